//! The audit rule catalog and its evaluation.
//!
//! Every rule yields at most one issue per page and reads nothing but the
//! page (and, for site rules, an immutable index of the whole crawl), so
//! rules can run in any order or in parallel with identical output.

use crate::error::FetchError;
use crate::fetcher::FetchedPage;
use crate::models::{Issue, IssueCategory, Severity};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

pub const TITLE_MIN_CHARS: usize = 30;
pub const TITLE_MAX_CHARS: usize = 60;
pub const META_DESCRIPTION_MIN_CHARS: usize = 70;
pub const META_DESCRIPTION_MAX_CHARS: usize = 160;

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub slow_response_ms: u64,
    pub min_words: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            slow_response_ms: 2000,
            min_words: 300,
        }
    }
}

type PageCheck = fn(&FetchedPage, &Thresholds) -> Option<String>;
type SiteCheck = fn(&FetchedPage, &SiteIndex) -> Option<String>;

#[derive(Clone, Copy)]
enum Check {
    /// Produced by the crawler when a fetch fails
    Fetch,
    Page(PageCheck),
    Site(SiteCheck),
}

#[derive(Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    pub title: &'static str,
    pub category: IssueCategory,
    pub severity: Severity,
    pub auto_fixable: bool,
    pub recommended_fix: &'static str,
    html_only: bool,
    check: Check,
}

impl Rule {
    pub fn issue(&self, url: Option<&str>, description: String) -> Issue {
        Issue {
            id: issue_id(self.id, url),
            rule_id: self.id.to_string(),
            title: self.title.to_string(),
            description,
            category: self.category,
            severity: self.severity,
            url: url.map(|u| u.to_string()),
            recommended_fix: self.recommended_fix.to_string(),
            auto_fixable: self.auto_fixable,
            fixed: false,
            ignored: false,
            first_seen: 0,
        }
    }
}

pub const PAGE_UNREACHABLE: &str = "page-unreachable";
pub const MISSING_TITLE: &str = "missing-title";
pub const TITLE_LENGTH: &str = "title-length";
pub const MISSING_META_DESCRIPTION: &str = "missing-meta-description";
pub const META_DESCRIPTION_LENGTH: &str = "meta-description-length";
pub const MISSING_H1: &str = "missing-h1";
pub const MULTIPLE_H1: &str = "multiple-h1";
pub const MISSING_ALT_TEXT: &str = "missing-alt-text";
pub const THIN_CONTENT: &str = "thin-content";
pub const MISSING_CANONICAL: &str = "missing-canonical";
pub const MISSING_VIEWPORT: &str = "missing-viewport";
pub const SLOW_RESPONSE: &str = "slow-response";
pub const MISSING_STRUCTURED_DATA: &str = "missing-structured-data";
pub const MISSING_OPEN_GRAPH: &str = "missing-open-graph";
pub const DUPLICATE_TITLE: &str = "duplicate-title";
pub const BROKEN_INTERNAL_LINK: &str = "broken-internal-link";

pub static CATALOG: &[Rule] = &[
    Rule {
        id: PAGE_UNREACHABLE,
        title: "Page unreachable",
        category: IssueCategory::Technical,
        severity: Severity::Critical,
        auto_fixable: false,
        recommended_fix: "Check that the page exists, the server is healthy, and the response fits within the size limit.",
        html_only: false,
        check: Check::Fetch,
    },
    Rule {
        id: MISSING_TITLE,
        title: "Missing page title",
        category: IssueCategory::Meta,
        severity: Severity::High,
        auto_fixable: true,
        recommended_fix: "Add a unique, descriptive <title> of 30-60 characters.",
        html_only: true,
        check: Check::Page(check_missing_title),
    },
    Rule {
        id: TITLE_LENGTH,
        title: "Title length out of range",
        category: IssueCategory::Meta,
        severity: Severity::Low,
        auto_fixable: false,
        recommended_fix: "Rewrite the title to 30-60 characters so it is not truncated in search results.",
        html_only: true,
        check: Check::Page(check_title_length),
    },
    Rule {
        id: MISSING_META_DESCRIPTION,
        title: "Missing meta description",
        category: IssueCategory::Meta,
        severity: Severity::Medium,
        auto_fixable: true,
        recommended_fix: "Add a meta description of 70-160 characters summarizing the page.",
        html_only: true,
        check: Check::Page(check_missing_meta_description),
    },
    Rule {
        id: META_DESCRIPTION_LENGTH,
        title: "Meta description length out of range",
        category: IssueCategory::Meta,
        severity: Severity::Low,
        auto_fixable: false,
        recommended_fix: "Rewrite the meta description to 70-160 characters.",
        html_only: true,
        check: Check::Page(check_meta_description_length),
    },
    Rule {
        id: MISSING_H1,
        title: "Missing H1 heading",
        category: IssueCategory::Content,
        severity: Severity::Medium,
        auto_fixable: true,
        recommended_fix: "Add a single H1 heading describing the page's main topic.",
        html_only: true,
        check: Check::Page(check_missing_h1),
    },
    Rule {
        id: MULTIPLE_H1,
        title: "Multiple H1 headings",
        category: IssueCategory::Content,
        severity: Severity::Low,
        auto_fixable: false,
        recommended_fix: "Keep one H1 and demote the others to H2.",
        html_only: true,
        check: Check::Page(check_multiple_h1),
    },
    Rule {
        id: MISSING_ALT_TEXT,
        title: "Images missing alt text",
        category: IssueCategory::Content,
        severity: Severity::Medium,
        auto_fixable: true,
        recommended_fix: "Describe every meaningful image in its alt attribute.",
        html_only: true,
        check: Check::Page(check_missing_alt_text),
    },
    Rule {
        id: THIN_CONTENT,
        title: "Thin content",
        category: IssueCategory::Content,
        severity: Severity::Low,
        auto_fixable: false,
        recommended_fix: "Expand the page with substantive content (at least 300 words).",
        html_only: true,
        check: Check::Page(check_thin_content),
    },
    Rule {
        id: MISSING_CANONICAL,
        title: "Missing canonical link",
        category: IssueCategory::Technical,
        severity: Severity::Low,
        auto_fixable: true,
        recommended_fix: "Add <link rel=\"canonical\"> pointing at the preferred URL.",
        html_only: true,
        check: Check::Page(check_missing_canonical),
    },
    Rule {
        id: MISSING_VIEWPORT,
        title: "Missing viewport meta tag",
        category: IssueCategory::Technical,
        severity: Severity::Medium,
        auto_fixable: true,
        recommended_fix: "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">.",
        html_only: true,
        check: Check::Page(check_missing_viewport),
    },
    Rule {
        id: SLOW_RESPONSE,
        title: "Slow server response",
        category: IssueCategory::Performance,
        severity: Severity::Medium,
        auto_fixable: false,
        recommended_fix: "Reduce server response time with caching, a CDN, or lighter pages.",
        html_only: false,
        check: Check::Page(check_slow_response),
    },
    Rule {
        id: MISSING_STRUCTURED_DATA,
        title: "Missing structured data",
        category: IssueCategory::StructuredData,
        severity: Severity::Low,
        auto_fixable: true,
        recommended_fix: "Add schema.org JSON-LD describing the page.",
        html_only: true,
        check: Check::Page(check_missing_structured_data),
    },
    Rule {
        id: MISSING_OPEN_GRAPH,
        title: "Missing Open Graph tags",
        category: IssueCategory::Meta,
        severity: Severity::Info,
        auto_fixable: true,
        recommended_fix: "Add og:title, og:description and og:url tags for social sharing.",
        html_only: true,
        check: Check::Page(check_missing_open_graph),
    },
    Rule {
        id: DUPLICATE_TITLE,
        title: "Duplicate page title",
        category: IssueCategory::Meta,
        severity: Severity::Medium,
        auto_fixable: false,
        recommended_fix: "Give every page a distinct title.",
        html_only: true,
        check: Check::Site(check_duplicate_title),
    },
    Rule {
        id: BROKEN_INTERNAL_LINK,
        title: "Broken internal links",
        category: IssueCategory::Links,
        severity: Severity::High,
        auto_fixable: false,
        recommended_fix: "Update or remove links pointing at pages that fail to load.",
        html_only: true,
        check: Check::Site(check_broken_internal_link),
    },
];

pub fn rule(id: &str) -> Option<&'static Rule> {
    CATALOG.iter().find(|r| r.id == id)
}

/// Stable issue identifier: the same rule on the same URL always maps to the
/// same id, so re-detection in a later crawl is recognized
pub fn issue_id(rule_id: &str, url: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.as_bytes());
    hasher.update(b"|");
    hasher.update(url.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// What every page of one crawl looked like, for cross-page rules
#[derive(Debug, Default)]
pub struct SiteIndex {
    /// Normalized title → URLs carrying it
    titles: HashMap<String, Vec<String>>,
    /// URLs whose fetch failed
    failed: HashSet<String>,
}

impl SiteIndex {
    pub fn build<'a>(
        pages: impl IntoIterator<Item = &'a FetchedPage>,
        failed: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut titles: HashMap<String, Vec<String>> = HashMap::new();
        for page in pages {
            if let Some(title) = page.title.as_deref() {
                titles
                    .entry(normalize_title(title))
                    .or_default()
                    .push(page.url.clone());
            }
        }
        Self {
            titles,
            failed: failed.into_iter().map(|u| u.to_string()).collect(),
        }
    }

    fn pages_sharing_title(&self, title: &str) -> usize {
        self.titles
            .get(&normalize_title(title))
            .map(|urls| urls.len())
            .unwrap_or(0)
    }
}

fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine {
    thresholds: Thresholds,
}

impl RuleEngine {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Runs every page-local rule against a fetched page
    pub fn evaluate(&self, page: &FetchedPage) -> Vec<Issue> {
        let mut issues: Vec<Issue> = CATALOG
            .iter()
            .filter(|rule| page.is_html || !rule.html_only)
            .filter_map(|rule| match rule.check {
                Check::Page(check) => check(page, &self.thresholds)
                    .map(|description| rule.issue(Some(page.url.as_str()), description)),
                _ => None,
            })
            .collect();
        sort_issues(&mut issues);
        issues
    }

    /// Runs the cross-page rules once the whole crawl is known
    pub fn evaluate_site(&self, page: &FetchedPage, site: &SiteIndex) -> Vec<Issue> {
        let mut issues: Vec<Issue> = CATALOG
            .iter()
            .filter(|rule| page.is_html || !rule.html_only)
            .filter_map(|rule| match rule.check {
                Check::Site(check) => {
                    check(page, site).map(|description| rule.issue(Some(page.url.as_str()), description))
                }
                _ => None,
            })
            .collect();
        sort_issues(&mut issues);
        issues
    }

    /// The single issue recorded for a page that could not be fetched
    pub fn unreachable(&self, url: &str, error: &FetchError) -> Issue {
        let rule = rule(PAGE_UNREACHABLE).expect("page-unreachable is in the catalog");
        rule.issue(Some(url), format!("Failed to fetch page: {}", error))
    }
}

/// Canonical issue order: most severe first, then rule id, then URL
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then_with(|| a.url.cmp(&b.url))
    });
}

fn check_missing_title(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    page.title
        .is_none()
        .then(|| "Page has no <title> element".to_string())
}

fn check_title_length(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    let len = page.title.as_deref()?.chars().count();
    (!(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&len)).then(|| {
        format!(
            "Title is {} characters (recommended {}-{})",
            len, TITLE_MIN_CHARS, TITLE_MAX_CHARS
        )
    })
}

fn check_missing_meta_description(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    page.meta_description
        .is_none()
        .then(|| "Page is missing a meta description".to_string())
}

fn check_meta_description_length(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    let len = page.meta_description.as_deref()?.chars().count();
    (!(META_DESCRIPTION_MIN_CHARS..=META_DESCRIPTION_MAX_CHARS).contains(&len)).then(|| {
        format!(
            "Meta description is {} characters (recommended {}-{})",
            len, META_DESCRIPTION_MIN_CHARS, META_DESCRIPTION_MAX_CHARS
        )
    })
}

fn check_missing_h1(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    page.h1_tags
        .iter()
        .all(|h| h.is_empty())
        .then(|| "Page is missing an H1 heading".to_string())
}

fn check_multiple_h1(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    let count = page.h1_tags.len();
    (count > 1).then(|| format!("Page has {} H1 headings", count))
}

fn check_missing_alt_text(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    let missing = page.images.iter().filter(|img| img.alt.is_none()).count();
    (missing > 0).then(|| format!("{} image(s) missing alt text", missing))
}

fn check_thin_content(page: &FetchedPage, thresholds: &Thresholds) -> Option<String> {
    (page.word_count < thresholds.min_words).then(|| {
        format!(
            "Page has {} words of body text (minimum {})",
            page.word_count, thresholds.min_words
        )
    })
}

fn check_missing_canonical(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    page.canonical
        .is_none()
        .then(|| "Page does not declare a canonical URL".to_string())
}

fn check_missing_viewport(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    (!page.has_viewport).then(|| "Page has no viewport meta tag".to_string())
}

fn check_slow_response(page: &FetchedPage, thresholds: &Thresholds) -> Option<String> {
    (page.response_time_ms > thresholds.slow_response_ms).then(|| {
        format!(
            "Server responded in {} ms (threshold {} ms)",
            page.response_time_ms, thresholds.slow_response_ms
        )
    })
}

fn check_missing_structured_data(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    (!page.has_structured_data).then(|| "Page has no JSON-LD or microdata".to_string())
}

fn check_missing_open_graph(page: &FetchedPage, _: &Thresholds) -> Option<String> {
    (!page.has_open_graph).then(|| "Page has no Open Graph tags".to_string())
}

fn check_duplicate_title(page: &FetchedPage, site: &SiteIndex) -> Option<String> {
    let title = page.title.as_deref()?;
    let others = site.pages_sharing_title(title).saturating_sub(1);
    (others > 0).then(|| format!("Title \"{}\" is shared with {} other page(s)", title, others))
}

fn check_broken_internal_link(page: &FetchedPage, site: &SiteIndex) -> Option<String> {
    let broken: Vec<&str> = page
        .links
        .iter()
        .filter(|link| site.failed.contains(link.as_str()))
        .map(|link| link.as_str())
        .collect();
    if broken.is_empty() {
        return None;
    }
    Some(format!(
        "{} internal link(s) point to failing pages: {}",
        broken.len(),
        broken.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Image;

    fn healthy_page(url: &str) -> FetchedPage {
        FetchedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            status_code: 200,
            is_html: true,
            title: Some("A Healthy Page Title For Testing Purposes".to_string()),
            meta_description: Some(
                "A meta description that is comfortably longer than seventy characters in total."
                    .to_string(),
            ),
            h1_tags: vec!["Healthy".to_string()],
            canonical: Some(url.to_string()),
            has_viewport: true,
            has_structured_data: true,
            has_open_graph: true,
            word_count: 500,
            response_time_ms: 40,
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_page_has_no_issues() {
        let engine = RuleEngine::default();
        assert!(engine.evaluate(&healthy_page("https://example.com/")).is_empty());
    }

    #[test]
    fn test_missing_meta_description_is_single_fixable_meta_issue() {
        let engine = RuleEngine::default();
        let mut page = healthy_page("https://example.com/");
        page.meta_description = None;

        let issues = engine.evaluate(&page);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, MISSING_META_DESCRIPTION);
        assert_eq!(issues[0].category, IssueCategory::Meta);
        assert!(issues[0].auto_fixable);
        assert_eq!(issues[0].severity, Severity::Medium);
    }

    #[test]
    fn test_each_rule_yields_at_most_one_issue() {
        let engine = RuleEngine::default();
        let mut page = healthy_page("https://example.com/");
        page.images = vec![
            Image { src: "a.png".into(), alt: None },
            Image { src: "b.png".into(), alt: None },
        ];
        page.h1_tags = vec!["One".into(), "Two".into(), "Three".into()];

        let issues = engine.evaluate(&page);
        let mut ids: Vec<_> = issues.iter().map(|i| i.rule_id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), issues.len());
        assert!(issues.iter().any(|i| i.description == "2 image(s) missing alt text"));
    }

    #[test]
    fn test_issues_sorted_by_severity() {
        let engine = RuleEngine::default();
        let page = FetchedPage {
            url: "https://example.com/bare".into(),
            is_html: true,
            ..Default::default()
        };
        let issues = engine.evaluate(&page);
        assert!(issues.windows(2).all(|w| w[0].severity <= w[1].severity));
        assert_eq!(issues[0].rule_id, MISSING_TITLE);
    }

    #[test]
    fn test_non_html_pages_only_get_performance_rules() {
        let engine = RuleEngine::default();
        let page = FetchedPage {
            url: "https://example.com/file.pdf".into(),
            is_html: false,
            response_time_ms: 5000,
            ..Default::default()
        };
        let issues = engine.evaluate(&page);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, SLOW_RESPONSE);
    }

    #[test]
    fn test_issue_id_is_stable_and_distinct() {
        let a = issue_id(MISSING_TITLE, Some("https://example.com/"));
        let b = issue_id(MISSING_TITLE, Some("https://example.com/"));
        let c = issue_id(MISSING_TITLE, Some("https://example.com/about"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_site_rules() {
        let engine = RuleEngine::default();
        let mut home = healthy_page("https://example.com/");
        home.links = vec![
            "https://example.com/about".to_string(),
            "https://example.com/gone".to_string(),
        ];
        let about = healthy_page("https://example.com/about");
        let site = SiteIndex::build([&home, &about], ["https://example.com/gone"]);

        let issues = engine.evaluate_site(&home, &site);
        let rule_ids: Vec<_> = issues.iter().map(|i| i.rule_id.as_str()).collect();
        assert_eq!(rule_ids, vec![BROKEN_INTERNAL_LINK, DUPLICATE_TITLE]);
        assert!(issues[0].description.contains("https://example.com/gone"));
    }

    #[test]
    fn test_unreachable_issue() {
        let engine = RuleEngine::default();
        let issue = engine.unreachable("https://example.com/x", &FetchError::Http5xx(502));
        assert_eq!(issue.rule_id, PAGE_UNREACHABLE);
        assert_eq!(issue.severity, Severity::Critical);
        assert!(!issue.auto_fixable);
        assert!(issue.description.contains("HTTP 502"));
    }
}
