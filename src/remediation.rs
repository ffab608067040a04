//! Automated fixes for auto-fixable issues.
//!
//! A fix is a patch (target element plus new value) synthesized from the
//! page snapshot of the latest crawl. Patches are recorded in the store for
//! the site's CMS to publish; reports are never touched.

use crate::error::RemediationError;
use crate::models::{AppliedFix, FixAllSummary, FixOutcome, Issue, PageSnapshot};
use crate::rules;
use crate::store::AuditStore;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use url::Url;

pub const META_DESCRIPTION_LIMIT: usize = 155;
const TITLE_LIMIT: usize = 60;
const VIEWPORT_TAG: &str = r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#;

/// The element a fix targets and the value it receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub field: &'static str,
    pub value: String,
}

/// Builds the patch for `rule_id` from what the page currently contains.
/// Pure: the same snapshot always yields the same patch.
pub fn synthesize(rule_id: &str, page: &PageSnapshot) -> Result<Patch, String> {
    match rule_id {
        rules::MISSING_META_DESCRIPTION => {
            let source = if page.text_excerpt.trim().is_empty() {
                page.h1_tags.first().or(page.title.as_ref()).cloned().unwrap_or_default()
            } else {
                page.text_excerpt.clone()
            };
            let value = truncate_words(&source, META_DESCRIPTION_LIMIT);
            if value.is_empty() {
                return Err("page has no text to summarize".to_string());
            }
            Ok(Patch {
                field: "meta[name=description]",
                value,
            })
        }
        rules::MISSING_TITLE => {
            let value = match page.h1_tags.iter().find(|h| !h.trim().is_empty()) {
                Some(h1) => truncate_words(h1, TITLE_LIMIT),
                None => title_from_url(&page.url)
                    .ok_or_else(|| "no heading or URL to derive a title from".to_string())?,
            };
            Ok(Patch {
                field: "title",
                value,
            })
        }
        rules::MISSING_H1 => {
            let title = page
                .title
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| "page has no title to derive a heading from".to_string())?;
            Ok(Patch {
                field: "h1",
                value: title.trim().to_string(),
            })
        }
        rules::MISSING_ALT_TEXT => {
            let alts: BTreeMap<&str, String> = page
                .images
                .iter()
                .filter(|img| img.alt.is_none())
                .map(|img| (img.src.as_str(), alt_from_src(&img.src)))
                .collect();
            if alts.is_empty() {
                return Err("no images without alt text".to_string());
            }
            let value = serde_json::to_string(&alts).map_err(|e| e.to_string())?;
            Ok(Patch {
                field: "img[alt]",
                value,
            })
        }
        rules::MISSING_CANONICAL => Ok(Patch {
            field: "link[rel=canonical]",
            value: format!(r#"<link rel="canonical" href="{}">"#, escape_attr(&page.url)),
        }),
        rules::MISSING_VIEWPORT => Ok(Patch {
            field: "meta[name=viewport]",
            value: VIEWPORT_TAG.to_string(),
        }),
        rules::MISSING_STRUCTURED_DATA => {
            let mut data = json!({
                "@context": "https://schema.org",
                "@type": "WebPage",
                "url": page.url,
            });
            if let Some(name) = page.title.as_ref().or(page.h1_tags.first()) {
                data["name"] = json!(name);
            }
            if let Some(description) = description_of(page) {
                data["description"] = json!(description);
            }
            Ok(Patch {
                field: "script[type=application/ld+json]",
                value: format!(
                    r#"<script type="application/ld+json">{}</script>"#,
                    data
                ),
            })
        }
        rules::MISSING_OPEN_GRAPH => {
            let title = page
                .title
                .as_ref()
                .or(page.h1_tags.first())
                .ok_or_else(|| "page has no title for og:title".to_string())?;
            let mut tags = vec![
                og_tag("og:title", title),
                og_tag("og:type", "website"),
                og_tag("og:url", &page.url),
            ];
            if let Some(description) = description_of(page) {
                tags.push(og_tag("og:description", &description));
            }
            Ok(Patch {
                field: "meta[property^=og:]",
                value: tags.join("\n"),
            })
        }
        other => Err(format!("no automatic fix for rule '{}'", other)),
    }
}

fn description_of(page: &PageSnapshot) -> Option<String> {
    page.meta_description
        .clone()
        .or_else(|| Some(truncate_words(&page.text_excerpt, META_DESCRIPTION_LIMIT)))
        .filter(|d| !d.is_empty())
}

fn og_tag(property: &str, content: &str) -> String {
    format!(
        r#"<meta property="{}" content="{}">"#,
        property,
        escape_attr(content)
    )
}

/// Collapses whitespace and cuts `text` to at most `limit` characters
/// without splitting a word
pub fn truncate_words(text: &str, limit: usize) -> String {
    let mut out = String::new();
    for word in text.split_whitespace() {
        let needed = if out.is_empty() { word.chars().count() } else { word.chars().count() + 1 };
        if out.chars().count() + needed > limit {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.is_empty() {
        // a single word longer than the limit
        out = text.split_whitespace().next().unwrap_or("").chars().take(limit).collect();
    }
    out
}

fn title_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let slug = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(s).to_string());

    match slug {
        Some(slug) => Some(humanize(&slug)).filter(|s| !s.is_empty()),
        None => url.host_str().map(|h| h.trim_start_matches("www.").to_string()),
    }
}

fn alt_from_src(src: &str) -> String {
    let name = src
        .split(['?', '#'])
        .next()
        .unwrap_or(src)
        .rsplit('/')
        .next()
        .unwrap_or(src);
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    let alt = humanize(stem);
    if alt.is_empty() { "Image".to_string() } else { alt }
}

/// "hemp-farming_guide" → "Hemp farming guide"
fn humanize(slug: &str) -> String {
    let words: Vec<&str> = slug
        .split(['-', '_', ' ', '+'])
        .filter(|w| !w.is_empty())
        .collect();
    let sentence = words.join(" ");
    let mut chars = sentence.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn check_eligible(issue: &Issue) -> Result<(), RemediationError> {
    let reason = if issue.fixed {
        "issue is already fixed".to_string()
    } else if issue.ignored {
        "issue is ignored".to_string()
    } else if !issue.auto_fixable {
        format!("rule '{}' has no automatic fix", issue.rule_id)
    } else {
        return Ok(());
    };
    Err(RemediationError::NotFixable {
        id: issue.id.clone(),
        reason,
    })
}

/// Applies the automatic fix for one issue. Ineligible issues are rejected
/// and left untouched, so a second call for the same issue changes nothing.
/// A fix that cannot be synthesized comes back as an unsuccessful outcome.
pub fn fix_issue(store: &mut AuditStore, id: &str) -> Result<FixOutcome, RemediationError> {
    let issue = store
        .issue(id)
        .ok_or_else(|| RemediationError::IssueNotFound(id.to_string()))?;
    check_eligible(issue)?;
    if !store.is_detected(id) {
        return Err(RemediationError::NotFixable {
            id: id.to_string(),
            reason: "no longer detected".to_string(),
        });
    }

    let patch = issue
        .url
        .as_deref()
        .and_then(|url| store.snapshot(url))
        .ok_or_else(|| "no snapshot of the page from the latest crawl".to_string())
        .and_then(|page| synthesize(&issue.rule_id, page));

    let patch = match patch {
        Ok(patch) => patch,
        Err(detail) => {
            tracing::warn!(issue = %id, rule = %issue.rule_id, reason = %detail, "Fix could not be applied");
            return Ok(FixOutcome {
                issue_id: id.to_string(),
                success: false,
                detail,
                fix: None,
            });
        }
    };

    let fix = AppliedFix {
        issue_id: id.to_string(),
        url: issue.url.clone(),
        rule_id: issue.rule_id.clone(),
        field: patch.field.to_string(),
        value: patch.value,
        applied_at: Utc::now(),
    };

    if let Some(issue) = store.issue_mut(id) {
        issue.fixed = true;
    }
    store.record_fix(fix.clone());
    tracing::info!(issue = %id, rule = %fix.rule_id, field = %fix.field, "Applied fix");

    Ok(FixOutcome {
        issue_id: id.to_string(),
        success: true,
        detail: format!("set {}", fix.field),
        fix: Some(fix),
    })
}

/// Fixes every eligible issue of a report (the latest when `version` is
/// `None`). One failure never stops the rest.
pub fn fix_all(store: &mut AuditStore, version: Option<u64>) -> Result<FixAllSummary, RemediationError> {
    let report = match version {
        Some(v) => store.report(v).ok_or(RemediationError::ReportNotFound(v))?,
        None => match store.latest_report() {
            Some(report) => report,
            None => return Ok(FixAllSummary::default()),
        },
    };
    let report_version = report.version;
    let eligible = store.eligible_issues(report);

    let mut summary = FixAllSummary {
        report_version,
        ..Default::default()
    };
    for issue in eligible {
        let outcome = fix_issue(store, &issue.id).unwrap_or_else(|e| FixOutcome {
            issue_id: issue.id.clone(),
            success: false,
            detail: e.to_string(),
            fix: None,
        });
        if outcome.success {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
        summary.details.push(outcome);
    }

    tracing::info!(
        report = report_version,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Fix-all finished"
    );
    Ok(summary)
}

/// Excludes an issue from scores and fix lists from the next report on
pub fn ignore_issue(store: &mut AuditStore, id: &str) -> Result<Issue, RemediationError> {
    let issue = store
        .issue_mut(id)
        .ok_or_else(|| RemediationError::IssueNotFound(id.to_string()))?;
    if issue.fixed {
        return Err(RemediationError::NotFixable {
            id: id.to_string(),
            reason: "issue is already fixed".to_string(),
        });
    }
    issue.ignored = true;
    tracing::info!(issue = %id, "Ignored issue");
    Ok(issue.clone())
}

/// Marks an issue fixed by hand once the latest crawl no longer detects it
pub fn resolve_issue(store: &mut AuditStore, id: &str) -> Result<Issue, RemediationError> {
    if store.issue(id).is_none() {
        return Err(RemediationError::IssueNotFound(id.to_string()));
    }
    if store.is_detected(id) {
        return Err(RemediationError::StillDetected(id.to_string()));
    }

    let issue = store
        .issue_mut(id)
        .ok_or_else(|| RemediationError::IssueNotFound(id.to_string()))?;
    issue.fixed = true;
    issue.ignored = false;
    tracing::info!(issue = %id, "Resolved issue");
    Ok(issue.clone())
}
