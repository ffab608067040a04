use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity. Variants are declared most severe first, so the derived
/// ordering sorts critical issues ahead of everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    /// Points subtracted from a page's score for one issue of this severity
    pub fn penalty(self) -> u32 {
        match self {
            Severity::Critical => 30,
            Severity::High => 15,
            Severity::Medium => 8,
            Severity::Low => 3,
            Severity::Info => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    Meta,
    Content,
    Technical,
    Performance,
    Links,
    StructuredData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub rule_id: String,
    pub title: String,
    pub description: String,
    pub category: IssueCategory,
    pub severity: Severity,
    pub url: Option<String>,
    pub recommended_fix: String,
    pub auto_fixable: bool,
    pub fixed: bool,
    pub ignored: bool,
    /// Report version in which the issue was first detected (0 until aggregated)
    #[serde(default)]
    pub first_seen: u64,
}

impl Issue {
    /// Open issues count toward scores and report tallies
    pub fn is_open(&self) -> bool {
        !self.fixed && !self.ignored
    }

    /// Whether the remediation engine may act on this issue
    pub fn is_eligible_for_fix(&self) -> bool {
        self.auto_fixable && self.is_open()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAudit {
    pub url: String,
    pub title: Option<String>,
    pub score: u32,
    pub issues: Vec<Issue>,
    pub fetched_at: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
    /// Canonical same-site links found on the page
    pub internal_links: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub total: usize,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Info => self.info += 1,
        }
        self.total += 1;
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Info => self.info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub version: u64,
    pub run_id: Option<u64>,
    pub seed_url: Option<String>,
    pub date: DateTime<Utc>,
    pub pages_crawled: usize,
    pub total_issues: SeverityCounts,
    pub new_issues: usize,
    pub fixed_issues: usize,
    pub overall_score: u32,
    pub top_priority_fixes: Vec<Issue>,
    pub open_issue_ids: Vec<String>,
    pub content_suggestions: Vec<String>,
    pub keyword_rankings: Vec<KeywordRanking>,
}

impl Report {
    /// Zeroed stand-in served before the first crawl completes
    pub fn placeholder() -> Self {
        Self {
            version: 0,
            run_id: None,
            seed_url: None,
            date: Utc::now(),
            pages_crawled: 0,
            total_issues: SeverityCounts::default(),
            new_issues: 0,
            fixed_issues: 0,
            overall_score: 0,
            top_priority_fixes: vec![],
            open_issue_ids: vec![],
            content_suggestions: vec![],
            keyword_rankings: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub version: u64,
    pub date: DateTime<Utc>,
    pub overall_score: u32,
    pub total_issues: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl CrawlState {
    pub fn is_active(self) -> bool {
        matches!(self, CrawlState::Queued | CrawlState::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRun {
    pub id: u64,
    pub seed_url: String,
    pub max_pages: usize,
    pub state: CrawlState,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_crawled: usize,
    pub report_version: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub src: String,
    pub alt: Option<String>,
}

/// Extracted content of a crawled page, retained for remediation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub h1_tags: Vec<String>,
    pub headings: Vec<String>,
    pub text_excerpt: String,
    pub images: Vec<Image>,
    pub canonical: Option<String>,
    pub has_viewport: bool,
    pub has_structured_data: bool,
    pub has_open_graph: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFix {
    pub issue_id: String,
    pub url: Option<String>,
    pub rule_id: String,
    /// The page element the patch targets, e.g. `meta[name=description]`
    pub field: String,
    pub value: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixOutcome {
    pub issue_id: String,
    pub success: bool,
    pub detail: String,
    pub fix: Option<AppliedFix>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixAllSummary {
    pub report_version: u64,
    pub succeeded: usize,
    pub failed: usize,
    pub details: Vec<FixOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchIntent {
    Informational,
    Navigational,
    Commercial,
    Transactional,
}

impl SearchIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchIntent::Informational => "informational",
            SearchIntent::Navigational => "navigational",
            SearchIntent::Commercial => "commercial",
            SearchIntent::Transactional => "transactional",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordResearchResult {
    pub keyword: String,
    pub search_volume: u64,
    pub difficulty: u8,
    pub intent: SearchIntent,
    pub trend: Trend,
    pub cpc: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTopic {
    pub id: String,
    pub topic: String,
    pub intent: SearchIntent,
    pub keywords: Vec<KeywordResearchResult>,
    pub total_search_volume: u64,
    pub average_difficulty: f64,
    pub suggested_title: String,
    pub suggested_subheadings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRanking {
    pub keyword: String,
    pub url: String,
    pub position: u32,
    pub previous_position: Option<u32>,
    pub change: Option<i64>,
    pub last_updated: DateTime<Utc>,
}

/// One measurement in the append-only ranking history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingSample {
    pub keyword: String,
    pub url: String,
    pub position: u32,
    pub measured_at: DateTime<Utc>,
}
