//! Turns the page audits of one crawl into a versioned report.
//!
//! Scoring: a page starts at 100 and loses [`Severity::penalty`] points per
//! open issue, floored at 0. The site score is the mean of page scores
//! weighted by `1 + inbound internal links`, rounded half away from zero.

use crate::models::{Issue, KeywordRanking, PageAudit, Report, SeverityCounts};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_TOP_FIXES: usize = 10;

/// Everything a report carries that does not come from the audits
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub version: u64,
    pub run_id: Option<u64>,
    pub seed_url: Option<String>,
    pub date: DateTime<Utc>,
    pub content_suggestions: Vec<String>,
    pub keyword_rankings: Vec<KeywordRanking>,
    pub top_fixes_limit: usize,
}

impl ReportContext {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            run_id: None,
            seed_url: None,
            date: Utc::now(),
            content_suggestions: vec![],
            keyword_rankings: vec![],
            top_fixes_limit: DEFAULT_TOP_FIXES,
        }
    }
}

/// Score of one page from its open issues
pub fn page_score(issues: &[Issue]) -> u32 {
    let penalty: u32 = issues
        .iter()
        .filter(|issue| issue.is_open())
        .map(|issue| issue.severity.penalty())
        .sum();
    100u32.saturating_sub(penalty)
}

/// Weight of every audited page: one plus the number of other audited pages
/// linking to it
pub fn page_weights(audits: &[PageAudit]) -> HashMap<&str, u64> {
    let mut weights: HashMap<&str, u64> = audits.iter().map(|a| (a.url.as_str(), 1)).collect();

    for audit in audits {
        let targets: HashSet<&str> = audit
            .internal_links
            .iter()
            .map(|l| l.as_str())
            .filter(|l| *l != audit.url)
            .collect();
        for target in targets {
            if let Some(weight) = weights.get_mut(target) {
                *weight += 1;
            }
        }
    }

    weights
}

pub fn overall_score(audits: &[PageAudit]) -> u32 {
    if audits.is_empty() {
        return 100;
    }

    let weights = page_weights(audits);
    let (weighted, total) = audits.iter().fold((0u64, 0u64), |(sum, total), audit| {
        let w = weights.get(audit.url.as_str()).copied().unwrap_or(1);
        (sum + w * audit.score as u64, total + w)
    });

    (weighted as f64 / total as f64).round() as u32
}

pub struct Aggregator;

impl Aggregator {
    /// Builds the next report from a completed crawl's audits, diffing
    /// against the previous report's open issues
    pub fn aggregate(
        audits: &[PageAudit],
        previous: Option<&Report>,
        context: ReportContext,
    ) -> Report {
        let weights = page_weights(audits);

        let detected: HashSet<&str> = audits
            .iter()
            .flat_map(|a| a.issues.iter().map(|i| i.id.as_str()))
            .collect();

        let mut open: Vec<&Issue> = audits
            .iter()
            .flat_map(|a| a.issues.iter())
            .filter(|issue| issue.is_open())
            .collect();

        let mut total_issues = SeverityCounts::default();
        for issue in &open {
            total_issues.record(issue.severity);
        }

        let previous_open: HashSet<&str> = previous
            .map(|r| r.open_issue_ids.iter().map(|id| id.as_str()).collect())
            .unwrap_or_default();

        let new_issues = open
            .iter()
            .filter(|issue| !previous_open.contains(issue.id.as_str()))
            .count();
        let fixed_issues = previous_open
            .iter()
            .filter(|id| !detected.contains(*id))
            .count();

        let impact = |issue: &Issue| {
            issue
                .url
                .as_deref()
                .and_then(|u| weights.get(u).copied())
                .unwrap_or(1)
        };
        open.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then_with(|| impact(b).cmp(&impact(a)))
                .then_with(|| a.url.cmp(&b.url))
                .then_with(|| a.rule_id.cmp(&b.rule_id))
        });

        let top_priority_fixes = open
            .iter()
            .take(context.top_fixes_limit)
            .map(|issue| (*issue).clone())
            .collect();

        let mut open_issue_ids: Vec<String> = open.iter().map(|i| i.id.clone()).collect();
        open_issue_ids.sort();
        open_issue_ids.dedup();

        Report {
            version: context.version,
            run_id: context.run_id,
            seed_url: context.seed_url,
            date: context.date,
            pages_crawled: audits.len(),
            total_issues,
            new_issues,
            fixed_issues,
            overall_score: overall_score(audits),
            top_priority_fixes,
            open_issue_ids,
            content_suggestions: context.content_suggestions,
            keyword_rankings: context.keyword_rankings,
        }
    }
}
