//! Issue, report, run and keyword state, with optional JSON persistence.
//!
//! Layout of a data directory:
//!
//! ```text
//! <data_dir>/state.json                 issues, audits, runs, fixes, keyword data
//! <data_dir>/reports/report-000001.json one write-once file per report version
//! ```

use crate::error::{StoreError, StoreResult};
use crate::models::{
    AppliedFix, ContentTopic, CrawlRun, CrawlState, Issue, KeywordRanking,
    KeywordResearchResult, PageAudit, PageSnapshot, RankingSample, Report, ReportSummary,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "state.json";
const REPORTS_DIR: &str = "reports";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct State {
    issues: BTreeMap<String, Issue>,
    audits: Vec<PageAudit>,
    snapshots: BTreeMap<String, PageSnapshot>,
    runs: Vec<CrawlRun>,
    fixes: Vec<AppliedFix>,
    rankings: Vec<KeywordRanking>,
    ranking_history: Vec<RankingSample>,
    research: Vec<KeywordResearchResult>,
    topics: Vec<ContentTopic>,
}

#[derive(Debug, Default)]
pub struct AuditStore {
    dir: Option<PathBuf>,
    state: State,
    /// Every report, ascending by version
    reports: Vec<Report>,
}

impl AuditStore {
    /// A store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens (or initializes) a store in `dir`. Runs that were still
    /// queued or running when the previous process stopped are failed.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir.join(REPORTS_DIR))?;

        let state_path = dir.join(STATE_FILE);
        let mut state: State = if state_path.exists() {
            serde_json::from_str(&fs::read_to_string(&state_path)?)?
        } else {
            State::default()
        };

        let mut reports = Vec::new();
        for entry in fs::read_dir(dir.join(REPORTS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let report: Report = serde_json::from_str(&fs::read_to_string(&path)?)?;
                reports.push(report);
            }
        }
        reports.sort_by_key(|r| r.version);

        let mut interrupted = 0;
        for run in state.runs.iter_mut().filter(|r| r.state.is_active()) {
            run.state = CrawlState::Failed;
            run.error = Some("interrupted".to_string());
            run.finished_at = Some(Utc::now());
            interrupted += 1;
        }

        let store = Self {
            dir: Some(dir.to_path_buf()),
            state,
            reports,
        };
        if interrupted > 0 {
            tracing::warn!(runs = interrupted, "Marked interrupted crawl runs as failed");
            store.persist()?;
        }

        tracing::info!(
            dir = %dir.display(),
            reports = store.reports.len(),
            issues = store.state.issues.len(),
            "Opened audit store"
        );
        Ok(store)
    }

    /// Writes `state.json`. No-op for in-memory stores.
    pub fn persist(&self) -> StoreResult<()> {
        match &self.dir {
            Some(dir) => write_atomic(&dir.join(STATE_FILE), &self.state),
            None => Ok(()),
        }
    }

    // Runs

    /// Queues a new run; only one run may be queued or running at a time
    pub fn begin_run(&mut self, seed_url: &str, max_pages: usize) -> StoreResult<CrawlRun> {
        if let Some(active) = self.active_run() {
            return Err(StoreError::CrawlInProgress(active.id));
        }

        let id = self.state.runs.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let run = CrawlRun {
            id,
            seed_url: seed_url.to_string(),
            max_pages,
            state: CrawlState::Queued,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
            pages_crawled: 0,
            report_version: None,
        };
        self.state.runs.push(run.clone());
        Ok(run)
    }

    pub fn active_run(&self) -> Option<&CrawlRun> {
        self.state.runs.iter().find(|r| r.state.is_active())
    }

    pub fn run(&self, id: u64) -> Option<&CrawlRun> {
        self.state.runs.iter().find(|r| r.id == id)
    }

    fn run_mut(&mut self, id: u64) -> StoreResult<&mut CrawlRun> {
        self.state
            .runs
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::RunNotFound(id))
    }

    pub fn mark_running(&mut self, id: u64) -> StoreResult<()> {
        self.run_mut(id)?.state = CrawlState::Running;
        Ok(())
    }

    pub fn fail_run(&mut self, id: u64, error: &str) -> StoreResult<()> {
        let run = self.run_mut(id)?;
        run.state = CrawlState::Failed;
        run.error = Some(error.to_string());
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    // Reports

    pub fn latest_report(&self) -> Option<&Report> {
        self.reports.last()
    }

    pub fn report(&self, version: u64) -> Option<&Report> {
        self.reports.iter().find(|r| r.version == version)
    }

    pub fn report_summaries(&self) -> Vec<ReportSummary> {
        self.reports
            .iter()
            .map(|r| ReportSummary {
                version: r.version,
                date: r.date,
                overall_score: r.overall_score,
                total_issues: r.total_issues.total,
            })
            .collect()
    }

    pub fn next_version(&self) -> u64 {
        self.latest_report().map(|r| r.version).unwrap_or(0) + 1
    }

    /// Carries stored issue state onto freshly detected issues and
    /// registers new ones. Ignored issues stay ignored; a fixed issue that
    /// is detected again is reopened. Page scores are recomputed from the
    /// resulting flags.
    pub fn reconcile_issues(&mut self, audits: &mut [PageAudit], version: u64) {
        for audit in audits.iter_mut() {
            for issue in audit.issues.iter_mut() {
                match self.state.issues.get_mut(&issue.id) {
                    Some(stored) => {
                        if stored.fixed {
                            tracing::warn!(
                                issue = %issue.id,
                                rule = %issue.rule_id,
                                url = issue.url.as_deref().unwrap_or(""),
                                "Fixed issue detected again, reopening"
                            );
                        }
                        issue.ignored = stored.ignored;
                        issue.fixed = false;
                        issue.first_seen = stored.first_seen;
                        *stored = issue.clone();
                    }
                    None => {
                        issue.first_seen = version;
                        self.state.issues.insert(issue.id.clone(), issue.clone());
                    }
                }
            }
            audit.score = crate::aggregator::page_score(&audit.issues);
        }
    }

    /// Stores a new report version together with the audits and snapshots
    /// it was built from, and completes the run that produced it
    pub fn commit_report(
        &mut self,
        report: Report,
        audits: Vec<PageAudit>,
        snapshots: Vec<PageSnapshot>,
    ) -> StoreResult<()> {
        if let Some(dir) = &self.dir {
            let path = dir
                .join(REPORTS_DIR)
                .join(format!("report-{:06}.json", report.version));
            write_atomic(&path, &report)?;
        }

        if let Some(run_id) = report.run_id {
            let run = self.run_mut(run_id)?;
            run.state = CrawlState::Completed;
            run.finished_at = Some(Utc::now());
            run.pages_crawled = report.pages_crawled;
            run.report_version = Some(report.version);
        }

        self.state.audits = audits;
        self.state.snapshots = snapshots
            .into_iter()
            .map(|s| (s.url.clone(), s))
            .collect();

        tracing::info!(
            version = report.version,
            score = report.overall_score,
            issues = report.total_issues.total,
            "Committed report"
        );
        self.reports.push(report);
        self.persist()
    }

    // Audits and issues

    /// Audits of the latest crawl with current issue flags
    pub fn page_audits(&self) -> Vec<PageAudit> {
        self.state
            .audits
            .iter()
            .map(|audit| {
                let mut audit = audit.clone();
                for issue in audit.issues.iter_mut() {
                    if let Some(stored) = self.state.issues.get(&issue.id) {
                        issue.fixed = stored.fixed;
                        issue.ignored = stored.ignored;
                    }
                }
                audit
            })
            .collect()
    }

    /// Whether the latest crawl detected the issue, whatever its flags
    pub fn is_detected(&self, id: &str) -> bool {
        self.state
            .audits
            .iter()
            .any(|audit| audit.issues.iter().any(|issue| issue.id == id))
    }

    pub fn issue(&self, id: &str) -> Option<&Issue> {
        self.state.issues.get(id)
    }

    pub fn issue_mut(&mut self, id: &str) -> Option<&mut Issue> {
        self.state.issues.get_mut(id)
    }

    /// Issues of `report` that are still open, auto-fixable and detected
    /// by the latest crawl
    pub fn eligible_issues(&self, report: &Report) -> Vec<Issue> {
        report
            .open_issue_ids
            .iter()
            .filter(|id| self.is_detected(id))
            .filter_map(|id| self.state.issues.get(id))
            .filter(|issue| issue.is_eligible_for_fix())
            .cloned()
            .collect()
    }

    pub fn snapshot(&self, url: &str) -> Option<&PageSnapshot> {
        self.state.snapshots.get(url)
    }

    pub fn record_fix(&mut self, fix: AppliedFix) {
        self.state.fixes.push(fix);
    }

    pub fn fixes(&self) -> &[AppliedFix] {
        &self.state.fixes
    }

    // Keywords

    pub fn set_research(&mut self, results: Vec<KeywordResearchResult>, topics: Vec<ContentTopic>) {
        self.state.research = results;
        self.state.topics = topics;
    }

    pub fn research(&self) -> &[KeywordResearchResult] {
        &self.state.research
    }

    pub fn topics(&self) -> &[ContentTopic] {
        &self.state.topics
    }

    pub fn ranking(&self, keyword: &str, url: &str) -> Option<&KeywordRanking> {
        self.state
            .rankings
            .iter()
            .find(|r| r.keyword == keyword && r.url == url)
    }

    /// Replaces the current record for the ranking's (keyword, url) and
    /// appends the measurement to the history
    pub fn upsert_ranking(&mut self, ranking: KeywordRanking) {
        self.state
            .ranking_history
            .push(crate::keywords::ranking::sample(&ranking));
        match self
            .state
            .rankings
            .iter_mut()
            .find(|r| r.keyword == ranking.keyword && r.url == ranking.url)
        {
            Some(existing) => *existing = ranking,
            None => self.state.rankings.push(ranking),
        }
    }

    pub fn rankings(&self) -> &[KeywordRanking] {
        &self.state.rankings
    }

    pub fn ranking_history(&self) -> &[RankingSample] {
        &self.state.ranking_history
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
