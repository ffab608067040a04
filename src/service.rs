use crate::aggregator::{Aggregator, ReportContext};
use crate::config::Settings;
use crate::crawler::{CrawlOutcome, Crawler, CrawlerConfig};
use crate::error::{CrawlError, KeywordError, ServiceError, StoreError};
use crate::fetcher::Fetcher;
use crate::http_client::build_http_client;
use crate::keywords::provider::{HttpKeywordProvider, KeywordProvider, UnconfiguredProvider};
use crate::keywords::{self, normalize_keyword};
use crate::models::{
    AppliedFix, ContentTopic, CrawlRun, FixAllSummary, FixOutcome, Issue, KeywordRanking,
    KeywordResearchResult, PageAudit, RankingSample, Report, ReportSummary,
};
use crate::remediation;
use crate::rules::Thresholds;
use crate::store::AuditStore;
use anyhow::Context;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

/// Number of topic titles carried into each report
const CONTENT_SUGGESTIONS: usize = 5;

/// Owns the store and the outbound clients; cheap to clone into handlers
/// and background tasks.
#[derive(Clone)]
pub struct AuditService {
    settings: Arc<Settings>,
    store: Arc<Mutex<AuditStore>>,
    client: reqwest::Client,
    provider: Arc<dyn KeywordProvider>,
}

impl AuditService {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let store = match &settings.data_dir {
            Some(dir) => AuditStore::open(dir)
                .with_context(|| format!("Failed to open data directory {}", dir.display()))?,
            None => AuditStore::in_memory(),
        };
        let client = build_http_client(&settings.user_agent, settings.fetch_timeout_secs)?;
        let provider: Arc<dyn KeywordProvider> = match &settings.provider_url {
            Some(base) => Arc::new(
                HttpKeywordProvider::new(client.clone(), base, settings.provider_api_key.clone())
                    .with_context(|| format!("Invalid keyword provider URL: {}", base))?,
            ),
            None => {
                tracing::info!("No keyword provider configured");
                Arc::new(UnconfiguredProvider)
            }
        };
        Ok(Self::with_parts(settings, store, client, provider))
    }

    pub fn with_parts(
        settings: Settings,
        store: AuditStore,
        client: reqwest::Client,
        provider: Arc<dyn KeywordProvider>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            store: Arc::new(Mutex::new(store)),
            client,
            provider,
        }
    }

    /// Never held across an `.await`
    fn store(&self) -> MutexGuard<'_, AuditStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn crawler(&self, url: &str, max_pages: Option<usize>) -> Result<Crawler, ServiceError> {
        let max_pages = match max_pages {
            Some(0) => {
                return Err(ServiceError::InvalidRequest(
                    "maxPages must be at least 1".to_string(),
                ));
            }
            Some(n) => n,
            None => self.settings.max_pages,
        };

        let config = CrawlerConfig {
            max_pages,
            concurrent_requests: self.settings.concurrency,
            requests_per_second: self.settings.rate_limit,
            respect_robots_txt: self.settings.respect_robots_txt,
            user_agent: self.settings.user_agent.clone(),
            thresholds: Thresholds {
                slow_response_ms: self.settings.slow_response_ms,
                ..Thresholds::default()
            },
        };
        let fetcher = Fetcher::new(self.client.clone(), self.settings.max_body_bytes);
        Ok(Crawler::new(url, self.client.clone(), fetcher, config)?)
    }

    fn begin_run(&self, crawler: &Crawler, max_pages: Option<usize>) -> Result<CrawlRun, ServiceError> {
        let mut store = self.store();
        let run = store.begin_run(
            crawler.seed().as_str(),
            max_pages.unwrap_or(self.settings.max_pages),
        )?;
        store.persist()?;
        tracing::info!(run = run.id, seed = %run.seed_url, "Queued crawl");
        Ok(run)
    }

    /// Queues a crawl and runs it in the background. The returned run can
    /// be polled with [`AuditService::run`].
    pub fn start_crawl(&self, url: &str, max_pages: Option<usize>) -> Result<CrawlRun, ServiceError> {
        let crawler = self.crawler(url, max_pages)?;
        let run = self.begin_run(&crawler, max_pages)?;

        let service = self.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            if let Err(e) = service.execute(run_id, crawler).await {
                tracing::error!(run = run_id, error = %e, "Crawl run failed");
            }
        });

        Ok(run)
    }

    /// Runs a crawl to completion on the current task
    pub async fn run_crawl(
        &self,
        url: &str,
        max_pages: Option<usize>,
        progress: bool,
    ) -> Result<Report, ServiceError> {
        let mut crawler = self.crawler(url, max_pages)?;
        if progress {
            crawler.enable_progress_bar();
        }
        let run = self.begin_run(&crawler, max_pages)?;
        self.execute(run.id, crawler).await
    }

    async fn execute(&self, run_id: u64, crawler: Crawler) -> Result<Report, ServiceError> {
        self.store().mark_running(run_id)?;

        let limit = self.settings.crawl_timeout_secs;
        let crawled = match tokio::time::timeout(Duration::from_secs(limit), crawler.crawl()).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(CrawlError::TimedOut(limit).into()),
        };

        let result = crawled.and_then(|outcome| self.commit(run_id, outcome));
        if let Err(e) = &result {
            let mut store = self.store();
            let recorded = store
                .fail_run(run_id, &e.to_string())
                .and_then(|_| store.persist());
            if let Err(store_error) = recorded {
                tracing::error!(run = run_id, error = %store_error, "Failed to record crawl failure");
            }
        }
        result
    }

    fn commit(&self, run_id: u64, outcome: CrawlOutcome) -> Result<Report, ServiceError> {
        let mut store = self.store();
        let version = store.next_version();
        let mut audits = outcome.audits;
        store.reconcile_issues(&mut audits, version);

        let context = ReportContext {
            version,
            run_id: Some(run_id),
            seed_url: Some(outcome.seed_url),
            date: Utc::now(),
            content_suggestions: store
                .topics()
                .iter()
                .take(CONTENT_SUGGESTIONS)
                .map(|t| t.suggested_title.clone())
                .collect(),
            keyword_rankings: store.rankings().to_vec(),
            top_fixes_limit: self.settings.top_fixes_limit,
        };
        let report = Aggregator::aggregate(&audits, store.latest_report(), context);
        store.commit_report(report.clone(), audits, outcome.snapshots)?;
        Ok(report)
    }

    pub fn run(&self, id: u64) -> Result<CrawlRun, ServiceError> {
        self.store()
            .run(id)
            .cloned()
            .ok_or(ServiceError::Store(StoreError::RunNotFound(id)))
    }

    // Reports

    /// The latest report, or the zeroed placeholder before the first crawl
    pub fn latest_report(&self) -> Report {
        self.store()
            .latest_report()
            .cloned()
            .unwrap_or_else(Report::placeholder)
    }

    pub fn report(&self, version: u64) -> Option<Report> {
        self.store().report(version).cloned()
    }

    pub fn reports(&self) -> Vec<ReportSummary> {
        self.store().report_summaries()
    }

    pub fn page_audits(&self) -> Vec<PageAudit> {
        self.store().page_audits()
    }

    // Remediation

    pub fn fixable_issues(&self) -> Vec<Issue> {
        let store = self.store();
        match store.latest_report() {
            Some(report) => store.eligible_issues(report),
            None => vec![],
        }
    }

    pub fn fix_issue(&self, id: &str) -> Result<FixOutcome, ServiceError> {
        let mut store = self.store();
        let outcome = remediation::fix_issue(&mut store, id)?;
        store.persist()?;
        Ok(outcome)
    }

    pub fn fix_all(&self, report_version: Option<u64>) -> Result<FixAllSummary, ServiceError> {
        let mut store = self.store();
        let summary = remediation::fix_all(&mut store, report_version)?;
        store.persist()?;
        Ok(summary)
    }

    pub fn ignore_issue(&self, id: &str) -> Result<Issue, ServiceError> {
        let mut store = self.store();
        let issue = remediation::ignore_issue(&mut store, id)?;
        store.persist()?;
        Ok(issue)
    }

    pub fn resolve_issue(&self, id: &str) -> Result<Issue, ServiceError> {
        let mut store = self.store();
        let issue = remediation::resolve_issue(&mut store, id)?;
        store.persist()?;
        Ok(issue)
    }

    pub fn fixes(&self) -> Vec<AppliedFix> {
        self.store().fixes().to_vec()
    }

    // Keywords

    /// Researches the seeds and replaces the stored results and topics
    pub async fn research(&self, seeds: &[String]) -> Result<Vec<KeywordResearchResult>, ServiceError> {
        let results = keywords::research(self.provider.as_ref(), seeds).await?;
        let topics = keywords::cluster_into_topics(&results, self.settings.cluster_threshold);

        let mut store = self.store();
        store.set_research(results.clone(), topics);
        store.persist()?;
        Ok(results)
    }

    pub fn top_keywords(&self, limit: usize, min_volume: u64) -> Vec<KeywordResearchResult> {
        keywords::top_keywords(self.store().research(), limit, min_volume)
    }

    pub fn suggested_topics(&self, limit: usize, min_volume: u64) -> Vec<ContentTopic> {
        keywords::suggested_topics(self.store().topics(), limit, min_volume)
    }

    /// Measures the current position of `url` for `keyword` and folds it
    /// into the tracked ranking
    pub async fn track_ranking(&self, keyword: &str, url: &str) -> Result<KeywordRanking, ServiceError> {
        let keyword = normalize_keyword(keyword);
        if keyword.is_empty() {
            return Err(KeywordError::InvalidTarget("keyword is empty".to_string()).into());
        }
        let url = Url::parse(url.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| KeywordError::InvalidTarget(format!("not an http(s) URL: {}", url)))?;
        let url = url.to_string();

        let position = self
            .provider
            .position(&keyword, &url)
            .await?
            .ok_or_else(|| KeywordError::NotRanked {
                keyword: keyword.clone(),
                url: url.clone(),
            })?;

        let mut store = self.store();
        let ranking = keywords::record_position(
            store.ranking(&keyword, &url),
            &keyword,
            &url,
            position,
            Utc::now(),
        );
        store.upsert_ranking(ranking.clone());
        store.persist()?;
        tracing::info!(keyword = %keyword, url = %url, position, change = ?ranking.change, "Recorded ranking");
        Ok(ranking)
    }

    pub fn rankings(&self) -> Vec<KeywordRanking> {
        self.store().rankings().to_vec()
    }

    /// Every recorded measurement, oldest first
    pub fn ranking_history(&self) -> Vec<RankingSample> {
        self.store().ranking_history().to_vec()
    }
}
