use crate::aggregator::page_score;
use crate::error::{CrawlError, FetchError};
use crate::fetcher::{FetchedPage, Fetcher};
use crate::models::{PageAudit, PageSnapshot};
use crate::robots::RobotsTxt;
use crate::rules::{RuleEngine, SiteIndex, Thresholds, sort_issues};
use crate::url_utils::canonicalize;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroU32;
use url::Url;

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub max_pages: usize,
    pub concurrent_requests: usize,
    pub requests_per_second: Option<f64>,
    pub respect_robots_txt: bool,
    pub user_agent: String,
    pub thresholds: Thresholds,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 50,
            concurrent_requests: 5,
            requests_per_second: None,
            respect_robots_txt: true,
            user_agent: crate::http_client::DEFAULT_USER_AGENT.to_string(),
            thresholds: Thresholds::default(),
        }
    }
}

/// Result of one completed traversal
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub seed_url: String,
    /// One audit per visited URL, sorted by URL
    pub audits: Vec<PageAudit>,
    /// Extracted content of every successfully fetched page
    pub snapshots: Vec<PageSnapshot>,
}

type PageFetch = (Url, DateTime<Utc>, Result<FetchedPage, FetchError>);

pub struct Crawler {
    client: reqwest::Client,
    fetcher: Fetcher,
    engine: RuleEngine,
    seed: Url,
    max_pages: usize,
    concurrent_requests: usize,
    respect_robots_txt: bool,
    user_agent: String,
    /// Every canonical URL ever queued
    visited: HashSet<String>,
    to_visit: VecDeque<Url>,
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    /// robots.txt per origin, fetched the first time a URL on it is queued
    robots: HashMap<String, RobotsTxt>,
    progress_bar: Option<ProgressBar>,
}

impl Crawler {
    pub fn new(
        seed_url: &str,
        client: reqwest::Client,
        fetcher: Fetcher,
        config: CrawlerConfig,
    ) -> Result<Self, CrawlError> {
        let parsed = Url::parse(seed_url.trim())
            .map_err(|e| CrawlError::InvalidSeed(format!("{}: {}", seed_url, e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(CrawlError::InvalidSeed(format!(
                    "unsupported scheme '{}': only http and https are supported",
                    scheme
                )));
            }
        }

        let seed = canonicalize(&parsed)
            .ok_or_else(|| CrawlError::InvalidSeed(seed_url.to_string()))?;

        let mut visited = HashSet::new();
        visited.insert(seed.to_string());
        let mut to_visit = VecDeque::new();
        to_visit.push_back(seed.clone());

        let rate_limiter = config
            .requests_per_second
            .and_then(|rps| NonZeroU32::new(rps.ceil().max(1.0) as u32))
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            fetcher,
            engine: RuleEngine::new(config.thresholds),
            seed,
            max_pages: config.max_pages.max(1),
            concurrent_requests: config.concurrent_requests.max(1),
            respect_robots_txt: config.respect_robots_txt,
            user_agent: config.user_agent,
            visited,
            to_visit,
            rate_limiter,
            robots: HashMap::new(),
            progress_bar: None,
        })
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    /// Enable progress bar for crawling
    pub fn enable_progress_bar(&mut self) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("[{elapsed_precise}] {spinner:.cyan} Crawling: {pos} pages")
                .expect("Progress bar template should be valid"),
        );
        self.progress_bar = Some(pb);
    }

    /// Breadth-first traversal from the seed until the page budget is spent
    /// or the frontier is empty. Fails only when the seed itself cannot be
    /// fetched.
    pub async fn crawl(mut self) -> Result<CrawlOutcome, CrawlError> {
        if let Some(ref pb) = self.progress_bar {
            pb.set_position(0);
        }

        let mut fetched: Vec<(DateTime<Utc>, FetchedPage)> = Vec::new();
        let mut failed: Vec<(Url, DateTime<Utc>, FetchError)> = Vec::new();
        let mut attempted = 0usize;

        while !self.to_visit.is_empty() && attempted < self.max_pages {
            let mut batch = Vec::new();
            while let Some(url) = self.to_visit.pop_front() {
                // The seed was requested explicitly, so robots.txt only gates discovered pages
                if url != self.seed && self.respect_robots_txt && !self.robots_allow(&url).await {
                    tracing::info!(url = %url, "Skipping URL disallowed by robots.txt");
                    continue;
                }

                batch.push(url);

                if batch.len() >= self.concurrent_requests
                    || attempted + batch.len() >= self.max_pages
                {
                    break;
                }
            }

            if batch.is_empty() {
                break;
            }
            attempted += batch.len();

            let results: Vec<PageFetch> = stream::iter(batch)
                .map(|url| self.fetch_page(url))
                .buffer_unordered(self.concurrent_requests)
                .collect()
                .await;

            for (url, fetched_at, result) in results {
                match result {
                    Ok(page) => {
                        for link in &page.links {
                            if self.visited.insert(link.clone())
                                && let Ok(parsed) = Url::parse(link)
                            {
                                self.to_visit.push_back(parsed);
                            }
                        }
                        fetched.push((fetched_at, page));
                    }
                    Err(e) if url == self.seed => {
                        tracing::error!(url = %url, error = %e, "Seed page unreachable");
                        if let Some(ref pb) = self.progress_bar {
                            pb.abandon();
                        }
                        return Err(CrawlError::SeedUnreachable {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "Failed to crawl page");
                        failed.push((url, fetched_at, e));
                    }
                }
            }

            if let Some(ref pb) = self.progress_bar {
                pb.set_position((fetched.len() + failed.len()) as u64);
            }
        }

        if let Some(ref pb) = self.progress_bar {
            pb.finish_with_message(format!(
                "Crawled {} pages",
                fetched.len() + failed.len()
            ));
        }

        Ok(self.build_outcome(fetched, failed))
    }

    /// Checks `url` against the robots.txt of its own origin. Subdomains of
    /// the seed's site carry their own rules.
    async fn robots_allow(&mut self, url: &Url) -> bool {
        let origin = url.origin().ascii_serialization();
        if !self.robots.contains_key(&origin) {
            let robots = RobotsTxt::fetch(&self.client, url).await;
            self.robots.insert(origin.clone(), robots);
        }
        self.robots
            .get(&origin)
            .is_none_or(|robots| robots.is_allowed(url, &self.user_agent))
    }

    async fn fetch_page(&self, url: Url) -> PageFetch {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let fetched_at = Utc::now();
        let result = self.fetcher.fetch(&url, &self.seed).await;
        tracing::debug!(url = %url, ok = result.is_ok(), "Fetched page");
        (url, fetched_at, result)
    }

    /// Runs the rule engine over every page and freezes the results into
    /// page audits. Site rules need the whole crawl, so this happens once
    /// traversal is over.
    fn build_outcome(
        &self,
        fetched: Vec<(DateTime<Utc>, FetchedPage)>,
        failed: Vec<(Url, DateTime<Utc>, FetchError)>,
    ) -> CrawlOutcome {
        let site = SiteIndex::build(
            fetched.iter().map(|(_, page)| page),
            failed.iter().map(|(url, _, _)| url.as_str()),
        );

        let mut audits: Vec<PageAudit> = Vec::with_capacity(fetched.len() + failed.len());
        let mut snapshots = Vec::with_capacity(fetched.len());

        for (fetched_at, page) in &fetched {
            let mut issues = self.engine.evaluate(page);
            issues.extend(self.engine.evaluate_site(page, &site));
            sort_issues(&mut issues);

            audits.push(PageAudit {
                url: page.url.clone(),
                title: page.title.clone(),
                score: page_score(&issues),
                issues,
                fetched_at: *fetched_at,
                status_code: Some(page.status_code),
                response_time_ms: page.response_time_ms,
                internal_links: page.links.clone(),
            });
            snapshots.push(page.snapshot());
        }

        for (url, fetched_at, error) in &failed {
            let issues = vec![self.engine.unreachable(url.as_str(), error)];
            let status_code = match error {
                FetchError::Http4xx(code) | FetchError::Http5xx(code) => Some(*code),
                _ => None,
            };
            audits.push(PageAudit {
                url: url.to_string(),
                title: None,
                score: page_score(&issues),
                issues,
                fetched_at: *fetched_at,
                status_code,
                response_time_ms: 0,
                internal_links: vec![],
            });
        }

        audits.sort_by(|a, b| a.url.cmp(&b.url));
        snapshots.sort_by(|a, b| a.url.cmp(&b.url));

        tracing::info!(
            seed = %self.seed,
            pages = audits.len(),
            failed = failed.len(),
            "Crawl finished"
        );

        CrawlOutcome {
            seed_url: self.seed.to_string(),
            audits,
            snapshots,
        }
    }
}
