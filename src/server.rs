//! JSON API consumed by the operator dashboard.
//!
//! "No data yet" is always a 200 (placeholder report, empty list); errors
//! are `{"error": <code>, "message": <text>}` with a 4xx/5xx status.

use crate::config::Settings;
use crate::error::{CrawlError, KeywordError, RemediationError, ServiceError, StoreError};
use crate::service::AuditService;
use actix_web::http::StatusCode;
use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, ResponseError, web};
use anyhow::Context;
use serde::{Deserialize, Serialize};

const DEFAULT_LIST_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ServiceError {
    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Crawl(CrawlError::InvalidSeed(_)) => "invalid_url",
            ServiceError::Crawl(CrawlError::SeedUnreachable { .. }) => "seed_unreachable",
            ServiceError::Crawl(CrawlError::TimedOut(_)) => "crawl_timeout",
            ServiceError::Store(StoreError::CrawlInProgress(_)) => "crawl_in_progress",
            ServiceError::Store(StoreError::RunNotFound(_)) => "not_found",
            ServiceError::Store(_) => "storage",
            ServiceError::Remediation(RemediationError::IssueNotFound(_)) => "not_found",
            ServiceError::Remediation(RemediationError::ReportNotFound(_)) => "not_found",
            ServiceError::Remediation(RemediationError::NotFixable { .. }) => "not_fixable",
            ServiceError::Remediation(RemediationError::StillDetected(_)) => "still_detected",
            ServiceError::Keyword(KeywordError::ProviderUnavailable(_)) => "provider_unavailable",
            ServiceError::Keyword(KeywordError::NoSeeds) => "invalid_request",
            ServiceError::Keyword(KeywordError::InvalidTarget(_)) => "invalid_request",
            ServiceError::Keyword(KeywordError::NotRanked { .. }) => "not_ranked",
            ServiceError::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self.code() {
            "invalid_url" | "invalid_request" => StatusCode::BAD_REQUEST,
            "not_found" | "not_ranked" => StatusCode::NOT_FOUND,
            "crawl_in_progress" | "still_detected" => StatusCode::CONFLICT,
            "not_fixable" => StatusCode::UNPROCESSABLE_ENTITY,
            "seed_unreachable" => StatusCode::BAD_GATEWAY,
            "crawl_timeout" => StatusCode::GATEWAY_TIMEOUT,
            "provider_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
        HttpResponse::build(status).json(ErrorBody {
            error: self.code(),
            message: self.to_string(),
        })
    }
}

type ApiResult = Result<HttpResponse, ServiceError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CrawlRequest {
    url: String,
    max_pages: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CrawlAccepted {
    run_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixAllQuery {
    report: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchRequest {
    #[serde(default)]
    seed_keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    limit: Option<usize>,
    min_volume: Option<u64>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }

    fn min_volume(&self) -> u64 {
        self.min_volume.unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct TrackRequest {
    keyword: String,
    url: String,
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn start_crawl(service: web::Data<AuditService>, body: web::Json<CrawlRequest>) -> ApiResult {
    let run = service.start_crawl(&body.url, body.max_pages)?;
    Ok(HttpResponse::Accepted().json(CrawlAccepted { run_id: run.id }))
}

async fn crawl_status(service: web::Data<AuditService>, path: web::Path<u64>) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.run(path.into_inner())?))
}

async fn latest_report(service: web::Data<AuditService>) -> HttpResponse {
    HttpResponse::Ok().json(service.latest_report())
}

async fn report_version(service: web::Data<AuditService>, path: web::Path<u64>) -> ApiResult {
    let version = path.into_inner();
    let report = service
        .report(version)
        .ok_or(RemediationError::ReportNotFound(version))?;
    Ok(HttpResponse::Ok().json(report))
}

async fn list_reports(service: web::Data<AuditService>) -> HttpResponse {
    HttpResponse::Ok().json(service.reports())
}

async fn page_audits(service: web::Data<AuditService>) -> HttpResponse {
    HttpResponse::Ok().json(service.page_audits())
}

async fn fixable_issues(service: web::Data<AuditService>) -> HttpResponse {
    HttpResponse::Ok().json(service.fixable_issues())
}

async fn fix_issue(service: web::Data<AuditService>, path: web::Path<String>) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.fix_issue(&path)?))
}

async fn fix_all(service: web::Data<AuditService>, query: web::Query<FixAllQuery>) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.fix_all(query.report)?))
}

async fn ignore_issue(service: web::Data<AuditService>, path: web::Path<String>) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.ignore_issue(&path)?))
}

async fn resolve_issue(service: web::Data<AuditService>, path: web::Path<String>) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.resolve_issue(&path)?))
}

async fn list_fixes(service: web::Data<AuditService>) -> HttpResponse {
    HttpResponse::Ok().json(service.fixes())
}

async fn research_keywords(
    service: web::Data<AuditService>,
    body: web::Json<ResearchRequest>,
) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.research(&body.seed_keywords).await?))
}

async fn top_keywords(service: web::Data<AuditService>, query: web::Query<ListQuery>) -> HttpResponse {
    HttpResponse::Ok().json(service.top_keywords(query.limit(), query.min_volume()))
}

async fn suggested_topics(
    service: web::Data<AuditService>,
    query: web::Query<ListQuery>,
) -> HttpResponse {
    HttpResponse::Ok().json(service.suggested_topics(query.limit(), query.min_volume()))
}

async fn track_ranking(service: web::Data<AuditService>, body: web::Json<TrackRequest>) -> ApiResult {
    Ok(HttpResponse::Ok().json(service.track_ranking(&body.keyword, &body.url).await?))
}

async fn list_rankings(service: web::Data<AuditService>) -> HttpResponse {
    HttpResponse::Ok().json(service.rankings())
}

async fn ranking_history(service: web::Data<AuditService>) -> HttpResponse {
    HttpResponse::Ok().json(service.ranking_history())
}

/// Malformed JSON bodies get the same error shape as everything else
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        ServiceError::InvalidRequest(err.to_string()).into()
    })
}

/// Registers every route; the caller provides `web::Data<AuditService>`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health))
        .route("/crawl", web::post().to(start_crawl))
        .route("/crawl/{run_id}", web::get().to(crawl_status))
        .route("/reports/latest", web::get().to(latest_report))
        .route("/reports", web::get().to(list_reports))
        .route("/reports/{version}", web::get().to(report_version))
        .route("/page-audits", web::get().to(page_audits))
        .route("/issues/fixable", web::get().to(fixable_issues))
        .route("/issues/fix-all", web::post().to(fix_all))
        .route("/issues/{id}/fix", web::post().to(fix_issue))
        .route("/issues/{id}/ignore", web::post().to(ignore_issue))
        .route("/issues/{id}/resolve", web::post().to(resolve_issue))
        .route("/fixes", web::get().to(list_fixes))
        .route("/keywords/research", web::post().to(research_keywords))
        .route("/keywords/top", web::get().to(top_keywords))
        .route("/keywords/rankings", web::post().to(track_ranking))
        .route("/keywords/rankings", web::get().to(list_rankings))
        .route("/keywords/rankings/history", web::get().to(ranking_history))
        .route("/content-topics/suggested", web::get().to(suggested_topics));
}

pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let listen = settings.listen.clone();
    let service = web::Data::new(AuditService::new(settings)?);

    tracing::info!(listen = %listen, "Starting API server");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(service.clone())
            .configure(configure)
    })
    .bind(&listen)
    .with_context(|| format!("Failed to bind {}", listen))?
    .run()
    .await
    .context("API server stopped unexpectedly")
}
