mod server;

use actix_web::{App, test, web};
use futures::future::BoxFuture;
use serde_json::{Value, json};
use server::{FixturePage, Fixture, start_site, start_standard_site};
use sitepulse::config::Settings;
use sitepulse::error::KeywordError;
use sitepulse::http_client::{DEFAULT_USER_AGENT, build_http_client};
use sitepulse::keywords::provider::{KeywordProvider, RawKeyword, UnconfiguredProvider};
use sitepulse::server::configure;
use sitepulse::service::AuditService;
use sitepulse::store::AuditStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Returns a fixed keyword set and a position that improves on every call
struct StaticProvider {
    next_position: AtomicU32,
}

impl KeywordProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn query<'a>(&'a self, _seeds: &'a [String]) -> BoxFuture<'a, Result<Vec<RawKeyword>, KeywordError>> {
        let raw = |keyword: &str, volume: u64, difficulty: f64| RawKeyword {
            keyword: keyword.to_string(),
            search_volume: volume,
            difficulty,
            intent: None,
            trend: None,
            cpc: None,
        };
        let keywords = vec![
            raw("hemp business", 1000, 40.0),
            raw("hemp business plan", 300, 30.0),
            raw("hemp farming", 800, 50.0),
            raw("best hemp seeds", 500, 60.0),
        ];
        Box::pin(async move { Ok(keywords) })
    }

    fn position<'a>(&'a self, _keyword: &'a str, _url: &'a str) -> BoxFuture<'a, Result<Option<u32>, KeywordError>> {
        let position = self.next_position.fetch_sub(3, Ordering::SeqCst);
        Box::pin(async move { Ok(Some(position)) })
    }
}

fn service_with(provider: Arc<dyn KeywordProvider>) -> AuditService {
    let settings = Settings::default();
    let client = build_http_client(DEFAULT_USER_AGENT, 5).unwrap();
    AuditService::with_parts(settings, AuditStore::in_memory(), client, provider)
}

fn static_service() -> AuditService {
    service_with(Arc::new(StaticProvider {
        next_position: AtomicU32::new(12),
    }))
}

macro_rules! app {
    ($service:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($service.clone()))
                .configure(configure),
        )
        .await
    };
}

async fn wait_for_run(service: &AuditService, run_id: u64) -> Value {
    for _ in 0..200 {
        let run = service.run(run_id).unwrap();
        if !run.state.is_active() {
            return serde_json::to_value(run).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("crawl run {} did not finish", run_id);
}

#[actix_web::test]
async fn test_health_and_empty_state() {
    let service = static_service();
    let app = app!(service);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert!(resp.status().is_success());

    let report: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/reports/latest").to_request(),
    )
    .await;
    assert_eq!(report["version"], 0);
    assert_eq!(report["pagesCrawled"], 0);

    for uri in [
        "/reports",
        "/page-audits",
        "/issues/fixable",
        "/fixes",
        "/keywords/rankings",
        "/keywords/rankings/history",
    ] {
        let body: Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(body, json!([]), "{} should be empty", uri);
    }

    let resp = test::call_service(&app, test::TestRequest::post().uri("/issues/fix-all").to_request()).await;
    assert!(resp.status().is_success());
    let summary: Value = test::read_body_json(resp).await;
    assert_eq!(summary["reportVersion"], 0);
    assert_eq!(summary["succeeded"], 0);
}

#[actix_web::test]
async fn test_crawl_report_and_fix_flow() {
    let base_url = start_standard_site().await;
    let service = static_service();
    let app = app!(service);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/crawl")
            .set_json(json!({ "url": base_url, "maxPages": 10 }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 202);
    let accepted: Value = test::read_body_json(resp).await;
    let run_id = accepted["runId"].as_u64().unwrap();

    let run = wait_for_run(&service, run_id).await;
    assert_eq!(run["state"], "completed");
    assert_eq!(run["reportVersion"], 1);

    let status: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri(&format!("/crawl/{}", run_id)).to_request(),
    )
    .await;
    assert_eq!(status["pagesCrawled"], 4);

    let report: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/reports/latest").to_request(),
    )
    .await;
    assert_eq!(report["version"], 1);
    assert_eq!(report["pagesCrawled"], 4);
    assert_eq!(report["totalIssues"]["critical"], 1);
    assert_eq!(report["totalIssues"]["high"], 1);
    assert_eq!(report["totalIssues"]["medium"], 1);
    assert_eq!(report["overallScore"], 87);
    assert_eq!(report["topPriorityFixes"][0]["severity"], "critical");

    let audits: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/page-audits").to_request(),
    )
    .await;
    assert_eq!(audits.as_array().unwrap().len(), 4);

    let fixable: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/issues/fixable").to_request(),
    )
    .await;
    let fixable = fixable.as_array().unwrap();
    assert_eq!(fixable.len(), 1);
    assert_eq!(fixable[0]["ruleId"], "missing-meta-description");
    let id = fixable[0]["id"].as_str().unwrap().to_string();

    let fix_uri = format!("/issues/{}/fix", id);
    let outcome: Value =
        test::call_and_read_body_json(&app, test::TestRequest::post().uri(&fix_uri).to_request()).await;
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["fix"]["field"], "meta[name=description]");

    let resp = test::call_service(&app, test::TestRequest::post().uri(&fix_uri).to_request()).await;
    assert_eq!(resp.status(), 422);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["error"], "not_fixable");

    let resp = test::call_service(
        &app,
        test::TestRequest::post().uri("/issues/ffffffffffffffff/fix").to_request(),
    )
    .await;
    assert_eq!(resp.status(), 404);

    let fixes: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/fixes").to_request()).await;
    assert_eq!(fixes.as_array().unwrap().len(), 1);

    let reports: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/reports").to_request()).await;
    assert_eq!(reports[0]["version"], 1);

    let first: Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/reports/1").to_request()).await;
    assert_eq!(first["overallScore"], 87);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/reports/7").to_request()).await;
    assert_eq!(resp.status(), 404);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/crawl/999").to_request()).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_crawl_request_validation() {
    let service = static_service();
    let app = app!(service);

    for body in [
        json!({ "url": "not a url" }),
        json!({ "url": "ftp://example.com/" }),
        json!({ "url": "https://example.com/", "maxPages": 0 }),
    ] {
        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/crawl").set_json(&body).to_request(),
        )
        .await;
        assert_eq!(resp.status(), 400, "{}", body);
        let error: Value = test::read_body_json(resp).await;
        assert!(error["message"].is_string());
    }

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/crawl")
            .insert_header(("content-type", "application/json"))
            .set_payload("{not json")
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_second_crawl_conflicts_while_running() {
    let base_url = start_site(vec![(
        "/".to_string(),
        Fixture::Slow(
            1500,
            FixturePage::healthy("/", "Hemp Farming Guide: Home Page Overview").render(),
        ),
    )])
    .await;
    let service = static_service();
    let app = app!(service);

    let crawl = || {
        test::TestRequest::post()
            .uri("/crawl")
            .set_json(json!({ "url": base_url }))
            .to_request()
    };

    let resp = test::call_service(&app, crawl()).await;
    assert_eq!(resp.status(), 202);
    let accepted: Value = test::read_body_json(resp).await;

    let resp = test::call_service(&app, crawl()).await;
    assert_eq!(resp.status(), 409);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["error"], "crawl_in_progress");

    let run = wait_for_run(&service, accepted["runId"].as_u64().unwrap()).await;
    assert_eq!(run["state"], "completed");

    let resp = test::call_service(&app, crawl()).await;
    assert_eq!(resp.status(), 202);
}

#[actix_web::test]
async fn test_unreachable_seed_fails_run_without_report() {
    let base_url = start_site(vec![("/".to_string(), Fixture::Status(503))]).await;
    let service = static_service();
    let app = app!(service);

    let accepted: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/crawl")
            .set_json(json!({ "url": base_url }))
            .to_request(),
    )
    .await;

    let run = wait_for_run(&service, accepted["runId"].as_u64().unwrap()).await;
    assert_eq!(run["state"], "failed");
    assert!(run["error"].as_str().unwrap().contains("unreachable"));
    assert_eq!(service.latest_report().version, 0);
}

#[actix_web::test]
async fn test_keyword_endpoints() {
    let service = static_service();
    let app = app!(service);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/keywords/research")
            .set_json(json!({ "seedKeywords": [] }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 400);

    let results: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/keywords/research")
            .set_json(json!({ "seedKeywords": ["hemp business"] }))
            .to_request(),
    )
    .await;
    assert_eq!(results.as_array().unwrap().len(), 4);
    assert_eq!(results[0]["keyword"], "hemp business");
    assert_eq!(results[0]["intent"], "informational");

    let top: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/keywords/top?limit=2&minVolume=400").to_request(),
    )
    .await;
    assert_eq!(top[0]["keyword"], "hemp business");
    assert_eq!(top[1]["keyword"], "hemp farming");

    let topics: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/content-topics/suggested?limit=1")
            .to_request(),
    )
    .await;
    assert_eq!(topics.as_array().unwrap().len(), 1);
    assert_eq!(topics[0]["topic"], "hemp business");
    assert_eq!(topics[0]["totalSearchVolume"], 1300);
    assert_eq!(
        topics[0]["suggestedTitle"],
        "What Is Hemp Business? A Complete Guide"
    );

    let track = || {
        test::TestRequest::post()
            .uri("/keywords/rankings")
            .set_json(json!({ "keyword": "hemp business", "url": "https://example.com/" }))
            .to_request()
    };
    let first: Value = test::call_and_read_body_json(&app, track()).await;
    assert_eq!(first["position"], 12);
    assert_eq!(first["change"], Value::Null);

    let second: Value = test::call_and_read_body_json(&app, track()).await;
    assert_eq!(second["position"], 9);
    assert_eq!(second["previousPosition"], 12);
    assert_eq!(second["change"], 3);

    let rankings: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/keywords/rankings").to_request(),
    )
    .await;
    assert_eq!(rankings.as_array().unwrap().len(), 1);

    let history: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/keywords/rankings/history").to_request(),
    )
    .await;
    let positions: Vec<u64> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["position"].as_u64().unwrap())
        .collect();
    assert_eq!(positions, vec![12, 9]);
}

#[actix_web::test]
async fn test_keyword_provider_unavailable() {
    let service = service_with(Arc::new(UnconfiguredProvider));
    let app = app!(service);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/keywords/research")
            .set_json(json!({ "seedKeywords": ["hemp business"] }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), 503);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["error"], "provider_unavailable");

    // No stale data is served afterwards
    let top: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get().uri("/keywords/top").to_request(),
    )
    .await;
    assert_eq!(top, json!([]));
}
