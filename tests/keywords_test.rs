use actix_web::{App, HttpResponse, HttpServer, web};
use serde_json::json;
use sitepulse::error::KeywordError;
use sitepulse::http_client::{DEFAULT_USER_AGENT, build_http_client};
use sitepulse::keywords::provider::{HttpKeywordProvider, KeywordProvider, UnconfiguredProvider};
use sitepulse::keywords::{self, cluster};
use sitepulse::models::{SearchIntent, Trend};

async fn start_provider(healthy: bool) -> String {
    let http_server = HttpServer::new(move || {
        App::new()
            .route(
                "/keywords",
                web::post().to(move |body: web::Json<serde_json::Value>| async move {
                    if !healthy {
                        return HttpResponse::InternalServerError().body("upstream down");
                    }
                    assert_eq!(body["seedKeywords"][0], "hemp business");
                    HttpResponse::Ok().json(json!({
                        "keywords": [
                            {"keyword": "hemp business", "searchVolume": 1000, "difficulty": 40, "trend": "rising"},
                            {"keyword": "Hemp  Businesses", "searchVolume": 300, "difficulty": 35},
                            {"keyword": "hemp business plan", "searchVolume": 300, "difficulty": 30},
                            {"keyword": "buy hemp seeds", "volume": 400, "difficulty": 70.4, "cpc": 1.2},
                            {"keyword": "best hemp seeds", "searchVolume": 500, "difficulty": 60, "intent": "commercial"}
                        ]
                    }))
                }),
            )
            .route(
                "/rankings",
                web::get().to(|query: web::Query<std::collections::HashMap<String, String>>| async move {
                    let position = match query.get("keyword").map(String::as_str) {
                        Some("hemp business") => json!(4),
                        _ => json!(null),
                    };
                    HttpResponse::Ok().json(json!({ "position": position }))
                }),
            )
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("Failed to bind provider server");

    let addr = http_server.addrs().first().cloned().expect("No address bound");
    let app_server = http_server.run();
    tokio::spawn(async move {
        if let Err(e) = app_server.await {
            eprintln!("Provider server error: {}", e);
        }
    });

    format!("http://{}", addr)
}

fn provider(base_url: &str) -> HttpKeywordProvider {
    let client = build_http_client(DEFAULT_USER_AGENT, 5).unwrap();
    HttpKeywordProvider::new(client, base_url, Some("test-key".to_string())).unwrap()
}

fn seeds(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_research_normalizes_and_dedupes() {
    let base_url = start_provider(true).await;
    let provider = provider(&base_url);

    let results = keywords::research(&provider, &seeds(&["  Hemp Business "])).await.unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.keyword.as_str()).collect();
    assert_eq!(
        names,
        vec!["hemp business", "best hemp seeds", "buy hemp seeds", "hemp business plan"]
    );

    let business = &results[0];
    assert_eq!(business.trend, Trend::Rising);
    assert_eq!(business.intent, SearchIntent::Informational);

    let buy = results.iter().find(|r| r.keyword == "buy hemp seeds").unwrap();
    assert_eq!(buy.intent, SearchIntent::Transactional);
    assert_eq!(buy.difficulty, 70);
    assert_eq!(buy.trend, Trend::Stable);
    assert_eq!(buy.cpc, Some(1.2));

    let topics = keywords::cluster_into_topics(&results, cluster::DEFAULT_SIMILARITY_THRESHOLD);
    assert_eq!(topics[0].topic, "hemp business");
    assert_eq!(topics[0].total_search_volume, 1300);
}

#[tokio::test]
async fn test_provider_failure_is_reported_not_cached() {
    let base_url = start_provider(false).await;
    let provider = provider(&base_url);

    match keywords::research(&provider, &seeds(&["hemp business"])).await {
        Err(KeywordError::ProviderUnavailable(message)) => assert!(message.contains("500")),
        other => panic!("expected ProviderUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_and_unconfigured_providers() {
    // Nothing listens on port 9 locally
    let unreachable = provider("http://127.0.0.1:9");
    assert!(matches!(
        keywords::research(&unreachable, &seeds(&["hemp business"])).await,
        Err(KeywordError::ProviderUnavailable(_))
    ));

    assert!(matches!(
        keywords::research(&UnconfiguredProvider, &seeds(&["hemp business"])).await,
        Err(KeywordError::ProviderUnavailable(_))
    ));
}

#[tokio::test]
async fn test_empty_seeds_are_rejected() {
    assert_eq!(
        keywords::research(&UnconfiguredProvider, &seeds(&[])).await,
        Err(KeywordError::NoSeeds)
    );
    assert_eq!(
        keywords::research(&UnconfiguredProvider, &seeds(&["   "])).await,
        Err(KeywordError::NoSeeds)
    );
}

#[tokio::test]
async fn test_provider_positions() {
    let base_url = start_provider(true).await;
    let provider = provider(&base_url);

    assert_eq!(
        provider.position("hemp business", "https://example.com/").await,
        Ok(Some(4))
    );
    assert_eq!(
        provider.position("hemp oil", "https://example.com/").await,
        Ok(None)
    );
}
