//! Keyword research, topic clustering and rank tracking.

pub mod cluster;
pub mod provider;
pub mod ranking;

use crate::error::KeywordError;
use crate::models::{KeywordResearchResult, SearchIntent, Trend};
use provider::{KeywordProvider, RawKeyword};
use std::collections::HashMap;

pub use cluster::{cluster_into_topics, suggested_topics, top_keywords};
pub use ranking::record_position;

const TRANSACTIONAL_MODIFIERS: &[&str] = &[
    "buy", "price", "prices", "cheap", "discount", "coupon", "order", "shop", "sale", "deal",
    "hire", "near",
];
const COMMERCIAL_MODIFIERS: &[&str] = &[
    "best", "top", "review", "reviews", "vs", "versus", "compare", "comparison", "alternative",
    "alternatives",
];
const NAVIGATIONAL_MODIFIERS: &[&str] = &["login", "sign", "official", "website", "contact"];

/// Lowercased keyword with collapsed whitespace
pub fn normalize_keyword(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tokens used to compare keywords: punctuation stripped, simple plurals
/// folded, sorted and de-duplicated
pub fn keyword_tokens(keyword: &str) -> Vec<String> {
    let mut tokens: Vec<String> = keyword
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| singular(&t.to_lowercase()))
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

fn singular(token: &str) -> String {
    if token.len() > 4 && token.ends_with("sses") {
        token[..token.len() - 2].to_string()
    } else if token.len() > 4 && token.ends_with("ies") {
        format!("{}y", &token[..token.len() - 3])
    } else if token.len() > 3
        && token.ends_with('s')
        && !token.ends_with("ss")
        && !token.ends_with("us")
    {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

/// Intent implied by modifier words; anything without a transactional,
/// commercial or navigational modifier is informational
pub fn infer_intent(keyword: &str) -> SearchIntent {
    let words: Vec<String> = keyword
        .split(|c: char| !c.is_alphanumeric())
        .map(|w| w.to_lowercase())
        .collect();
    let has = |list: &[&str]| words.iter().any(|w| list.contains(&w.as_str()));

    if has(TRANSACTIONAL_MODIFIERS) {
        SearchIntent::Transactional
    } else if has(COMMERCIAL_MODIFIERS) {
        SearchIntent::Commercial
    } else if has(NAVIGATIONAL_MODIFIERS) {
        SearchIntent::Navigational
    } else {
        SearchIntent::Informational
    }
}

fn parse_intent(raw: Option<&str>, keyword: &str) -> SearchIntent {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("informational") | Some("info") => SearchIntent::Informational,
        Some("navigational") | Some("nav") => SearchIntent::Navigational,
        Some("commercial") => SearchIntent::Commercial,
        Some("transactional") => SearchIntent::Transactional,
        _ => infer_intent(keyword),
    }
}

fn parse_trend(raw: Option<&str>) -> Trend {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("rising") | Some("up") | Some("increasing") => Trend::Rising,
        Some("declining") | Some("down") | Some("decreasing") => Trend::Declining,
        _ => Trend::Stable,
    }
}

fn to_result(raw: RawKeyword) -> Option<KeywordResearchResult> {
    let keyword = normalize_keyword(&raw.keyword);
    if keyword.is_empty() {
        return None;
    }
    Some(KeywordResearchResult {
        intent: parse_intent(raw.intent.as_deref(), &keyword),
        trend: parse_trend(raw.trend.as_deref()),
        difficulty: raw.difficulty.round().clamp(0.0, 100.0) as u8,
        search_volume: raw.search_volume,
        cpc: raw.cpc.filter(|c| c.is_finite() && *c >= 0.0),
        keyword,
    })
}

/// Collapses near-identical keywords ("hemp business" / "Hemp  Businesses")
/// onto the highest-volume variant, then orders by volume
pub fn dedupe(results: Vec<KeywordResearchResult>) -> Vec<KeywordResearchResult> {
    let mut best: HashMap<Vec<String>, KeywordResearchResult> = HashMap::new();
    for result in results {
        let key = keyword_tokens(&result.keyword);
        match best.get(&key) {
            Some(existing)
                if (existing.search_volume, std::cmp::Reverse(&existing.keyword))
                    >= (result.search_volume, std::cmp::Reverse(&result.keyword)) => {}
            _ => {
                best.insert(key, result);
            }
        }
    }

    let mut deduped: Vec<KeywordResearchResult> = best.into_values().collect();
    deduped.sort_by(|a, b| {
        b.search_volume
            .cmp(&a.search_volume)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    deduped
}

/// Asks the provider about the seeds and returns normalized, de-duplicated
/// results. Provider failures surface as-is; nothing is served from cache.
pub async fn research(
    provider: &dyn KeywordProvider,
    seeds: &[String],
) -> Result<Vec<KeywordResearchResult>, KeywordError> {
    let mut cleaned: Vec<String> = seeds
        .iter()
        .map(|s| normalize_keyword(s))
        .filter(|s| !s.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    if cleaned.is_empty() {
        return Err(KeywordError::NoSeeds);
    }

    let raw = provider.query(&cleaned).await.inspect_err(|e| {
        tracing::warn!(provider = provider.name(), error = %e, "Keyword research failed");
    })?;

    let results = dedupe(raw.into_iter().filter_map(to_result).collect());
    tracing::info!(
        seeds = cleaned.len(),
        results = results.len(),
        "Keyword research complete"
    );
    Ok(results)
}
