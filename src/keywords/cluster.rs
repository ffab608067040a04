use super::keyword_tokens;
use crate::models::{ContentTopic, KeywordResearchResult, SearchIntent};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

/// Minimum token Jaccard similarity for two keywords to share a topic
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.34;

const MAX_SUBHEADINGS: usize = 6;

pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let a: HashSet<&String> = a.iter().collect();
    let b: HashSet<&String> = b.iter().collect();
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}

/// Groups keywords into topics. Keywords only share a topic when they have
/// the same intent and are linked by a chain of pairs at or above
/// `threshold` similarity. Output is sorted by total volume.
pub fn cluster_into_topics(results: &[KeywordResearchResult], threshold: f64) -> Vec<ContentTopic> {
    let mut by_intent: BTreeMap<SearchIntent, Vec<&KeywordResearchResult>> = BTreeMap::new();
    for result in results {
        by_intent.entry(result.intent).or_default().push(result);
    }

    let mut topics = Vec::new();
    for (intent, members) in by_intent {
        let tokens: Vec<Vec<String>> = members.iter().map(|m| keyword_tokens(&m.keyword)).collect();

        // union-find over the members of one intent
        let mut parent: Vec<usize> = (0..members.len()).collect();
        fn root(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                if jaccard(&tokens[i], &tokens[j]) >= threshold {
                    let (ri, rj) = (root(&mut parent, i), root(&mut parent, j));
                    if ri != rj {
                        parent[rj] = ri;
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<KeywordResearchResult>> = BTreeMap::new();
        for (i, member) in members.iter().enumerate() {
            let r = root(&mut parent, i);
            groups.entry(r).or_default().push((*member).clone());
        }

        topics.extend(groups.into_values().map(|group| build_topic(intent, group)));
    }

    topics.sort_by(|a, b| {
        b.total_search_volume
            .cmp(&a.total_search_volume)
            .then_with(|| a.topic.cmp(&b.topic))
    });
    topics
}

fn build_topic(intent: SearchIntent, mut keywords: Vec<KeywordResearchResult>) -> ContentTopic {
    keywords.sort_by(|a, b| {
        b.search_volume
            .cmp(&a.search_volume)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });

    let topic = keywords[0].keyword.clone();
    let total_search_volume = keywords.iter().map(|k| k.search_volume).sum();
    let average_difficulty = keywords.iter().map(|k| k.difficulty as f64).sum::<f64>()
        / keywords.len() as f64;

    let mut sorted_keywords: Vec<&str> = keywords.iter().map(|k| k.keyword.as_str()).collect();
    sorted_keywords.sort_unstable();
    let mut hasher = Sha256::new();
    hasher.update(intent.as_str().as_bytes());
    for keyword in &sorted_keywords {
        hasher.update(b"|");
        hasher.update(keyword.as_bytes());
    }
    let id = hex::encode(hasher.finalize())[..12].to_string();

    let mut suggested_subheadings: Vec<String> = keywords
        .iter()
        .skip(1)
        .take(MAX_SUBHEADINGS - 2)
        .map(|k| title_case(&k.keyword))
        .collect();
    suggested_subheadings.extend(standard_headings(intent, &topic));
    suggested_subheadings.truncate(MAX_SUBHEADINGS);

    ContentTopic {
        id,
        suggested_title: suggested_title(intent, &topic),
        suggested_subheadings,
        topic,
        intent,
        keywords,
        total_search_volume,
        average_difficulty: (average_difficulty * 10.0).round() / 10.0,
    }
}

pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn suggested_title(intent: SearchIntent, topic: &str) -> String {
    let topic = title_case(topic);
    match intent {
        SearchIntent::Informational => format!("What Is {}? A Complete Guide", topic),
        SearchIntent::Commercial => format!("Best {}: Top Picks Compared", topic),
        SearchIntent::Transactional => format!("Buy {}: Prices, Options and Deals", topic),
        SearchIntent::Navigational => format!("{}: Official Resources", topic),
    }
}

fn standard_headings(intent: SearchIntent, topic: &str) -> Vec<String> {
    let topic = title_case(topic);
    match intent {
        SearchIntent::Informational => vec![
            format!("Why {} Matters", topic),
            "Frequently Asked Questions".to_string(),
        ],
        SearchIntent::Commercial => vec![
            "How We Compared".to_string(),
            "Which One Should You Choose?".to_string(),
        ],
        SearchIntent::Transactional => vec![
            "Pricing".to_string(),
            "How to Order".to_string(),
        ],
        SearchIntent::Navigational => vec![
            "Where to Find It".to_string(),
            "Contact and Support".to_string(),
        ],
    }
}

/// Keywords worth targeting first: high volume relative to difficulty
pub fn top_keywords(
    results: &[KeywordResearchResult],
    limit: usize,
    min_volume: u64,
) -> Vec<KeywordResearchResult> {
    let opportunity = |k: &KeywordResearchResult| k.search_volume as f64 / (k.difficulty as f64 + 10.0);

    let mut candidates: Vec<&KeywordResearchResult> = results
        .iter()
        .filter(|k| k.search_volume >= min_volume)
        .collect();
    candidates.sort_by(|a, b| {
        opportunity(b)
            .total_cmp(&opportunity(a))
            .then_with(|| b.search_volume.cmp(&a.search_volume))
            .then_with(|| a.keyword.cmp(&b.keyword))
    });
    candidates.into_iter().take(limit).cloned().collect()
}

pub fn suggested_topics(topics: &[ContentTopic], limit: usize, min_volume: u64) -> Vec<ContentTopic> {
    let mut selected: Vec<&ContentTopic> = topics
        .iter()
        .filter(|t| t.total_search_volume >= min_volume)
        .collect();
    selected.sort_by(|a, b| {
        b.total_search_volume
            .cmp(&a.total_search_volume)
            .then_with(|| a.topic.cmp(&b.topic))
    });
    selected.into_iter().take(limit).cloned().collect()
}
