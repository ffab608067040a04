use crate::models::{KeywordRanking, RankingSample};
use chrono::{DateTime, Utc};

/// Folds a fresh position measurement into the tracked ranking for
/// `(keyword, url)`. A positive `change` means the page moved up.
pub fn record_position(
    existing: Option<&KeywordRanking>,
    keyword: &str,
    url: &str,
    position: u32,
    now: DateTime<Utc>,
) -> KeywordRanking {
    let previous_position = existing.map(|r| r.position);
    KeywordRanking {
        keyword: keyword.to_string(),
        url: url.to_string(),
        position,
        previous_position,
        change: previous_position.map(|prev| prev as i64 - position as i64),
        last_updated: now,
    }
}

pub fn sample(ranking: &KeywordRanking) -> RankingSample {
    RankingSample {
        keyword: ranking.keyword.clone(),
        url: ranking.url.clone(),
        position: ranking.position,
        measured_at: ranking.last_updated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_measurement_has_no_change() {
        let ranking = record_position(None, "hemp business", "https://example.com/", 12, Utc::now());
        assert_eq!(ranking.position, 12);
        assert_eq!(ranking.previous_position, None);
        assert_eq!(ranking.change, None);
    }

    #[test]
    fn test_change_is_positive_when_moving_up() {
        let first = record_position(None, "hemp", "https://example.com/", 12, Utc::now());
        let second = record_position(Some(&first), "hemp", "https://example.com/", 5, Utc::now());
        assert_eq!(second.previous_position, Some(12));
        assert_eq!(second.change, Some(7));

        let third = record_position(Some(&second), "hemp", "https://example.com/", 9, Utc::now());
        assert_eq!(third.change, Some(-4));
        assert_eq!(sample(&third).position, 9);
    }
}
