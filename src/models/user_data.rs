use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ArticleId, DigestOutcome, UserPreferences};

/// Oldest digest events are dropped past this many.
pub const HISTORY_LIMIT: usize = 100;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedArticle {
    pub article_id: ArticleId,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

/// One rating per article; a new rating replaces the old one.
pub type Ratings = BTreeMap<ArticleId, Rating>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsCounters {
    pub articles_fetched: u64,
    pub categories_covered: u64,
    pub ratings_submitted: u64,
    pub shares_triggered: u64,
    pub digests_generated: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestEvent {
    pub timestamp: DateTime<Utc>,
    pub categories: Vec<String>,
    pub article_count: usize,
    pub new_articles: usize,
    pub outcome: DigestOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Analytics {
    pub counters: AnalyticsCounters,
    pub history: Vec<DigestEvent>,
}

impl Analytics {
    pub fn record_digest(&mut self, event: DigestEvent, categories_covered: usize) {
        self.counters.articles_fetched += event.new_articles as u64;
        self.counters.categories_covered += categories_covered as u64;
        self.counters.digests_generated += 1;

        self.history.push(event);
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }

    pub fn record_rating(&mut self) {
        self.counters.ratings_submitted += 1;
    }

    pub fn record_share(&mut self) {
        self.counters.shares_triggered += 1;
    }
}

/// Everything a user owns, as written by export and read by import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDataExport {
    pub preferences: UserPreferences,
    pub saved_articles: Vec<SavedArticle>,
    pub ratings: Ratings,
    #[serde(default)]
    pub analytics: Analytics,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
}

/// Bytes on disk per collection. Missing files count as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataSizes {
    pub preferences: u64,
    pub saved_articles: u64,
    pub ratings: u64,
    pub analytics: u64,
    pub article_cache: u64,
}

impl DataSizes {
    pub fn total(&self) -> u64 {
        self.preferences + self.saved_articles + self.ratings + self.analytics + self.article_cache
    }
}

/// Number of ratings per score, with every score from 1 to 5 present.
pub fn rating_distribution(ratings: &Ratings) -> BTreeMap<u8, usize> {
    let mut distribution: BTreeMap<u8, usize> = (MIN_RATING..=MAX_RATING).map(|s| (s, 0)).collect();
    for rating in ratings.values() {
        *distribution.entry(rating.score).or_default() += 1;
    }
    distribution
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserStats {
    pub total_saved_articles: usize,
    pub total_ratings: usize,
    pub average_rating: f64,
    pub rating_distribution: BTreeMap<u8, usize>,
    /// Articles held in the local cache.
    pub cached_articles: usize,
    pub favorite_category: Option<String>,
    pub interests: Vec<String>,
    pub frequency: String,
    pub last_activity: Option<DateTime<Utc>>,
    pub data_sizes: DataSizes,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(new_articles: usize) -> DigestEvent {
        DigestEvent {
            timestamp: Utc::now(),
            categories: vec!["Technology".to_string()],
            article_count: new_articles,
            new_articles,
            outcome: DigestOutcome::Fresh,
        }
    }

    #[test]
    fn history_is_capped() {
        let mut analytics = Analytics::default();
        for _ in 0..(HISTORY_LIMIT + 5) {
            analytics.record_digest(event(1), 1);
        }

        assert_eq!(analytics.history.len(), HISTORY_LIMIT);
        assert_eq!(analytics.counters.articles_fetched, (HISTORY_LIMIT + 5) as u64);
        assert_eq!(analytics.counters.digests_generated, (HISTORY_LIMIT + 5) as u64);
    }

    #[test]
    fn distribution_covers_every_score() {
        let mut ratings = Ratings::new();
        for (id, score) in [("a", 5), ("b", 5), ("c", 2)] {
            ratings.insert(
                ArticleId::from(id),
                Rating {
                    score,
                    comment: None,
                    rated_at: Utc::now(),
                },
            );
        }

        let distribution = rating_distribution(&ratings);

        let counts: Vec<_> = distribution.into_iter().collect();
        assert_eq!(counts, vec![(1, 0), (2, 1), (3, 0), (4, 0), (5, 2)]);
        assert!(rating_distribution(&Ratings::new()).values().all(|&n| n == 0));
    }

    #[test]
    fn ratings_serialize_keyed_by_article() {
        let mut ratings = Ratings::new();
        ratings.insert(
            ArticleId::from("abc"),
            Rating {
                score: 4,
                comment: None,
                rated_at: Utc::now(),
            },
        );

        let json = serde_json::to_value(&ratings).unwrap();
        assert_eq!(json["abc"]["score"], 4);
    }
}
