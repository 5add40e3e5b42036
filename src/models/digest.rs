use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Article;

/// How a category's articles were obtained for this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryStatus {
    Fresh,
    /// Live fetch failed; articles come from the batch cached at `cached_at`.
    Stale { cached_at: DateTime<Utc>, reason: String },
    /// Live fetch failed transiently and nothing was cached.
    Unavailable { reason: String },
    /// Live fetch failed permanently (bad key, malformed query).
    Failed { reason: String },
}

impl CategoryStatus {
    pub fn is_fresh(&self) -> bool {
        matches!(self, CategoryStatus::Fresh)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CategoryStatus::Fresh => "fresh",
            CategoryStatus::Stale { .. } => "stale",
            CategoryStatus::Unavailable { .. } => "unavailable",
            CategoryStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestOutcome {
    Fresh,
    PartiallyStale,
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigestEntry {
    pub article: Article,
    pub is_saved: bool,
    pub rating: Option<u8>,
    pub reading_minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigestSection {
    pub category: String,
    pub status: CategoryStatus,
    pub entries: Vec<DigestEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub outcome: DigestOutcome,
    pub sections: Vec<DigestSection>,
    /// Articles seen for the first time in this run.
    pub new_articles: usize,
}

impl Digest {
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            outcome: DigestOutcome::Empty,
            sections: Vec::new(),
            new_articles: 0,
        }
    }

    pub fn article_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }

    pub fn categories(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.category.clone()).collect()
    }
}
