use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::SummaryStatus;

/// Stable identity derived from an article's URL and title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(String);

impl ArticleId {
    pub fn derive(url: &str, title: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_url(url).as_bytes());
        hasher.update([0u8]);
        hasher.update(title.trim().as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ArticleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ArticleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Scheme and host case differences should not produce a new identity.
fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match url::Url::parse(raw) {
        Ok(parsed) => parsed.to_string(),
        Err(_) => raw.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Categories that matched this article, in selection order.
    pub categories: Vec<String>,
    pub excerpt: String,
    pub summary: Option<String>,
    pub summary_status: SummaryStatus,
    pub fetched_at: DateTime<Utc>,
}

impl Article {
    /// Text shown to the reader: the summary once generated, otherwise the
    /// raw excerpt.
    pub fn display_text(&self) -> &str {
        match (&self.summary_status, &self.summary) {
            (SummaryStatus::Done, Some(summary)) => summary,
            _ => &self.excerpt,
        }
    }

    pub fn add_category(&mut self, category: &str) {
        if !self.categories.iter().any(|c| c == category) {
            self.categories.push(category.to_string());
        }
    }

    pub fn needs_summary(&self, retry_failed: bool) -> bool {
        match self.summary_status {
            SummaryStatus::Pending => true,
            SummaryStatus::Failed => retry_failed,
            SummaryStatus::Done => false,
        }
    }
}

/// An article as returned by the news source, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawArticle {
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub excerpt: Option<String>,
}
