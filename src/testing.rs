//! Scripted stand-ins for the news source and the summarization service.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::ai::{SummaryRequest, SummaryService};
use crate::error::ServiceError;
use crate::models::RawArticle;
use crate::news::{NewsRequest, NewsSource};

/// Build a raw article published `hours_ago` hours before now.
pub fn raw_article(url: &str, title: &str, hours_ago: i64) -> RawArticle {
    RawArticle {
        title: title.to_string(),
        url: url.to_string(),
        source: "Test Wire".to_string(),
        published_at: Some(Utc::now() - chrono::Duration::hours(hours_ago)),
        excerpt: Some(format!("Excerpt for {}", title)),
    }
}

/// News source that answers each query string with a scripted result.
/// Unscripted queries return no articles.
pub struct MockNewsSource {
    responses: Mutex<HashMap<String, std::result::Result<Vec<RawArticle>, ServiceError>>>,
    pub call_log: Mutex<Vec<NewsRequest>>,
}

impl MockNewsSource {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            call_log: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(&self, query: &str, result: std::result::Result<Vec<RawArticle>, ServiceError>) {
        self.responses
            .lock()
            .unwrap()
            .insert(query.to_string(), result);
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    pub fn calls_for(&self, query: &str) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.query == query)
            .count()
    }
}

#[async_trait]
impl NewsSource for MockNewsSource {
    async fn search(&self, request: &NewsRequest) -> std::result::Result<Vec<RawArticle>, ServiceError> {
        self.call_log.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .get(&request.query)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Summarizer that returns "Summary: <first prompt line>" unless the prompt
/// contains a scripted failure trigger.
pub struct MockSummarizer {
    failures: Mutex<Vec<(String, ServiceError)>>,
    delay: Duration,
    pub call_log: Mutex<Vec<SummaryRequest>>,
}

impl MockSummarizer {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    /// Fail every prompt that contains `needle`.
    pub fn fail_when(&self, needle: &str, error: ServiceError) {
        self.failures
            .lock()
            .unwrap()
            .push((needle.to_string(), error));
    }

    pub fn call_count(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }
}

#[async_trait]
impl SummaryService for MockSummarizer {
    async fn summarize(&self, request: &SummaryRequest) -> std::result::Result<String, ServiceError> {
        self.call_log.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle.as_str()))
            .map(|(_, err)| err.clone());
        if let Some(err) = failure {
            return Err(err);
        }

        let headline = request
            .prompt
            .lines()
            .find_map(|l| l.trim().strip_prefix("Title: "))
            .unwrap_or("article");
        Ok(format!("Summary: {}", headline))
    }

    fn model_version(&self) -> &str {
        "mock-summarizer"
    }
}
