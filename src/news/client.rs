use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result, ServiceError};
use crate::models::RawArticle;

const NEWS_API_URL: &str = "https://newsapi.org/v2/everything";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRequest {
    pub query: String,
    /// Only articles published at or after this instant.
    pub from: DateTime<Utc>,
    pub page_size: u32,
    pub page: u32,
}

/// A searchable news source.
#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn search(&self, request: &NewsRequest) -> std::result::Result<Vec<RawArticle>, ServiceError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<ApiArticle>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiArticle {
    source: Option<ApiSource>,
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
    content: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiSource {
    name: Option<String>,
}

pub struct NewsApiClient {
    client: Client,
    api_key: String,
}

impl NewsApiClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("news-digest/1.0")
            .build()
            .map_err(|e| AppError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, api_key })
    }
}

#[async_trait]
impl NewsSource for NewsApiClient {
    async fn search(&self, request: &NewsRequest) -> std::result::Result<Vec<RawArticle>, ServiceError> {
        let from = request.from.to_rfc3339_opts(SecondsFormat::Secs, true);
        let page_size = request.page_size.to_string();
        let page = request.page.max(1).to_string();

        let response = self
            .client
            .get(NEWS_API_URL)
            .header("X-Api-Key", &self.api_key)
            .query(&[
                ("q", request.query.as_str()),
                ("from", from.as_str()),
                ("sortBy", "publishedAt"),
                ("language", "en"),
                ("pageSize", page_size.as_str()),
                ("page", page.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::from_status(status.as_u16(), &body));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(&e))?;

        Ok(parsed.articles.into_iter().map(RawArticle::from).collect())
    }
}

impl From<ApiArticle> for RawArticle {
    fn from(article: ApiArticle) -> Self {
        RawArticle {
            title: article.title.unwrap_or_default(),
            url: article.url.unwrap_or_default(),
            source: article
                .source
                .and_then(|s| s.name)
                .unwrap_or_else(|| "Unknown source".to_string()),
            published_at: article
                .published_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            // Descriptions are cleaner than the truncated `content` field.
            excerpt: article.description.filter(|d| !d.trim().is_empty()).or(article.content),
        }
    }
}
