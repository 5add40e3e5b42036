use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::config::FetchConfig;
use crate::db::{CategoryBatch, Repository};
use crate::error::{AppError, Result};
use crate::models::{Article, ArticleId, CategoryStatus, Frequency, RawArticle, SummaryStatus};
use crate::retry::{RetryError, RetryPolicy};

use super::client::{NewsRequest, NewsSource};
use super::query::CategoryQuery;

// NewsAPI marks truncated content with e.g. "[+2013 chars]".
static TRUNCATION_MARKER: OnceLock<Option<Regex>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub per_category_cap: u32,
    pub call_timeout: Duration,
    pub concurrency: usize,
    pub reuse_window: chrono::Duration,
}

impl From<&FetchConfig> for FetchSettings {
    fn from(config: &FetchConfig) -> Self {
        Self {
            per_category_cap: config.per_category_cap,
            call_timeout: config.call_timeout(),
            concurrency: config.concurrency.max(1),
            reuse_window: chrono::Duration::seconds(config.reuse_window_secs as i64),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryReport {
    pub category: String,
    pub status: CategoryStatus,
    /// Articles shown for this category, in fetch order.
    pub article_ids: Vec<ArticleId>,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Deduplicated articles in first-seen order, with cached summary state.
    pub articles: Vec<Article>,
    pub reports: Vec<CategoryReport>,
    /// Articles that were not in the cache before this run.
    pub new_article_ids: Vec<ArticleId>,
}

struct CategoryResult {
    category: String,
    request_key: String,
    status: CategoryStatus,
    articles: Vec<Article>,
    /// Came from a live call (as opposed to the cache).
    live: bool,
}

pub struct NewsFetcher {
    source: Arc<dyn NewsSource>,
    policy: RetryPolicy,
    settings: FetchSettings,
}

impl NewsFetcher {
    pub fn new(source: Arc<dyn NewsSource>, policy: RetryPolicy, settings: FetchSettings) -> Self {
        Self {
            source,
            policy,
            settings,
        }
    }

    /// Fetch every category concurrently, then merge, deduplicate and cache
    /// the results. Category failures are reported, not returned as errors.
    pub async fn fetch_all(
        &self,
        queries: &[CategoryQuery],
        frequency: Frequency,
        repo: &Repository,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let results: Vec<Result<CategoryResult>> = stream::iter(queries)
            .map(|query| self.fetch_category(query, frequency, repo, now, cancel))
            .buffered(self.settings.concurrency)
            .collect()
            .await;
        let results = results.into_iter().collect::<Result<Vec<_>>>()?;

        // Merge in category order; the first copy of an article wins.
        let mut articles: Vec<Article> = Vec::new();
        let mut index: HashMap<ArticleId, usize> = HashMap::new();
        let mut live_ids: HashSet<ArticleId> = HashSet::new();
        let mut reports = Vec::with_capacity(results.len());
        let mut live_batches = Vec::new();

        for result in results {
            let mut ids = Vec::with_capacity(result.articles.len());
            for article in result.articles {
                if result.live {
                    live_ids.insert(article.id.clone());
                }
                ids.push(article.id.clone());
                match index.get(&article.id) {
                    Some(&i) => articles[i].add_category(&result.category),
                    None => {
                        index.insert(article.id.clone(), articles.len());
                        articles.push(article);
                    }
                }
            }

            if result.live {
                live_batches.push(CategoryBatch {
                    category: result.category.clone(),
                    article_ids: ids.clone(),
                    request_key: result.request_key.clone(),
                    fetched_at: now,
                });
            }
            reports.push(CategoryReport {
                category: result.category,
                status: result.status,
                article_ids: ids,
            });
        }

        let to_store: Vec<Article> = articles
            .iter()
            .filter(|a| live_ids.contains(&a.id))
            .cloned()
            .collect();
        let new_article_ids = repo.upsert_articles(to_store).await?;
        for batch in live_batches {
            repo.save_category_batch(batch).await?;
        }

        // Pick up summaries cached by earlier runs.
        let all_ids: Vec<ArticleId> = articles.iter().map(|a| a.id.clone()).collect();
        let cached: HashMap<ArticleId, Article> = repo
            .get_articles(&all_ids)
            .await?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        for article in &mut articles {
            if let Some(c) = cached.get(&article.id) {
                article.summary = c.summary.clone();
                article.summary_status = c.summary_status;
            }
        }

        tracing::info!(
            "Fetched {} articles ({} new) across {} categories",
            articles.len(),
            new_article_ids.len(),
            reports.len()
        );

        Ok(FetchOutcome {
            articles,
            reports,
            new_article_ids,
        })
    }

    async fn fetch_category(
        &self,
        query: &CategoryQuery,
        frequency: Frequency,
        repo: &Repository,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<CategoryResult> {
        let category = query.category.clone();
        let window = frequency.window();
        let request_key = batch_key(&query.query, window, self.settings.per_category_cap);

        // A recent batch only stands in for the same request.
        if self.settings.reuse_window > chrono::Duration::zero() {
            if let Some(batch) = repo.load_category_batch(&category).await? {
                if batch.request_key == request_key && now - batch.fetched_at < self.settings.reuse_window {
                    tracing::debug!("Reusing recent batch for {}", category);
                    let articles = load_batch_articles(repo, &batch).await?;
                    return Ok(CategoryResult {
                        category,
                        request_key,
                        status: CategoryStatus::Fresh,
                        articles,
                        live: false,
                    });
                }
            }
        }

        let request = NewsRequest {
            query: query.query.clone(),
            from: now - window,
            page_size: self.settings.per_category_cap,
            page: 1,
        };
        let label = format!("news fetch [{}]", category);
        let source = &self.source;

        let outcome = self
            .policy
            .run(&label, self.settings.call_timeout, cancel, || source.search(&request))
            .await;

        match outcome {
            Ok(raw) => {
                let articles = normalize_batch(raw, &category, self.settings.per_category_cap, now);
                tracing::debug!("Fetched {} articles for {}", articles.len(), category);
                Ok(CategoryResult {
                    category,
                    request_key,
                    status: CategoryStatus::Fresh,
                    articles,
                    live: true,
                })
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                let reason = format!("gave up after {} attempts: {}", attempts, last.message());
                match repo.load_category_batch(&category).await? {
                    Some(batch) => {
                        tracing::warn!(
                            "Fetch for {} failed ({}), using batch cached at {}",
                            category,
                            reason,
                            batch.fetched_at
                        );
                        let articles = load_batch_articles(repo, &batch).await?;
                        Ok(CategoryResult {
                            category,
                            request_key,
                            status: CategoryStatus::Stale {
                                cached_at: batch.fetched_at,
                                reason,
                            },
                            articles,
                            live: false,
                        })
                    }
                    None => {
                        tracing::warn!("Fetch for {} failed with nothing cached: {}", category, reason);
                        Ok(CategoryResult {
                            category,
                            request_key,
                            status: CategoryStatus::Unavailable { reason },
                            articles: Vec::new(),
                            live: false,
                        })
                    }
                }
            }
            Err(RetryError::Permanent(err)) => {
                tracing::error!("Fetch for {} failed: {}", category, err);
                Ok(CategoryResult {
                    category,
                    request_key,
                    status: CategoryStatus::Failed {
                        reason: err.message().to_string(),
                    },
                    articles: Vec::new(),
                    live: false,
                })
            }
            Err(RetryError::Cancelled) => Err(AppError::Cancelled),
        }
    }
}

fn batch_key(query: &str, window: chrono::Duration, page_size: u32) -> String {
    format!("{}|{}|{}", query, window.num_seconds(), page_size)
}

async fn load_batch_articles(repo: &Repository, batch: &CategoryBatch) -> Result<Vec<Article>> {
    let mut articles = repo.get_articles(&batch.article_ids).await?;
    for article in &mut articles {
        article.categories = vec![batch.category.clone()];
    }
    Ok(articles)
}

/// Turn raw results into articles for one category: drop removed or
/// incomplete items, drop duplicates, and keep at most `cap`.
fn normalize_batch(raw: Vec<RawArticle>, category: &str, cap: u32, now: DateTime<Utc>) -> Vec<Article> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|r| normalize(r, category, now))
        .filter(|a| seen.insert(a.id.clone()))
        .take(cap as usize)
        .collect()
}

fn normalize(raw: RawArticle, category: &str, now: DateTime<Utc>) -> Option<Article> {
    let title = raw.title.trim();
    let url = raw.url.trim();
    if title.is_empty() || url.is_empty() || title == "[Removed]" {
        return None;
    }

    Some(Article {
        id: ArticleId::derive(url, title),
        title: title.to_string(),
        url: url.to_string(),
        source: raw.source.trim().to_string(),
        published_at: raw.published_at,
        categories: vec![category.to_string()],
        excerpt: raw.excerpt.as_deref().map(clean_excerpt).unwrap_or_default(),
        summary: None,
        summary_status: SummaryStatus::Pending,
        fetched_at: now,
    })
}

/// Plain-text excerpt: markup stripped, truncation marker removed,
/// whitespace collapsed.
pub fn clean_excerpt(text: &str) -> String {
    let text = if text.contains('<') || text.contains('&') {
        html2text::from_read(text.as_bytes(), 10_000).unwrap_or_else(|_| text.to_string())
    } else {
        text.to_string()
    };

    let marker = TRUNCATION_MARKER.get_or_init(|| Regex::new(r"\s*\[\+\d+ chars\]\s*$").ok());
    let text = match marker {
        Some(re) => re.replace(text.trim_end(), "").into_owned(),
        None => text,
    };

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
