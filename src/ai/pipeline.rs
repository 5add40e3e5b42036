use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::SummaryConfig;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Article, SummaryStatus};
use crate::retry::{RetryError, RetryPolicy};

use super::summarizer::{SummaryRequest, SummaryService};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_words: u32,
    pub max_input_chars: usize,
    pub call_timeout: Duration,
    pub concurrency: usize,
}

impl From<&SummaryConfig> for PipelineSettings {
    fn from(config: &SummaryConfig) -> Self {
        Self {
            max_words: config.max_words,
            max_input_chars: config.max_input_chars,
            call_timeout: config.call_timeout(),
            concurrency: config.concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Already summarized, no call made.
    pub cached: usize,
    pub summarized: usize,
    pub failed: usize,
}

pub struct SummaryPipeline {
    service: Arc<dyn SummaryService>,
    policy: RetryPolicy,
    settings: PipelineSettings,
}

impl SummaryPipeline {
    pub fn new(service: Arc<dyn SummaryService>, policy: RetryPolicy, settings: PipelineSettings) -> Self {
        Self {
            service,
            policy,
            settings,
        }
    }

    /// Summarize every pending article (and failed ones when `retry_failed`),
    /// updating both `articles` and the cache as each call completes.
    /// Articles already summarized are never sent to the service again.
    pub async fn run(
        &self,
        articles: &mut [Article],
        repo: &Repository,
        retry_failed: bool,
        cancel: &CancellationToken,
    ) -> Result<PipelineStats> {
        let mut stats = PipelineStats {
            cached: articles
                .iter()
                .filter(|a| a.summary_status == SummaryStatus::Done)
                .count(),
            ..Default::default()
        };

        let work: Vec<(usize, SummaryRequest)> = articles
            .iter()
            .enumerate()
            .filter(|(_, a)| a.needs_summary(retry_failed))
            .map(|(i, a)| (i, self.request_for(a)))
            .collect();

        if work.is_empty() {
            return Ok(stats);
        }
        tracing::debug!("Summarizing {} articles", work.len());

        let service = &self.service;
        let mut results = stream::iter(work)
            .map(|(i, request)| async move {
                let label = format!("summary [{}]", i);
                let outcome = self
                    .policy
                    .run(&label, self.settings.call_timeout, cancel, || {
                        service.summarize(&request)
                    })
                    .await;
                (i, outcome)
            })
            .buffer_unordered(self.settings.concurrency);

        // Results are applied one at a time so each completed summary is
        // cached even if the run is cancelled later.
        while let Some((i, outcome)) = results.next().await {
            let article = &mut articles[i];
            match outcome {
                Ok(summary) => {
                    repo.save_summary(
                        &article.id,
                        summary.clone(),
                        self.service.model_version().to_string(),
                    )
                    .await?;
                    article.summary = Some(summary);
                    article.summary_status = SummaryStatus::Done;
                    stats.summarized += 1;
                }
                Err(RetryError::Cancelled) => return Err(AppError::Cancelled),
                Err(err) => {
                    tracing::warn!("Could not summarize '{}': {}", article.title, err);
                    repo.mark_summary_failed(&article.id).await?;
                    article.summary_status = SummaryStatus::Failed;
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(
            "Summaries: {} new, {} failed, {} cached",
            stats.summarized,
            stats.failed,
            stats.cached
        );
        Ok(stats)
    }

    fn request_for(&self, article: &Article) -> SummaryRequest {
        SummaryRequest {
            prompt: build_prompt(article, self.settings.max_words, self.settings.max_input_chars),
            max_words: self.settings.max_words,
        }
    }
}

pub fn build_prompt(article: &Article, max_words: u32, max_input_chars: usize) -> String {
    let content = match article.excerpt.char_indices().nth(max_input_chars) {
        Some((idx, _)) => format!("{}...", &article.excerpt[..idx]),
        None if article.excerpt.is_empty() => "(no excerpt available)".to_string(),
        None => article.excerpt.clone(),
    };

    format!(
        "Please provide a concise and engaging summary of this news article in {} words or less.\n\n\
         Title: {}\n\
         Source: {}\n\
         Content: {}",
        max_words, article.title, article.source, content
    )
}
