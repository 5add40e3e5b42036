use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::ai::{ClaudeSummarizer, PipelineSettings, SummaryPipeline, SummaryService};
use crate::config::Config;
use crate::digest;
use crate::error::{AppError, Result};
use crate::models::{
    rating_distribution, Article, ArticleId, Digest, Frequency, Rating, SavedArticle, SummaryStatus,
    UserDataExport, UserPreferences, UserStats, MAX_RATING, MIN_RATING,
};
use crate::news::{build_queries, CategoryTable, FetchSettings, NewsApiClient, NewsFetcher, NewsSource};
use crate::store::LocalStore;

/// Keys an import file must carry.
const REQUIRED_IMPORT_KEYS: [&str; 3] = ["preferences", "saved_articles", "ratings"];

pub struct App {
    config: Config,
    table: CategoryTable,
    pub store: LocalStore,
    news: Option<Arc<dyn NewsSource>>,
    summarizer: Option<Arc<dyn SummaryService>>,
    // One digest run at a time per process.
    run_lock: Mutex<()>,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        let store = LocalStore::open(&config.data_path()).await?;

        let news = match &config.news_api_key {
            Some(key) => Some(Arc::new(NewsApiClient::new(key.clone(), config.fetch.call_timeout())?)
                as Arc<dyn NewsSource>),
            None => None,
        };

        let summarizer = match (&config.claude_api_key, config.summary.enabled) {
            (Some(key), true) => Some(Arc::new(ClaudeSummarizer::new(
                key.clone(),
                config.summary.call_timeout(),
            )?) as Arc<dyn SummaryService>),
            (None, true) => {
                tracing::warn!("No Anthropic API key configured, digests will show excerpts");
                None
            }
            (_, false) => None,
        };

        Ok(Self::with_services(config, store, news, summarizer))
    }

    pub fn with_services(
        config: Config,
        store: LocalStore,
        news: Option<Arc<dyn NewsSource>>,
        summarizer: Option<Arc<dyn SummaryService>>,
    ) -> Self {
        let table = CategoryTable::new(&config.categories);
        Self {
            config,
            table,
            store,
            news,
            summarizer,
            run_lock: Mutex::new(()),
        }
    }

    pub fn category_names(&self) -> Vec<String> {
        self.table.names().map(str::to_string).collect()
    }

    pub async fn preferences(&self) -> Result<UserPreferences> {
        self.store.load_preferences().await
    }

    /// Replace the selected categories, and the frequency when given.
    /// Unknown category names are rejected and nothing is written.
    pub async fn update_preferences(
        &self,
        categories: &[String],
        frequency: Option<Frequency>,
    ) -> Result<UserPreferences> {
        let categories = self.table.normalize_selection(categories)?;
        let current = self.store.load_preferences().await?;

        let prefs = UserPreferences {
            categories,
            frequency: frequency.unwrap_or(current.frequency),
            last_updated: Some(Utc::now()),
        };
        self.store.preferences.save(&prefs).await?;
        tracing::info!(
            "Preferences updated: {:?} ({})",
            prefs.categories,
            prefs.frequency.as_str()
        );
        Ok(prefs)
    }

    /// Fetch, summarize and assemble a digest for the stored preferences,
    /// then record the run in analytics.
    ///
    /// Only configuration errors and cancellation abort the run; category
    /// and summary failures are reported inside the digest. A cancelled run
    /// leaves analytics untouched.
    pub async fn generate_digest(&self, retry_failed: bool, cancel: &CancellationToken) -> Result<Digest> {
        let _guard = self.run_lock.lock().await;
        let now = Utc::now();
        let prefs = self.store.load_preferences().await?;

        let queries = build_queries(&self.table, &prefs.categories, self.config.fetch.max_query_len)?;
        let digest = if queries.is_empty() {
            tracing::info!("No categories selected, digest is empty");
            Digest::empty(now)
        } else {
            let news = self.news.clone().ok_or_else(|| {
                AppError::Config("no news API key configured (set NEWS_API_KEY)".to_string())
            })?;
            let fetcher = NewsFetcher::new(
                news,
                self.config.fetch.retry_policy(),
                FetchSettings::from(&self.config.fetch),
            );

            let mut fetched = fetcher
                .fetch_all(&queries, prefs.frequency, &self.store.articles, now, cancel)
                .await?;

            if let Some(pipeline) = self.pipeline() {
                pipeline
                    .run(&mut fetched.articles, &self.store.articles, retry_failed, cancel)
                    .await?;
            }

            let selected: Vec<String> = queries.into_iter().map(|q| q.category).collect();
            let saved = self.store.saved.load().await;
            let ratings = self.store.ratings.load().await;
            digest::assemble(&selected, &fetched, &saved, &ratings, now)
        };

        let event = digest::digest_event(&digest);
        let covered = digest::categories_covered(&digest);
        self.store
            .analytics
            .update(|analytics| analytics.record_digest(event, covered))
            .await?;

        tracing::info!(
            "Digest generated: {} articles, {} new, {:?}",
            digest.article_count(),
            digest.new_articles,
            digest.outcome
        );
        Ok(digest)
    }

    /// Returns false if the article was already saved.
    pub async fn save_article(&self, id: &str) -> Result<bool> {
        let article = self.require_article(id).await?;
        let added = self
            .store
            .saved
            .update(|saved| {
                if saved.iter().any(|s| s.article_id == article.id) {
                    false
                } else {
                    saved.push(SavedArticle {
                        article_id: article.id.clone(),
                        saved_at: Utc::now(),
                    });
                    true
                }
            })
            .await?;
        if added {
            tracing::info!("Saved article: {}", article.title);
        }
        Ok(added)
    }

    /// Returns false if the article was not saved.
    pub async fn remove_saved(&self, id: &str) -> Result<bool> {
        let id = ArticleId::from(id);
        self.store
            .saved
            .update(|saved| {
                let before = saved.len();
                saved.retain(|s| s.article_id != id);
                saved.len() != before
            })
            .await
    }

    /// Saved articles, newest first. Articles missing from the cache come
    /// back as `None`.
    pub async fn saved_articles(&self) -> Result<Vec<(SavedArticle, Option<Article>)>> {
        let mut saved = self.store.saved.load().await;
        saved.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));

        let mut out = Vec::with_capacity(saved.len());
        for entry in saved {
            let article = self.store.articles.get_article(&entry.article_id).await?;
            out.push((entry, article));
        }
        Ok(out)
    }

    /// Rate an article from 1 to 5. A new rating replaces any earlier one.
    pub async fn rate_article(&self, id: &str, score: u8, comment: Option<String>) -> Result<()> {
        check_rating(score)?;
        let article = self.require_article(id).await?;

        let comment = comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        self.store
            .ratings
            .update(|ratings| {
                ratings.insert(
                    article.id.clone(),
                    Rating {
                        score,
                        comment,
                        rated_at: Utc::now(),
                    },
                )
            })
            .await?;
        self.store.analytics.update(|a| a.record_rating()).await?;
        Ok(())
    }

    /// A shareable line for the article.
    pub async fn share_article(&self, id: &str) -> Result<String> {
        let article = self.require_article(id).await?;
        self.store.analytics.update(|a| a.record_share()).await?;
        Ok(format!("{} - {}", article.title, article.url))
    }

    /// Discard an article's summary and summarize it again.
    pub async fn resummarize(&self, id: &str, cancel: &CancellationToken) -> Result<Article> {
        let mut article = self.require_article(id).await?;
        let pipeline = self
            .pipeline()
            .ok_or_else(|| AppError::Config("summaries are disabled".to_string()))?;

        self.store.articles.reset_summary(&article.id).await?;
        article.summary = None;
        article.summary_status = SummaryStatus::Pending;

        let mut batch = [article];
        pipeline
            .run(&mut batch, &self.store.articles, true, cancel)
            .await?;
        let [article] = batch;
        Ok(article)
    }

    pub async fn stats(&self) -> Result<UserStats> {
        let prefs = self.store.load_preferences().await?;
        let saved = self.store.saved.load().await;
        let ratings = self.store.ratings.load().await;
        let analytics = self.store.analytics.load().await;

        let average_rating = if ratings.is_empty() {
            0.0
        } else {
            let total: u32 = ratings.values().map(|r| r.score as u32).sum();
            let avg = total as f64 / ratings.len() as f64;
            (avg * 10.0).round() / 10.0
        };

        let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &saved {
            if let Some(article) = self.store.articles.get_article(&entry.article_id).await? {
                for category in article.categories {
                    *category_counts.entry(category).or_default() += 1;
                }
            }
        }
        // Ties go to the alphabetically first category.
        let favorite_category = category_counts
            .iter()
            .fold(None::<(&String, usize)>, |best, (name, &count)| match best {
                Some((_, top)) if top >= count => best,
                _ => Some((name, count)),
            })
            .map(|(name, _)| name.clone());

        let last_activity = [
            prefs.last_updated,
            saved.iter().map(|s| s.saved_at).max(),
            ratings.values().map(|r| r.rated_at).max(),
            analytics.history.last().map(|e| e.timestamp),
        ]
        .into_iter()
        .flatten()
        .max();

        Ok(UserStats {
            total_saved_articles: saved.len(),
            total_ratings: ratings.len(),
            average_rating,
            rating_distribution: rating_distribution(&ratings),
            cached_articles: self.store.articles.count_articles().await?,
            favorite_category,
            interests: prefs.categories,
            frequency: prefs.frequency.as_str().to_string(),
            last_activity,
            data_sizes: self.store.data_sizes().await?,
        })
    }

    pub async fn export(&self, path: &Path) -> Result<UserDataExport> {
        let data = self.store.export().await;
        let json = serde_json::to_string_pretty(&data)?;
        tokio::fs::write(path, json).await?;
        tracing::info!("Exported user data to {:?}", path);
        Ok(data)
    }

    /// Restore preferences, saved articles and ratings from an export file.
    /// Nothing is written unless the whole file is valid.
    pub async fn import(&self, path: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        if !value.is_object() {
            return Err(anyhow::anyhow!("import file must contain a JSON object").into());
        }

        if let Some(missing) = REQUIRED_IMPORT_KEYS.iter().find(|k| value.get(**k).is_none()) {
            return Err(AppError::Config(format!(
                "import file is missing '{}'",
                missing
            )));
        }

        let mut data: UserDataExport = serde_json::from_value(value)?;
        data.preferences.categories = self.table.normalize_selection(&data.preferences.categories)?;
        for rating in data.ratings.values() {
            check_rating(rating.score)?;
        }
        self.store.import(data).await?;
        tracing::info!("Imported user data from {:?}", path);
        Ok(())
    }

    /// Clear saved articles, ratings and analytics. Preferences survive.
    pub async fn reset(&self) -> Result<()> {
        self.store.reset_user_data().await
    }

    pub async fn article(&self, id: &str) -> Result<Option<Article>> {
        self.store.articles.get_article(&ArticleId::from(id)).await
    }

    async fn require_article(&self, id: &str) -> Result<Article> {
        self.article(id)
            .await?
            .ok_or_else(|| AppError::UnknownArticle(id.to_string()))
    }

    fn pipeline(&self) -> Option<SummaryPipeline> {
        let service = self.summarizer.clone()?;
        Some(SummaryPipeline::new(
            service,
            self.config.summary.retry_policy(),
            PipelineSettings::from(&self.config.summary),
        ))
    }
}

fn check_rating(score: u8) -> Result<()> {
    if (MIN_RATING..=MAX_RATING).contains(&score) {
        Ok(())
    } else {
        Err(AppError::InvalidRating(score))
    }
}
