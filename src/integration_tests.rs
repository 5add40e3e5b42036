//! End-to-end flows through `App` with scripted news and summary services.

use std::collections::BTreeMap;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use crate::ai::SummaryService;
use crate::app::App;
use crate::config::Config;
use crate::error::{AppError, ServiceError};
use crate::models::{CategoryStatus, Digest, DigestOutcome, Frequency, SummaryStatus};
use crate::news::NewsSource;
use crate::store::LocalStore;
use crate::testing::{raw_article, MockNewsSource, MockSummarizer};

struct Harness {
    app: App,
    news: Arc<MockNewsSource>,
    summarizer: Arc<MockSummarizer>,
    _dir: TempDir,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.categories = BTreeMap::from([
        ("Technology".to_string(), vec!["technology".to_string()]),
        ("Science".to_string(), vec!["science".to_string()]),
        ("Sports".to_string(), vec!["sports".to_string()]),
    ]);
    config.fetch.base_delay_ms = 0;
    config.fetch.max_delay_ms = 0;
    config.fetch.reuse_window_secs = 0;
    config.summary.base_delay_ms = 0;
    config.summary.max_delay_ms = 0;
    config
}

async fn harness_with(config: Config, summarizer: MockSummarizer) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path()).await.unwrap();
    let news = Arc::new(MockNewsSource::new());
    let summarizer = Arc::new(summarizer);
    let app = App::with_services(
        config,
        store,
        Some(news.clone() as Arc<dyn NewsSource>),
        Some(summarizer.clone() as Arc<dyn SummaryService>),
    );
    Harness {
        app,
        news,
        summarizer,
        _dir: dir,
    }
}

async fn harness(categories: &[&str]) -> Harness {
    let h = harness_with(test_config(), MockSummarizer::new()).await;
    let categories: Vec<String> = categories.iter().map(|c| c.to_string()).collect();
    h.app.update_preferences(&categories, None).await.unwrap();
    h
}

async fn digest(h: &Harness) -> Digest {
    assert_ok!(h.app.generate_digest(false, &CancellationToken::new()).await)
}

#[tokio::test]
async fn duplicate_results_collapse_into_one_article() {
    let h = harness(&["Technology"]).await;
    h.news.respond(
        "technology",
        Ok(vec![
            raw_article("https://x.test/chips", "Chip shortage eases", 6),
            raw_article("https://x.test/robots", "Robots learn to fold laundry", 1),
            raw_article("https://x.test/chips", "Chip shortage eases", 6),
        ]),
    );

    let digest = digest(&h).await;

    assert_eq!(digest.outcome, DigestOutcome::Fresh);
    assert_eq!(digest.article_count(), 2);
    let entries = &digest.sections[0].entries;
    assert_eq!(entries[0].article.title, "Robots learn to fold laundry");
    assert_eq!(entries[1].article.title, "Chip shortage eases");
    assert!(entries
        .iter()
        .all(|e| e.article.categories == vec!["Technology".to_string()]));
    assert_eq!(entries[0].article.display_text(), "Summary: Robots learn to fold laundry");
}

#[tokio::test]
async fn repeated_runs_count_unique_articles_and_reuse_summaries() {
    let h = harness(&["Science"]).await;
    h.news.respond(
        "science",
        Ok(vec![
            raw_article("https://x.test/a", "Comet sighted", 2),
            raw_article("https://x.test/b", "New exoplanet", 3),
        ]),
    );
    digest(&h).await;

    h.news.respond(
        "science",
        Ok(vec![
            raw_article("https://x.test/b", "New exoplanet", 3),
            raw_article("https://x.test/c", "Ocean sensors", 1),
        ]),
    );
    let second = digest(&h).await;

    assert_eq!(second.new_articles, 1);
    assert_eq!(h.summarizer.call_count(), 3);

    let analytics = h.app.store.analytics.load().await;
    assert_eq!(analytics.counters.articles_fetched, 3);
    assert_eq!(analytics.counters.digests_generated, 2);
    assert_eq!(analytics.counters.categories_covered, 2);
    assert_eq!(analytics.history.len(), 2);
    assert_eq!(analytics.history[1].article_count, 2);
}

#[tokio::test]
async fn permanent_summary_failure_shows_excerpt() {
    let summarizer = MockSummarizer::new();
    summarizer.fail_when(
        "Title: Sensitive story",
        ServiceError::Permanent("content policy".to_string()),
    );
    let h = harness_with(test_config(), summarizer).await;
    h.app
        .update_preferences(&["Technology".to_string()], None)
        .await
        .unwrap();
    h.news.respond(
        "technology",
        Ok(vec![
            raw_article("https://x.test/s", "Sensitive story", 1),
            raw_article("https://x.test/o", "Ordinary story", 2),
        ]),
    );

    let digest = digest(&h).await;

    let sensitive = &digest.sections[0].entries[0].article;
    assert_eq!(sensitive.summary_status, SummaryStatus::Failed);
    assert_eq!(sensitive.display_text(), "Excerpt for Sensitive story");
    assert_eq!(digest.sections[0].entries[1].article.summary_status, SummaryStatus::Done);
    assert_eq!(digest.outcome, DigestOutcome::Fresh);
}

#[tokio::test]
async fn failing_category_retries_then_serves_cache() {
    let h = harness(&["Sports", "Science"]).await;
    h.news.respond("sports", Ok(vec![raw_article("https://x.test/goal", "Late winner", 4)]));
    h.news.respond("science", Ok(vec![raw_article("https://x.test/lab", "Lab result", 2)]));
    digest(&h).await;

    h.news.respond("sports", Err(ServiceError::Transient("503".to_string())));
    let digest = digest(&h).await;

    assert_eq!(h.news.calls_for("sports"), 1 + 3);
    assert_eq!(digest.outcome, DigestOutcome::PartiallyStale);
    assert!(matches!(digest.sections[0].status, CategoryStatus::Stale { .. }));
    assert_eq!(digest.sections[0].entries[0].article.title, "Late winner");
    assert!(digest.sections[1].status.is_fresh());
}

#[tokio::test]
async fn rejected_key_degrades_only_that_category() {
    let h = harness(&["Sports", "Science"]).await;
    h.news.respond("sports", Err(ServiceError::Permanent("apiKeyInvalid".to_string())));
    h.news.respond("science", Ok(vec![raw_article("https://x.test/lab", "Lab result", 2)]));

    let digest = digest(&h).await;

    assert_eq!(h.news.calls_for("sports"), 1);
    assert!(matches!(digest.sections[0].status, CategoryStatus::Failed { .. }));
    assert_eq!(digest.article_count(), 1);
    assert_eq!(digest.outcome, DigestOutcome::PartiallyStale);
}

#[tokio::test]
async fn no_categories_gives_empty_digest_without_calls() {
    let h = harness(&[]).await;

    let digest = digest(&h).await;

    assert_eq!(digest.outcome, DigestOutcome::Empty);
    assert_eq!(h.news.call_count(), 0);
    let analytics = h.app.store.analytics.load().await;
    assert_eq!(analytics.history.len(), 1);
    assert_eq!(analytics.counters.articles_fetched, 0);
}

#[tokio::test]
async fn missing_news_key_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::open(dir.path()).await.unwrap();
    let app = App::with_services(test_config(), store, None, None);
    app.update_preferences(&["Science".to_string()], None)
        .await
        .unwrap();

    let result = app.generate_digest(false, &CancellationToken::new()).await;

    assert!(matches!(result, Err(AppError::Config(_))));
    assert_eq!(app.store.analytics.load().await.counters.digests_generated, 0);
}

#[tokio::test]
async fn cancelled_run_records_nothing() {
    let h = harness(&["Science"]).await;
    h.news.respond("science", Ok(vec![raw_article("https://x.test/a", "Comet", 1)]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = h.app.generate_digest(false, &cancel).await;

    assert!(matches!(result, Err(AppError::Cancelled)));
    assert_eq!(h.app.store.analytics.load().await.counters.digests_generated, 0);
}

#[tokio::test]
async fn unknown_category_is_rejected() {
    let h = harness(&["Science"]).await;

    let result = h
        .app
        .update_preferences(&["Astrology".to_string()], Some(Frequency::Weekly))
        .await;

    assert!(matches!(result, Err(AppError::Config(_))));
    let prefs = h.app.preferences().await.unwrap();
    assert_eq!(prefs.categories, vec!["Science".to_string()]);
    assert_eq!(prefs.frequency, Frequency::Daily);
}

#[tokio::test]
async fn save_rate_share_and_reset() {
    let h = harness(&["Technology"]).await;
    h.news.respond("technology", Ok(vec![raw_article("https://x.test/t", "Quantum leap", 1)]));
    let id = digest(&h).await.sections[0].entries[0].article.id.to_string();

    assert!(h.app.save_article(&id).await.unwrap());
    assert!(!h.app.save_article(&id).await.unwrap());
    h.app
        .rate_article(&id, 4, Some("solid".to_string()))
        .await
        .unwrap();
    let line = h.app.share_article(&id).await.unwrap();
    assert_eq!(line, "Quantum leap - https://x.test/t");

    let refreshed = digest(&h).await;
    let entry = &refreshed.sections[0].entries[0];
    assert!(entry.is_saved);
    assert_eq!(entry.rating, Some(4));

    let counters = h.app.store.analytics.load().await.counters;
    assert_eq!(counters.ratings_submitted, 1);
    assert_eq!(counters.shares_triggered, 1);

    h.app.reset().await.unwrap();

    assert!(h.app.saved_articles().await.unwrap().is_empty());
    assert!(h.app.store.ratings.load().await.is_empty());
    assert!(h.app.store.analytics.load().await.history.is_empty());
    assert_eq!(
        h.app.preferences().await.unwrap().categories,
        vec!["Technology".to_string()]
    );
}

#[tokio::test]
async fn invalid_actions_are_rejected() {
    let h = harness(&["Technology"]).await;
    h.news.respond("technology", Ok(vec![raw_article("https://x.test/t", "Quantum leap", 1)]));
    let id = digest(&h).await.sections[0].entries[0].article.id.to_string();

    assert!(matches!(
        h.app.save_article("no-such-article").await,
        Err(AppError::UnknownArticle(_))
    ));
    assert!(matches!(
        h.app.rate_article(&id, 6, None).await,
        Err(AppError::InvalidRating(6))
    ));
    assert!(matches!(
        h.app.rate_article(&id, 0, None).await,
        Err(AppError::InvalidRating(0))
    ));
    assert!(!h.app.remove_saved(&id).await.unwrap());
}

#[tokio::test]
async fn stats_summarize_user_activity() {
    let h = harness(&["Technology", "Science"]).await;
    h.news.respond(
        "technology",
        Ok(vec![
            raw_article("https://x.test/t1", "Tech one", 1),
            raw_article("https://x.test/t2", "Tech two", 2),
        ]),
    );
    h.news.respond("science", Ok(vec![raw_article("https://x.test/s1", "Science one", 1)]));
    let digest = digest(&h).await;
    let ids: Vec<String> = digest
        .sections
        .iter()
        .flat_map(|s| s.entries.iter().map(|e| e.article.id.to_string()))
        .collect();

    for id in &ids {
        h.app.save_article(id).await.unwrap();
    }
    h.app.rate_article(&ids[0], 5, None).await.unwrap();
    h.app.rate_article(&ids[1], 4, None).await.unwrap();
    h.app.rate_article(&ids[2], 4, None).await.unwrap();

    let stats = h.app.stats().await.unwrap();

    assert_eq!(stats.total_saved_articles, 3);
    assert_eq!(stats.total_ratings, 3);
    assert_eq!(stats.average_rating, 4.3);
    assert_eq!(stats.cached_articles, 3);
    assert_eq!(stats.favorite_category.as_deref(), Some("Technology"));
    assert_eq!(stats.interests, vec!["Technology", "Science"]);
    assert_eq!(stats.frequency, "daily");
    assert!(stats.last_activity.is_some());
    assert_eq!(stats.rating_distribution.get(&4), Some(&2));
    assert_eq!(stats.rating_distribution.get(&5), Some(&1));
    assert_eq!(stats.rating_distribution.get(&1), Some(&0));
    assert_eq!(stats.rating_distribution.len(), 5);
    assert!(stats.data_sizes.saved_articles > 0);
    assert!(stats.data_sizes.ratings > 0);
    assert!(stats.data_sizes.article_cache > 0);
}

#[tokio::test]
async fn saved_list_marks_articles_missing_from_cache() {
    let h = harness(&["Technology"]).await;
    h.app
        .store
        .saved
        .update(|saved| {
            saved.push(crate::models::SavedArticle {
                article_id: "gone".into(),
                saved_at: chrono::Utc::now(),
            })
        })
        .await
        .unwrap();

    let saved = h.app.saved_articles().await.unwrap();

    assert_eq!(saved.len(), 1);
    assert!(saved[0].1.is_none());
}

#[tokio::test]
async fn export_then_import_restores_user_data() {
    let h = harness(&["Sports"]).await;
    h.news.respond("sports", Ok(vec![raw_article("https://x.test/g", "Final whistle", 1)]));
    let id = digest(&h).await.sections[0].entries[0].article.id.to_string();
    h.app.save_article(&id).await.unwrap();
    h.app.rate_article(&id, 3, None).await.unwrap();

    let file = h._dir.path().join("export.json");
    let exported = h.app.export(&file).await.unwrap();
    assert_eq!(exported.saved_articles.len(), 1);

    let other = harness(&[]).await;
    other.app.import(&file).await.unwrap();

    assert_eq!(
        other.app.preferences().await.unwrap().categories,
        vec!["Sports".to_string()]
    );
    assert_eq!(other.app.store.saved.load().await.len(), 1);
    assert_eq!(other.app.store.ratings.load().await.len(), 1);
}

#[tokio::test]
async fn import_requires_every_collection() {
    let h = harness(&["Sports"]).await;
    let file = h._dir.path().join("partial.json");
    std::fs::write(&file, r#"{"preferences": {"categories": []}, "ratings": {}}"#).unwrap();

    let result = h.app.import(&file).await;

    assert!(matches!(result, Err(AppError::Config(_))));
    assert_eq!(
        h.app.preferences().await.unwrap().categories,
        vec!["Sports".to_string()]
    );
}

#[tokio::test]
async fn import_rejects_out_of_range_ratings() {
    let h = harness(&["Sports"]).await;
    h.news.respond("sports", Ok(vec![raw_article("https://x.test/g", "Final whistle", 1)]));
    let id = digest(&h).await.sections[0].entries[0].article.id.to_string();
    h.app.rate_article(&id, 4, None).await.unwrap();

    for score in [0, 200] {
        let file = h._dir.path().join(format!("ratings-{}.json", score));
        let data = serde_json::json!({
            "preferences": {"categories": ["Science"], "frequency": "weekly"},
            "saved_articles": [],
            "ratings": {
                "abc": {"score": 3, "rated_at": "2026-01-11T12:00:00Z"},
                "def": {"score": score, "rated_at": "2026-01-11T12:00:00Z"}
            }
        });
        std::fs::write(&file, data.to_string()).unwrap();

        let result = h.app.import(&file).await;

        assert!(matches!(result, Err(AppError::InvalidRating(s)) if s == score));
    }

    let prefs = h.app.preferences().await.unwrap();
    assert_eq!(prefs.categories, vec!["Sports".to_string()]);
    assert_eq!(prefs.frequency, Frequency::Daily);
    let ratings = h.app.store.ratings.load().await;
    assert_eq!(ratings.len(), 1);
    assert_eq!(h.app.stats().await.unwrap().average_rating, 4.0);
}

#[tokio::test]
async fn switching_to_weekly_fetches_the_wider_window() {
    let mut config = test_config();
    config.fetch.reuse_window_secs = 300;
    let h = harness_with(config, MockSummarizer::new()).await;
    h.app
        .update_preferences(&["Science".to_string()], Some(Frequency::Daily))
        .await
        .unwrap();
    h.news.respond("science", Ok(vec![raw_article("https://x.test/a", "Comet", 1)]));

    digest(&h).await;
    digest(&h).await;
    assert_eq!(h.news.call_count(), 1);

    h.app
        .update_preferences(&["Science".to_string()], Some(Frequency::Weekly))
        .await
        .unwrap();
    let weekly = digest(&h).await;

    let calls = h.news.call_log.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    let widened = calls[0].from - calls[1].from;
    assert!(widened > chrono::Duration::days(6) - chrono::Duration::minutes(1));
    assert!(widened <= chrono::Duration::days(6));
    assert!(weekly.sections[0].status.is_fresh());
}

#[tokio::test]
async fn resummarize_calls_the_service_again() {
    let h = harness(&["Science"]).await;
    h.news.respond("science", Ok(vec![raw_article("https://x.test/a", "Comet", 1)]));
    let id = digest(&h).await.sections[0].entries[0].article.id.to_string();
    assert_eq!(h.summarizer.call_count(), 1);

    let article = h
        .app
        .resummarize(&id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(h.summarizer.call_count(), 2);
    assert_eq!(article.summary_status, SummaryStatus::Done);
    assert_eq!(article.display_text(), "Summary: Comet");
}
