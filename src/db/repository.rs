use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Article, ArticleId, SummaryStatus};

use super::schema::{MIGRATIONS, SCHEMA};

const ARTICLE_COLUMNS: &str = "id, title, url, source, published_at, categories, excerpt, \
                               summary, summary_status, fetched_at";

/// The last successful fetch for a category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryBatch {
    pub category: String,
    pub article_ids: Vec<ArticleId>,
    /// Query, window length and page size of the request the batch answered.
    pub request_key: String,
    pub fetched_at: DateTime<Utc>,
}

/// Article cache: fetched articles, their summaries, and the last good batch
/// per category.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    /// Open the cache at `db_path`. A file that is not a usable database is
    /// moved aside and replaced with an empty one.
    pub async fn open(db_path: &Path) -> Result<Self> {
        match Self::open_with_schema(db_path).await {
            Ok(repo) => Ok(repo),
            Err(e) => {
                let aside = db_path.with_extension("db.corrupt");
                tracing::warn!(
                    "Article cache {:?} is unreadable ({}), moving it to {:?}",
                    db_path,
                    e,
                    aside
                );
                tokio::fs::rename(db_path, &aside).await?;
                Self::open_with_schema(db_path).await
            }
        }
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn open_with_schema(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            for migration in MIGRATIONS {
                // Ignore "duplicate column" once a migration has run
                let _ = conn.execute(migration, []);
            }
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Article operations

    /// Insert or refresh articles, leaving any cached summary untouched.
    /// Category tags are merged with the ones already stored.
    /// Returns the ids that were not in the cache before.
    pub async fn upsert_articles(&self, articles: Vec<Article>) -> Result<Vec<ArticleId>> {
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = Vec::new();
                {
                    let mut stored = tx.prepare("SELECT categories FROM articles WHERE id = ?1")?;
                    let mut upsert = tx.prepare(
                        r#"INSERT INTO articles (id, title, url, source, published_at, categories, excerpt, fetched_at)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                           ON CONFLICT(id) DO UPDATE SET
                               title = excluded.title,
                               url = excluded.url,
                               source = excluded.source,
                               published_at = excluded.published_at,
                               categories = excluded.categories,
                               excerpt = excluded.excerpt,
                               fetched_at = excluded.fetched_at"#,
                    )?;

                    for article in articles {
                        let previous: Option<String> = stored
                            .query_row(params![article.id.as_str()], |row| row.get(0))
                            .optional()?;
                        let known = previous.is_some();

                        let mut categories: Vec<String> = previous
                            .and_then(|json| serde_json::from_str(&json).ok())
                            .unwrap_or_default();
                        for category in &article.categories {
                            if !categories.contains(category) {
                                categories.push(category.clone());
                            }
                        }
                        let categories = serde_json::to_string(&categories)
                            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

                        upsert.execute(params![
                            article.id.as_str(),
                            article.title,
                            article.url,
                            article.source,
                            article.published_at.map(|dt| dt.to_rfc3339()),
                            categories,
                            article.excerpt,
                            article.fetched_at.to_rfc3339(),
                        ])?;

                        if !known {
                            inserted.push(article.id);
                        }
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }

    pub async fn get_article(&self, id: &ArticleId) -> Result<Option<Article>> {
        let id = id.as_str().to_string();
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM articles WHERE id = ?1",
                    ARTICLE_COLUMNS
                ))?;
                let article = stmt.query_row(params![id], article_from_row).optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    /// Fetch articles in the order of `ids`, skipping ids no longer cached.
    pub async fn get_articles(&self, ids: &[ArticleId]) -> Result<Vec<Article>> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM articles WHERE id = ?1",
                    ARTICLE_COLUMNS
                ))?;
                let mut articles = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(article) = stmt.query_row(params![id], article_from_row).optional()? {
                        articles.push(article);
                    }
                }
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn count_articles(&self) -> Result<usize> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }

    // Summary operations

    pub async fn save_summary(&self, id: &ArticleId, content: String, model: String) -> Result<()> {
        let id = id.as_str().to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE articles
                       SET summary = ?1, summary_model = ?2, summary_status = 'done',
                           summarized_at = datetime('now')
                       WHERE id = ?3"#,
                    params![content, model, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn mark_summary_failed(&self, id: &ArticleId) -> Result<()> {
        self.set_summary_status(id, SummaryStatus::Failed).await
    }

    /// Forget a cached summary so the next pipeline run regenerates it.
    pub async fn reset_summary(&self, id: &ArticleId) -> Result<()> {
        let id = id.as_str().to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"UPDATE articles
                       SET summary = NULL, summary_model = NULL, summarized_at = NULL,
                           summary_status = 'pending'
                       WHERE id = ?1"#,
                    params![id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn set_summary_status(&self, id: &ArticleId, status: SummaryStatus) -> Result<()> {
        let id = id.as_str().to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE articles SET summary_status = ?1 WHERE id = ?2",
                    params![status.as_str(), id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Category batch operations

    pub async fn save_category_batch(&self, batch: CategoryBatch) -> Result<()> {
        let ids: Vec<&str> = batch.article_ids.iter().map(|id| id.as_str()).collect();
        let ids_json = serde_json::to_string(&ids)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO category_batches (category, article_ids, request_key, fetched_at)
                       VALUES (?1, ?2, ?3, ?4)
                       ON CONFLICT(category) DO UPDATE SET
                           article_ids = excluded.article_ids,
                           request_key = excluded.request_key,
                           fetched_at = excluded.fetched_at"#,
                    params![
                        batch.category,
                        ids_json,
                        batch.request_key,
                        batch.fetched_at.to_rfc3339()
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn load_category_batch(&self, category: &str) -> Result<Option<CategoryBatch>> {
        let category = category.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT article_ids, request_key, fetched_at FROM category_batches WHERE category = ?1",
                        params![category],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row.map(|(ids, key, fetched_at)| (category, ids, key, fetched_at)))
            })
            .await?;

        let Some((category, ids_json, request_key, fetched_at)) = row else {
            return Ok(None);
        };
        let Some(fetched_at) = parse_datetime(&fetched_at) else {
            tracing::warn!("Ignoring cached batch for {} with bad timestamp", category);
            return Ok(None);
        };
        let article_ids = serde_json::from_str::<Vec<String>>(&ids_json)?
            .into_iter()
            .map(ArticleId::from)
            .collect();

        Ok(Some(CategoryBatch {
            category,
            article_ids,
            request_key,
            fetched_at,
        }))
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let categories: String = row.get(5)?;
    Ok(Article {
        id: ArticleId::from(row.get::<_, String>(0)?),
        title: row.get(1)?,
        url: row.get(2)?,
        source: row.get(3)?,
        published_at: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| parse_datetime(&s)),
        categories: serde_json::from_str(&categories).unwrap_or_default(),
        excerpt: row.get(6)?,
        summary: row.get(7)?,
        summary_status: SummaryStatus::parse(&row.get::<_, String>(8)?),
        fetched_at: row
            .get::<_, String>(9)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}
