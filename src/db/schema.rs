pub const SCHEMA: &str = r#"
-- articles table (identity is a hash of url + title)
CREATE TABLE IF NOT EXISTS articles (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    source TEXT NOT NULL,
    published_at TEXT,
    categories TEXT NOT NULL DEFAULT '[]',
    excerpt TEXT NOT NULL DEFAULT '',
    summary TEXT,
    summary_status TEXT NOT NULL DEFAULT 'pending',
    summary_model TEXT,
    summarized_at TEXT,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles(published_at DESC);
CREATE INDEX IF NOT EXISTS idx_articles_summary_status ON articles(summary_status);

-- category_batches table (last successful fetch per category, used as fallback)
-- request_key identifies the query, time window and page size the batch answered
CREATE TABLE IF NOT EXISTS category_batches (
    category TEXT PRIMARY KEY,
    article_ids TEXT NOT NULL,
    request_key TEXT NOT NULL DEFAULT '',
    fetched_at TEXT NOT NULL
);
"#;

/// Columns added after the first release. Each fails harmlessly once applied.
pub const MIGRATIONS: &[&str] =
    &["ALTER TABLE category_batches ADD COLUMN request_key TEXT NOT NULL DEFAULT ''"];
