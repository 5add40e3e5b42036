//! Local persistence: four user-state collections as JSON files plus the
//! SQLite article cache.

mod json_file;

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Analytics, DataSizes, Ratings, SavedArticle, UserDataExport, UserPreferences};

pub use json_file::JsonFile;

const PREFERENCES_FILE: &str = "user_preferences.json";
const SAVED_FILE: &str = "saved_articles.json";
const RATINGS_FILE: &str = "ratings.json";
const ANALYTICS_FILE: &str = "analytics.json";
const ARTICLES_DB: &str = "articles.db";

pub struct LocalStore {
    dir: PathBuf,
    pub preferences: JsonFile<UserPreferences>,
    pub saved: JsonFile<Vec<SavedArticle>>,
    pub ratings: JsonFile<Ratings>,
    pub analytics: JsonFile<Analytics>,
    pub articles: Repository,
}

impl LocalStore {
    pub async fn open(dir: &Path) -> Result<Self> {
        if tokio::fs::metadata(dir).await.is_ok_and(|m| !m.is_dir()) {
            return Err(AppError::Storage(format!(
                "data path {:?} exists and is not a directory",
                dir
            )));
        }
        tokio::fs::create_dir_all(dir).await?;
        let articles = Repository::open(&dir.join(ARTICLES_DB)).await?;

        Ok(Self {
            dir: dir.to_path_buf(),
            preferences: JsonFile::new(dir.join(PREFERENCES_FILE)),
            saved: JsonFile::new(dir.join(SAVED_FILE)),
            ratings: JsonFile::new(dir.join(RATINGS_FILE)),
            analytics: JsonFile::new(dir.join(ANALYTICS_FILE)),
            articles,
        })
    }

    /// Size of each collection file and the article cache.
    pub async fn data_sizes(&self) -> Result<DataSizes> {
        Ok(DataSizes {
            preferences: self.file_size(PREFERENCES_FILE).await?,
            saved_articles: self.file_size(SAVED_FILE).await?,
            ratings: self.file_size(RATINGS_FILE).await?,
            analytics: self.file_size(ANALYTICS_FILE).await?,
            article_cache: self.file_size(ARTICLES_DB).await?,
        })
    }

    async fn file_size(&self, name: &str) -> Result<u64> {
        match tokio::fs::metadata(self.dir.join(name)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Preferences, writing the defaults on first run.
    pub async fn load_preferences(&self) -> Result<UserPreferences> {
        if !self.preferences.exists() {
            let defaults = UserPreferences::default();
            self.preferences.save(&defaults).await?;
            return Ok(defaults);
        }
        Ok(self.preferences.load().await)
    }

    /// Clear saved articles, ratings and analytics. Preferences and the
    /// article cache are kept.
    pub async fn reset_user_data(&self) -> Result<()> {
        self.saved.save(&Vec::new()).await?;
        self.ratings.save(&Ratings::new()).await?;
        self.analytics.save(&Analytics::default()).await?;
        tracing::info!("Cleared saved articles, ratings and analytics in {:?}", self.dir);
        Ok(())
    }

    pub async fn export(&self) -> UserDataExport {
        UserDataExport {
            preferences: self.preferences.load().await,
            saved_articles: self.saved.load().await,
            ratings: self.ratings.load().await,
            analytics: self.analytics.load().await,
            exported_at: Some(Utc::now()),
        }
    }

    /// Replace preferences, saved articles and ratings with imported data.
    /// Analytics are left as they are.
    pub async fn import(&self, data: UserDataExport) -> Result<()> {
        self.preferences.save(&data.preferences).await?;
        self.saved.save(&data.saved_articles).await?;
        self.ratings.save(&data.ratings).await?;
        Ok(())
    }
}
