use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    pub news_api_key: Option<String>,
    pub claude_api_key: Option<String>,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    /// Interest category -> search keywords, most specific first.
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub per_category_cap: u32,
    pub max_query_len: usize,
    pub timeout_secs: u64,
    pub concurrency: usize,
    /// A category batch younger than this is reused without a network call.
    pub reuse_window_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            per_category_cap: 10,
            max_query_len: 500,
            timeout_secs: 10,
            concurrency: 4,
            reuse_window_secs: 300,
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub enabled: bool,
    pub max_words: u32,
    /// Excerpt characters included in the prompt.
    pub max_input_chars: usize,
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_words: 200,
            max_input_chars: 1500,
            timeout_secs: 30,
            concurrency: 3,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 16_000,
        }
    }
}

impl SummaryConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("news-digest")
        .to_string_lossy()
        .to_string()
}

pub fn default_categories() -> BTreeMap<String, Vec<String>> {
    let table: [(&str, &[&str]); 6] = [
        (
            "Technology",
            &["artificial intelligence", "cybersecurity", "software", "hardware", "startups"],
        ),
        (
            "Business",
            &["finance", "economy", "markets", "entrepreneurship", "corporate"],
        ),
        (
            "Science",
            &["research", "discoveries", "health", "environment", "space"],
        ),
        (
            "Politics",
            &["government", "policy", "elections", "international relations"],
        ),
        (
            "Sports",
            &["football", "basketball", "tennis", "olympics", "soccer"],
        ),
        (
            "Entertainment",
            &["movies", "music", "celebrity", "gaming", "streaming"],
        ),
    ];

    table
        .iter()
        .map(|(name, keywords)| {
            (
                name.to_string(),
                keywords.iter().map(|k| k.to_string()).collect(),
            )
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            news_api_key: None,
            claude_api_key: None,
            fetch: FetchConfig::default(),
            summary: SummaryConfig::default(),
            categories: default_categories(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path, writing defaults if the file is missing.
    /// API keys from the environment take precedence over the file.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            toml::from_str::<Config>(&content)?
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            config
        };

        if let Ok(key) = std::env::var("NEWS_API_KEY") {
            if !key.trim().is_empty() {
                config.news_api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.trim().is_empty() {
                config.claude_api_key = Some(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("news-digest")
            .join("config.toml")
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    fn validate(&self) -> Result<()> {
        if self.fetch.max_attempts == 0 || self.summary.max_attempts == 0 {
            return Err(AppError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.fetch.per_category_cap == 0 {
            return Err(AppError::Config("fetch.per_category_cap must be at least 1".to_string()));
        }
        if let Some((name, _)) = self.categories.iter().find(|(_, kw)| kw.is_empty()) {
            return Err(AppError::Config(format!("category '{}' has no keywords", name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.categories.len(), 6);
        assert_eq!(config.fetch.max_attempts, 3);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/tmp/digest"

[fetch]
per_category_cap = 3

[categories]
Rust = ["rust language", "cargo"]
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.data_dir, "/tmp/digest");
        assert_eq!(config.fetch.per_category_cap, 3);
        assert_eq!(config.fetch.max_query_len, 500);
        assert_eq!(config.summary.max_words, 200);
        assert_eq!(config.categories.len(), 1);
    }

    #[test]
    fn empty_keyword_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[categories]\nEmpty = []\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
