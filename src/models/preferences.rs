use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
}

impl Frequency {
    /// How far back a digest looks for articles.
    pub fn window(&self) -> chrono::Duration {
        match self {
            Frequency::Daily => chrono::Duration::hours(24),
            Frequency::Weekly => chrono::Duration::days(7),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(AppError::Config(format!(
                "unknown frequency '{}', expected daily or weekly",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Selected interest categories, in the order the user picked them.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}
