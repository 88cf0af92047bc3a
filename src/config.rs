//! Runtime configuration resolved from CLI flags and environment variables.

use crate::error::{NlqError, Result};
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Settings shared by every component that talks to the LLM or the store.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    /// Directory holding the analytics table files (CSV/Parquet per table).
    pub data_dir: PathBuf,
    /// SQLite database backing the insight cache.
    pub cache_db: PathBuf,
    /// SQLite database backing the exemplar training store.
    pub training_db: PathBuf,
    /// Directory mirroring cached insights as flat files.
    pub insights_dir: Option<PathBuf>,
}

impl Config {
    /// Resolve configuration, preferring explicit flag values over environment
    /// variables. A missing API key is fatal.
    pub fn resolve(api_key: Option<String>, data_dir: Option<PathBuf>) -> Result<Self> {
        let api_key = api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .ok_or_else(|| {
                NlqError::Config(
                    "Google API key not provided and not found in environment variables"
                        .to_string(),
                )
            })?;

        let model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let temperature = match std::env::var("GEMINI_TEMPERATURE") {
            Ok(raw) => raw.parse::<f64>().unwrap_or_else(|_| {
                warn!("Invalid GEMINI_TEMPERATURE value '{}', using default {}", raw, DEFAULT_TEMPERATURE);
                DEFAULT_TEMPERATURE
            }),
            Err(_) => DEFAULT_TEMPERATURE,
        };

        let data_dir = data_dir
            .or_else(|| std::env::var("ANALYTICS_DATA_DIR").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data"));

        let cache_db = std::env::var("INSIGHTS_CACHE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("db").join("insights_cache.sqlite"));

        let training_db = std::env::var("TRAINING_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("db").join("training_store.sqlite"));

        let insights_dir = std::env::var("INSIGHTS_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("insights"));

        Ok(Self {
            api_key,
            model,
            temperature,
            data_dir,
            cache_db,
            training_db,
            insights_dir: Some(insights_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults_insights_dir_under_data_dir() {
        let config = Config::resolve(
            Some("test-key".to_string()),
            Some(PathBuf::from("/tmp/store")),
        )
        .unwrap();
        assert_eq!(
            config.insights_dir,
            Some(PathBuf::from("/tmp/store/insights"))
        );
    }
}
