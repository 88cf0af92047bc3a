//! Durable TTL cache for generated insights.
//!
//! Backed by a SQLite table keyed by (entity_key, insight_type). Entries
//! older than the TTL are treated as absent so callers regenerate them.
//! `put` is a strict upsert; the table never holds two rows for one key.

use crate::error::{NlqError, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Entries older than this are considered stale.
pub const INSIGHT_TTL_HOURS: i64 = 24;

/// Insight type for whole-company summaries.
pub const COMPANY_INSIGHT: &str = "company";

pub struct InsightCache {
    conn: Mutex<Connection>,
    /// When set, every `put` also mirrors the text to a flat file here.
    mirror_dir: Option<PathBuf>,
}

impl InsightCache {
    pub fn open(path: &Path, mirror_dir: Option<PathBuf>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            mirror_dir,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            mirror_dir: None,
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS insights_cache (
                entity_key TEXT NOT NULL,
                insight_type TEXT NOT NULL,
                insight_text TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                PRIMARY KEY (entity_key, insight_type)
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| NlqError::Cache("insight cache lock poisoned".to_string()))
    }

    /// Fetch a fresh insight, treating stale entries as absent.
    pub fn get(&self, entity_key: &str, insight_type: &str) -> Result<Option<String>> {
        self.get_as_of(entity_key, insight_type, Utc::now())
    }

    /// Freshness check against an explicit clock, so tests can advance time.
    pub fn get_as_of(
        &self,
        entity_key: &str,
        insight_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let cutoff = now - Duration::hours(INSIGHT_TTL_HOURS);
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT insight_text FROM insights_cache
                 WHERE entity_key = ?1 AND insight_type = ?2 AND generated_at > ?3",
                params![entity_key, insight_type, cutoff.to_rfc3339()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(row)
    }

    /// Upsert an insight: update the existing row if present, insert
    /// otherwise. The stored timestamp is always refreshed.
    pub fn put(&self, entity_key: &str, insight_type: &str, text: &str) -> Result<()> {
        {
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO insights_cache (entity_key, insight_type, insight_text, generated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (entity_key, insight_type)
                 DO UPDATE SET insight_text = excluded.insight_text,
                               generated_at = excluded.generated_at",
                params![entity_key, insight_type, text, Utc::now().to_rfc3339()],
            )?;
        }

        if let Some(dir) = &self.mirror_dir {
            if let Err(e) = self.mirror_to_file(dir, entity_key, text) {
                // Mirror files are a convenience; the cache row is the truth.
                warn!("Could not mirror insight for {}: {}", entity_key, e);
            }
        }
        Ok(())
    }

    fn mirror_to_file(&self, dir: &Path, entity_key: &str, text: &str) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let slug = entity_key.replace(' ', "_").to_lowercase();
        let path = dir.join(format!("{}_insight.html", slug));
        std::fs::write(&path, text)?;
        info!("Saved insight to file: {}", path.display());
        Ok(())
    }

    /// Number of rows stored for one entity/type key.
    pub fn row_count(&self, entity_key: &str, insight_type: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM insights_cache WHERE entity_key = ?1 AND insight_type = ?2",
            params![entity_key, insight_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_put_returns_stored_text() {
        let cache = InsightCache::open_in_memory().unwrap();
        cache.put("Cyber Circuit", COMPANY_INSIGHT, "<p>fine quarter</p>").unwrap();
        let got = cache.get("Cyber Circuit", COMPANY_INSIGHT).unwrap();
        assert_eq!(got.as_deref(), Some("<p>fine quarter</p>"));
    }

    #[test]
    fn test_stale_entry_is_absent() {
        let cache = InsightCache::open_in_memory().unwrap();
        cache.put("Cyber Circuit", COMPANY_INSIGHT, "<p>old</p>").unwrap();

        let later = Utc::now() + Duration::hours(INSIGHT_TTL_HOURS + 1);
        let got = cache.get_as_of("Cyber Circuit", COMPANY_INSIGHT, later).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn test_put_is_upsert_not_insert() {
        let cache = InsightCache::open_in_memory().unwrap();
        cache.put("Aura Align", COMPANY_INSIGHT, "first").unwrap();
        cache.put("Aura Align", COMPANY_INSIGHT, "second").unwrap();

        assert_eq!(cache.row_count("Aura Align", COMPANY_INSIGHT).unwrap(), 1);
        let got = cache.get("Aura Align", COMPANY_INSIGHT).unwrap();
        assert_eq!(got.as_deref(), Some("second"));
    }

    #[test]
    fn test_keys_are_independent() {
        let cache = InsightCache::open_in_memory().unwrap();
        cache.put("Aura Align", COMPANY_INSIGHT, "a").unwrap();
        cache.put("Cyber Circuit", COMPANY_INSIGHT, "b").unwrap();

        assert_eq!(cache.get("Aura Align", COMPANY_INSIGHT).unwrap().as_deref(), Some("a"));
        assert_eq!(cache.get("Cyber Circuit", COMPANY_INSIGHT).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_missing_entity_is_absent() {
        let cache = InsightCache::open_in_memory().unwrap();
        assert_eq!(cache.get("Nobody", COMPANY_INSIGHT).unwrap(), None);
    }

    #[test]
    fn test_put_mirrors_insight_to_flat_file() {
        let base = std::env::temp_dir()
            .join("adinsight_cache_test")
            .join(uuid::Uuid::new_v4().to_string());
        let mirror_dir = base.join("insights");
        let cache = InsightCache::open(&base.join("cache.sqlite"), Some(mirror_dir.clone())).unwrap();

        cache.put("Cyber Circuit", COMPANY_INSIGHT, "<p>strong quarter</p>").unwrap();

        let mirrored = std::fs::read_to_string(mirror_dir.join("cyber_circuit_insight.html")).unwrap();
        assert_eq!(mirrored, "<p>strong quarter</p>");

        cache.put("Cyber Circuit", COMPANY_INSIGHT, "<p>revised</p>").unwrap();
        let mirrored = std::fs::read_to_string(mirror_dir.join("cyber_circuit_insight.html")).unwrap();
        assert_eq!(mirrored, "<p>revised</p>");
    }
}
