//! Exemplar training store for the example-based SQL engine.
//!
//! Holds trained (question, SQL) pairs, free-text documentation, and schema
//! blocks in a SQLite table. Training is always a full wipe-then-rebuild so
//! the store never accumulates stale or duplicate entries.

use crate::error::{NlqError, Result};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

/// Minimum similarity for an exemplar to count as a neighbor.
pub const SIMILARITY_THRESHOLD: f64 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingKind {
    /// A (question, SQL) exemplar pair.
    Pair,
    /// Free-text documentation about the data model.
    Documentation,
    /// A rendered table schema block.
    Schema,
}

impl TrainingKind {
    fn as_str(&self) -> &'static str {
        match self {
            TrainingKind::Pair => "pair",
            TrainingKind::Documentation => "documentation",
            TrainingKind::Schema => "schema",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pair" => Ok(TrainingKind::Pair),
            "documentation" => Ok(TrainingKind::Documentation),
            "schema" => Ok(TrainingKind::Schema),
            other => Err(NlqError::Training(format!("Unknown training kind: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingItem {
    pub id: String,
    pub kind: TrainingKind,
    /// Present only for `Pair` items.
    pub question: Option<String>,
    /// SQL for pairs, text for documentation, DDL for schema blocks.
    pub content: String,
}

/// A retrieved exemplar pair with its similarity to the asked question.
#[derive(Debug, Clone)]
pub struct ScoredExemplar {
    pub question: String,
    pub sql: String,
    pub score: f64,
}

pub struct ExemplarStore {
    conn: Mutex<Connection>,
}

impl ExemplarStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS training_items (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                question TEXT,
                content TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| NlqError::Training("exemplar store lock poisoned".to_string()))
    }

    /// Remove every training item. Called at the start of each rebuild.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM training_items", [])?;
        Ok(removed)
    }

    pub fn add_pair(&self, question: &str, sql: &str) -> Result<()> {
        self.insert(TrainingKind::Pair, Some(question), sql)
    }

    pub fn add_documentation(&self, text: &str) -> Result<()> {
        self.insert(TrainingKind::Documentation, None, text)
    }

    pub fn add_schema(&self, ddl: &str) -> Result<()> {
        self.insert(TrainingKind::Schema, None, ddl)
    }

    fn insert(&self, kind: TrainingKind, question: Option<&str>, content: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO training_items (id, kind, question, content) VALUES (?1, ?2, ?3, ?4)",
            params![Uuid::new_v4().to_string(), kind.as_str(), question, content],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM training_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn all(&self) -> Result<Vec<TrainingItem>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, kind, question, content FROM training_items ORDER BY kind, question")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, kind, question, content) = row?;
            items.push(TrainingItem {
                id,
                kind: TrainingKind::parse(&kind)?,
                question,
                content,
            });
        }
        Ok(items)
    }

    /// Documentation and schema blocks, concatenated for prompt context.
    pub fn context_blocks(&self) -> Result<Vec<String>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|item| item.kind != TrainingKind::Pair)
            .map(|item| item.content)
            .collect())
    }

    /// Nearest trained exemplars for a question, best first, capped at
    /// `top_k`, filtered by the similarity threshold.
    pub fn nearest_pairs(&self, question: &str, top_k: usize) -> Result<Vec<ScoredExemplar>> {
        let needle = normalize(question);
        let mut scored: Vec<ScoredExemplar> = self
            .all()?
            .into_iter()
            .filter(|item| item.kind == TrainingKind::Pair)
            .filter_map(|item| {
                let trained = item.question?;
                let score = strsim::jaro_winkler(&needle, &normalize(&trained));
                if score >= SIMILARITY_THRESHOLD {
                    Some(ScoredExemplar {
                        question: trained,
                        sql: item.content,
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
