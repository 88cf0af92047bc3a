//! Batch insight generation across every entity in the store.

use crate::error::Result;
use crate::execution::ExecutionEngine;
use crate::insights::cache::InsightCache;
use crate::insights::facets::distinct_entities;
use crate::insights::generator::InsightGenerator;
use crate::llm::CompleteText;
use serde::Serialize;
use tracing::{error, info};

/// Per-run summary: which entities succeeded and which failed, with the
/// failure messages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub entity: String,
    pub error: String,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct BatchDriver<'a> {
    llm: &'a dyn CompleteText,
    engine: &'a ExecutionEngine,
    cache: &'a InsightCache,
}

impl<'a> BatchDriver<'a> {
    pub fn new(
        llm: &'a dyn CompleteText,
        engine: &'a ExecutionEngine,
        cache: &'a InsightCache,
    ) -> Self {
        Self { llm, engine, cache }
    }

    /// Generate insights for every entity. Per-entity failures are caught
    /// and recorded; the run always completes.
    pub async fn run(&self, force_refresh: bool) -> Result<BatchSummary> {
        let entities = distinct_entities(self.engine)?;
        self.run_for(&entities, force_refresh).await
    }

    /// Same as `run`, over an explicit entity list.
    pub async fn run_for(&self, entities: &[String], force_refresh: bool) -> Result<BatchSummary> {
        info!("Generating insights for {} entities", entities.len());
        let generator = InsightGenerator::new(self.llm, self.engine, self.cache);
        let mut summary = BatchSummary::default();

        for entity in entities {
            match generator.generate(entity, force_refresh).await {
                Ok(_) => summary.succeeded.push(entity.clone()),
                Err(e) => {
                    error!("Error generating insight for {}: {}", entity, e);
                    summary.failed.push(BatchFailure {
                        entity: entity.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Insight batch finished: {} succeeded, {} failed",
            summary.succeeded.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}
