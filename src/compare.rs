//! Side-by-side comparison of two text-to-SQL engines.

use crate::backend::{AskRequest, QueryResponse, TextToSql};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Result of one engine's run: either its response or its error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineOutcome {
    Response(QueryResponse),
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineReport {
    pub backend: String,
    pub outcome: EngineOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub question: String,
    pub reports: Vec<EngineReport>,
}

async fn run_one(engine: &dyn TextToSql, request: &AskRequest) -> EngineReport {
    let outcome = match engine.ask(request).await {
        Ok(response) => EngineOutcome::Response(response),
        Err(e) => {
            error!("Engine '{}' failed: {}", engine.name(), e);
            EngineOutcome::Error {
                error: e.to_string(),
            }
        }
    };
    EngineReport {
        backend: engine.name().to_string(),
        outcome,
    }
}

/// Run the same question through both engines. Each engine is invoked
/// independently; one engine's failure never blocks or hides the other's
/// result.
pub async fn compare(
    first: &dyn TextToSql,
    second: &dyn TextToSql,
    request: &AskRequest,
) -> Comparison {
    let reports = vec![run_one(first, request).await, run_one(second, request).await];
    Comparison {
        question: request.question.clone(),
        reports,
    }
}
