//! Text-to-SQL backend adapters.
//!
//! Two engines implement the same `TextToSql` contract: `RetrievalEngine`
//! generates SQL from a live schema catalog, `ExampleEngine` from trained
//! exemplars plus documentation. Both run the same pipeline per question:
//! enhance, generate SQL, execute, synthesize. No path exits without a
//! `QueryResponse`: a missing SQL candidate routes to the fallback
//! description and an execution failure is annotated into the results.

use crate::catalog::SchemaCatalog;
use crate::enhancer::enhance;
use crate::error::Result;
use crate::execution::{ExecutionEngine, ExecutionOutcome, Row};
use crate::exemplars::{ExemplarStore, TrainingItem};
use crate::llm::CompleteText;
use crate::synthesizer::Synthesizer;
use async_trait::async_trait;
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A question plus its optional entity scope.
#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub entity: Option<String>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: Option<String>) -> Self {
        self.entity = entity;
        self
    }

    /// The question as handed to the generator: entity scope folded in as an
    /// explicit filter sentence.
    fn scoped_question(&self) -> String {
        match &self.entity {
            Some(entity) => format!(
                "{} Limit the analysis to the company '{}'.",
                self.question, entity
            ),
            None => self.question.clone(),
        }
    }
}

/// Response returned by every `ask` call.
///
/// Invariant: `sql` is empty iff no SQL candidate was produced; in that case
/// `results` is empty and `description` carries the fallback framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    pub sql: String,
    pub results: Vec<Row>,
    pub description: String,
}

/// Outcome of SQL generation. Absence is an expected value, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlCandidate {
    Sql(String),
    Empty,
}

/// Capability contract shared by both engines. The comparator and the CLI
/// consume engines only through this trait.
#[async_trait]
pub trait TextToSql: Send + Sync {
    fn name(&self) -> &'static str;

    /// Answer a question end to end. Always yields a `QueryResponse`;
    /// `Err` is reserved for infrastructure failures such as an unreadable
    /// store directory.
    async fn ask(&self, request: &AskRequest) -> Result<QueryResponse>;

    /// Full wipe-then-rebuild of the engine's knowledge base. Never
    /// incremental. Not safe to call concurrently with in-flight `ask` calls
    /// on the same instance beyond the serialization the engine itself does.
    async fn train(&self) -> Result<()>;
}

/// Extract a SQL candidate from raw LLM output: strip code fences, reject the
/// NO_SQL token and empty output.
pub fn extract_sql(raw: &str) -> SqlCandidate {
    let fence = Regex::new(r"(?s)^\s*```(?:sql)?\s*(.*?)\s*```\s*$").expect("static regex");
    let mut text = raw.trim().to_string();
    if let Some(captures) = fence.captures(&text) {
        text = captures[1].trim().to_string();
    }
    text = text.trim_matches('`').trim().to_string();

    if text.is_empty() || text.eq_ignore_ascii_case("no_sql") || text.contains("NO_SQL") {
        SqlCandidate::Empty
    } else {
        SqlCandidate::Sql(text)
    }
}

/// Run the shared back half of the pipeline: execute the candidate (if any)
/// and synthesize a description.
async fn respond(
    llm: &dyn CompleteText,
    engine: &ExecutionEngine,
    request: &AskRequest,
    candidate: SqlCandidate,
) -> Result<QueryResponse> {
    let synthesizer = Synthesizer::new(llm);
    let question = request.question.clone();

    let sql = match candidate {
        SqlCandidate::Empty => {
            info!("No SQL candidate produced, using fallback response");
            let description = synthesizer.describe_fallback(&question).await;
            return Ok(QueryResponse {
                question,
                sql: String::new(),
                results: Vec::new(),
                description,
            });
        }
        SqlCandidate::Sql(sql) => sql,
    };

    let results = match engine.execute(&sql)? {
        ExecutionOutcome::Rows { rows, .. } => rows,
        ExecutionOutcome::Failed { error } => {
            // Execution failure is still synthesized, annotated as data.
            let mut row = Row::new();
            row.insert("error".to_string(), serde_json::Value::String(error));
            vec![row]
        }
    };

    let description = if results.is_empty() {
        String::new()
    } else {
        synthesizer.describe(&question, &sql, &results).await
    };

    Ok(QueryResponse {
        question,
        sql,
        results,
        description,
    })
}

/// Engine that generates SQL from a live schema catalog.
///
/// Construction is cheap; the catalog is built once on first use and reused
/// for the instance's lifetime. `train` rebuilds it from scratch.
pub struct RetrievalEngine {
    llm: Arc<dyn CompleteText>,
    engine: ExecutionEngine,
    catalog: RwLock<Option<SchemaCatalog>>,
}

impl RetrievalEngine {
    pub fn new(llm: Arc<dyn CompleteText>, engine: ExecutionEngine) -> Self {
        Self {
            llm,
            engine,
            catalog: RwLock::new(None),
        }
    }

    /// Build the catalog on first use. Idempotent; double-checked under the
    /// write lock so concurrent first calls build it once.
    async fn ensure_ready(&self) -> Result<()> {
        if self.catalog.read().await.is_some() {
            return Ok(());
        }
        let mut slot = self.catalog.write().await;
        if slot.is_none() {
            let catalog = SchemaCatalog::build(&self.engine)?;
            info!("Built schema catalog with {} tables", catalog.len());
            *slot = Some(catalog);
        }
        Ok(())
    }

    async fn generate_sql(&self, question: &str) -> SqlCandidate {
        let schema = {
            let guard = self.catalog.read().await;
            match guard.as_ref() {
                Some(catalog) => catalog.render(),
                None => return SqlCandidate::Empty,
            }
        };

        let prompt = format!(
            r#"You translate analytics questions into SQL for a columnar store.

Available tables:
{schema}

Question: {question}

Rules:
- Return exactly one SQL SELECT statement and nothing else.
- Only reference the tables and columns listed above.
- If the question cannot be answered from these tables, return exactly NO_SQL."#
        );

        match self.llm.complete(&prompt).await {
            Ok(raw) => {
                let candidate = extract_sql(&raw);
                if let SqlCandidate::Sql(sql) = &candidate {
                    info!("Retrieved SQL: {}", sql);
                }
                candidate
            }
            Err(e) => {
                warn!("SQL generation failed, treating as no candidate: {}", e);
                SqlCandidate::Empty
            }
        }
    }
}

#[async_trait]
impl TextToSql for RetrievalEngine {
    fn name(&self) -> &'static str {
        "retrieval"
    }

    async fn ask(&self, request: &AskRequest) -> Result<QueryResponse> {
        let enhanced = enhance(&request.scoped_question());
        info!("Asking retrieval engine: {}", enhanced);

        self.ensure_ready().await?;
        let candidate = self.generate_sql(&enhanced).await;
        respond(self.llm.as_ref(), &self.engine, request, candidate).await
    }

    async fn train(&self) -> Result<()> {
        let mut slot = self.catalog.write().await;
        *slot = None;
        let catalog = SchemaCatalog::build(&self.engine)?;
        info!("Rebuilt schema catalog with {} tables", catalog.len());
        *slot = Some(catalog);
        Ok(())
    }
}

/// Canonical documentation about the campaign data model, trained into the
/// exemplar store so generated SQL uses the right columns and aggregations.
pub const DATA_MODEL_DOCUMENTATION: &str = r#"The analytics store contains social media advertising data.

Base columns on stg_campaigns:
- Campaign_ID: unique identifier for each campaign (primary key, use for counting unique campaigns)
- Target_Audience: demographic target, e.g. "Men 35-44" (dimension)
- Campaign_Goal: purpose of the campaign, e.g. "Product Launch" (dimension)
- Duration: length of campaign, e.g. "15 Days"
- Channel_Used: social media platform, e.g. "Instagram" (dimension)
- Conversion_Rate: rate of conversions (metric, average it)
- Acquisition_Cost: cost per acquisition (metric, average or sum)
- ROI: return on investment (metric, average it)
- Location, Language, Customer_Segment, Company: dimensions for grouping and filtering
- Clicks, Impressions: volume metrics (sum them)
- Engagement_Score: engagement level (metric, average it)
- Date: campaign date (use for time grouping)

Aggregated tables: campaign_monthly_metrics (per company per month),
metrics_monthly_anomalies (z-scored anomaly flags),
campaign_month_performance_rankings (top/bottom performer flags and ranks).

Common patterns: GROUP BY dimensions, WHERE filters on dimensions,
EXTRACT(MONTH FROM Date) for time analysis, window functions for ranking."#;

/// Engine that generates SQL from nearest-neighbor trained exemplars plus one
/// LLM completion conditioned on the retrieved context and the live schema.
pub struct ExampleEngine {
    llm: Arc<dyn CompleteText>,
    engine: ExecutionEngine,
    store: ExemplarStore,
}

impl ExampleEngine {
    pub fn new(llm: Arc<dyn CompleteText>, engine: ExecutionEngine, store: ExemplarStore) -> Self {
        Self { llm, engine, store }
    }

    /// The training items currently in the store, for inspection.
    pub fn training_data(&self) -> Result<Vec<TrainingItem>> {
        self.store.all()
    }

    /// Add one trained (question, SQL) exemplar.
    pub fn add_exemplar(&self, question: &str, sql: &str) -> Result<()> {
        self.store.add_pair(question, sql)
    }

    /// Canned starter questions for the data set.
    pub fn suggest_questions(&self) -> Vec<&'static str> {
        vec![
            "What are the top 5 companies by ROI?",
            "Which channel has the highest conversion rate?",
            "How does CTR vary across different target audiences?",
            "What is the average acquisition cost by month?",
            "Which campaigns had the highest engagement score?",
        ]
    }

    async fn generate_sql(&self, question: &str) -> Result<SqlCandidate> {
        let neighbors = self.store.nearest_pairs(question, 5)?;
        let context = self.store.context_blocks()?;

        let exemplar_block = if neighbors.is_empty() {
            "(no similar trained questions)".to_string()
        } else {
            neighbors
                .iter()
                .map(|n| format!("Q: {}\nSQL: {}", n.question, n.sql))
                .join("\n\n")
        };

        let schema = match SchemaCatalog::build(&self.engine) {
            Ok(catalog) => catalog.render(),
            Err(e) => {
                warn!("Schema introspection failed, generating without it: {}", e);
                String::new()
            }
        };

        let prompt = format!(
            r#"You translate analytics questions into SQL for a columnar store.

Documentation:
{documentation}

Live schema:
{schema}

Similar trained questions:
{exemplar_block}

Question: {question}

Rules:
- Return exactly one SQL SELECT statement and nothing else.
- Prefer the style of the trained questions above when they are close.
- If the question cannot be answered from this data, return exactly NO_SQL."#,
            documentation = context.join("\n\n"),
        );

        match self.llm.complete(&prompt).await {
            Ok(raw) => {
                let candidate = extract_sql(&raw);
                if let SqlCandidate::Sql(sql) = &candidate {
                    info!("Generated SQL: {}", sql);
                }
                Ok(candidate)
            }
            Err(e) => {
                warn!("SQL generation failed, treating as no candidate: {}", e);
                Ok(SqlCandidate::Empty)
            }
        }
    }
}

#[async_trait]
impl TextToSql for ExampleEngine {
    fn name(&self) -> &'static str {
        "example"
    }

    async fn ask(&self, request: &AskRequest) -> Result<QueryResponse> {
        let enhanced = enhance(&request.scoped_question());
        info!("Asking example engine: {}", enhanced);

        let candidate = self.generate_sql(&enhanced).await?;
        respond(self.llm.as_ref(), &self.engine, request, candidate).await
    }

    /// Wipe the store, then rebuild it from live introspection and the
    /// canonical documentation. Calling twice leaves the store size unchanged.
    async fn train(&self) -> Result<()> {
        let removed = self.store.clear()?;
        info!("Cleared {} existing training items", removed);

        match self.engine.introspect() {
            Ok(schemas) => {
                for schema in &schemas {
                    let ddl = schema
                        .columns
                        .iter()
                        .map(|(name, ty)| format!("  {} {}", name, ty))
                        .join(",\n");
                    self.store
                        .add_schema(&format!("TABLE {} (\n{}\n)", schema.table, ddl))?;
                }
                info!("Trained on {} table schemas", schemas.len());
            }
            Err(e) => warn!("Could not train on store schema: {}", e),
        }

        self.store.add_documentation(DATA_MODEL_DOCUMENTATION)?;
        info!("Training completed, store holds {} items", self.store.len()?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sql_strips_fences() {
        let raw = "```sql\nSELECT 1\n```";
        assert_eq!(extract_sql(raw), SqlCandidate::Sql("SELECT 1".to_string()));
    }

    #[test]
    fn test_extract_sql_strips_bare_fences() {
        let raw = "```\nSELECT 2\n```";
        assert_eq!(extract_sql(raw), SqlCandidate::Sql("SELECT 2".to_string()));
    }

    #[test]
    fn test_extract_sql_no_sql_token_is_empty() {
        assert_eq!(extract_sql("NO_SQL"), SqlCandidate::Empty);
        assert_eq!(extract_sql("  no_sql  "), SqlCandidate::Empty);
        assert_eq!(extract_sql(""), SqlCandidate::Empty);
    }

    #[test]
    fn test_extract_sql_passes_plain_sql_through() {
        assert_eq!(
            extract_sql("SELECT Company FROM stg_campaigns"),
            SqlCandidate::Sql("SELECT Company FROM stg_campaigns".to_string())
        );
    }

    #[test]
    fn test_scoped_question_folds_entity_in() {
        let request = AskRequest::new("What is the ROI by channel?")
            .with_entity(Some("Cyber Circuit".to_string()));
        let scoped = request.scoped_question();
        assert!(scoped.starts_with("What is the ROI by channel?"));
        assert!(scoped.contains("Cyber Circuit"));
    }
}
