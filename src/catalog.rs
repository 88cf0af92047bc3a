//! Schema catalog built from live store introspection.
//!
//! The catalog is the retrieval engine's knowledge base: the tables the SQL
//! generator is allowed to reference, rendered as prompt context.

use crate::error::Result;
use crate::execution::{ExecutionEngine, TableSchema};
use itertools::Itertools;
use tracing::info;

/// Tables preferred when present in the store. Everything else is noise for
/// the common analytics questions, so the catalog narrows to these.
pub const KEY_TABLES: &[&str] = &[
    "stg_campaigns",
    "campaign_monthly_metrics",
    "metrics_monthly_anomalies",
    "campaign_month_performance_rankings",
];

/// Read-only snapshot of the store schema used for SQL generation.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    /// Build a catalog from live introspection. When any of the key tables
    /// exist, only those are kept; otherwise every table is kept.
    pub fn build(engine: &ExecutionEngine) -> Result<Self> {
        let all = engine.introspect()?;
        info!("Found {} tables in the store", all.len());

        let key: Vec<TableSchema> = all
            .iter()
            .filter(|t| KEY_TABLES.contains(&t.table.as_str()))
            .cloned()
            .collect();

        let tables = if key.is_empty() { all } else { key };
        info!(
            "Using tables: {}",
            tables.iter().map(|t| t.table.as_str()).join(", ")
        );

        Ok(Self { tables })
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Render the catalog as prompt context, one CREATE TABLE-style block per
    /// table.
    pub fn render(&self) -> String {
        self.tables
            .iter()
            .map(|t| {
                let cols = t
                    .columns
                    .iter()
                    .map(|(name, ty)| format!("  {} {}", name, ty))
                    .join(",\n");
                format!("TABLE {} (\n{}\n)", t.table, cols)
            })
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(table: &str) -> TableSchema {
        TableSchema {
            table: table.to_string(),
            columns: vec![
                ("Company".to_string(), "str".to_string()),
                ("roi".to_string(), "f64".to_string()),
            ],
        }
    }

    #[test]
    fn test_render_lists_tables_and_columns() {
        let catalog = SchemaCatalog {
            tables: vec![schema("campaign_monthly_metrics")],
        };
        let rendered = catalog.render();
        assert!(rendered.contains("TABLE campaign_monthly_metrics"));
        assert!(rendered.contains("Company str"));
        assert!(rendered.contains("roi f64"));
    }
}
