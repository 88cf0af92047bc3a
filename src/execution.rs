//! SQL execution against the columnar analytics store.
//!
//! The store is a directory of table files (CSV or Parquet, one per table)
//! queried through the polars SQL engine. Each `execute` call builds a fresh
//! SQL context, registers the tables, runs the statement, and drops the
//! context. Nothing is pooled or shared across calls.

use crate::error::{NlqError, Result};
use polars::prelude::*;
use polars::sql::SQLContext;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One result row as column -> JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of running one SQL statement. Failures are data, not errors:
/// malformed SQL and missing tables land in `Failed` so the pipeline can
/// degrade instead of aborting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Rows { rows: Vec<Row>, row_count: usize },
    Failed { error: String },
}

impl ExecutionOutcome {
    pub fn row_count(&self) -> usize {
        match self {
            ExecutionOutcome::Rows { row_count, .. } => *row_count,
            ExecutionOutcome::Failed { .. } => 0,
        }
    }
}

/// Schema of one table in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    /// (column name, type name) pairs in declaration order.
    pub columns: Vec<(String, String)>,
}

/// Execution engine bound to one analytics store directory.
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    data_dir: PathBuf,
}

impl ExecutionEngine {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// List the table files in the store as (name, path) pairs.
    fn table_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut tables = Vec::new();
        let entries = std::fs::read_dir(&self.data_dir).map_err(|e| {
            NlqError::Execution(format!(
                "Cannot read data directory {}: {}",
                self.data_dir.display(),
                e
            ))
        })?;
        for entry in entries {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext == "csv" || ext == "parquet" {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    tables.push((stem.to_string(), path.clone()));
                }
            }
        }
        tables.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(tables)
    }

    fn scan_table(path: &Path) -> Result<LazyFrame> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "csv" => LazyCsvReader::new(path)
                .with_has_header(true)
                .finish()
                .map_err(|e| NlqError::Polars(format!("Failed to scan CSV: {}", e))),
            "parquet" => LazyFrame::scan_parquet(path, ScanArgsParquet::default())
                .map_err(|e| NlqError::Polars(format!("Failed to scan Parquet: {}", e))),
            other => Err(NlqError::Execution(format!(
                "Unsupported table file extension: {}",
                other
            ))),
        }
    }

    /// Run one SQL statement, materializing every row. SQL-level failures
    /// (bad syntax, unknown table, type errors) are captured into the outcome.
    pub fn execute(&self, sql: &str) -> Result<ExecutionOutcome> {
        info!("Executing SQL: {}", sql);

        let tables = self.table_files()?;
        let mut ctx = SQLContext::new();
        for (name, path) in &tables {
            match Self::scan_table(path) {
                Ok(lf) => ctx.register(name, lf),
                Err(e) => warn!("Skipping table {}: {}", name, e),
            }
        }

        let collected = ctx
            .execute(sql)
            .and_then(|lf| lf.collect());

        match collected {
            Ok(df) => {
                let rows = dataframe_to_rows(&df)?;
                let row_count = rows.len();
                info!("SQL execution returned {} rows", row_count);
                Ok(ExecutionOutcome::Rows { rows, row_count })
            }
            Err(e) => {
                warn!("SQL execution failed: {}", e);
                Ok(ExecutionOutcome::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    /// Introspect the store: every table with its columns and types.
    pub fn introspect(&self) -> Result<Vec<TableSchema>> {
        let mut schemas = Vec::new();
        for (name, path) in self.table_files()? {
            let mut lf = Self::scan_table(&path)?;
            let schema = lf
                .schema()
                .map_err(|e| NlqError::Polars(format!("Failed to read schema of {}: {}", name, e)))?;
            let columns = schema
                .iter_fields()
                .map(|field| (field.name().to_string(), field.data_type().to_string()))
                .collect();
            schemas.push(TableSchema {
                table: name,
                columns,
            });
        }
        Ok(schemas)
    }
}

/// Convert a DataFrame into JSON row maps.
fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<Row>> {
    let columns: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = Vec::with_capacity(df.height());

    for row_idx in 0..df.height() {
        let mut row = Row::new();
        for col_name in &columns {
            if let Ok(series) = df.column(col_name) {
                row.insert(col_name.clone(), any_value_to_json(series, row_idx)?);
            }
        }
        rows.push(row);
    }

    Ok(rows)
}

fn any_value_to_json(series: &Series, row_idx: usize) -> Result<serde_json::Value> {
    use polars::prelude::AnyValue;

    let any_val = series
        .get(row_idx)
        .map_err(|e| NlqError::Execution(format!("Failed to get value: {}", e)))?;

    if any_val.is_null() {
        return Ok(serde_json::Value::Null);
    }

    match any_val {
        AnyValue::Null => Ok(serde_json::Value::Null),
        AnyValue::Boolean(b) => Ok(serde_json::Value::Bool(b)),
        AnyValue::String(s) => Ok(serde_json::Value::String(s.to_string())),
        AnyValue::Int8(i) => Ok(serde_json::Value::Number(i.into())),
        AnyValue::Int16(i) => Ok(serde_json::Value::Number(i.into())),
        AnyValue::Int32(i) => Ok(serde_json::Value::Number(i.into())),
        AnyValue::Int64(i) => Ok(serde_json::Value::Number(i.into())),
        AnyValue::UInt8(u) => Ok(serde_json::Value::Number(u.into())),
        AnyValue::UInt16(u) => Ok(serde_json::Value::Number(u.into())),
        AnyValue::UInt32(u) => Ok(serde_json::Value::Number(u.into())),
        AnyValue::UInt64(u) => Ok(serde_json::Value::Number(u.into())),
        AnyValue::Float32(f) => Ok(serde_json::Number::from_f64(f as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)),
        AnyValue::Float64(f) => Ok(serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)),
        other => Ok(serde_json::Value::String(format!("{:?}", other))),
    }
}
