//! Facet gathering for insight generation.
//!
//! Every facet reads pre-aggregated tables computed upstream (monthly
//! metrics, anomaly flags, duration analysis, clusters); nothing here
//! derives statistics itself. Facet fetches degrade to empty on failure so
//! a missing table never blocks insight generation.

use crate::error::Result;
use crate::execution::{ExecutionEngine, ExecutionOutcome, Row};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

/// All facets gathered for one entity, serialized as the LLM payload.
#[derive(Debug, Clone, Serialize)]
pub struct EntityFacets {
    pub company_name: String,
    pub company_metrics: Value,
    pub campaign_rankings: Value,
    pub channel_insights: Value,
    pub audience_insights: Value,
    pub duration_insights: Value,
    pub campaign_clusters: Value,
}

impl EntityFacets {
    /// Gather every facet for one entity. Individual facet failures are
    /// logged and leave that facet empty.
    pub fn gather(engine: &ExecutionEngine, entity: &str) -> Self {
        Self {
            company_name: entity.to_string(),
            company_metrics: fetch_company_metrics(engine, entity),
            campaign_rankings: fetch_campaign_rankings(engine, entity),
            channel_insights: fetch_channel_insights(engine, entity),
            audience_insights: fetch_audience_insights(engine, entity),
            duration_insights: fetch_duration_insights(engine, entity),
            campaign_clusters: fetch_campaign_clusters(engine, entity),
        }
    }
}

/// Distinct entities present in the monthly metrics table, sorted.
pub fn distinct_entities(engine: &ExecutionEngine) -> Result<Vec<String>> {
    let sql = "SELECT DISTINCT Company FROM campaign_monthly_metrics ORDER BY Company";
    let rows = match engine.execute(sql)? {
        ExecutionOutcome::Rows { rows, .. } => rows,
        ExecutionOutcome::Failed { error } => {
            warn!("Could not list entities: {}", error);
            Vec::new()
        }
    };
    Ok(rows
        .iter()
        .filter_map(|row| row.get("Company").and_then(|v| v.as_str()).map(String::from))
        .collect())
}

fn quote(entity: &str) -> String {
    entity.replace('\'', "''")
}

/// Run one facet query, degrading to no rows on any failure.
fn rows_or_empty(engine: &ExecutionEngine, sql: &str, facet: &str) -> Vec<Row> {
    match engine.execute(sql) {
        Ok(ExecutionOutcome::Rows { rows, .. }) => rows,
        Ok(ExecutionOutcome::Failed { error }) => {
            warn!("Error fetching {}: {}", facet, error);
            Vec::new()
        }
        Err(e) => {
            warn!("Error fetching {}: {}", facet, e);
            Vec::new()
        }
    }
}

fn rows_to_value(rows: Vec<Row>) -> Value {
    Value::Array(rows.into_iter().map(Value::Object).collect())
}

fn pct_change(current: Option<f64>, previous: Option<f64>) -> Value {
    match (current, previous) {
        (Some(c), Some(p)) if p != 0.0 => json!((c - p) / p * 100.0),
        _ => Value::Null,
    }
}

fn number(row: &Row, key: &str) -> Option<f64> {
    row.get(key).and_then(|v| v.as_f64())
}

/// Latest month's averages with deltas against the previous month.
fn fetch_company_metrics(engine: &ExecutionEngine, entity: &str) -> Value {
    let sql = format!(
        "SELECT month, \
                AVG(roi) AS avg_roi, \
                AVG(conversion_rate) AS avg_conversion_rate, \
                SUM(total_revenue) AS total_revenue \
         FROM campaign_monthly_metrics \
         WHERE Company = '{}' \
         GROUP BY month \
         ORDER BY month DESC \
         LIMIT 2",
        quote(entity)
    );
    let rows = rows_or_empty(engine, &sql, "company metrics");
    if rows.is_empty() {
        return json!({});
    }

    let current = &rows[0];
    let previous = rows.get(1);
    let prev_number = |key: &str| previous.and_then(|row| number(row, key));

    json!({
        "current_month": current.get("month"),
        "current_roi": number(current, "avg_roi"),
        "current_conversion_rate": number(current, "avg_conversion_rate"),
        "current_revenue": number(current, "total_revenue"),
        "previous_month": previous.and_then(|row| row.get("month").cloned()),
        "previous_roi": prev_number("avg_roi"),
        "previous_conversion_rate": prev_number("avg_conversion_rate"),
        "previous_revenue": prev_number("total_revenue"),
        "roi_change_pct": pct_change(number(current, "avg_roi"), prev_number("avg_roi")),
        "conversion_rate_change_pct": pct_change(
            number(current, "avg_conversion_rate"),
            prev_number("avg_conversion_rate"),
        ),
        "revenue_change_pct": pct_change(
            number(current, "total_revenue"),
            prev_number("total_revenue"),
        ),
    })
}

const RANKING_METRICS: &[&str] = &["roi", "conversion", "revenue", "cpa"];

/// Top and bottom performers per metric from the rankings table.
fn fetch_campaign_rankings(engine: &ExecutionEngine, entity: &str) -> Value {
    let mut top = serde_json::Map::new();
    let mut bottom = serde_json::Map::new();

    for metric in RANKING_METRICS {
        let top_sql = format!(
            "SELECT * FROM campaign_month_performance_rankings \
             WHERE Company = '{}' AND is_top_{metric}_performer = true \
             ORDER BY {metric}_rank LIMIT 3",
            quote(entity)
        );
        top.insert(
            metric.to_string(),
            rows_to_value(rows_or_empty(engine, &top_sql, "top performers")),
        );

        let bottom_sql = format!(
            "SELECT * FROM campaign_month_performance_rankings \
             WHERE Company = '{}' AND is_bottom_{metric}_performer = true \
             ORDER BY {metric}_rank_asc LIMIT 3",
            quote(entity)
        );
        bottom.insert(
            metric.to_string(),
            rows_to_value(rows_or_empty(engine, &bottom_sql, "bottom performers")),
        );
    }

    json!({
        "top_performers": top,
        "bottom_performers": bottom,
    })
}

/// Channel rollups plus flagged spend anomalies.
fn fetch_channel_insights(engine: &ExecutionEngine, entity: &str) -> Value {
    let top_sql = format!(
        "SELECT Channel_Used, \
                AVG(avg_conversion_rate) AS avg_conversion_rate, \
                SUM(channel_share_clicks) AS share_clicks, \
                COUNT(*) AS channel_count \
         FROM channel_monthly_metrics \
         WHERE Company = '{}' \
         GROUP BY Channel_Used \
         ORDER BY avg_conversion_rate DESC \
         LIMIT 3",
        quote(entity)
    );
    let anomaly_sql = format!(
        "SELECT Channel_Used, spend_anomaly \
         FROM channel_quarter_anomalies \
         WHERE Company = '{}' AND has_anomaly = true \
         ORDER BY spend_anomaly DESC \
         LIMIT 3",
        quote(entity)
    );

    json!({
        "top_channels": rows_to_value(rows_or_empty(engine, &top_sql, "channel insights")),
        "anomalies": rows_to_value(rows_or_empty(engine, &anomaly_sql, "channel anomalies")),
    })
}

/// Audience rollups plus the largest revenue z-score deviations.
fn fetch_audience_insights(engine: &ExecutionEngine, entity: &str) -> Value {
    let top_sql = format!(
        "SELECT response_rate, total_spend, total_revenue \
         FROM audience_monthly_metrics \
         WHERE Company = '{}' \
         ORDER BY response_rate DESC \
         LIMIT 3",
        quote(entity)
    );
    let anomaly_sql = format!(
        "SELECT revenue_z \
         FROM audience_quarter_anomalies \
         WHERE Company = '{}' \
         ORDER BY ABS(revenue_z) DESC \
         LIMIT 3",
        quote(entity)
    );

    json!({
        "top_audiences": rows_to_value(rows_or_empty(engine, &top_sql, "audience insights")),
        "anomalies": rows_to_value(rows_or_empty(engine, &anomaly_sql, "audience anomalies")),
    })
}

/// Optimal campaign duration per dimension, pre-computed upstream.
fn fetch_duration_insights(engine: &ExecutionEngine, entity: &str) -> Value {
    let sql = format!(
        "SELECT dimension, optimal_duration_range, optimal_duration_bucket, optimal_conversion_rate \
         FROM campaign_duration_quarter_analysis \
         WHERE Company = '{}' \
         ORDER BY optimal_conversion_rate DESC \
         LIMIT 5",
        quote(entity)
    );
    let rows = rows_or_empty(engine, &sql, "duration insights");
    let overall = rows.first();

    json!({
        "optimal_durations": rows_to_value(rows.clone()),
        "overall_optimal_duration": overall.and_then(|row| row.get("optimal_duration_range").cloned()),
        "overall_conversion_rate": overall.and_then(|row| row.get("optimal_conversion_rate").cloned()),
    })
}

/// Winning-combination cluster segments.
fn fetch_campaign_clusters(engine: &ExecutionEngine, entity: &str) -> Value {
    let roi_sql = format!(
        "SELECT segment, min_duration, optimal_min_duration, optimal_max_duration, is_optimal_duration \
         FROM campaign_quarter_clusters \
         WHERE Company = '{}' \
         ORDER BY optimal_min_duration DESC \
         LIMIT 3",
        quote(entity)
    );
    let conversion_sql = format!(
        "SELECT segment, min_duration, optimal_min_duration, optimal_max_duration, is_optimal_duration \
         FROM campaign_quarter_clusters \
         WHERE Company = '{}' \
         ORDER BY optimal_max_duration DESC \
         LIMIT 3",
        quote(entity)
    );

    json!({
        "high_roi": rows_to_value(rows_or_empty(engine, &roi_sql, "roi clusters")),
        "high_conversion": rows_to_value(rows_or_empty(engine, &conversion_sql, "conversion clusters")),
    })
}
