use adinsight::error::{NlqError, Result};
use adinsight::execution::ExecutionEngine;
use adinsight::insights::batch::BatchDriver;
use adinsight::insights::cache::{InsightCache, COMPANY_INSIGHT};
use adinsight::insights::generator::InsightGenerator;
use adinsight::llm::CompleteText;
use async_trait::async_trait;
use polars::prelude::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// LLM that counts calls and fails for prompts mentioning a chosen entity.
struct CountingLlm {
    calls: AtomicUsize,
    fail_for: Option<String>,
    reply: String,
}

impl CountingLlm {
    fn new(reply: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_for: None,
            reply: reply.to_string(),
        }
    }

    fn failing_for(entity: &str, reply: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_for: Some(entity.to_string()),
            reply: reply.to_string(),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompleteText for CountingLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(entity) = &self.fail_for {
            if prompt.contains(entity.as_str()) {
                return Err(NlqError::Llm("rate limited".to_string()));
            }
        }
        Ok(self.reply.clone())
    }
}

/// Store with a monthly metrics table covering three companies.
fn create_metrics_store() -> Result<PathBuf> {
    let data_dir = std::env::temp_dir()
        .join("adinsight_insights_test")
        .join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&data_dir)?;

    let mut metrics = df! [
        "Company" => ["Aura Align", "Aura Align", "Cyber Circuit", "Cyber Circuit", "NovaNest", "NovaNest"],
        "month" => ["2024-04", "2024-05", "2024-04", "2024-05", "2024-04", "2024-05"],
        "roi" => [1.8, 2.0, 3.5, 4.1, 0.9, 1.1],
        "conversion_rate" => [0.04, 0.05, 0.07, 0.08, 0.02, 0.03],
        "total_revenue" => [120000.0, 150000.0, 400000.0, 460000.0, 50000.0, 62000.0]
    ]
    .map_err(|e| NlqError::Polars(e.to_string()))?;

    let path = data_dir.join("campaign_monthly_metrics.parquet");
    let mut file = std::fs::File::create(&path)?;
    ParquetWriter::new(&mut file)
        .finish(&mut metrics)
        .map_err(|e| NlqError::Polars(e.to_string()))?;

    Ok(data_dir)
}

#[tokio::test]
async fn test_generator_returns_cached_insight_without_second_llm_call(
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let data_dir = create_metrics_store()?;
    let engine = ExecutionEngine::new(data_dir);
    let cache = InsightCache::open_in_memory()?;
    let llm = CountingLlm::new(r#"<p class="text-gray-700">Strong month.</p>"#);

    let generator = InsightGenerator::new(&llm, &engine, &cache);
    let first = generator.generate("Cyber Circuit", false).await?;
    let second = generator.generate("Cyber Circuit", false).await?;

    assert_eq!(first, second);
    assert_eq!(llm.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_force_refresh_regenerates() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let data_dir = create_metrics_store()?;
    let engine = ExecutionEngine::new(data_dir);
    let cache = InsightCache::open_in_memory()?;
    let llm = CountingLlm::new(r#"<p class="text-gray-700">Strong month.</p>"#);

    let generator = InsightGenerator::new(&llm, &engine, &cache);
    generator.generate("Cyber Circuit", false).await?;
    generator.generate("Cyber Circuit", true).await?;

    assert_eq!(llm.call_count(), 2);
    assert_eq!(cache.row_count("Cyber Circuit", COMPANY_INSIGHT)?, 1);
    Ok(())
}

#[tokio::test]
async fn test_generated_insight_is_cached_with_fences_stripped(
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let data_dir = create_metrics_store()?;
    let engine = ExecutionEngine::new(data_dir);
    let cache = InsightCache::open_in_memory()?;
    let llm = CountingLlm::new("```html\n<p class=\"text-gray-700\">Fenced.</p>\n```");

    let generator = InsightGenerator::new(&llm, &engine, &cache);
    let insight = generator.generate("Aura Align", false).await?;

    assert_eq!(insight, r#"<p class="text-gray-700">Fenced.</p>"#);
    let cached = cache.get("Aura Align", COMPANY_INSIGHT)?;
    assert_eq!(cached.as_deref(), Some(insight.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_batch_isolates_per_entity_failures() -> std::result::Result<(), Box<dyn std::error::Error>>
{
    let data_dir = create_metrics_store()?;
    let engine = ExecutionEngine::new(data_dir);
    let cache = InsightCache::open_in_memory()?;
    // The insight prompt embeds the entity's facet payload, so failing on the
    // company name simulates one entity's generation blowing up.
    let llm = CountingLlm::failing_for("Cyber Circuit", r#"<p class="text-gray-700">Fine.</p>"#);

    let driver = BatchDriver::new(&llm, &engine, &cache);
    let summary = driver.run(true).await?;

    assert_eq!(summary.succeeded.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].entity, "Cyber Circuit");
    assert!(!summary.all_succeeded());

    // The other entities still got cached insights.
    assert!(cache.get("Aura Align", COMPANY_INSIGHT)?.is_some());
    assert!(cache.get("NovaNest", COMPANY_INSIGHT)?.is_some());
    assert!(cache.get("Cyber Circuit", COMPANY_INSIGHT)?.is_none());
    Ok(())
}
