//! Natural-language synthesis of query results.
//!
//! Two paths: `describe` turns (question, SQL, rows) into a short analysis,
//! and `describe_fallback` produces the apology used when no SQL could be
//! generated. Neither path lets an LLM failure escape: `describe` degrades to
//! a sentinel string and `describe_fallback` to a deterministic template.

use crate::execution::Row;
use crate::llm::CompleteText;
use tracing::{error, info};

/// Returned by `describe` when the LLM call fails.
pub const DESCRIPTION_SENTINEL: &str = "Error generating description";

/// Fixed scope disclaimer included verbatim in every fallback response.
pub const DATA_SCOPE: &str =
    "The database only contains campaign performance, audience segments, and marketing metrics data.";

/// Sample size sent to the LLM; remaining rows are summarized as a count.
const MAX_SAMPLE_ROWS: usize = 10;

pub struct Synthesizer<'a> {
    llm: &'a dyn CompleteText,
}

impl<'a> Synthesizer<'a> {
    pub fn new(llm: &'a dyn CompleteText) -> Self {
        Self { llm }
    }

    /// Describe successful (or error-annotated) results in 2-3 sentences of
    /// business vocabulary.
    pub async fn describe(&self, question: &str, sql: &str, rows: &[Row]) -> String {
        let mut results_str = rows
            .iter()
            .take(MAX_SAMPLE_ROWS)
            .map(|row| serde_json::Value::Object(row.clone()).to_string())
            .collect::<Vec<_>>()
            .join("\n");
        if rows.len() > MAX_SAMPLE_ROWS {
            results_str.push_str(&format!("\n... and {} more rows", rows.len() - MAX_SAMPLE_ROWS));
        }

        let prompt = format!(
            r#"Based on the following SQL query and results, provide a clear answer to the question:

Question: {question}

SQL Query:
{sql}

Results:
{results_str}

Your response must do TWO things:
1. State what the data shows, using specific numbers/metrics from the results AND mentioning key parameters (like filters, time periods, or groupings).
2. Directly connect this to the original question, noting any limitations if the data doesn't fully answer what was asked.

Important guidelines:
- Keep your response VERY CONCISE (max 2-3 sentences)
- Don't quote exact table or column names from the SQL - translate these to business concepts
- Focus on what the data means, not how it was queried
- Don't add recommendations or inferences beyond what the data shows"#
        );

        match self.llm.complete(&prompt).await {
            Ok(text) => {
                info!("Generated analysis for the results");
                text
            }
            Err(e) => {
                error!("Error generating description: {}", e);
                DESCRIPTION_SENTINEL.to_string()
            }
        }
    }

    /// Produce the "Unable to ..." response for questions that yielded no SQL.
    /// Falls back to a deterministic template if the LLM call fails, so this
    /// path can never fail.
    pub async fn describe_fallback(&self, question: &str) -> String {
        let prompt = format!(
            r#"The user asked: '{question}'

Generate a helpful response with these components:

1. Start with a statement beginning with 'Unable to' that explains we can't answer this from the marketing data. Express a subtle hint of disappointment that we can't be more helpful.

2. Include this exact explanation: "{DATA_SCOPE}"

3. End with a brief, subtle comment that shows you wish you could help more while adding just a touch of wit. Don't overdo the humor - it should be understated.

Make sure the response flows naturally as a single paragraph.

For parsing purposes, add 'Joke:' on a separate line before your subtle comment, but I'll remove this marker later."#
        );

        match self.llm.complete(&prompt).await {
            Ok(full_response) => {
                // Splice the marked closing remark back into one paragraph.
                match full_response.split_once("Joke:") {
                    Some((main, joke)) if !joke.trim().is_empty() => {
                        format!("{} {}", main.trim(), joke.trim())
                    }
                    _ => full_response.trim().to_string(),
                }
            }
            Err(e) => {
                error!("Error generating fallback response with LLM: {}", e);
                format!(
                    "Unable to answer about '{}' based on marketing data. {}",
                    question, DATA_SCOPE
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NlqError, Result};
    use async_trait::async_trait;

    struct FixedLlm(String);

    #[async_trait]
    impl CompleteText for FixedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl CompleteText for FailingLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(NlqError::Llm("connection reset".to_string()))
        }
    }

    /// Records the last prompt so tests can assert on what was sent.
    struct CapturingLlm {
        last_prompt: std::sync::Mutex<String>,
    }

    impl CapturingLlm {
        fn new() -> Self {
            Self {
                last_prompt: std::sync::Mutex::new(String::new()),
            }
        }
    }

    #[async_trait]
    impl CompleteText for CapturingLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            Ok("The campaigns performed well.".to_string())
        }
    }

    #[tokio::test]
    async fn test_describe_degrades_to_sentinel_on_llm_failure() {
        let llm = FailingLlm;
        let synthesizer = Synthesizer::new(&llm);
        let description = synthesizer.describe("q", "SELECT 1", &[]).await;
        assert_eq!(description, DESCRIPTION_SENTINEL);
    }

    #[tokio::test]
    async fn test_describe_samples_ten_rows_and_summarizes_the_rest() {
        let llm = CapturingLlm::new();
        let synthesizer = Synthesizer::new(&llm);

        let rows: Vec<Row> = (0..12)
            .map(|i| {
                let mut row = Row::new();
                row.insert("campaign_rank".to_string(), serde_json::json!(i));
                row
            })
            .collect();

        synthesizer.describe("rank campaigns", "SELECT 1", &rows).await;

        let prompt = llm.last_prompt.lock().unwrap().clone();
        assert_eq!(prompt.matches("\"campaign_rank\":").count(), 10);
        assert!(prompt.contains("... and 2 more rows"));
    }

    #[tokio::test]
    async fn test_describe_omits_more_rows_marker_at_the_cap() {
        let llm = CapturingLlm::new();
        let synthesizer = Synthesizer::new(&llm);

        let rows: Vec<Row> = (0..10)
            .map(|i| {
                let mut row = Row::new();
                row.insert("campaign_rank".to_string(), serde_json::json!(i));
                row
            })
            .collect();

        synthesizer.describe("rank campaigns", "SELECT 1", &rows).await;

        let prompt = llm.last_prompt.lock().unwrap().clone();
        assert_eq!(prompt.matches("\"campaign_rank\":").count(), 10);
        assert!(!prompt.contains("more rows"));
    }

    #[tokio::test]
    async fn test_fallback_splices_joke_marker() {
        let llm = FixedLlm(format!(
            "Unable to answer that. {}\nJoke: I'm better with ROI than recipes.",
            DATA_SCOPE
        ));
        let synthesizer = Synthesizer::new(&llm);
        let text = synthesizer.describe_fallback("what's for dinner").await;
        assert!(text.starts_with("Unable to"));
        assert!(text.contains(DATA_SCOPE));
        assert!(text.contains("recipes"));
        assert!(!text.contains("Joke:"));
    }

    #[tokio::test]
    async fn test_fallback_never_fails_even_when_llm_fails() {
        let llm = FailingLlm;
        let synthesizer = Synthesizer::new(&llm);
        let text = synthesizer.describe_fallback("what's for dinner").await;
        assert!(text.starts_with("Unable to"));
        assert!(text.contains("what's for dinner"));
        assert!(text.contains(DATA_SCOPE));
    }
}
