//! LLM completion client.
//!
//! One capability: turn a prompt into text. The Gemini client is the
//! production implementation; tests supply their own `CompleteText` impls.

use crate::error::{NlqError, Result};
use async_trait::async_trait;

/// Synchronous-in-spirit completion contract: one prompt in, one text out.
/// Every LLM touchpoint (SQL generation, descriptions, insight summaries)
/// goes through this trait so callers can be exercised without the network.
#[async_trait]
pub trait CompleteText: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    api_key: String,
    model: String,
    temperature: f64,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, temperature: f64) -> Self {
        Self {
            api_key,
            model,
            temperature,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

#[async_trait]
impl CompleteText for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let client = reqwest::Client::new();
        let body = serde_json::json!({
            "contents": [
                {"parts": [{"text": prompt}]}
            ],
            "generationConfig": {
                "temperature": self.temperature
            }
        });

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let response = client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| NlqError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NlqError::Llm(format!(
                "LLM API returned status {}",
                status
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NlqError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        let content = response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| NlqError::Llm("No content in LLM response".to_string()))?;

        Ok(content.trim().to_string())
    }
}
