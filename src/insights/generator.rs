//! Insight generation: gather facets, summarize once through the LLM, write
//! through the cache.

use crate::error::{NlqError, Result};
use crate::execution::ExecutionEngine;
use crate::insights::cache::{InsightCache, COMPANY_INSIGHT};
use crate::insights::facets::EntityFacets;
use crate::llm::CompleteText;
use tracing::info;

pub struct InsightGenerator<'a> {
    llm: &'a dyn CompleteText,
    engine: &'a ExecutionEngine,
    cache: &'a InsightCache,
}

impl<'a> InsightGenerator<'a> {
    pub fn new(
        llm: &'a dyn CompleteText,
        engine: &'a ExecutionEngine,
        cache: &'a InsightCache,
    ) -> Self {
        Self { llm, engine, cache }
    }

    /// Generate (or return the cached) insight for one entity. The literal
    /// LLM output, minus surrounding code fences, is cached and returned;
    /// no HTML validation is applied.
    pub async fn generate(&self, entity: &str, force_refresh: bool) -> Result<String> {
        if !force_refresh {
            if let Some(cached) = self.cache.get(entity, COMPANY_INSIGHT)? {
                info!("Returning cached insight for {}", entity);
                return Ok(cached);
            }
        }

        let facets = EntityFacets::gather(self.engine, entity);
        let data_json = serde_json::to_string(&facets)?;

        let prompt = format!(
            r#"You are an expert marketing analyst who provides extremely concise, data-driven insights for social media marketing campaigns.

Generate a brief, actionable single-paragraph summary for {entity}'s marketing performance based on this data: {data_json}

Format your response as compact HTML with Tailwind CSS classes, following this structure:

<p class="text-gray-700">{entity} experienced a <span class="text-green-500 font-semibold">+X%</span> ROI change with top campaign achieving <span class="text-blue-500 font-semibold">X</span> ROI. Channel <span class="text-blue-500 font-semibold">[name]</span> performed <span class="text-green-500 font-semibold">X%</span> above average ROI, while optimal campaign duration is <span class="text-blue-500 font-semibold">X days</span>.</p>

BE EXTREMELY CONCISE. Create a single paragraph with 2-3 sentences maximum. Always highlight numbers and percentages with color spans (green for positive, red for negative, blue for neutral). Include only the most important metrics and actionable insights.

IMPORTANT:
1. Follow the exact pattern from the example above, with colored spans for all metrics and numbers.
2. Do not include separate sections or headings - just one concise paragraph.
3. Be consistent with percentage values - report them exactly as provided in the data.
4. Do not include backticks or markdown formatting in your response - output only the HTML."#
        );

        let raw = self.llm.complete(&prompt).await?;
        let insight = strip_code_fences(&raw);
        if insight.is_empty() {
            return Err(NlqError::Llm(format!(
                "Empty insight generated for {}",
                entity
            )));
        }

        info!("Generated insight for {} ({} characters)", entity, insight.len());
        self.cache.put(entity, COMPANY_INSIGHT, &insight)?;
        Ok(insight)
    }
}

/// Strip surrounding markdown fences from LLM output. Inner content is
/// passed through untouched.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(inner) = trimmed
        .strip_prefix("```html")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
    {
        return inner.trim().to_string();
    }
    if trimmed.len() >= 2 && trimmed.starts_with('`') && trimmed.ends_with('`') {
        return trimmed.trim_matches('`').trim().to_string();
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_html_fence() {
        let raw = "```html\n<p>fine</p>\n```";
        assert_eq!(strip_code_fences(raw), "<p>fine</p>");
    }

    #[test]
    fn test_strips_bare_fence() {
        let raw = "```\n<p>fine</p>\n```";
        assert_eq!(strip_code_fences(raw), "<p>fine</p>");
    }

    #[test]
    fn test_strips_single_backticks() {
        assert_eq!(strip_code_fences("`<p>fine</p>`"), "<p>fine</p>");
    }

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(strip_code_fences("<p>fine</p>"), "<p>fine</p>");
    }

    #[test]
    fn test_inner_backticks_are_kept() {
        assert_eq!(strip_code_fences("use `roi` here"), "use `roi` here");
    }
}
