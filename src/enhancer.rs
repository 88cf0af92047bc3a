//! Question enhancement.
//!
//! Appends a table-selection hint to a question based on keyword rules so the
//! SQL generator favors the right pre-aggregated table. Rules are ordered and
//! mutually exclusive: the first matching rule wins.

/// Table preferred for time-based analysis questions.
pub const MONTHLY_METRICS_TABLE: &str = "campaign_monthly_metrics";
/// Table preferred for anomaly questions.
pub const ANOMALIES_TABLE: &str = "metrics_monthly_anomalies";
/// Table preferred for ranking and comparison questions.
pub const RANKINGS_TABLE: &str = "campaign_month_performance_rankings";
/// Table preferred for campaign-level detail questions.
pub const CAMPAIGNS_TABLE: &str = "stg_campaigns";

const TIME_TERMS: &[&str] = &["month", "trend", "over time", "change", "growth"];
const ANOMALY_TERMS: &[&str] = &["anomaly", "unusual", "outlier", "deviation", "abnormal"];
const RANKING_TERMS: &[&str] = &[
    "rank",
    "ranking",
    "top",
    "best",
    "worst",
    "compare",
    "comparison",
    "performance",
];
const DETAIL_TERMS: &[&str] = &["campaign", "specific", "individual", "detail"];

fn matches_any(question: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| question.contains(term))
}

/// Enhance a question with table guidance. Questions that match no rule are
/// returned unchanged.
pub fn enhance(question: &str) -> String {
    let lower = question.to_lowercase();

    if matches_any(&lower, TIME_TERMS) {
        format!(
            "{} Use the {} table for time-based analysis.",
            question, MONTHLY_METRICS_TABLE
        )
    } else if matches_any(&lower, ANOMALY_TERMS) {
        format!(
            "{} Use the {} table to identify statistical anomalies.",
            question, ANOMALIES_TABLE
        )
    } else if matches_any(&lower, RANKING_TERMS) {
        format!(
            "{} Use the {} table for aggregating campaigns and their performance.",
            question, RANKINGS_TABLE
        )
    } else if matches_any(&lower, DETAIL_TERMS) {
        format!(
            "{} Use the {} table for detailed campaign-level data.",
            question, CAMPAIGNS_TABLE
        )
    } else {
        question.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_terms_win_over_ranking_terms() {
        // "trend" and "best" both appear; the time rule has priority.
        let enhanced = enhance("What is the best ROI trend?");
        assert!(enhanced.contains(MONTHLY_METRICS_TABLE));
        assert!(!enhanced.contains(RANKINGS_TABLE));
    }

    #[test]
    fn test_anomaly_rule() {
        let enhanced = enhance("Any unusual spend this quarter?");
        assert!(enhanced.contains(ANOMALIES_TABLE));
    }

    #[test]
    fn test_ranking_rule() {
        let enhanced = enhance("Top channels by conversion");
        assert!(enhanced.contains(RANKINGS_TABLE));
    }

    #[test]
    fn test_detail_rule() {
        let enhanced = enhance("Show me a specific breakdown");
        assert!(enhanced.contains(CAMPAIGNS_TABLE));
    }

    #[test]
    fn test_unmatched_question_is_unchanged() {
        let question = "What color is the sky?";
        assert_eq!(enhance(question), question);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let enhanced = enhance("MONTHLY GROWTH please");
        assert!(enhanced.contains(MONTHLY_METRICS_TABLE));
    }

    #[test]
    fn test_deterministic() {
        let question = "Compare ROI across companies";
        assert_eq!(enhance(question), enhance(question));
    }
}
