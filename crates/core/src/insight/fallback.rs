use crate::domain::recommendation::{Action, PipelineStage, Recommendation};
use crate::domain::sentiment::{DailySentimentSummary, SentimentCounts};

pub const RULE_BASED_MODEL: &str = "rule-based";

const BUY_ABOVE: f64 = 0.7;
const SELL_BELOW: f64 = 0.3;

/// Deterministic recommendation from sentiment ratios alone, used whenever the generator
/// is unavailable or its call fails.
///
/// `r = positive / (positive + negative)`:
///
/// | condition            | action | confidence |
/// |----------------------|--------|------------|
/// | no relevant headline | hold   | 0.5        |
/// | `r > 0.7`            | buy    | 0.8        |
/// | `r < 0.3`            | sell   | 0.8        |
/// | otherwise            | hold   | 0.6        |
pub fn recommend_from_ratios(
    company_code: &str,
    company_name: &str,
    counts: &SentimentCounts,
) -> Recommendation {
    let relevant = counts.relevant();

    let (action, confidence, rationale) = if relevant == 0 {
        (
            Action::Hold,
            0.5,
            "뉴스 감성 분석 결과 명확한 감성 신호가 없습니다 (no clear signal).".to_string(),
        )
    } else {
        let ratio = counts.positive as f64 / relevant as f64;
        if ratio > BUY_ABOVE {
            (
                Action::Buy,
                0.8,
                format!(
                    "뉴스 감성 분석 결과 긍정 뉴스 비율이 높습니다 ({}/{relevant}).",
                    counts.positive
                ),
            )
        } else if ratio < SELL_BELOW {
            (
                Action::Sell,
                0.8,
                format!(
                    "뉴스 감성 분석 결과 부정 뉴스 비율이 높습니다 ({}/{relevant}).",
                    counts.negative
                ),
            )
        } else {
            (
                Action::Hold,
                0.6,
                "뉴스 감성 분석 결과 뉴스 감성이 혼재되어 있습니다.".to_string(),
            )
        }
    };

    Recommendation {
        company_code: company_code.to_string(),
        company_name: company_name.to_string(),
        action,
        confidence,
        rationale,
        ai_generated: false,
        model_used: RULE_BASED_MODEL.to_string(),
        raw_model_response: None,
        pipeline_stage: PipelineStage::SentimentOnly,
    }
}

pub fn recommend_from_summary(summary: &DailySentimentSummary) -> Recommendation {
    recommend_from_ratios(&summary.company_code, &summary.company_name, &summary.counts())
}
