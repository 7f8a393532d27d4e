use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Hold => "hold",
            Action::Sell => "sell",
        }
    }

    pub fn label_ko(self) -> &'static str {
        match self {
            Action::Buy => "매수",
            Action::Hold => "보류",
            Action::Sell => "매도",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far the two-stage pipeline got for a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Zero headlines; the generator was never invoked.
    InsufficientData,
    /// Generator unavailable, failed or timed out; rule-based result from sentiment only.
    SentimentOnly,
    /// Generator replied but the reply could not be decoded.
    ParseError,
    /// Generator replied and the reply was decoded.
    Completed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::InsufficientData => "insufficient_data",
            PipelineStage::SentimentOnly => "sentiment_only",
            PipelineStage::ParseError => "parse_error",
            PipelineStage::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub company_code: String,
    pub company_name: String,
    pub action: Action,
    pub confidence: f64,
    pub rationale: String,
    pub ai_generated: bool,
    pub model_used: String,
    pub raw_model_response: Option<String>,
    pub pipeline_stage: PipelineStage,
}
