pub mod http;

use crate::config::Settings;
use crate::domain::sentiment::Sentiment;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const FALLBACK_MODEL_ID: &str = "fallback";
pub const FALLBACK_PROBABILITY: f64 = 0.5;
const DEFAULT_BATCH_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub sentiment: Sentiment,
    pub probability: f64,
    pub model_id: String,
}

impl Classification {
    pub fn fallback() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            probability: FALLBACK_PROBABILITY,
            model_id: FALLBACK_MODEL_ID.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.model_id == FALLBACK_MODEL_ID
    }
}

/// A pretrained 3-class sequence classifier.
///
/// `logits` returns one row per input, in input order, with columns in
/// [`Sentiment::LABELS`] order (negative, neutral, positive).
#[async_trait::async_trait]
pub trait SequenceClassifier: Send + Sync {
    fn model_id(&self) -> &str;

    async fn probe(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn logits(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Stage 1: headline text to sentiment.
///
/// Never fails. Without a model every item gets the neutral fallback; when a batch fails
/// only that batch does.
pub struct ClassifierAdapter {
    model: Option<Arc<dyn SequenceClassifier>>,
    batch_size: usize,
}

impl ClassifierAdapter {
    pub fn new(model: Option<Arc<dyn SequenceClassifier>>, batch_size: usize) -> Self {
        Self {
            model,
            batch_size: batch_size.max(1),
        }
    }

    pub fn fallback_only() -> Self {
        Self::new(None, DEFAULT_BATCH_SIZE)
    }

    /// Builds the HTTP classifier and probes it once (see [`ClassifierAdapter::probed`]).
    pub async fn connect(settings: &Settings) -> Self {
        let batch_size = std::env::var("CLASSIFIER_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_BATCH_SIZE);

        match http::HttpSequenceClassifier::from_settings(settings) {
            Ok(model) => Self::probed(Arc::new(model), batch_size).await,
            Err(err) => {
                tracing::error!(error = %err, "classifier not configured; all headlines will be neutral");
                Self::new(None, batch_size)
            }
        }
    }

    /// Probes `model` once. On failure the model is dropped and every later call gets the
    /// neutral fallback; it is never retried.
    pub async fn probed(model: Arc<dyn SequenceClassifier>, batch_size: usize) -> Self {
        match model.probe().await.context("classifier probe failed") {
            Ok(()) => {
                tracing::info!(model = model.model_id(), batch_size, "classifier ready");
                Self::new(Some(model), batch_size)
            }
            Err(err) => {
                tracing::error!(error = %err, "classifier unavailable; all headlines will be neutral");
                Self::new(None, batch_size)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    /// One result per input, in input order, regardless of batch boundaries.
    pub async fn classify(&self, texts: &[String]) -> Vec<Classification> {
        let Some(model) = self.model.as_deref() else {
            return texts.iter().map(|_| Classification::fallback()).collect();
        };

        let mut out = Vec::with_capacity(texts.len());
        for (batch_idx, chunk) in texts.chunks(self.batch_size).enumerate() {
            match model.logits(chunk).await {
                Ok(rows) if rows.len() == chunk.len() => {
                    out.extend(rows.iter().map(|row| {
                        classify_row(row, model.model_id()).unwrap_or_else(Classification::fallback)
                    }));
                }
                Ok(rows) => {
                    tracing::warn!(
                        batch_idx,
                        expected = chunk.len(),
                        got = rows.len(),
                        "classifier returned wrong row count; batch falls back to neutral"
                    );
                    out.extend(chunk.iter().map(|_| Classification::fallback()));
                }
                Err(err) => {
                    tracing::warn!(
                        batch_idx,
                        batch_size = chunk.len(),
                        error = %err,
                        "classifier batch failed; batch falls back to neutral"
                    );
                    out.extend(chunk.iter().map(|_| Classification::fallback()));
                }
            }
        }

        let fallbacks = out.iter().filter(|c| c.is_fallback()).count();
        tracing::info!(total = out.len(), fallbacks, "classified headlines");
        out
    }
}

/// Softmax then argmax over one logits row. `None` for a malformed row.
fn classify_row(logits: &[f32], model_id: &str) -> Option<Classification> {
    if logits.len() != Sentiment::LABELS.len() || logits.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&v| (v as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();

    let (index, best) = exps
        .iter()
        .enumerate()
        .fold((0usize, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });

    Some(Classification {
        sentiment: Sentiment::from_index(index)?,
        probability: best / sum,
        model_id: model_id.to_string(),
    })
}
