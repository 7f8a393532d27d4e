use crate::classifier::SequenceClassifier;
use crate::config::Settings;
use anyhow::Context;
use serde::Serialize;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MODEL: &str = "snunlp/KR-FinBert-SC";

/// Inference server hosting the sentiment model.
///
/// `POST {base}/predict` with `{"inputs": [...], "truncate": true}` answers with one raw
/// logits row per input.
#[derive(Debug, Clone)]
pub struct HttpSequenceClassifier {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
}

impl HttpSequenceClassifier {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_classifier_base_url()?.to_string();
        let model = std::env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let timeout_secs = std::env::var("CLASSIFIER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build classifier http client")?;

        Ok(Self {
            http,
            base_url,
            model,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait::async_trait]
impl SequenceClassifier for HttpSequenceClassifier {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> anyhow::Result<()> {
        let res = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .context("classifier health request failed")?;
        anyhow::ensure!(
            res.status().is_success(),
            "classifier server unhealthy: HTTP {}",
            res.status()
        );
        Ok(())
    }

    async fn logits(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let res = self
            .http
            .post(self.url("/predict"))
            .json(&PredictRequest {
                inputs: texts,
                truncate: true,
            })
            .send()
            .await
            .context("classifier request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read classifier response")?;
        if !status.is_success() {
            anyhow::bail!("classifier HTTP {status}: {text}");
        }

        serde_json::from_str::<Vec<Vec<f32>>>(&text)
            .with_context(|| format!("classifier response is not a logits matrix: {text}"))
    }
}
