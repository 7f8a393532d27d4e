pub mod anthropic;
pub mod error;
pub mod textgen;

use crate::config::Settings;
use crate::llm::error::GeneratorDiagnosticsError;
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
    TextGeneration,
}

impl Provider {
    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "textgen" | "tgi" | "text-generation" => Ok(Provider::TextGeneration),
            other => anyhow::bail!("unknown GENERATOR_PROVIDER: {other}"),
        }
    }
}

/// A generative model that continues a prompt.
///
/// Implementations return only the newly generated continuation, never the echoed prompt.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    fn model_id(&self) -> &str;

    /// Start-up check; an error here means the model is unavailable for the process lifetime.
    async fn probe(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn generate(&self, prompt: &str, max_new_tokens: u32) -> anyhow::Result<String>;
}

/// Builds the configured generator and probes it (see [`probed`]).
pub async fn connect(settings: &Settings) -> Option<Arc<dyn TextGenerator>> {
    match build(settings) {
        Ok(generator) => probed(generator).await,
        Err(err) => {
            tracing::error!(error = %err, "generator not configured; recommendations will be rule-based");
            None
        }
    }
}

/// Probes `generator` once. `None` means stage 2 is permanently downgraded to the rule-based
/// recommender; the generator is dropped and never called again.
pub async fn probed(generator: Arc<dyn TextGenerator>) -> Option<Arc<dyn TextGenerator>> {
    match generator.probe().await.context("generator probe failed") {
        Ok(()) => {
            tracing::info!(provider = ?generator.provider(), model = generator.model_id(), "generator ready");
            Some(generator)
        }
        Err(err) => {
            tracing::error!(error = %err, "generator unavailable; recommendations will be rule-based");
            None
        }
    }
}

/// A whitespace-only continuation counts as a failed call for every back-end.
pub(crate) fn non_empty_reply(
    provider: Provider,
    text: String,
    detail: impl FnOnce() -> String,
) -> anyhow::Result<String> {
    if text.trim().is_empty() {
        return Err(GeneratorDiagnosticsError {
            provider,
            stage: "empty_reply",
            detail: detail(),
            raw_output: None,
        }
        .into());
    }
    Ok(text)
}

fn build(settings: &Settings) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let provider = Provider::from_name(settings.generator_provider.as_deref().unwrap_or("anthropic"))?;
    let generator: Arc<dyn TextGenerator> = match provider {
        Provider::Anthropic => Arc::new(anthropic::AnthropicClient::from_settings(settings)?),
        Provider::TextGeneration => Arc::new(textgen::TextGenerationClient::from_settings(settings)?),
    };
    Ok(generator)
}
