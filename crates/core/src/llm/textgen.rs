use crate::config::Settings;
use crate::llm::error::GeneratorDiagnosticsError;
use crate::llm::{Provider, TextGenerator};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MODEL: &str = "LGAI-EXAONE/EXAONE-Deep-2.4B";

/// Self-hosted text-generation server (`POST /generate`, `GET /health`).
#[derive(Debug, Clone)]
pub struct TextGenerationClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl TextGenerationClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings.require_textgen_base_url()?.to_string();
        let model = std::env::var("TEXTGEN_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let temperature = std::env::var("GENERATOR_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(0.2);
        let timeout_secs = std::env::var("TEXTGEN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build text-generation http client")?;

        Ok(Self {
            http,
            base_url,
            model,
            temperature,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, prompt: &str, max_new_tokens: u32) -> GenerateRequest {
        GenerateRequest {
            inputs: prompt.to_string(),
            parameters: GenerateParameters {
                max_new_tokens,
                temperature: self.temperature,
                top_p: 0.8,
                repetition_penalty: 1.2,
                do_sample: true,
                return_full_text: false,
            },
        }
    }
}

/// Some servers ignore `return_full_text=false`; drop the prompt if it was echoed back.
pub fn strip_prompt_echo<'a>(prompt: &str, generated: &'a str) -> &'a str {
    generated.strip_prefix(prompt).unwrap_or(generated)
}

#[async_trait::async_trait]
impl TextGenerator for TextGenerationClient {
    fn provider(&self) -> Provider {
        Provider::TextGeneration
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn probe(&self) -> anyhow::Result<()> {
        let res = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .context("text-generation health request failed")?;
        anyhow::ensure!(
            res.status().is_success(),
            "text-generation server unhealthy: HTTP {}",
            res.status()
        );
        Ok(())
    }

    async fn generate(&self, prompt: &str, max_new_tokens: u32) -> anyhow::Result<String> {
        let res = self
            .http
            .post(self.url("/generate"))
            .json(&self.request(prompt, max_new_tokens))
            .send()
            .await
            .context("text-generation request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read text-generation response")?;
        if !status.is_success() {
            return Err(GeneratorDiagnosticsError {
                provider: Provider::TextGeneration,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
            }
            .into());
        }

        let parsed = serde_json::from_str::<GenerateResponse>(&text).map_err(|e| {
            GeneratorDiagnosticsError {
                provider: Provider::TextGeneration,
                stage: "decode",
                detail: e.to_string(),
                raw_output: Some(text.clone()),
            }
        })?;

        let reply = strip_prompt_echo(prompt, &parsed.generated_text).trim().to_string();
        super::non_empty_reply(Provider::TextGeneration, reply, || {
            format!("generated_text_chars={}", parsed.generated_text.chars().count())
        })
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    inputs: String,
    parameters: GenerateParameters,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateParameters {
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
    repetition_penalty: f32,
    do_sample: bool,
    return_full_text: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    generated_text: String,
}
