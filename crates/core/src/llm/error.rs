use crate::llm::Provider;
use std::fmt;

/// Generator failure that keeps whatever the model sent back.
#[derive(Debug, Clone)]
pub struct GeneratorDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
}

impl fmt::Display for GeneratorDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "generator error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for GeneratorDiagnosticsError {}
