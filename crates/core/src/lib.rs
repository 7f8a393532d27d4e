pub mod aggregate;
pub mod classifier;
pub mod domain;
pub mod ingest;
pub mod insight;
pub mod llm;
pub mod pipeline;
pub mod storage;
pub mod time;

pub mod config {
    use anyhow::Context;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub textgen_base_url: Option<String>,
        pub classifier_base_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub generator_provider: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
                textgen_base_url: std::env::var("TEXTGEN_BASE_URL").ok(),
                classifier_base_url: std::env::var("CLASSIFIER_BASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                generator_provider: std::env::var("GENERATOR_PROVIDER").ok(),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }

        pub fn require_textgen_base_url(&self) -> anyhow::Result<&str> {
            self.textgen_base_url
                .as_deref()
                .context("TEXTGEN_BASE_URL is required")
        }

        pub fn require_classifier_base_url(&self) -> anyhow::Result<&str> {
            self.classifier_base_url
                .as_deref()
                .context("CLASSIFIER_BASE_URL is required")
        }
    }
}
