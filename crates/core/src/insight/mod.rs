pub mod fallback;
pub mod parse;
pub mod prompt;

use crate::domain::market::{ChartTrend, PriceSnapshot};
use crate::domain::recommendation::{Action, PipelineStage, Recommendation};
use crate::domain::sentiment::SentimentCounts;
use crate::llm::error::GeneratorDiagnosticsError;
use crate::llm::{self, TextGenerator};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_NEW_TOKENS: u32 = 150;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const PARSE_ERROR_CONFIDENCE: f64 = 0.5;

pub struct InsightRequest<'a> {
    pub company_code: &'a str,
    pub company_name: &'a str,
    pub counts: &'a SentimentCounts,
    pub price: &'a PriceSnapshot,
    pub headlines: &'a [String],
    pub chart_trend: Option<ChartTrend>,
}

/// Stage 2: turns a day's sentiment counts plus price/chart context into a recommendation.
///
/// Never fails. A missing generator, a failed or timed-out call, and an undecodable reply all
/// yield a well-formed [`Recommendation`] whose `pipeline_stage` says what happened.
pub struct InsightGenerator {
    generator: Option<Arc<dyn TextGenerator>>,
    max_new_tokens: u32,
    timeout: Duration,
}

impl InsightGenerator {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            generator,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn from_env(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        let max_new_tokens = std::env::var("GENERATOR_MAX_NEW_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_NEW_TOKENS);
        let timeout_secs = std::env::var("GENERATOR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        Self::new(generator).with_limits(max_new_tokens, Duration::from_secs(timeout_secs))
    }

    pub fn with_limits(mut self, max_new_tokens: u32, timeout: Duration) -> Self {
        self.max_new_tokens = max_new_tokens;
        self.timeout = timeout;
        self
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_some()
    }

    pub fn model_id(&self) -> Option<&str> {
        self.generator.as_deref().map(|g| g.model_id())
    }

    pub async fn generate(&self, req: InsightRequest<'_>) -> Recommendation {
        if req.counts.total() == 0 {
            tracing::info!(company_code = req.company_code, "no headlines; skipping generator");
            return insufficient_data(req.company_code, req.company_name);
        }

        let Some(generator) = self.generator.as_deref() else {
            return fallback::recommend_from_ratios(req.company_code, req.company_name, req.counts);
        };

        let prompt = prompt::build_prompt(&prompt::PromptInput {
            company_name: req.company_name,
            counts: req.counts,
            price: req.price,
            chart_trend: req.chart_trend,
            headlines: req.headlines,
        });

        let t0 = Instant::now();
        let result = match tokio::time::timeout(
            self.timeout,
            generator.generate(&prompt, self.max_new_tokens),
        )
        .await
        {
            Ok(result) => result.and_then(|reply| {
                llm::non_empty_reply(generator.provider(), reply, || "blank continuation".to_string())
            }),
            Err(_) => {
                tracing::warn!(
                    company_code = req.company_code,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "generator call timed out; using rule-based recommendation"
                );
                return fallback::recommend_from_ratios(req.company_code, req.company_name, req.counts);
            }
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(
                    company_code = req.company_code,
                    error = %err,
                    "generator call failed; using rule-based recommendation"
                );
                let mut rec =
                    fallback::recommend_from_ratios(req.company_code, req.company_name, req.counts);
                rec.raw_model_response = err
                    .downcast_ref::<GeneratorDiagnosticsError>()
                    .and_then(|d| d.raw_output.clone());
                return rec;
            }
        };

        tracing::info!(
            company_code = req.company_code,
            elapsed_ms = t0.elapsed().as_millis(),
            reply_chars = reply.chars().count(),
            "generator replied"
        );

        let parsed = parse::parse_reply(&reply, req.counts);
        if !parsed.matched.any() {
            tracing::warn!(
                company_code = req.company_code,
                raw = %reply,
                "generator reply did not contain any expected field"
            );
            return Recommendation {
                company_code: req.company_code.to_string(),
                company_name: req.company_name.to_string(),
                action: Action::Hold,
                confidence: PARSE_ERROR_CONFIDENCE,
                rationale: parse::synthesized_rationale(req.counts),
                ai_generated: false,
                model_used: generator.model_id().to_string(),
                raw_model_response: Some(reply),
                pipeline_stage: PipelineStage::ParseError,
            };
        }

        Recommendation {
            company_code: req.company_code.to_string(),
            company_name: req.company_name.to_string(),
            action: parsed.action,
            confidence: parsed.confidence,
            rationale: parsed.rationale,
            ai_generated: true,
            model_used: generator.model_id().to_string(),
            raw_model_response: Some(reply),
            pipeline_stage: PipelineStage::Completed,
        }
    }
}

fn insufficient_data(company_code: &str, company_name: &str) -> Recommendation {
    Recommendation {
        company_code: company_code.to_string(),
        company_name: company_name.to_string(),
        action: Action::Hold,
        confidence: 0.0,
        rationale: "분석할 뉴스가 없어 투자 인사이트를 생성할 수 없습니다 (insufficient data)."
            .to_string(),
        ai_generated: false,
        model_used: "none".to_string(),
        raw_model_response: None,
        pipeline_stage: PipelineStage::InsufficientData,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::market::PriceStatus;
    use crate::llm::Provider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) enum Reply {
        Text(&'static str),
        Fail,
        Hang,
    }

    pub(crate) struct MockGenerator {
        reply: Reply,
        pub calls: AtomicUsize,
        pub last_prompt: Mutex<Option<String>>,
    }

    impl MockGenerator {
        pub(crate) fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait::async_trait]
    impl TextGenerator for MockGenerator {
        fn provider(&self) -> Provider {
            Provider::TextGeneration
        }

        fn model_id(&self) -> &str {
            "mock-generator"
        }

        async fn generate(&self, prompt: &str, _max_new_tokens: u32) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            match self.reply {
                Reply::Text(t) => Ok(t.to_string()),
                Reply::Fail => Err(GeneratorDiagnosticsError {
                    provider: Provider::TextGeneration,
                    stage: "http",
                    detail: "status=500".to_string(),
                    raw_output: Some("upstream exploded".to_string()),
                }
                .into()),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }
    }

    fn price() -> PriceSnapshot {
        PriceSnapshot {
            company_code: "005930".to_string(),
            current_price: Some(71_000),
            change_value: Some("500".to_string()),
            change_rate: Some("+0.71%".to_string()),
            volume: None,
            market_cap: None,
            status: PriceStatus::Rising,
        }
    }

    fn counts(positive: u32, negative: u32, neutral: u32) -> SentimentCounts {
        SentimentCounts {
            positive,
            negative,
            neutral,
        }
    }

    async fn run(gen: &InsightGenerator, c: &SentimentCounts) -> Recommendation {
        let p = price();
        let headlines = vec!["삼성전자, 신규 반도체 수주".to_string()];
        gen.generate(InsightRequest {
            company_code: "005930",
            company_name: "삼성전자",
            counts: c,
            price: &p,
            headlines: &headlines,
            chart_trend: Some(ChartTrend::Up),
        })
        .await
    }

    #[tokio::test]
    async fn empty_news_never_calls_generator() {
        let mock = MockGenerator::new(Reply::Text("투자추천: 매수"));
        let gen = InsightGenerator::new(Some(mock.clone()));
        let rec = run(&gen, &counts(0, 0, 0)).await;

        assert_eq!(mock.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rec.action, Action::Hold);
        assert!(!rec.ai_generated);
        assert_eq!(rec.pipeline_stage, PipelineStage::InsufficientData);
    }

    #[tokio::test]
    async fn decodes_generator_reply() {
        let mock = MockGenerator::new(Reply::Text(
            "투자추천: 매수, 확신도: 8\n분석근거: 긍정 뉴스가 75%로 우세하고 차트도 상승 중입니다.",
        ));
        let gen = InsightGenerator::new(Some(mock.clone()));
        let rec = run(&gen, &counts(6, 2, 2)).await;

        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence, 0.8);
        assert!(rec.ai_generated);
        assert_eq!(rec.pipeline_stage, PipelineStage::Completed);
        assert_eq!(rec.model_used, "mock-generator");
        assert!(rec.raw_model_response.unwrap().contains("투자추천: 매수"));

        let prompt = mock.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("긍정 뉴스: 6개 (75.0%)"));
        assert!(prompt.contains("차트 트렌드: 상승"));
    }

    #[tokio::test]
    async fn call_failure_routes_to_rule_based() {
        let mock = MockGenerator::new(Reply::Fail);
        let gen = InsightGenerator::new(Some(mock.clone()));
        let rec = run(&gen, &counts(6, 2, 2)).await;

        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence, 0.8);
        assert!(!rec.ai_generated);
        assert_eq!(rec.pipeline_stage, PipelineStage::SentimentOnly);
        assert_eq!(rec.raw_model_response.as_deref(), Some("upstream exploded"));

        // A failed call does not disable the generator for later calls.
        assert!(gen.is_available());
        run(&gen, &counts(1, 1, 0)).await;
        assert_eq!(mock.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_routes_to_rule_based() {
        let mock = MockGenerator::new(Reply::Hang);
        let gen = InsightGenerator::new(Some(mock.clone()))
            .with_limits(150, Duration::from_secs(5));
        let rec = run(&gen, &counts(1, 5, 0)).await;

        assert_eq!(rec.action, Action::Sell);
        assert_eq!(rec.pipeline_stage, PipelineStage::SentimentOnly);
    }

    #[tokio::test]
    async fn unavailable_generator_uses_rule_based() {
        let gen = InsightGenerator::new(None);
        let rec = run(&gen, &counts(6, 2, 2)).await;
        assert_eq!((rec.action, rec.confidence), (Action::Buy, 0.8));
        assert_eq!(rec.pipeline_stage, PipelineStage::SentimentOnly);
    }

    #[tokio::test]
    async fn blank_reply_is_a_failed_call() {
        let mock = MockGenerator::new(Reply::Text("  \n "));
        let gen = InsightGenerator::new(Some(mock.clone()));
        let rec = run(&gen, &counts(1, 5, 0)).await;

        assert_eq!(mock.calls.load(Ordering::SeqCst), 1);
        assert_eq!((rec.action, rec.confidence), (Action::Sell, 0.8));
        assert!(!rec.ai_generated);
        assert_eq!(rec.pipeline_stage, PipelineStage::SentimentOnly);
        assert_eq!(rec.raw_model_response, None);
    }

    #[tokio::test]
    async fn unreadable_reply_is_parse_error() {
        let mock = MockGenerator::new(Reply::Text("잘 모르겠습니다."));
        let gen = InsightGenerator::new(Some(mock));
        let rec = run(&gen, &counts(6, 2, 2)).await;

        assert_eq!(rec.action, Action::Hold);
        assert_eq!(rec.confidence, 0.5);
        assert!(!rec.ai_generated);
        assert_eq!(rec.pipeline_stage, PipelineStage::ParseError);
        assert_eq!(rec.raw_model_response.as_deref(), Some("잘 모르겠습니다."));
        assert!(rec.rationale.contains("긍정 6개"));
    }
}
