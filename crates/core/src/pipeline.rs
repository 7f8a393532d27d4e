use crate::aggregate;
use crate::classifier::ClassifierAdapter;
use crate::domain::market::{ChartTrend, PriceSnapshot};
use crate::domain::recommendation::Recommendation;
use crate::domain::sentiment::{DailySentimentSummary, NewsItem, SentimentCounts};
use crate::ingest::naver::DEFAULT_PERIOD;
use crate::ingest::provider::MarketDataClient;
use crate::ingest::types::Headline;
use crate::insight::{fallback, InsightGenerator, InsightRequest};
use crate::storage::SentimentStore;
use crate::time::kst;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Headlines read back from storage for an insight; the prompt uses the first few.
pub const INSIGHT_HEADLINE_LIMIT: usize = 10;

const PENDING_IMPACT: &str = "종합 인사이트 대기";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    NoNews,
    SentimentAnalyzed,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsAnalysis {
    pub company_code: String,
    pub company_name: String,
    pub analysis_date: NaiveDate,
    pub stage: AnalysisStage,
    pub items: Vec<NewsItem>,
    /// Rows that were new; re-fetching the same day's headlines inserts nothing.
    pub inserted: u64,
    pub counts: SentimentCounts,
    pub summary: Option<DailySentimentSummary>,
    pub classifier_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveInsight {
    pub company_code: String,
    pub company_name: String,
    pub analysis_date: NaiveDate,
    pub counts: SentimentCounts,
    pub headlines: Vec<String>,
    pub price: PriceSnapshot,
    pub chart_trend: Option<ChartTrend>,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentComparison {
    pub company_code: String,
    pub analysis_date: NaiveDate,
    pub today: Option<DailySentimentSummary>,
    pub yesterday: Option<DailySentimentSummary>,
    pub score_change: Option<f64>,
    /// Rule-based signal from today's summary alone.
    pub signal: Option<Recommendation>,
}

/// Classify → store → aggregate → generate, one company and day at a time.
pub struct Pipeline {
    store: Arc<dyn SentimentStore>,
    market: Arc<dyn MarketDataClient>,
    classifier: ClassifierAdapter,
    insight: InsightGenerator,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn SentimentStore>,
        market: Arc<dyn MarketDataClient>,
        classifier: ClassifierAdapter,
        insight: InsightGenerator,
    ) -> Self {
        Self {
            store,
            market,
            classifier,
            insight,
        }
    }

    pub fn market(&self) -> &dyn MarketDataClient {
        self.market.as_ref()
    }

    pub fn classifier_available(&self) -> bool {
        self.classifier.is_available()
    }

    pub fn generator_model(&self) -> Option<&str> {
        self.insight.model_id()
    }

    /// Fetch errors are logged and treated as an empty day; storage errors propagate.
    pub async fn analyze_news(
        &self,
        company_code: &str,
        company_name: &str,
        analysis_date: NaiveDate,
        limit: usize,
    ) -> anyhow::Result<NewsAnalysis> {
        let (company_code, company_name) = (company_code.trim(), company_name.trim());
        let headlines: Vec<Headline> = match self.market.fetch_headlines(company_code, limit).await {
            Ok(h) => h
                .into_iter()
                .filter_map(|mut h| {
                    // Titles are part of the dedup key; stored and queried trimmed.
                    h.title = h.title.trim().to_string();
                    (!h.title.is_empty()).then_some(h)
                })
                .collect(),
            Err(err) => {
                tracing::warn!(company_code, error = %err, "headline fetch failed; treating as no news");
                Vec::new()
            }
        };

        if headlines.is_empty() {
            return Ok(NewsAnalysis {
                company_code: company_code.to_string(),
                company_name: company_name.to_string(),
                analysis_date,
                stage: AnalysisStage::NoNews,
                items: Vec::new(),
                inserted: 0,
                counts: SentimentCounts::default(),
                summary: None,
                classifier_available: self.classifier.is_available(),
            });
        }

        let titles: Vec<String> = headlines.iter().map(|h| h.title.clone()).collect();
        let classes = self.classifier.classify(&titles).await;

        let items: Vec<NewsItem> = headlines
            .into_iter()
            .zip(classes)
            .map(|(h, c)| {
                let analysis_reason = if c.is_fallback() {
                    "감성 분류기 미사용: 중립 기본값".to_string()
                } else {
                    format!("{} 금융 뉴스 감성 분류 (확률 {:.2})", c.model_id, c.probability)
                };
                NewsItem {
                    company_code: company_code.to_string(),
                    company_name: company_name.to_string(),
                    published_date: kst::parse_news_date(&h.date_string, analysis_date),
                    crawled_date: analysis_date,
                    title: h.title,
                    url: h.url,
                    source: h.source,
                    sentiment: c.sentiment,
                    sentiment_probability: c.probability,
                    model_used: c.model_id,
                    analysis_reason,
                    investment_impact: PENDING_IMPACT.to_string(),
                }
            })
            .collect();

        let counts = SentimentCounts::from_sentiments(items.iter().map(|i| i.sentiment));
        let inserted = self.store.insert_news_items(&items).await?;
        let summary = aggregate::aggregate_and_store(
            self.store.as_ref(),
            company_code,
            company_name,
            analysis_date,
        )
        .await?;

        tracing::info!(
            company_code,
            %analysis_date,
            fetched = items.len(),
            inserted,
            positive = counts.positive,
            negative = counts.negative,
            neutral = counts.neutral,
            "news analyzed"
        );

        Ok(NewsAnalysis {
            company_code: company_code.to_string(),
            company_name: company_name.to_string(),
            analysis_date,
            stage: AnalysisStage::SentimentAnalyzed,
            items,
            inserted,
            counts,
            summary,
            classifier_available: self.classifier.is_available(),
        })
    }

    /// Stage 2 over what is already stored for the day.
    pub async fn comprehensive_insight(
        &self,
        company_code: &str,
        company_name: &str,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<ComprehensiveInsight> {
        let (company_code, company_name) = (company_code.trim(), company_name.trim());
        let counts = self.store.sentiment_counts(company_code, analysis_date).await?;
        let headlines = self
            .store
            .top_headlines(company_code, analysis_date, INSIGHT_HEADLINE_LIMIT)
            .await?;

        let price = match self.market.fetch_price(company_code).await {
            Ok(p) => p,
            Err(err) => {
                tracing::warn!(company_code, error = %err, "price fetch failed");
                PriceSnapshot::unavailable(company_code)
            }
        };
        let chart_trend = match self.market.fetch_chart(company_code, DEFAULT_PERIOD).await {
            Ok(series) if !series.points.is_empty() => Some(series.trend),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(company_code, error = %err, "chart fetch failed");
                None
            }
        };

        let recommendation = self
            .insight
            .generate(InsightRequest {
                company_code,
                company_name,
                counts: &counts,
                price: &price,
                headlines: &headlines,
                chart_trend,
            })
            .await;

        tracing::info!(
            company_code,
            %analysis_date,
            action = recommendation.action.as_str(),
            confidence = recommendation.confidence,
            stage = recommendation.pipeline_stage.as_str(),
            ai_generated = recommendation.ai_generated,
            "insight generated"
        );

        Ok(ComprehensiveInsight {
            company_code: company_code.to_string(),
            company_name: company_name.to_string(),
            analysis_date,
            counts,
            headlines,
            price,
            chart_trend,
            recommendation,
        })
    }

    pub async fn sentiment_comparison(
        &self,
        company_code: &str,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<SentimentComparison> {
        let company_code = company_code.trim();
        let today = self.store.find_summary(company_code, analysis_date).await?;
        let yesterday = match aggregate::previous_day(analysis_date) {
            Some(prev) => self.store.find_summary(company_code, prev).await?,
            None => None,
        };
        let score_change = match (&today, &yesterday) {
            (Some(t), Some(y)) => Some(t.sentiment_score - y.sentiment_score),
            _ => None,
        };
        let signal = today.as_ref().map(fallback::recommend_from_summary);

        Ok(SentimentComparison {
            company_code: company_code.to_string(),
            analysis_date,
            today,
            yesterday,
            score_change,
            signal,
        })
    }

    pub async fn record(&self, insight: &ComprehensiveInsight) -> anyhow::Result<Uuid> {
        self.store
            .record_recommendation(&insight.recommendation, &insight.counts)
            .await
    }

    /// Full daily run for one company: analyze, generate and record.
    pub async fn run_daily(
        &self,
        company_code: &str,
        company_name: &str,
        analysis_date: NaiveDate,
        limit: usize,
    ) -> anyhow::Result<(NewsAnalysis, ComprehensiveInsight)> {
        let analysis = self
            .analyze_news(company_code, company_name, analysis_date, limit)
            .await?;
        let insight = self
            .comprehensive_insight(company_code, company_name, analysis_date)
            .await?;
        let id = self.record(&insight).await?;
        tracing::debug!(company_code, %id, "recommendation recorded");
        Ok((analysis, insight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SequenceClassifier;
    use crate::domain::market::{ChartPoint, ChartSeries, PriceStatus};
    use crate::domain::recommendation::{Action, PipelineStage};
    use crate::domain::sentiment::SentimentTrend;
    use crate::insight::tests::{MockGenerator, Reply};
    use crate::storage::MemoryStore;
    use std::sync::atomic::Ordering;

    /// "상승" → positive, "하락" → negative, anything else neutral.
    struct KeywordClassifier;

    #[async_trait::async_trait]
    impl SequenceClassifier for KeywordClassifier {
        fn model_id(&self) -> &str {
            "keyword"
        }

        async fn logits(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("상승") {
                        vec![0.0, 0.0, 3.0]
                    } else if t.contains("하락") {
                        vec![3.0, 0.0, 0.0]
                    } else {
                        vec![0.0, 3.0, 0.0]
                    }
                })
                .collect())
        }
    }

    struct StaticMarket {
        headlines: Option<Vec<Headline>>,
    }

    #[async_trait::async_trait]
    impl MarketDataClient for StaticMarket {
        async fn fetch_headlines(&self, _code: &str, limit: usize) -> anyhow::Result<Vec<Headline>> {
            match &self.headlines {
                Some(h) => Ok(h.iter().take(limit).cloned().collect()),
                None => anyhow::bail!("news api down"),
            }
        }

        async fn fetch_price(&self, code: &str) -> anyhow::Result<PriceSnapshot> {
            Ok(PriceSnapshot {
                company_code: code.to_string(),
                current_price: Some(71_000),
                change_value: Some("500".to_string()),
                change_rate: Some("0.71".to_string()),
                volume: None,
                market_cap: None,
                status: PriceStatus::Rising,
            })
        }

        async fn fetch_chart(&self, code: &str, period: &str) -> anyhow::Result<ChartSeries> {
            let points: Vec<ChartPoint> = [100.0, 101.0]
                .iter()
                .enumerate()
                .map(|(i, &close)| ChartPoint {
                    date: day(1) + chrono::Duration::days(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 0,
                })
                .collect();
            let trend = ChartTrend::from_points(&points);
            Ok(ChartSeries {
                company_code: code.to_string(),
                period: period.to_string(),
                points,
                trend,
            })
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    /// 6 positive, 2 negative, 2 neutral.
    fn headlines() -> Vec<Headline> {
        let mut out = Vec::new();
        for i in 0..6 {
            out.push(headline(&format!("주가 상승 기대 {i}")));
        }
        for i in 0..2 {
            out.push(headline(&format!("실적 하락 우려 {i}")));
        }
        for i in 0..2 {
            out.push(headline(&format!("주주총회 개최 {i}")));
        }
        out
    }

    fn headline(title: &str) -> Headline {
        Headline {
            title: title.to_string(),
            source: "연합뉴스".to_string(),
            date_string: "2025.06.30".to_string(),
            url: String::new(),
        }
    }

    fn pipeline(
        store: Arc<MemoryStore>,
        market_headlines: Option<Vec<Headline>>,
        generator: Option<Arc<MockGenerator>>,
    ) -> Pipeline {
        let classifier = ClassifierAdapter::new(Some(Arc::new(KeywordClassifier)), 4);
        let insight = InsightGenerator::new(generator.map(|g| g as Arc<dyn crate::llm::TextGenerator>));
        Pipeline::new(
            store,
            Arc::new(StaticMarket {
                headlines: market_headlines,
            }),
            classifier,
            insight,
        )
    }

    #[tokio::test]
    async fn fallback_path_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let p = pipeline(store.clone(), Some(headlines()), None);

        let (analysis, insight) = p.run_daily("005930", "삼성전자", day(1), 100).await.unwrap();

        assert_eq!(analysis.stage, AnalysisStage::SentimentAnalyzed);
        assert_eq!(analysis.inserted, 10);
        assert_eq!(analysis.items[0].published_date, day(1) - chrono::Duration::days(1));
        let summary = analysis.summary.unwrap();
        assert_eq!((summary.positive_count, summary.negative_count, summary.neutral_count), (6, 2, 2));
        assert!((summary.sentiment_score - 0.4).abs() < 1e-12);
        assert_eq!(summary.sentiment_trend, SentimentTrend::Stable);

        let rec = &insight.recommendation;
        assert_eq!(rec.action, Action::Buy);
        assert_eq!(rec.confidence, 0.8);
        assert!(!rec.ai_generated);
        assert_eq!(rec.pipeline_stage, PipelineStage::SentimentOnly);
        assert_eq!(insight.chart_trend, Some(ChartTrend::Up));
        assert_eq!(insight.headlines.len(), 10);

        assert_eq!(store.recommendations().await, vec![rec.clone()]);
    }

    #[tokio::test]
    async fn generator_path_end_to_end() {
        let store = Arc::new(MemoryStore::new());
        let gen = MockGenerator::new(Reply::Text(
            "투자추천: 매수, 확신도: 8, 분석근거: 긍정 뉴스가 우세하고 차트도 상승 흐름입니다",
        ));
        let p = pipeline(store.clone(), Some(headlines()), Some(gen.clone()));

        let (_, insight) = p.run_daily("005930", "삼성전자", day(1), 100).await.unwrap();

        let rec = &insight.recommendation;
        assert_eq!(rec.action, Action::Buy);
        assert!((rec.confidence - 0.8).abs() < 1e-9);
        assert!(rec.ai_generated);
        assert_eq!(rec.pipeline_stage, PipelineStage::Completed);
        assert_eq!(gen.calls.load(Ordering::SeqCst), 1);

        let prompt = gen.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("삼성전자"));
        // Only three representative headlines reach the prompt.
        let in_prompt = insight.headlines.iter().filter(|h| prompt.contains(h.as_str())).count();
        assert_eq!(in_prompt, 3);
    }

    #[tokio::test]
    async fn refetch_same_day_is_deduplicated() {
        let store = Arc::new(MemoryStore::new());
        let p = pipeline(store.clone(), Some(headlines()), None);

        p.analyze_news("005930", "삼성전자", day(1), 100).await.unwrap();
        let again = p.analyze_news("005930", "삼성전자", day(1), 100).await.unwrap();

        assert_eq!(again.inserted, 0);
        assert_eq!(store.news_count().await, 10);
        assert_eq!(store.summary_count().await, 1);
        assert_eq!(again.summary.unwrap().total_news, 10);
    }

    #[tokio::test]
    async fn padded_code_and_titles_share_one_key() {
        let store = Arc::new(MemoryStore::new());
        let padded: Vec<Headline> = headlines()
            .into_iter()
            .map(|mut h| {
                h.title = format!("  {}\t", h.title);
                h
            })
            .chain([headline("   ")])
            .collect();

        let first = pipeline(store.clone(), Some(padded), None)
            .analyze_news(" 005930 ", "삼성전자 ", day(1), 100)
            .await
            .unwrap();
        assert_eq!(first.inserted, 10);
        assert_eq!(first.company_code, "005930");
        assert_eq!(first.summary.unwrap().total_news, 10);

        let again = pipeline(store.clone(), Some(headlines()), None)
            .analyze_news("005930", "삼성전자", day(1), 100)
            .await
            .unwrap();
        assert_eq!(again.inserted, 0);

        let stored = store.news_for_day("005930", day(1)).await.unwrap();
        assert_eq!(stored.len(), 10);
        assert!(stored.iter().all(|n| n.title == n.title.trim() && n.company_name == "삼성전자"));
    }

    #[tokio::test]
    async fn fetch_failure_is_no_news_and_generator_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let gen = MockGenerator::new(Reply::Text("투자추천: 매수"));
        let p = pipeline(store.clone(), None, Some(gen.clone()));

        let (analysis, insight) = p.run_daily("005930", "삼성전자", day(1), 100).await.unwrap();

        assert_eq!(analysis.stage, AnalysisStage::NoNews);
        assert!(analysis.summary.is_none());
        assert_eq!(store.summary_count().await, 0);
        assert_eq!(insight.recommendation.pipeline_stage, PipelineStage::InsufficientData);
        assert_eq!(insight.recommendation.action, Action::Hold);
        assert_eq!(gen.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn comparison_reports_day_over_day_change() {
        let store = Arc::new(MemoryStore::new());
        let p = pipeline(store.clone(), Some(headlines()), None);
        let negative_day: Vec<Headline> = (0..4).map(|i| headline(&format!("주가 하락 {i}"))).collect();
        let p_prev = pipeline(store.clone(), Some(negative_day), None);

        p_prev.analyze_news("005930", "삼성전자", day(1), 100).await.unwrap();
        p.analyze_news("005930", "삼성전자", day(2), 100).await.unwrap();

        let cmp = p.sentiment_comparison("005930", day(2)).await.unwrap();
        assert_eq!(cmp.yesterday.as_ref().unwrap().sentiment_score, -1.0);
        assert!((cmp.score_change.unwrap() - 1.4).abs() < 1e-9);
        assert_eq!(cmp.today.unwrap().sentiment_trend, SentimentTrend::Improving);
        assert_eq!(cmp.signal.unwrap().action, Action::Buy);

        let empty = p.sentiment_comparison("000660", day(2)).await.unwrap();
        assert!(empty.today.is_none() && empty.score_change.is_none() && empty.signal.is_none());
    }
}
