use crate::domain::market::{ChartSeries, PriceSnapshot};
use crate::ingest::types::Headline;
use crate::ingest::{naver, toss};
use crate::time::kst;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const DEFAULT_RETRIES: u32 = 2;
const MAX_RETRIES: u32 = 8;
const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;
const DEFAULT_NEWS_API_BASE_URL: &str = "https://wts-info-api.tossinvest.com";
const DEFAULT_PRICE_PAGE_BASE_URL: &str = "https://finance.naver.com";
const DEFAULT_CHART_BASE_URL: &str = "https://fchart.stock.naver.com";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Upstream news, quote and chart sources.
#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn fetch_headlines(&self, company_code: &str, limit: usize) -> Result<Vec<Headline>>;

    async fn fetch_price(&self, company_code: &str) -> Result<PriceSnapshot>;

    async fn fetch_chart(&self, company_code: &str, period: &str) -> Result<ChartSeries>;
}

#[derive(Debug, Clone)]
pub struct HttpMarketData {
    http: reqwest::Client,
    news_base_url: String,
    price_base_url: String,
    chart_base_url: String,
    retries: u32,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Exponential backoff after the `attempt`-th failure (1-based), capped.
fn backoff_ms(attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(16);
    (BASE_BACKOFF_MS << exp).min(MAX_BACKOFF_MS)
}

impl HttpMarketData {
    pub fn from_env() -> Result<Self> {
        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .clamp(1, MAX_RETRIES);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ko-KR,ko;q=0.9,en;q=0.8"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            news_base_url: env_or("NEWS_API_BASE_URL", DEFAULT_NEWS_API_BASE_URL),
            price_base_url: env_or("PRICE_PAGE_BASE_URL", DEFAULT_PRICE_PAGE_BASE_URL),
            chart_base_url: env_or("CHART_BASE_URL", DEFAULT_CHART_BASE_URL),
            retries,
        })
    }

    fn quote_page_url(&self, company_code: &str) -> String {
        format!(
            "{}/item/main.naver?code={company_code}",
            self.price_base_url.trim_end_matches('/')
        )
    }

    async fn get_text_once(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let res = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .with_context(|| format!("market data request failed: {url}"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;
        if !status.is_success() {
            anyhow::bail!("market data HTTP {status} from {url}");
        }
        Ok(text)
    }

    async fn get_text(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.get_text_once(url, headers.clone()).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_millis(backoff_ms(attempt));
                    tracing::warn!(attempt, ?backoff, error = %err, "market data fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl MarketDataClient for HttpMarketData {
    async fn fetch_headlines(&self, company_code: &str, limit: usize) -> Result<Vec<Headline>> {
        let url = format!(
            "{}/api/v2/news/companies/{company_code}?size={limit}&orderBy=relevant",
            self.news_base_url.trim_end_matches('/')
        );
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
        headers.insert(REFERER, HeaderValue::from_static("https://tossinvest.com/"));

        let t0 = std::time::Instant::now();
        let body = self.get_text(&url, headers).await?;
        let today = kst::today_kst(chrono::Utc::now()).format("%Y.%m.%d").to_string();
        let mut items = toss::parse_news_response(&body, &today)?;
        items.truncate(limit);

        tracing::info!(
            company_code,
            count = items.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "fetched headlines"
        );
        Ok(items)
    }

    async fn fetch_price(&self, company_code: &str) -> Result<PriceSnapshot> {
        let html = self
            .get_text(&self.quote_page_url(company_code), HeaderMap::new())
            .await?;
        naver::parse_quote_page(company_code, &html)
    }

    async fn fetch_chart(&self, company_code: &str, period: &str) -> Result<ChartSeries> {
        let url = format!(
            "{}/sise.nhn?symbol={company_code}&timeframe=day&count={}&requestType=0",
            self.chart_base_url.trim_end_matches('/'),
            naver::chart_count(period)
        );
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/xml, application/xml, text/html;q=0.9, */*;q=0.5"),
        );
        headers.insert(
            REFERER,
            HeaderValue::from_str(&self.quote_page_url(company_code))
                .context("invalid referer header")?,
        );

        let xml = self.get_text(&url, headers).await?;
        naver::parse_chart_xml(company_code, period, &xml)
    }
}
