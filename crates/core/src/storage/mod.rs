pub mod lock;
pub mod memory;
pub mod news;
pub mod recommendations;
pub mod summaries;

use crate::domain::recommendation::Recommendation;
use crate::domain::sentiment::{DailySentimentSummary, NewsItem, SentimentCounts};
use anyhow::Context;
use chrono::NaiveDate;
use uuid::Uuid;

pub use memory::MemoryStore;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Drops every pipeline table (and the migration ledger) and recreates the schema.
pub async fn reset_schema(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::query(
        "DROP TABLE IF EXISTS trading_recommendations, daily_sentiment_summary, news_data, _sqlx_migrations",
    )
    .persistent(false)
    .execute(pool)
    .await
    .context("drop pipeline tables failed")?;
    tracing::warn!("pipeline schema dropped");
    migrate(pool).await
}

/// Persistence seam for the pipeline.
///
/// `news_data` rows are keyed by `(company_code, title, crawled_date)` and never duplicated;
/// `daily_sentiment_summary` holds at most one row per `(company_code, analysis_date)`.
#[async_trait::async_trait]
pub trait SentimentStore: Send + Sync {
    /// Returns how many items were new.
    async fn insert_news_items(&self, items: &[NewsItem]) -> anyhow::Result<u64>;

    async fn sentiment_counts(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
    ) -> anyhow::Result<SentimentCounts>;

    async fn top_headlines(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
        limit: usize,
    ) -> anyhow::Result<Vec<String>>;

    async fn news_for_day(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
    ) -> anyhow::Result<Vec<NewsItem>>;

    async fn find_summary(
        &self,
        company_code: &str,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<Option<DailySentimentSummary>>;

    /// Recomputes the day's summary from stored news and atomically replaces the stored row.
    ///
    /// Reading counts, reading the previous calendar day's score and writing the row form one
    /// unit serialized per `(company_code, analysis_date)`. `None` (and nothing written) when
    /// the day has no news.
    async fn aggregate_day(
        &self,
        company_code: &str,
        company_name: &str,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<Option<DailySentimentSummary>>;

    async fn record_recommendation(
        &self,
        rec: &Recommendation,
        counts: &SentimentCounts,
    ) -> anyhow::Result<Uuid>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: sqlx::PgPool,
}

impl PgStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SentimentStore for PgStore {
    async fn insert_news_items(&self, items: &[NewsItem]) -> anyhow::Result<u64> {
        news::insert_news_items(&self.pool, items).await
    }

    async fn sentiment_counts(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
    ) -> anyhow::Result<SentimentCounts> {
        news::sentiment_counts(&self.pool, company_code, crawled_date).await
    }

    async fn top_headlines(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
        limit: usize,
    ) -> anyhow::Result<Vec<String>> {
        news::top_headlines(&self.pool, company_code, crawled_date, limit).await
    }

    async fn news_for_day(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
    ) -> anyhow::Result<Vec<NewsItem>> {
        news::news_for_day(&self.pool, company_code, crawled_date).await
    }

    async fn find_summary(
        &self,
        company_code: &str,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<Option<DailySentimentSummary>> {
        summaries::find_summary(&self.pool, company_code, analysis_date).await
    }

    async fn aggregate_day(
        &self,
        company_code: &str,
        company_name: &str,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<Option<DailySentimentSummary>> {
        summaries::aggregate_day(&self.pool, company_code, company_name, analysis_date).await
    }

    async fn record_recommendation(
        &self,
        rec: &Recommendation,
        counts: &SentimentCounts,
    ) -> anyhow::Result<Uuid> {
        recommendations::persist_recommendation(&self.pool, rec, counts).await
    }
}
