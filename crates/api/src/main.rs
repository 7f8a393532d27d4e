use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finsent_core::classifier::ClassifierAdapter;
use finsent_core::domain::company::{self, Company};
use finsent_core::domain::market::{ChartSeries, PriceSnapshot};
use finsent_core::ingest::naver::DEFAULT_PERIOD;
use finsent_core::ingest::provider::{HttpMarketData, MarketDataClient};
use finsent_core::insight::InsightGenerator;
use finsent_core::pipeline::{ComprehensiveInsight, NewsAnalysis, Pipeline, SentimentComparison};
use finsent_core::storage::PgStore;
use finsent_core::time::kst;

const HEADLINES_PER_PAGE: u32 = 20;
const MAX_HEADLINES: u32 = 100;
const DEFAULT_PAGES: u32 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = finsent_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match finsent_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let market: Arc<dyn MarketDataClient> = Arc::new(HttpMarketData::from_env()?);
    let classifier = ClassifierAdapter::connect(&settings).await;
    let generator = finsent_core::llm::connect(&settings).await;

    let health = HealthInfo {
        database: pool.is_some(),
        classifier: classifier.is_available(),
        generator_model: generator.as_deref().map(|g| g.model_id().to_string()),
    };

    let pipeline = pool.map(|pool| {
        Arc::new(Pipeline::new(
            Arc::new(PgStore::new(pool)),
            market.clone(),
            classifier,
            InsightGenerator::from_env(generator),
        ))
    });

    let state = AppState {
        market,
        pipeline,
        health: Arc::new(health),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health_check))
        .route("/companies", get(get_companies))
        .route("/stock_price/:company_code", get(get_stock_price))
        .route("/stock_chart/:company_code", get(get_stock_chart))
        .route("/crawl_news/:company_code", get(crawl_news))
        .route(
            "/comprehensive_insights/:company_code",
            get(get_comprehensive_insights),
        )
        .route(
            "/sentiment_comparison/:company_code",
            get(get_sentiment_comparison),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    market: Arc<dyn MarketDataClient>,
    /// `None` when the database is unavailable (degraded mode).
    pipeline: Option<Arc<Pipeline>>,
    health: Arc<HealthInfo>,
}

#[derive(Debug)]
struct HealthInfo {
    database: bool,
    classifier: bool,
    generator_model: Option<String>,
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let h = &state.health;
    Json(serde_json::json!({
        "status": if h.database { "healthy" } else { "degraded" },
        "database": h.database,
        "classifier": h.classifier,
        "generator_model": h.generator_model,
    }))
}

async fn get_companies() -> Json<&'static [Company]> {
    Json(company::COMPANIES)
}

fn internal_error(context: &'static str, err: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %err, "{context}");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn require_pipeline(state: &AppState) -> Result<&Pipeline, StatusCode> {
    state
        .pipeline
        .as_deref()
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

async fn get_stock_price(
    State(state): State<AppState>,
    Path(company_code): Path<String>,
) -> Result<Json<PriceSnapshot>, StatusCode> {
    let snapshot = state
        .market
        .fetch_price(&company_code)
        .await
        .map_err(|e| internal_error("price fetch failed", e))?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
struct ChartQuery {
    period: Option<String>,
}

async fn get_stock_chart(
    State(state): State<AppState>,
    Path(company_code): Path<String>,
    Query(q): Query<ChartQuery>,
) -> Result<Json<ChartSeries>, StatusCode> {
    let period = q.period.as_deref().unwrap_or(DEFAULT_PERIOD);
    let series = state
        .market
        .fetch_chart(&company_code, period)
        .await
        .map_err(|e| internal_error("chart fetch failed", e))?;
    if series.points.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(series))
}

#[derive(Debug, Deserialize)]
struct CrawlQuery {
    company_name: Option<String>,
    pages: Option<u32>,
}

fn headline_limit(pages: Option<u32>) -> usize {
    let pages = pages.unwrap_or(DEFAULT_PAGES);
    pages.saturating_mul(HEADLINES_PER_PAGE).min(MAX_HEADLINES) as usize
}

async fn crawl_news(
    State(state): State<AppState>,
    Path(company_code): Path<String>,
    Query(q): Query<CrawlQuery>,
) -> Result<Json<NewsAnalysis>, StatusCode> {
    let pipeline = require_pipeline(&state)?;
    let company_name = company::resolve_name(&company_code, q.company_name.as_deref());
    let today = kst::today_kst(chrono::Utc::now());

    let analysis = pipeline
        .analyze_news(&company_code, &company_name, today, headline_limit(q.pages))
        .await
        .map_err(|e| internal_error("news analysis failed", e))?;
    Ok(Json(analysis))
}

#[derive(Debug, Deserialize)]
struct InsightQuery {
    company_name: Option<String>,
}

async fn get_comprehensive_insights(
    State(state): State<AppState>,
    Path(company_code): Path<String>,
    Query(q): Query<InsightQuery>,
) -> Result<Json<ComprehensiveInsight>, StatusCode> {
    let pipeline = require_pipeline(&state)?;
    let company_name = company::resolve_name(&company_code, q.company_name.as_deref());
    let today = kst::today_kst(chrono::Utc::now());

    let insight = pipeline
        .comprehensive_insight(&company_code, &company_name, today)
        .await
        .map_err(|e| internal_error("insight generation failed", e))?;

    if let Err(e) = pipeline.record(&insight).await {
        sentry_anyhow::capture_anyhow(&e);
        tracing::warn!(error = %e, company_code, "failed to record recommendation");
    }
    Ok(Json(insight))
}

async fn get_sentiment_comparison(
    State(state): State<AppState>,
    Path(company_code): Path<String>,
) -> Result<Json<SentimentComparison>, StatusCode> {
    let pipeline = require_pipeline(&state)?;
    let today = kst::today_kst(chrono::Utc::now());

    let cmp = pipeline
        .sentiment_comparison(&company_code, today)
        .await
        .map_err(|e| internal_error("sentiment comparison failed", e))?;
    Ok(Json(cmp))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &finsent_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_limit_is_twenty_per_page_capped_at_hundred() {
        assert_eq!(headline_limit(Some(1)), 20);
        assert_eq!(headline_limit(Some(3)), 60);
        assert_eq!(headline_limit(Some(5)), 100);
        assert_eq!(headline_limit(Some(50)), 100);
        assert_eq!(headline_limit(None), 100);
        assert_eq!(headline_limit(Some(0)), 0);
    }
}
