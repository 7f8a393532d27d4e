use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use finsent_core::classifier::ClassifierAdapter;
use finsent_core::domain::company;
use finsent_core::ingest::provider::HttpMarketData;
use finsent_core::insight::InsightGenerator;
use finsent_core::pipeline::Pipeline;
use finsent_core::storage::{MemoryStore, PgStore, SentimentStore};

#[derive(Debug, Parser)]
#[command(name = "finsent_worker")]
struct Args {
    /// Analysis date (YYYY-MM-DD). Defaults to today's KST date.
    #[arg(long)]
    analysis_date: Option<String>,

    /// Company code to process; repeatable. Defaults to the built-in company list.
    #[arg(long = "company")]
    companies: Vec<String>,

    /// Headlines fetched per company.
    #[arg(long, default_value_t = 100)]
    limit: usize,

    /// Run the full pipeline against an in-memory store; nothing is written to the database.
    #[arg(long)]
    dry_run: bool,

    /// Drop and recreate all pipeline tables before running.
    #[arg(long, conflicts_with = "dry_run")]
    reset_schema: bool,
}

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

    let args = Args::parse();

    let analysis_date =
        finsent_core::time::kst::resolve_analysis_date(args.analysis_date.as_deref(), chrono::Utc::now())?;

    let companies: Vec<(String, String)> = if args.companies.is_empty() {
        company::COMPANIES
            .iter()
            .map(|c| (c.code.to_string(), c.name.to_string()))
            .collect()
    } else {
        args.companies
            .iter()
            .map(|code| (code.clone(), company::resolve_name(code, None)))
            .collect()
    };

    let store: Arc<dyn SentimentStore> = if args.dry_run {
        Arc::new(MemoryStore::new())
    } else {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;

        if args.reset_schema {
            finsent_core::storage::reset_schema(&pool).await?;
        } else {
            finsent_core::storage::migrate(&pool).await?;
        }
        Arc::new(PgStore::new(pool))
    };

    let classifier = ClassifierAdapter::connect(&settings).await;
    let generator = finsent_core::llm::connect(&settings).await;
    let pipeline = Pipeline::new(
        store,
        Arc::new(HttpMarketData::from_env()?),
        classifier,
        InsightGenerator::from_env(generator),
    );

    tracing::info!(
        %analysis_date,
        dry_run = args.dry_run,
        companies = companies.len(),
        classifier = pipeline.classifier_available(),
        generator = pipeline.generator_model().unwrap_or("none"),
        "daily sentiment run starting"
    );

    let mut failed = 0usize;
    for (code, name) in &companies {
        match pipeline.run_daily(code, name, analysis_date, args.limit).await {
            Ok((analysis, insight)) => {
                let rec = &insight.recommendation;
                tracing::info!(
                    company_code = %code,
                    fetched = analysis.items.len(),
                    inserted = analysis.inserted,
                    action = rec.action.as_str(),
                    confidence = rec.confidence,
                    stage = rec.pipeline_stage.as_str(),
                    "company done"
                );
            }
            Err(err) => {
                failed += 1;
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(company_code = %code, error = %err, "company run failed");
            }
        }
    }

    tracing::info!(%analysis_date, total = companies.len(), failed, "daily sentiment run finished");
    anyhow::ensure!(
        failed < companies.len() || companies.is_empty(),
        "every company failed for {analysis_date}"
    );
    Ok(())
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
    fn parses_repeated_companies() {
        let args = Args::try_parse_from([
            "finsent_worker",
            "--analysis-date",
            "2025-07-01",
            "--company",
            "005930",
            "--company",
            "000660",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.analysis_date.as_deref(), Some("2025-07-01"));
        assert_eq!(args.companies, vec!["005930", "000660"]);
        assert_eq!(args.limit, 100);
        assert!(args.dry_run);
    }

    #[test]
    fn reset_schema_conflicts_with_dry_run() {
        assert!(Args::try_parse_from(["finsent_worker", "--dry-run", "--reset-schema"]).is_err());
    }
}
