use crate::aggregate;
use crate::domain::sentiment::DailySentimentSummary;
use crate::storage::{lock, news};
use anyhow::Context;
use chrono::NaiveDate;

type SummaryRow = (
    String,
    String,
    NaiveDate,
    i32,
    i32,
    i32,
    i32,
    f64,
    f64,
    f64,
    f64,
    Option<f64>,
    Option<f64>,
    String,
);

fn count(v: i32) -> anyhow::Result<u32> {
    u32::try_from(v).with_context(|| format!("negative count in daily_sentiment_summary: {v}"))
}

fn to_db_count(v: u32) -> anyhow::Result<i32> {
    i32::try_from(v).with_context(|| format!("count does not fit INTEGER: {v}"))
}

pub async fn find_summary<'e, E>(
    exec: E,
    company_code: &str,
    analysis_date: NaiveDate,
) -> anyhow::Result<Option<DailySentimentSummary>>
where
    E: sqlx::PgExecutor<'e>,
{
    let row: Option<SummaryRow> = sqlx::query_as(
        "SELECT company_code, company_name, analysis_date, total_news, positive_count, \
                negative_count, neutral_count, positive_ratio, negative_ratio, neutral_ratio, \
                sentiment_score, prev_day_sentiment_score, sentiment_change, sentiment_trend \
         FROM daily_sentiment_summary \
         WHERE company_code = $1 AND analysis_date = $2",
    )
    .persistent(false)
    .bind(company_code)
    .bind(analysis_date)
    .fetch_optional(exec)
    .await
    .context("select daily_sentiment_summary failed")?;

    let Some((
        company_code,
        company_name,
        analysis_date,
        total_news,
        positive_count,
        negative_count,
        neutral_count,
        positive_ratio,
        negative_ratio,
        neutral_ratio,
        sentiment_score,
        prev_day_sentiment_score,
        sentiment_change,
        sentiment_trend,
    )) = row
    else {
        return Ok(None);
    };

    Ok(Some(DailySentimentSummary {
        company_code,
        company_name,
        analysis_date,
        total_news: count(total_news)?,
        positive_count: count(positive_count)?,
        negative_count: count(negative_count)?,
        neutral_count: count(neutral_count)?,
        positive_ratio,
        negative_ratio,
        neutral_ratio,
        sentiment_score,
        prev_day_sentiment_score,
        sentiment_change,
        sentiment_trend: sentiment_trend.parse()?,
    }))
}

/// Recomputes the summary for `(company_code, analysis_date)` from stored news and replaces
/// the stored row.
///
/// The counts read, the previous-day lookup and the delete-then-insert all run in one
/// transaction holding the key's advisory lock, so concurrent runs for the same key commit one
/// after another and the last one sees every news row committed before it took the lock.
pub async fn aggregate_day(
    pool: &sqlx::PgPool,
    company_code: &str,
    company_name: &str,
    analysis_date: NaiveDate,
) -> anyhow::Result<Option<DailySentimentSummary>> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    lock::lock_summary_key(&mut tx, company_code, analysis_date).await?;

    let counts = news::sentiment_counts(&mut *tx, company_code, analysis_date).await?;
    let prev_score = match aggregate::previous_day(analysis_date) {
        Some(prev_date) => find_summary(&mut *tx, company_code, prev_date)
            .await?
            .map(|s| s.sentiment_score),
        None => None,
    };

    let Some(summary) =
        aggregate::compute_summary(company_code, company_name, analysis_date, counts, prev_score)
    else {
        tx.commit().await.context("commit transaction failed")?;
        return Ok(None);
    };

    write_summary(&mut tx, &summary).await?;
    tx.commit().await.context("commit transaction failed")?;
    Ok(Some(summary))
}

async fn write_summary(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    summary: &DailySentimentSummary,
) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM daily_sentiment_summary WHERE company_code = $1 AND analysis_date = $2")
        .persistent(false)
        .bind(&summary.company_code)
        .bind(summary.analysis_date)
        .execute(&mut **tx)
        .await
        .context("delete daily_sentiment_summary failed")?;

    sqlx::query(
        "INSERT INTO daily_sentiment_summary (company_code, company_name, analysis_date, total_news, \
         positive_count, negative_count, neutral_count, positive_ratio, negative_ratio, neutral_ratio, \
         sentiment_score, prev_day_sentiment_score, sentiment_change, sentiment_trend) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .persistent(false)
    .bind(&summary.company_code)
    .bind(&summary.company_name)
    .bind(summary.analysis_date)
    .bind(to_db_count(summary.total_news)?)
    .bind(to_db_count(summary.positive_count)?)
    .bind(to_db_count(summary.negative_count)?)
    .bind(to_db_count(summary.neutral_count)?)
    .bind(summary.positive_ratio)
    .bind(summary.negative_ratio)
    .bind(summary.neutral_ratio)
    .bind(summary.sentiment_score)
    .bind(summary.prev_day_sentiment_score)
    .bind(summary.sentiment_change)
    .bind(summary.sentiment_trend.as_str())
    .execute(&mut **tx)
    .await
    .context("insert daily_sentiment_summary failed")?;
    Ok(())
}
