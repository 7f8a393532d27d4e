use crate::domain::sentiment::{DailySentimentSummary, SentimentCounts, SentimentTrend};
use crate::storage::SentimentStore;
use chrono::{Days, NaiveDate};

/// Pure part of the daily aggregation. `None` when there were no headlines: empty days are
/// not written, so they never enter trend history.
pub fn compute_summary(
    company_code: &str,
    company_name: &str,
    analysis_date: NaiveDate,
    counts: SentimentCounts,
    prev_day_score: Option<f64>,
) -> Option<DailySentimentSummary> {
    let total = counts.total();
    if total == 0 {
        return None;
    }

    let t = total as f64;
    let sentiment_score = (counts.positive as f64 - counts.negative as f64) / t;
    let sentiment_change = prev_day_score.map(|prev| sentiment_score - prev);
    let sentiment_trend = sentiment_change
        .map(SentimentTrend::from_change)
        .unwrap_or(SentimentTrend::Stable);

    Some(DailySentimentSummary {
        company_code: company_code.to_string(),
        company_name: company_name.to_string(),
        analysis_date,
        total_news: total,
        positive_count: counts.positive,
        negative_count: counts.negative,
        neutral_count: counts.neutral,
        positive_ratio: counts.positive as f64 / t,
        negative_ratio: counts.negative as f64 / t,
        neutral_ratio: counts.neutral as f64 / t,
        sentiment_score,
        prev_day_sentiment_score: prev_day_score,
        sentiment_change,
        sentiment_trend,
    })
}

/// The day whose score a summary is compared against: the fixed calendar day before
/// `analysis_date`. A skipped day is not walked past.
pub fn previous_day(analysis_date: NaiveDate) -> Option<NaiveDate> {
    analysis_date.checked_sub_days(Days::new(1))
}

/// Recomputes and replaces the summary for `(company_code, analysis_date)` from stored news.
///
/// The store runs the whole read-compute-replace as one unit per key, so a run that started
/// earlier can never commit counts older than a run that finished before it.
pub async fn aggregate_and_store(
    store: &dyn SentimentStore,
    company_code: &str,
    company_name: &str,
    analysis_date: NaiveDate,
) -> anyhow::Result<Option<DailySentimentSummary>> {
    let Some(summary) = store
        .aggregate_day(company_code, company_name, analysis_date)
        .await?
    else {
        tracing::info!(company_code, %analysis_date, "no news for day; summary not written");
        return Ok(None);
    };

    tracing::info!(
        company_code,
        %analysis_date,
        total = summary.total_news,
        score = summary.sentiment_score,
        trend = summary.sentiment_trend.as_str(),
        "daily sentiment summary stored"
    );
    Ok(Some(summary))
}
