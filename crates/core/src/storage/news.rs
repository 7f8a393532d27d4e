use crate::domain::sentiment::{NewsItem, Sentiment, SentimentCounts};
use anyhow::Context;
use chrono::NaiveDate;

/// Inserts classified headlines, skipping rows whose `(company_code, title, crawled_date)`
/// already exists. Returns the number of rows actually inserted.
pub async fn insert_news_items(pool: &sqlx::PgPool, items: &[NewsItem]) -> anyhow::Result<u64> {
    if items.is_empty() {
        return Ok(0);
    }

    let chunk_size: usize = std::env::var("NEWS_UPSERT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(200);
    anyhow::ensure!(chunk_size >= 1, "NEWS_UPSERT_BATCH must be >= 1");

    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let mut inserted: u64 = 0;

    for (batch_idx, chunk) in items.chunks(chunk_size).enumerate() {
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO news_data (company_code, company_name, title, url, source, published_date, \
             crawled_date, sentiment, sentiment_prob, model_used, analysis_reason, investment_impact) ",
        );
        qb.push_values(chunk, |mut b, item| {
            b.push_bind(item.company_code.as_str())
                .push_bind(item.company_name.as_str())
                .push_bind(item.title.as_str())
                .push_bind(item.url.as_str())
                .push_bind(item.source.as_str())
                .push_bind(item.published_date)
                .push_bind(item.crawled_date)
                .push_bind(item.sentiment.as_str())
                .push_bind(item.sentiment_probability as f32)
                .push_bind(item.model_used.as_str())
                .push_bind(item.analysis_reason.as_str())
                .push_bind(item.investment_impact.as_str());
        });
        qb.push(" ON CONFLICT (company_code, title, crawled_date) DO NOTHING");

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch insert news_data failed")?;
        inserted += res.rows_affected();

        tracing::debug!(
            batch_idx,
            batch_size = chunk.len(),
            inserted = res.rows_affected(),
            elapsed_ms = t0.elapsed().as_millis(),
            "news_data batch insert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(inserted)
}

pub async fn sentiment_counts<'e, E>(
    exec: E,
    company_code: &str,
    crawled_date: NaiveDate,
) -> anyhow::Result<SentimentCounts>
where
    E: sqlx::PgExecutor<'e>,
{
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT sentiment, COUNT(*) FROM news_data \
         WHERE company_code = $1 AND crawled_date = $2 \
         GROUP BY sentiment",
    )
    .persistent(false)
    .bind(company_code)
    .bind(crawled_date)
    .fetch_all(exec)
    .await
    .context("count news_data by sentiment failed")?;

    let mut counts = SentimentCounts::default();
    for (label, n) in rows {
        let sentiment: Sentiment = label.parse()?;
        let n = u32::try_from(n).with_context(|| format!("sentiment count out of range: {n}"))?;
        counts.add(sentiment, n);
    }
    Ok(counts)
}

/// Titles for the day ordered by classifier probability, newest first on ties.
pub async fn top_headlines(
    pool: &sqlx::PgPool,
    company_code: &str,
    crawled_date: NaiveDate,
    limit: usize,
) -> anyhow::Result<Vec<String>> {
    let limit = i64::try_from(limit).context("headline limit out of range")?;
    let titles: Vec<String> = sqlx::query_scalar(
        "SELECT title FROM news_data \
         WHERE company_code = $1 AND crawled_date = $2 \
         ORDER BY sentiment_prob DESC, created_at DESC, id DESC \
         LIMIT $3",
    )
    .persistent(false)
    .bind(company_code)
    .bind(crawled_date)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("select top news_data titles failed")?;
    Ok(titles)
}

type NewsRow = (
    String,
    String,
    String,
    String,
    String,
    NaiveDate,
    NaiveDate,
    String,
    f32,
    String,
    String,
    String,
);

pub async fn news_for_day(
    pool: &sqlx::PgPool,
    company_code: &str,
    crawled_date: NaiveDate,
) -> anyhow::Result<Vec<NewsItem>> {
    let rows: Vec<NewsRow> = sqlx::query_as(
        "SELECT company_code, company_name, title, url, source, published_date, crawled_date, \
                sentiment, sentiment_prob, model_used, analysis_reason, investment_impact \
         FROM news_data \
         WHERE company_code = $1 AND crawled_date = $2 \
         ORDER BY id",
    )
    .persistent(false)
    .bind(company_code)
    .bind(crawled_date)
    .fetch_all(pool)
    .await
    .context("select news_data failed")?;

    rows.into_iter()
        .map(
            |(
                company_code,
                company_name,
                title,
                url,
                source,
                published_date,
                crawled_date,
                sentiment,
                prob,
                model_used,
                analysis_reason,
                investment_impact,
            )| {
                Ok(NewsItem {
                    company_code,
                    company_name,
                    title,
                    url,
                    source,
                    published_date,
                    crawled_date,
                    sentiment: sentiment.parse()?,
                    sentiment_probability: prob as f64,
                    model_used,
                    analysis_reason,
                    investment_impact,
                })
            },
        )
        .collect()
}
