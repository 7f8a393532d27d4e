use crate::domain::recommendation::Recommendation;
use crate::domain::sentiment::SentimentCounts;
use anyhow::Context;
use uuid::Uuid;

pub async fn persist_recommendation(
    pool: &sqlx::PgPool,
    rec: &Recommendation,
    counts: &SentimentCounts,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    let sentiment_summary =
        serde_json::to_value(counts).context("serialize sentiment counts failed")?;

    sqlx::query(
        "INSERT INTO trading_recommendations (id, company_code, company_name, action, confidence, \
         rationale, ai_generated, model_used, raw_model_response, pipeline_stage, sentiment_summary) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .persistent(false)
    .bind(id)
    .bind(&rec.company_code)
    .bind(&rec.company_name)
    .bind(rec.action.as_str())
    .bind(rec.confidence)
    .bind(&rec.rationale)
    .bind(rec.ai_generated)
    .bind(&rec.model_used)
    .bind(rec.raw_model_response.as_deref())
    .bind(rec.pipeline_stage.as_str())
    .bind(sentiment_summary)
    .execute(pool)
    .await
    .context("insert trading_recommendations failed")?;

    Ok(id)
}
