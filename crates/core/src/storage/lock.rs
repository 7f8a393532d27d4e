use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Transaction-scoped advisory lock; released automatically on commit or rollback.
// Serializes daily aggregation for one (company, analysis_date) key.
const LOCK_NAMESPACE: i64 = 0x4649_4E53_454E_54; // "FINSENT"

fn lock_seed(analysis_date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (analysis_date.num_days_from_ce() as i64)
}

/// Postgres hashes the company code with a per-date seed, so the key is stable across processes.
pub async fn lock_summary_key(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    company_code: &str,
    analysis_date: NaiveDate,
) -> anyhow::Result<()> {
    let seed = lock_seed(analysis_date);
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, $2))")
        .persistent(false)
        .bind(company_code)
        .bind(seed)
        .execute(&mut **tx)
        .await
        .with_context(|| {
            format!("failed to acquire advisory lock (company_code={company_code}, seed={seed})")
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_differ_per_day_and_stay_in_namespace() {
        let d = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let next = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        assert_eq!(lock_seed(d), lock_seed(d));
        assert_ne!(lock_seed(d), lock_seed(next));
        assert_eq!(lock_seed(d) ^ LOCK_NAMESPACE, d.num_days_from_ce() as i64);
    }
}
