use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

const KST_OFFSET_HOURS: i64 = 9;

fn to_kst(utc: DateTime<Utc>) -> NaiveDateTime {
    (utc + Duration::hours(KST_OFFSET_HOURS)).naive_utc()
}

pub fn today_kst(now_utc: DateTime<Utc>) -> NaiveDate {
    to_kst(now_utc).date()
}

/// `--analysis-date` when given (`YYYY-MM-DD`), otherwise today in KST.
pub fn resolve_analysis_date(
    analysis_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    match analysis_date_arg {
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid analysis date (expected YYYY-MM-DD): {s}")),
        None => Ok(today_kst(now_utc)),
    }
}

/// Headline date strings: `YYYY.MM.DD`, or `MM.DD` in the current year. Anything else is today.
pub fn parse_news_date(s: &str, today: NaiveDate) -> NaiveDate {
    let s = s.trim().trim_end_matches('.');
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y.%m.%d") {
        return d;
    }

    let mut parts = s.split('.');
    if let (Some(m), Some(d), None) = (parts.next(), parts.next(), parts.next()) {
        if let (Ok(m), Ok(d)) = (m.trim().parse::<u32>(), d.trim().parse::<u32>()) {
            if let Some(date) = NaiveDate::from_ymd_opt(today.year(), m, d) {
                return date;
            }
        }
    }

    today
}

/// RFC 3339 timestamp to its KST calendar day as `YYYY.MM.DD`. A timestamp without an
/// offset is taken as already local.
pub fn kst_date_string(timestamp: &str) -> Option<String> {
    let ts = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(to_kst(dt.with_timezone(&Utc)).format("%Y.%m.%d").to_string());
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.format("%Y.%m.%d").to_string())
}
