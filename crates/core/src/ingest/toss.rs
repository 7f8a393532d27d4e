use crate::ingest::types::Headline;
use crate::time::kst;
use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

const ARTICLE_BASE_URL: &str = "https://tossinvest.com/news";

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    result: Option<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    #[serde(default)]
    body: Vec<NewsEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewsEntry {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    source: Option<NewsSource>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsSource {
    #[serde(default)]
    name: Option<String>,
}

fn entry_id(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decodes the securities news API body. Entries without a title or a source name are dropped;
/// a missing or unreadable `createdAt` falls back to `today` (`YYYY.MM.DD`).
pub fn parse_news_response(body: &str, today: &str) -> anyhow::Result<Vec<Headline>> {
    let parsed: NewsResponse =
        serde_json::from_str(body).context("news response is not valid JSON")?;
    let entries = parsed.result.map(|r| r.body).unwrap_or_default();

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let title = entry.title.as_deref().map(str::trim).unwrap_or_default();
        let source = entry
            .source
            .as_ref()
            .and_then(|s| s.name.as_deref())
            .map(str::trim)
            .unwrap_or_default();
        if title.is_empty() || source.is_empty() {
            continue;
        }

        let date_string = entry
            .created_at
            .as_deref()
            .and_then(kst::kst_date_string)
            .unwrap_or_else(|| today.to_string());
        let url = entry_id(&entry.id)
            .map(|id| format!("{ARTICLE_BASE_URL}/{id}"))
            .unwrap_or_default();

        out.push(Headline {
            title: title.to_string(),
            source: source.to_string(),
            date_string,
            url,
        });
    }
    Ok(out)
}
