use crate::aggregate;
use crate::domain::recommendation::Recommendation;
use crate::domain::sentiment::{DailySentimentSummary, NewsItem, SentimentCounts};
use crate::storage::SentimentStore;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-process store with the same keying rules as Postgres. Used for `--dry-run` and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    news: Vec<NewsItem>,
    news_keys: HashSet<(String, String, NaiveDate)>,
    summaries: HashMap<(String, NaiveDate), DailySentimentSummary>,
    recommendations: Vec<(Uuid, Recommendation, SentimentCounts)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn news_count(&self) -> usize {
        self.inner.lock().await.news.len()
    }

    pub async fn summary_count(&self) -> usize {
        self.inner.lock().await.summaries.len()
    }

    pub async fn recommendations(&self) -> Vec<Recommendation> {
        self.inner
            .lock()
            .await
            .recommendations
            .iter()
            .map(|(_, rec, _)| rec.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl SentimentStore for MemoryStore {
    async fn insert_news_items(&self, items: &[NewsItem]) -> anyhow::Result<u64> {
        let mut inner = self.inner.lock().await;
        let mut inserted = 0;
        for item in items {
            let key = (
                item.company_code.clone(),
                item.title.clone(),
                item.crawled_date,
            );
            if inner.news_keys.insert(key) {
                inner.news.push(item.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn sentiment_counts(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
    ) -> anyhow::Result<SentimentCounts> {
        let inner = self.inner.lock().await;
        Ok(SentimentCounts::from_sentiments(
            inner
                .news
                .iter()
                .filter(|n| n.company_code == company_code && n.crawled_date == crawled_date)
                .map(|n| n.sentiment),
        ))
    }

    async fn top_headlines(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
        limit: usize,
    ) -> anyhow::Result<Vec<String>> {
        let inner = self.inner.lock().await;
        // Insertion index stands in for created_at: later rows are newer.
        let mut rows: Vec<(usize, &NewsItem)> = inner
            .news
            .iter()
            .enumerate()
            .filter(|(_, n)| n.company_code == company_code && n.crawled_date == crawled_date)
            .collect();
        rows.sort_by(|(ia, a), (ib, b)| {
            b.sentiment_probability
                .total_cmp(&a.sentiment_probability)
                .then(ib.cmp(ia))
        });
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(_, n)| n.title.clone())
            .collect())
    }

    async fn news_for_day(
        &self,
        company_code: &str,
        crawled_date: NaiveDate,
    ) -> anyhow::Result<Vec<NewsItem>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .news
            .iter()
            .filter(|n| n.company_code == company_code && n.crawled_date == crawled_date)
            .cloned()
            .collect())
    }

    async fn find_summary(
        &self,
        company_code: &str,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<Option<DailySentimentSummary>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .summaries
            .get(&(company_code.to_string(), analysis_date))
            .cloned())
    }

    async fn aggregate_day(
        &self,
        company_code: &str,
        company_name: &str,
        analysis_date: NaiveDate,
    ) -> anyhow::Result<Option<DailySentimentSummary>> {
        // One guard across read and write; inserts for the key wait until the row is replaced.
        let mut inner = self.inner.lock().await;
        let counts = SentimentCounts::from_sentiments(
            inner
                .news
                .iter()
                .filter(|n| n.company_code == company_code && n.crawled_date == analysis_date)
                .map(|n| n.sentiment),
        );
        let prev_score = aggregate::previous_day(analysis_date)
            .and_then(|prev| inner.summaries.get(&(company_code.to_string(), prev)))
            .map(|s| s.sentiment_score);

        let summary =
            aggregate::compute_summary(company_code, company_name, analysis_date, counts, prev_score);
        if let Some(summary) = &summary {
            inner.summaries.insert(
                (summary.company_code.clone(), summary.analysis_date),
                summary.clone(),
            );
        }
        Ok(summary)
    }

    async fn record_recommendation(
        &self,
        rec: &Recommendation,
        counts: &SentimentCounts,
    ) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.inner
            .lock()
            .await
            .recommendations
            .push((id, rec.clone(), *counts));
        Ok(id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::sentiment::Sentiment;

    pub(crate) fn news(code: &str, title: &str, day: NaiveDate, sentiment: Sentiment, prob: f64) -> NewsItem {
        NewsItem {
            company_code: code.to_string(),
            company_name: "테스트".to_string(),
            title: title.to_string(),
            url: String::new(),
            source: "test".to_string(),
            published_date: day,
            crawled_date: day,
            sentiment,
            sentiment_probability: prob,
            model_used: "scripted".to_string(),
            analysis_reason: String::new(),
            investment_impact: String::new(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    #[tokio::test]
    async fn duplicate_key_keeps_first_row() {
        let store = MemoryStore::new();
        let first = news("005930", "실적 호조", day(1), Sentiment::Positive, 0.9);
        let mut again = first.clone();
        again.sentiment = Sentiment::Negative;

        assert_eq!(store.insert_news_items(&[first.clone()]).await.unwrap(), 1);
        assert_eq!(store.insert_news_items(&[again]).await.unwrap(), 0);

        let rows = store.news_for_day("005930", day(1)).await.unwrap();
        assert_eq!(rows, vec![first]);
    }

    #[tokio::test]
    async fn same_title_on_another_day_is_a_new_row() {
        let store = MemoryStore::new();
        let a = news("005930", "실적 호조", day(1), Sentiment::Positive, 0.9);
        let b = news("005930", "실적 호조", day(2), Sentiment::Positive, 0.9);
        assert_eq!(store.insert_news_items(&[a, b]).await.unwrap(), 2);
        assert_eq!(store.news_count().await, 2);
    }

    #[tokio::test]
    async fn counts_are_scoped_to_company_and_day() {
        let store = MemoryStore::new();
        store
            .insert_news_items(&[
                news("005930", "a", day(1), Sentiment::Positive, 0.9),
                news("005930", "b", day(1), Sentiment::Negative, 0.8),
                news("005930", "c", day(2), Sentiment::Negative, 0.8),
                news("000660", "d", day(1), Sentiment::Neutral, 0.7),
            ])
            .await
            .unwrap();

        let c = store.sentiment_counts("005930", day(1)).await.unwrap();
        assert_eq!((c.positive, c.negative, c.neutral), (1, 1, 0));
    }

    #[tokio::test]
    async fn top_headlines_order_by_probability_then_newest() {
        let store = MemoryStore::new();
        store
            .insert_news_items(&[
                news("005930", "low", day(1), Sentiment::Neutral, 0.4),
                news("005930", "tie-old", day(1), Sentiment::Positive, 0.9),
                news("005930", "tie-new", day(1), Sentiment::Positive, 0.9),
                news("005930", "mid", day(1), Sentiment::Negative, 0.7),
            ])
            .await
            .unwrap();

        let top = store.top_headlines("005930", day(1), 3).await.unwrap();
        assert_eq!(top, vec!["tie-new", "tie-old", "mid"]);
    }
}
