use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Three-way headline sentiment.
///
/// The classifier's output index maps onto this enum through [`Sentiment::from_index`]:
/// `0 = negative`, `1 = neutral`, `2 = positive`. The mapping is fixed; a model with a
/// different label order must be remapped before it reaches the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl Sentiment {
    pub const LABELS: [Sentiment; 3] = [Sentiment::Negative, Sentiment::Neutral, Sentiment::Positive];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::LABELS.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
        }
    }

    pub fn label_ko(self) -> &'static str {
        match self {
            Sentiment::Negative => "부정",
            Sentiment::Neutral => "중립",
            Sentiment::Positive => "긍정",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "negative" | "부정" => Ok(Sentiment::Negative),
            "neutral" | "중립" => Ok(Sentiment::Neutral),
            "positive" | "긍정" => Ok(Sentiment::Positive),
            other => anyhow::bail!("unknown sentiment label: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentTrend {
    Improving,
    Declining,
    Stable,
}

impl SentimentTrend {
    /// Day-over-day changes within this band are noise, not a trend.
    pub const THRESHOLD: f64 = 0.1;

    /// Strict comparison: a change of exactly `±THRESHOLD` is `Stable`.
    pub fn from_change(change: f64) -> Self {
        if change > Self::THRESHOLD {
            SentimentTrend::Improving
        } else if change < -Self::THRESHOLD {
            SentimentTrend::Declining
        } else {
            SentimentTrend::Stable
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SentimentTrend::Improving => "improving",
            SentimentTrend::Declining => "declining",
            SentimentTrend::Stable => "stable",
        }
    }
}

impl FromStr for SentimentTrend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "improving" => Ok(SentimentTrend::Improving),
            "declining" => Ok(SentimentTrend::Declining),
            "stable" => Ok(SentimentTrend::Stable),
            other => anyhow::bail!("unknown sentiment trend: {other}"),
        }
    }
}

/// One classified headline as stored in `news_data`.
///
/// Identity is `(company_code, title, crawled_date)`; storing the same key twice keeps the first row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub company_code: String,
    pub company_name: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub published_date: NaiveDate,
    pub crawled_date: NaiveDate,
    pub sentiment: Sentiment,
    pub sentiment_probability: f64,
    pub model_used: String,
    pub analysis_reason: String,
    pub investment_impact: String,
}

/// Per-class headline counts for one company and day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: u32,
    pub negative: u32,
    pub neutral: u32,
}

impl SentimentCounts {
    pub fn from_sentiments<I>(sentiments: I) -> Self
    where
        I: IntoIterator<Item = Sentiment>,
    {
        let mut out = Self::default();
        for s in sentiments {
            out.add(s, 1);
        }
        out
    }

    pub fn add(&mut self, sentiment: Sentiment, n: u32) {
        match sentiment {
            Sentiment::Positive => self.positive += n,
            Sentiment::Negative => self.negative += n,
            Sentiment::Neutral => self.neutral += n,
        }
    }

    pub fn total(&self) -> u32 {
        self.positive + self.negative + self.neutral
    }

    /// Positive plus negative; neutral headlines carry no directional signal.
    pub fn relevant(&self) -> u32 {
        self.positive + self.negative
    }
}

/// Aggregate of one company's headlines for one `analysis_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySentimentSummary {
    pub company_code: String,
    pub company_name: String,
    pub analysis_date: NaiveDate,
    pub total_news: u32,
    pub positive_count: u32,
    pub negative_count: u32,
    pub neutral_count: u32,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub neutral_ratio: f64,
    pub sentiment_score: f64,
    pub prev_day_sentiment_score: Option<f64>,
    pub sentiment_change: Option<f64>,
    pub sentiment_trend: SentimentTrend,
}

impl DailySentimentSummary {
    pub fn counts(&self) -> SentimentCounts {
        SentimentCounts {
            positive: self.positive_count,
            negative: self.negative_count,
            neutral: self.neutral_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_mapping_is_negative_neutral_positive() {
        assert_eq!(Sentiment::from_index(0), Some(Sentiment::Negative));
        assert_eq!(Sentiment::from_index(1), Some(Sentiment::Neutral));
        assert_eq!(Sentiment::from_index(2), Some(Sentiment::Positive));
        assert_eq!(Sentiment::from_index(3), None);
    }

    #[test]
    fn parses_stored_and_korean_labels() {
        assert_eq!("positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!("부정".parse::<Sentiment>().unwrap(), Sentiment::Negative);
        assert!("bullish".parse::<Sentiment>().is_err());
    }

    #[test]
    fn trend_thresholds_are_strict() {
        assert_eq!(SentimentTrend::from_change(0.15), SentimentTrend::Improving);
        assert_eq!(SentimentTrend::from_change(-0.15), SentimentTrend::Declining);
        assert_eq!(SentimentTrend::from_change(0.05), SentimentTrend::Stable);
        assert_eq!(SentimentTrend::from_change(-0.05), SentimentTrend::Stable);
        // Exactly on the boundary is not a trend.
        assert_eq!(SentimentTrend::from_change(0.1), SentimentTrend::Stable);
        assert_eq!(SentimentTrend::from_change(-0.1), SentimentTrend::Stable);
        assert_eq!(SentimentTrend::from_change(0.1 + 1e-9), SentimentTrend::Improving);
    }

    #[test]
    fn counts_tally_by_class() {
        use Sentiment::*;
        let counts = SentimentCounts::from_sentiments([Positive, Positive, Negative, Neutral]);
        assert_eq!(counts.positive, 2);
        assert_eq!(counts.negative, 1);
        assert_eq!(counts.neutral, 1);
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.relevant(), 3);
    }
}
