use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Intraday direction shown on the quote page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    Rising,
    Falling,
    Flat,
}

impl PriceStatus {
    pub fn label_ko(self) -> &'static str {
        match self {
            PriceStatus::Rising => "상승",
            PriceStatus::Falling => "하락",
            PriceStatus::Flat => "보합",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub company_code: String,
    pub current_price: Option<i64>,
    pub change_value: Option<String>,
    pub change_rate: Option<String>,
    pub volume: Option<String>,
    pub market_cap: Option<String>,
    pub status: PriceStatus,
}

impl PriceSnapshot {
    pub fn unavailable(company_code: &str) -> Self {
        Self {
            company_code: company_code.to_string(),
            current_price: None,
            change_value: None,
            change_rate: None,
            volume: None,
            market_cap: None,
            status: PriceStatus::Flat,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Label derived from the last two closes, independent of news sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartTrend {
    StrongUp,
    Up,
    Flat,
    Down,
    StrongDown,
    InsufficientData,
}

impl ChartTrend {
    /// `points` must be sorted by date ascending.
    pub fn from_points(points: &[ChartPoint]) -> Self {
        let [.., previous, latest] = points else {
            return ChartTrend::InsufficientData;
        };
        if latest.close <= 0.0 || previous.close <= 0.0 {
            return ChartTrend::InsufficientData;
        }

        let ratio = latest.close / previous.close;
        if ratio > 1.02 {
            ChartTrend::StrongUp
        } else if ratio > 1.0 {
            ChartTrend::Up
        } else if ratio < 0.98 {
            ChartTrend::StrongDown
        } else if ratio < 1.0 {
            ChartTrend::Down
        } else {
            ChartTrend::Flat
        }
    }

    pub fn label_ko(self) -> &'static str {
        match self {
            ChartTrend::StrongUp => "강한 상승",
            ChartTrend::Up => "상승",
            ChartTrend::Flat => "보합",
            ChartTrend::Down => "하락",
            ChartTrend::StrongDown => "강한 하락",
            ChartTrend::InsufficientData => "데이터 부족",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub company_code: String,
    pub period: String,
    pub points: Vec<ChartPoint>,
    pub trend: ChartTrend,
}
