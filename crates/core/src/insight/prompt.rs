use crate::domain::market::{ChartTrend, PriceSnapshot};
use crate::domain::sentiment::SentimentCounts;

/// Headlines quoted verbatim in the prompt.
pub const MAX_PROMPT_HEADLINES: usize = 3;

const SKEW_THRESHOLD_PCT: f64 = 60.0;

/// Directional ratios in percent, computed over positive + negative only.
/// With no directional headline both sides read 50%.
pub fn directional_ratios(counts: &SentimentCounts) -> (f64, f64) {
    let relevant = counts.relevant();
    if relevant == 0 {
        return (50.0, 50.0);
    }
    let relevant = relevant as f64;
    (
        counts.positive as f64 / relevant * 100.0,
        counts.negative as f64 / relevant * 100.0,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentSkew {
    Negative,
    Positive,
    Mixed,
}

impl SentimentSkew {
    /// Negative skew is checked first.
    pub fn from_ratios(positive_pct: f64, negative_pct: f64) -> Self {
        if negative_pct > SKEW_THRESHOLD_PCT {
            SentimentSkew::Negative
        } else if positive_pct > SKEW_THRESHOLD_PCT {
            SentimentSkew::Positive
        } else {
            SentimentSkew::Mixed
        }
    }

    fn label_ko(self) -> &'static str {
        match self {
            SentimentSkew::Negative => "부정적",
            SentimentSkew::Positive => "긍정적",
            SentimentSkew::Mixed => "중립적",
        }
    }
}

pub struct PromptInput<'a> {
    pub company_name: &'a str,
    pub counts: &'a SentimentCounts,
    pub price: &'a PriceSnapshot,
    pub chart_trend: Option<ChartTrend>,
    pub headlines: &'a [String],
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let counts = input.counts;
    let (positive_pct, negative_pct) = directional_ratios(counts);
    let skew = SentimentSkew::from_ratios(positive_pct, negative_pct);

    let current_price = input
        .price
        .current_price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let change_rate = input.price.change_rate.as_deref().unwrap_or("N/A");
    let mut lines: Vec<String> = vec![
        format!(
            "당신은 전문 투자 분석가입니다. 다음 정보를 바탕으로 {}에 대한 투자 판단을 해주세요.",
            input.company_name
        ),
        String::new(),
        "【분석 정보】".to_string(),
        "• 뉴스 감성 분석 결과".to_string(),
        format!("  - 긍정 뉴스: {}개 ({positive_pct:.1}%)", counts.positive),
        format!("  - 부정 뉴스: {}개 ({negative_pct:.1}%)", counts.negative),
        format!("  - 중립 뉴스: {}개", counts.neutral),
        format!("  - 총 뉴스: {}개", counts.total()),
        format!("  - 감성 경향: {}", skew.label_ko()),
        String::new(),
        "• 주가 정보".to_string(),
        format!("  - 현재가: {current_price}원"),
        format!("  - 변동률: {change_rate}"),
        format!("  - 상태: {}", input.price.status.label_ko()),
    ];
    if let Some(trend) = input.chart_trend {
        lines.push(format!("  - 차트 트렌드: {}", trend.label_ko()));
    }

    lines.push(String::new());
    lines.push("• 주요 뉴스".to_string());
    lines.extend(
        input
            .headlines
            .iter()
            .take(MAX_PROMPT_HEADLINES)
            .map(|title| format!("  - {}", title.trim())),
    );

    lines.extend(
        [
            "",
            "【분석 가이드라인】",
            "1. 뉴스 감성이 60% 이상 부정적이면 매도 고려",
            "2. 뉴스 감성이 60% 이상 긍정적이면 매수 고려",
            "3. 뉴스 감성과 차트 트렌드가 같은 방향이면 뉴스 감성에 더 큰 비중을 두세요",
            "4. 뉴스 감성이 혼재된 경우 차트 트렌드 중점 고려",
            "5. 뉴스와 차트가 상충할 경우 보수적 접근",
            "",
            "【요청사항】",
            "위 정보와 가이드라인을 종합하여 다음 형식으로 답변해주세요.",
            "",
            "투자추천: 매수/보류/매도 중 하나",
            "확신도: 1~10점 중 하나",
            "분석근거: 뉴스 감성 비율과 차트 정보를 연결한 구체적인 투자 판단 이유를 2-3문장으로 설명",
            "",
            "답변:",
        ]
        .into_iter()
        .map(str::to_string),
    );

    lines.join("\n")
}
