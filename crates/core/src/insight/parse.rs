//! Decodes the generator's free-text reply into action, confidence and rationale.
//!
//! Each field has an ordered list of patterns, most specific first. The first pattern that
//! matches wins; when none match the field takes its documented default:
//!
//! * action: `hold`
//! * confidence: `0.7`
//! * rationale: synthesized from the headline counts (also used when the captured span is
//!   shorter than [`MIN_RATIONALE_CHARS`])

use crate::domain::recommendation::Action;
use crate::domain::sentiment::SentimentCounts;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_CONFIDENCE: f64 = 0.7;
pub const MIN_RATIONALE_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInsight {
    pub action: Action,
    pub confidence: f64,
    pub rationale: String,
    pub matched: MatchedFields,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchedFields {
    pub action: bool,
    pub confidence: bool,
    pub rationale: bool,
}

impl MatchedFields {
    pub fn any(&self) -> bool {
        self.action || self.confidence || self.rationale
    }
}

struct Patterns {
    action: Vec<Regex>,
    confidence: Vec<Regex>,
    rationale: Vec<Regex>,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("static reply pattern must compile");
        Patterns {
            action: [
                // 투자추천: **매수**
                r"투자추천\**[\s:：]*\*\*\s*([매수도보류]+)\s*\*\*",
                // 투자추천: 매수 | 투자추천 [매수] | **투자추천**: 매수
                r#"투자추천[\s:：*\[\]「」"']*([매수도보류]+)"#,
                // Recommendation: BUY
                r#"(?i)\b(?:recommendation|action)\b[\s:：*\[\]"']*(buy|hold|sell)\b"#,
            ]
            .into_iter()
            .map(compile)
            .collect(),
            confidence: [
                // 확신도: 80%
                r"확신도\**[\s:：*]*(\d+(?:\.\d+)?)\s*%",
                // 확신도: **8** | 확신도: 8/10 | 확신도: 8점 | 확신도: 0.8
                r"확신도\**[\s:：*]*(\d+(?:\.\d+)?)",
                // Confidence: 8 | Confidence: 80%
                r"(?i)\bconfidence\b[\s:：*]*(\d+(?:\.\d+)?\s*%?)",
            ]
            .into_iter()
            .map(compile)
            .collect(),
            rationale: [
                // 분석근거: **...** closed right before a pipe or the end
                r"(?s)분석근거\**[\s:：]*\*\*(.+?)\*\*\s*(?:\||\z)",
                // 분석근거: ... up to a pipe
                r"(?s)분석근거\**[\s:：]*([^|]+)",
                // Rationale: ... / Reason: ...
                r"(?is)\b(?:rationale|reason)\b\**[\s:：]*([^|]+)",
            ]
            .into_iter()
            .map(compile)
            .collect(),
        }
    })
}

fn first_capture<'t>(list: &[Regex], text: &'t str) -> Option<&'t str> {
    list.iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
}

fn action_from_token(token: &str) -> Action {
    let lower = token.to_ascii_lowercase();
    if token.contains("매수") || lower == "buy" {
        Action::Buy
    } else if token.contains("매도") || lower == "sell" {
        Action::Sell
    } else {
        Action::Hold
    }
}

/// Percentages are taken literally, fractions in `[0, 1]` as-is, anything else as a 1–10 score.
fn confidence_from_token(token: &str) -> Option<f64> {
    let token = token.trim();
    if let Some(pct) = token.strip_suffix('%') {
        let v: f64 = pct.trim().parse().ok()?;
        return Some((v / 100.0).clamp(0.0, 1.0));
    }
    let v: f64 = token.parse().ok()?;
    if token.contains('.') && v <= 1.0 {
        return Some(v.clamp(0.0, 1.0));
    }
    Some((v / 10.0).clamp(0.1, 1.0))
}

fn parse_confidence(text: &str) -> Option<f64> {
    let p = patterns();
    // The percentage pattern is tried alone first so `80%` never reads as a score of 80.
    if let Some(pct) = p.confidence[0].captures(text).and_then(|c| c.get(1)) {
        if let Ok(v) = pct.as_str().parse::<f64>() {
            return Some((v / 100.0).clamp(0.0, 1.0));
        }
    }
    p.confidence[1..]
        .iter()
        .filter_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .find_map(|m| confidence_from_token(m.as_str()))
}

fn clean_rationale(span: &str) -> String {
    span.trim().trim_matches('*').trim().to_string()
}

pub fn synthesized_rationale(counts: &SentimentCounts) -> String {
    format!(
        "뉴스 감성 분석 결과 긍정 {}개, 부정 {}개를 바탕으로 한 종합 판단",
        counts.positive, counts.negative
    )
}

pub fn parse_reply(reply: &str, counts: &SentimentCounts) -> ParsedInsight {
    let p = patterns();
    let text = reply.trim();
    let mut matched = MatchedFields::default();

    let action = match first_capture(&p.action, text) {
        Some(token) => {
            matched.action = true;
            action_from_token(token)
        }
        None => Action::Hold,
    };

    let confidence = match parse_confidence(text) {
        Some(v) => {
            matched.confidence = true;
            v
        }
        None => DEFAULT_CONFIDENCE,
    };

    let captured = first_capture(&p.rationale, text).map(clean_rationale);
    matched.rationale = captured.is_some();
    let rationale = captured
        .filter(|r| r.chars().count() >= MIN_RATIONALE_CHARS)
        .unwrap_or_else(|| synthesized_rationale(counts));

    ParsedInsight {
        action,
        confidence,
        rationale,
        matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> SentimentCounts {
        SentimentCounts {
            positive: 6,
            negative: 2,
            neutral: 2,
        }
    }

    #[test]
    fn parses_plain_reply() {
        let reply = "투자추천: 매수\n확신도: 8\n분석근거: 긍정 뉴스 비율이 75%로 높고 차트도 상승 추세입니다.";
        let parsed = parse_reply(reply, &counts());
        assert_eq!(parsed.action, Action::Buy);
        assert_eq!(parsed.confidence, 0.8);
        assert_eq!(
            parsed.rationale,
            "긍정 뉴스 비율이 75%로 높고 차트도 상승 추세입니다."
        );
        assert!(parsed.matched.action && parsed.matched.confidence && parsed.matched.rationale);
    }

    #[test]
    fn emphasis_markup_does_not_change_action() {
        for reply in ["투자추천: **매수**", "투자추천: 매수", "**투자추천**: 매수", "투자추천：**매수**"] {
            assert_eq!(parse_reply(reply, &counts()).action, Action::Buy, "{reply}");
        }
    }

    #[test]
    fn single_line_reply_with_pipes() {
        let reply = "투자추천: **매도** | 확신도: **7** | 분석근거: **부정 뉴스가 다수이고 차트가 하락 중입니다**";
        let parsed = parse_reply(reply, &counts());
        assert_eq!(parsed.action, Action::Sell);
        assert_eq!(parsed.confidence, 0.7);
        assert_eq!(parsed.rationale, "부정 뉴스가 다수이고 차트가 하락 중입니다");
    }

    #[test]
    fn combined_reply_string() {
        let parsed = parse_reply("투자추천: 매수, 확신도: 8", &counts());
        assert_eq!(parsed.action, Action::Buy);
        assert_eq!(parsed.confidence, 0.8);
    }

    #[test]
    fn confidence_forms() {
        let c = |s: &str| parse_reply(s, &counts()).confidence;
        assert_eq!(c("확신도: 80%"), 0.8);
        assert_eq!(c("확신도: 50%"), 0.5);
        assert_eq!(c("확신도: 9/10"), 0.9);
        assert_eq!(c("확신도: 6점"), 0.6);
        assert_eq!(c("확신도: 0.8"), 0.8);
        assert_eq!(c("확신도: 0"), 0.1);
        assert_eq!(c("확신도: 15"), 1.0);
        assert_eq!(c("Confidence: 7"), 0.7);
        assert_eq!(c("no confidence token here"), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn english_fallback_patterns() {
        let parsed = parse_reply(
            "Recommendation: SELL\nConfidence: 90%\nRationale: negative coverage dominates the week.",
            &counts(),
        );
        assert_eq!(parsed.action, Action::Sell);
        assert_eq!(parsed.confidence, 0.9);
        assert_eq!(parsed.rationale, "negative coverage dominates the week.");
    }

    #[test]
    fn defaults_on_total_miss() {
        let parsed = parse_reply("모델이 다른 이야기를 했습니다", &counts());
        assert_eq!(parsed.action, Action::Hold);
        assert_eq!(parsed.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(parsed.rationale, synthesized_rationale(&counts()));
        assert!(!parsed.matched.any());
    }

    #[test]
    fn short_rationale_is_synthesized() {
        let parsed = parse_reply("투자추천: 보류\n분석근거: 애매함", &counts());
        assert_eq!(parsed.action, Action::Hold);
        assert!(parsed.matched.rationale);
        assert_eq!(parsed.rationale, synthesized_rationale(&counts()));
        assert!(parsed.rationale.contains("긍정 6개"));
        assert!(parsed.rationale.contains("부정 2개"));
    }

    #[test]
    fn markup_variations_all_decode() {
        let label_wraps = [("", ""), ("**", "**")];
        let seps = [":", ": ", " : ", "：", " "];
        let value_wraps = [("", ""), ("**", "**"), ("[", "]"), ("\"", "\"")];
        let tails = ["", " |", "\n", " | 확신도: 8"];
        let actions = [("매수", Action::Buy), ("보류", Action::Hold), ("매도", Action::Sell)];

        for (lo, lc) in label_wraps {
            for sep in seps {
                for (vo, vc) in value_wraps {
                    for tail in tails {
                        for (token, expected) in actions {
                            let reply = format!("{lo}투자추천{lc}{sep}{vo}{token}{vc}{tail}");
                            let parsed = parse_reply(&reply, &counts());
                            assert_eq!(parsed.action, expected, "reply={reply:?}");
                            assert!(parsed.matched.action, "reply={reply:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn confidence_markup_variations_all_decode() {
        let seps = [":", ": ", " : ", "："];
        let value_wraps = [("", ""), ("**", "**")];
        for sep in seps {
            for (vo, vc) in value_wraps {
                for n in 1..=10u32 {
                    let reply = format!("확신도{sep}{vo}{n}{vc}");
                    let parsed = parse_reply(&reply, &counts());
                    assert!((parsed.confidence - n as f64 / 10.0).abs() < 1e-12, "reply={reply:?}");
                }
            }
        }
    }
}
