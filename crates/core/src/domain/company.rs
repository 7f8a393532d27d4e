use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Company {
    pub code: &'static str,
    pub name: &'static str,
}

const fn c(code: &'static str, name: &'static str) -> Company {
    Company { code, name }
}

/// Large-cap KRX listings offered by the dashboard picker.
pub const COMPANIES: &[Company] = &[
    c("005930", "삼성전자"),
    c("000660", "SK하이닉스"),
    c("207940", "삼성바이오로직스"),
    c("373220", "LG에너지솔루션"),
    c("012450", "한화에어로스페이스"),
    c("105560", "KB금융"),
    c("005380", "현대차"),
    c("329180", "HD현대중공업"),
    c("005935", "삼성전자우"),
    c("000270", "기아"),
    c("068270", "셀트리온"),
    c("035420", "NAVER"),
    c("055550", "신한지주"),
    c("034020", "두산에너빌리티"),
    c("028260", "삼성물산"),
    c("042660", "한화오션"),
    c("012330", "현대모비스"),
    c("011200", "HMM"),
    c("009540", "HD한국조선해양"),
    c("086790", "하나금융지주"),
    c("138040", "메리츠금융지주"),
    c("015760", "한국전력"),
    c("032830", "삼성생명"),
    c("005490", "POSCO홀딩스"),
    c("196170", "알테오젠"),
    c("259960", "크래프톤"),
    c("000810", "삼성화재"),
    c("035720", "카카오"),
    c("064350", "현대로템"),
    c("010130", "고려아연"),
    c("033780", "KT&G"),
    c("010140", "삼성중공업"),
    c("267270", "HD현대일렉트릭"),
    c("316140", "우리금융지주"),
    c("402340", "SK스퀘어"),
    c("030200", "KT"),
    c("051910", "LG화학"),
    c("096770", "SK이노베이션"),
    c("024110", "기업은행"),
    c("352820", "하이브"),
    c("066570", "LG전자"),
    c("323410", "카카오뱅크"),
    c("017670", "SK텔레콤"),
    c("006400", "삼성SDI"),
    c("003550", "LG"),
    c("018260", "삼성에스디에스"),
    c("034730", "SK"),
    c("079550", "LIG넥스원"),
    c("180640", "한진칼"),
    c("009150", "삼성전기"),
];

pub fn find(code: &str) -> Option<&'static Company> {
    let code = code.trim();
    COMPANIES.iter().find(|c| c.code == code)
}

/// Explicit name wins; otherwise the directory name; otherwise the code itself.
pub fn resolve_name(code: &str, explicit: Option<&str>) -> String {
    if let Some(name) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return name.to_string();
    }
    find(code)
        .map(|c| c.name.to_string())
        .unwrap_or_else(|| code.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique_six_digit() {
        let mut seen = HashSet::new();
        for c in COMPANIES {
            assert_eq!(c.code.len(), 6, "{}", c.code);
            assert!(c.code.chars().all(|ch| ch.is_ascii_digit()));
            assert!(seen.insert(c.code), "duplicate code {}", c.code);
        }
        assert_eq!(COMPANIES.len(), 50);
    }

    #[test]
    fn resolves_names() {
        assert_eq!(resolve_name("005930", None), "삼성전자");
        assert_eq!(resolve_name("005930", Some("Samsung")), "Samsung");
        assert_eq!(resolve_name("005930", Some("  ")), "삼성전자");
        assert_eq!(resolve_name("999999", None), "999999");
    }
}
