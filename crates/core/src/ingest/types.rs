use serde::{Deserialize, Serialize};

/// One fetched headline before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub source: String,
    /// `YYYY.MM.DD` (KST), `MM.DD`, or free text such as "1시간 전".
    pub date_string: String,
    pub url: String,
}
