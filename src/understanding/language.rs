//! Script-based language detection

use serde::{Deserialize, Serialize};

/// Characters inspected when detecting the language of a query
const SAMPLE_CHARS: usize = 200;

/// Letters outside U+1E00–U+1EFF that only Vietnamese uses; accents shared
/// with French or Spanish (é, à, ô, ...) are neutral
const VIETNAMESE_LETTERS: &str = "ăđĩũơư";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Vietnamese,
    Chinese,
}

impl Language {
    /// Detect the language of `text` from its leading characters
    ///
    /// Vietnamese letters win over CJK, which wins over the English
    /// default.
    pub fn detect(text: &str) -> Self {
        let sample: String = text.chars().take(SAMPLE_CHARS).collect();
        if has_vietnamese(&sample) {
            Language::Vietnamese
        } else if has_cjk(&sample) {
            Language::Chinese
        } else {
            Language::English
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Vietnamese => "Vietnamese",
            Language::Chinese => "Chinese",
        }
    }

    /// Whether `text` could have been written in this language without mixing scripts
    pub fn admits(&self, text: &str) -> bool {
        match self {
            Language::Chinese => has_cjk(text) && !has_vietnamese(text),
            Language::Vietnamese => has_vietnamese(text) && !has_cjk(text),
            Language::English => !has_cjk(text) && !has_vietnamese(text),
        }
    }
}

fn has_vietnamese(text: &str) -> bool {
    text.chars().any(|c| {
        ('\u{1E00}'..='\u{1EFF}').contains(&c)
            || c.to_lowercase().any(|lower| VIETNAMESE_LETTERS.contains(lower))
    })
}

fn has_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4E00}'..='\u{9FFF}').contains(&c))
}
