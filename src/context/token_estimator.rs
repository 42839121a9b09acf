//! Token estimation for budget accounting

use super::models::Message;
use crate::config::{EstimatorKind, MemoryConfig};
use crate::error::{ContextError, Result};
use std::sync::Arc;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;
}

/// Character-ratio estimator (~4 characters per token)
///
/// Counts Unicode scalar values so Vietnamese and Chinese text are not
/// inflated by their UTF-8 byte length.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / self.chars_per_token
    }
}

/// Tiktoken-based token estimator using cl100k_base (GPT-4, GPT-3.5-turbo)
pub struct TiktokenEstimator {
    bpe: Arc<CoreBPE>,
}

impl TiktokenEstimator {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base()
            .map_err(|e| ContextError::Configuration(format!("failed to load cl100k_base: {}", e)))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// Build the estimator selected by `memory.estimator`
pub fn from_config(config: &MemoryConfig) -> Result<Arc<dyn TokenEstimator>> {
    let estimator: Arc<dyn TokenEstimator> = match config.estimator {
        EstimatorKind::CharRatio => Arc::new(CharRatioEstimator::new(config.chars_per_token)),
        EstimatorKind::Tiktoken => Arc::new(TiktokenEstimator::new()?),
    };
    Ok(estimator)
}

/// Estimate a message list as `role: content` lines plus a fixed per-message overhead
pub fn estimate_messages(
    estimator: &dyn TokenEstimator,
    messages: &[Message],
    overhead_per_message: usize,
) -> usize {
    messages
        .iter()
        .map(|m| estimator.estimate(&m.transcript_line()) + overhead_per_message)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::Role;

    #[test]
    fn test_char_ratio_estimator() {
        let estimator = CharRatioEstimator::default();
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abc"), 0);
        assert_eq!(estimator.estimate("abcdefgh"), 2);
    }

    #[test]
    fn test_char_ratio_counts_chars_not_bytes() {
        let estimator = CharRatioEstimator::default();
        // 8 characters, 24 bytes in UTF-8
        assert_eq!(estimator.estimate("电脑芯片性能很强"), 2);
        assert_eq!(estimator.estimate("máy tính"), 2);
    }

    #[test]
    fn test_char_ratio_is_monotonic() {
        let estimator = CharRatioEstimator::default();
        let mut text = String::new();
        let mut last = 0;
        for _ in 0..64 {
            text.push('x');
            let tokens = estimator.estimate(&text);
            assert!(tokens >= last);
            last = tokens;
        }
    }

    #[test]
    fn test_estimate_messages_adds_overhead() {
        let estimator = CharRatioEstimator::default();
        let messages = vec![
            Message::new(Role::User, "abcdefgh"),      // "user: abcdefgh" = 14 chars -> 3
            Message::new(Role::Assistant, "ok"),       // "assistant: ok" = 13 chars -> 3
        ];
        assert_eq!(estimate_messages(&estimator, &messages, 4), 3 + 4 + 3 + 4);
        assert_eq!(estimate_messages(&estimator, &[], 4), 0);
    }

    #[test]
    fn test_tiktoken_estimator() {
        let estimator = TiktokenEstimator::new().unwrap();
        let tokens = estimator.estimate("Hello, world! This is a test.");
        assert!(tokens > 0);
        assert!(tokens < 20);
    }

    #[test]
    fn test_from_config_selects_estimator() {
        let mut config = MemoryConfig::default();
        let char_ratio = from_config(&config).unwrap();
        assert_eq!(char_ratio.estimate("abcdefgh"), 2);

        config.chars_per_token = 2;
        assert_eq!(from_config(&config).unwrap().estimate("abcdefgh"), 4);

        config.estimator = EstimatorKind::Tiktoken;
        let tiktoken = from_config(&config).unwrap();
        // cl100k_base encodes "hello world" as two tokens
        assert_eq!(tiktoken.estimate("hello world"), 2);
    }
}
