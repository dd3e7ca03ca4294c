//! Narrow interface over the BPE tokenizer collaborator.
//!
//! The pipeline only needs a token count and an availability probe; the
//! encoder itself (tiktoken model family) stays behind this boundary. An
//! unavailable tokenizer warns once and the audit is skipped.

use std::sync::atomic::{AtomicBool, Ordering};

use tiktoken_rs::CoreBPE;

/// Default model when neither flag nor config names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

static WARNED_UNAVAILABLE: AtomicBool = AtomicBool::new(false);

/// Token counter bound to one model for the invocation.
pub struct Tokenizer {
    bpe: Option<CoreBPE>,
    model: String,
}

impl Tokenizer {
    /// Resolve the encoder for `model`. Failure is not fatal: the returned
    /// tokenizer reports unavailable and counting yields `None`.
    pub fn for_model(model: &str) -> Tokenizer {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => Some(bpe),
            Err(err) => {
                if !WARNED_UNAVAILABLE.swap(true, Ordering::Relaxed) {
                    tracing::warn!("tokenizer unavailable for model {model:?}: {err}; token audit skipped");
                }
                None
            }
        };
        Tokenizer {
            bpe,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Availability probe.
    pub fn is_available(&self) -> bool {
        self.bpe.is_some()
    }

    /// BPE token count of `text`, or `None` when the encoder is missing.
    pub fn count_tokens(&self, text: &str) -> Option<usize> {
        self.bpe
            .as_ref()
            .map(|bpe| bpe.encode_with_special_tokens(text).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_counts() {
        let tokenizer = Tokenizer::for_model(DEFAULT_MODEL);
        assert!(tokenizer.is_available());
        let count = tokenizer.count_tokens("hello world").unwrap();
        assert!(count > 0);
        assert!(count <= "hello world".len());
    }

    #[test]
    fn test_empty_text_counts_zero() {
        let tokenizer = Tokenizer::for_model(DEFAULT_MODEL);
        assert_eq!(tokenizer.count_tokens(""), Some(0));
    }

    #[test]
    fn test_unknown_model_is_unavailable() {
        let tokenizer = Tokenizer::for_model("not-a-model");
        assert!(!tokenizer.is_available());
        assert_eq!(tokenizer.count_tokens("text"), None);
    }
}
