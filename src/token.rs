use std::sync::Arc;

/// Default characters-per-token ratio used for budgeting.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 3;

/// Trait for estimating token counts in text.
///
/// Implementations must be reversible through [`TokenEstimator::chars_for`]
/// so a remaining token allowance can be turned back into a character cut.
pub trait TokenEstimator: Send + Sync {
    /// Estimates the number of tokens in the given text.
    fn estimate(&self, text: &str) -> usize;

    /// Converts a token allowance into a character allowance.
    fn chars_for(&self, tokens: usize) -> usize;
}

/// Fixed-ratio character tokenizer.
///
/// `tokens = floor(chars / ratio)`. Deliberately not a real tokenizer; the
/// ratio of 3 overestimates for typical source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    /// Creates an estimator with the given ratio (clamped to at least 1).
    #[must_use]
    pub const fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: if chars_per_token == 0 { 1 } else { chars_per_token },
        }
    }

    /// Returns the configured ratio.
    #[must_use]
    pub const fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }

    /// Wraps the estimator for sharing across pipeline stages.
    #[must_use]
    pub fn shared(self) -> Arc<dyn TokenEstimator> {
        Arc::new(self)
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count() / self.chars_per_token
    }

    fn chars_for(&self, tokens: usize) -> usize {
        tokens.saturating_mul(self.chars_per_token)
    }
}
