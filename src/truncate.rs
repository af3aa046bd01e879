//! Token-budget truncation of `path:content` context entries.
//!
//! Entries are admitted in order until one no longer fits. That entry is cut
//! down to the remaining allowance (if the allowance is worth keeping) and
//! processing stops; later entries are never considered.

use crate::error::Error;
use crate::token::{CharRatioEstimator, TokenEstimator};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default global token ceiling.
pub const DEFAULT_TOKEN_BUDGET: usize = 8_000;
/// Below this many remaining tokens a partial entry is not worth emitting.
pub const DEFAULT_MIN_REMAINING_TOKENS: usize = 100;
/// Allowances above this many characters keep both head and tail.
pub const DEFAULT_HEAD_TAIL_THRESHOLD_CHARS: usize = 1_000;
/// Appended to a prefix-only cut.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Limits applied by the [`Truncator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TruncationPolicy {
    /// Global token ceiling
    pub token_budget: usize,
    /// Stop instead of cutting when fewer tokens than this remain
    pub min_remaining_tokens: usize,
    /// Character allowance above which the head/tail split is used
    pub head_tail_threshold_chars: usize,
}

impl TruncationPolicy {
    /// Creates a policy with the given budget and default thresholds.
    #[must_use]
    pub const fn with_budget(token_budget: usize) -> Self {
        Self {
            token_budget,
            min_remaining_tokens: DEFAULT_MIN_REMAINING_TOKENS,
            head_tail_threshold_chars: DEFAULT_HEAD_TAIL_THRESHOLD_CHARS,
        }
    }
}

impl Default for TruncationPolicy {
    fn default() -> Self {
        Self::with_budget(DEFAULT_TOKEN_BUDGET)
    }
}

/// Budget bookkeeping after a truncation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BudgetState {
    /// Tokens charged to admitted entries, clamped to the budget
    pub total_tokens_used: usize,
    /// Tokens left under the ceiling
    pub remaining_budget: usize,
}

/// Outcome of a truncation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Truncation {
    /// Admitted entries, a prefix of the valid input entries, in order
    pub entries: Vec<String>,
    /// Final budget state
    pub budget: BudgetState,
    /// Path of the entry that was cut, if any
    pub truncated_path: Option<String>,
    /// True once an entry failed to fit
    pub exhausted: bool,
    /// Entries dropped for lacking a `:` separator
    #[serde(skip)]
    pub skipped: Vec<Error>,
}

/// Fits context entries into a token budget.
#[derive(Clone)]
pub struct Truncator {
    policy: TruncationPolicy,
    estimator: Arc<dyn TokenEstimator>,
}

impl std::fmt::Debug for Truncator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Truncator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for Truncator {
    fn default() -> Self {
        Self::new(TruncationPolicy::default(), CharRatioEstimator::default().shared())
    }
}

impl Truncator {
    /// Creates a truncator.
    #[must_use]
    pub fn new(policy: TruncationPolicy, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { policy, estimator }
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &TruncationPolicy {
        &self.policy
    }

    /// Runs one truncation pass over `path:content` entries.
    pub fn truncate<S: AsRef<str>>(&self, entries: &[S]) -> Truncation {
        let budget = self.policy.token_budget;
        let mut out = Truncation::default();
        let mut used = 0usize;

        for entry in entries {
            let entry = entry.as_ref();
            let Some((path, content)) = entry.split_once(':') else {
                trace!("Skipping entry without separator");
                out.skipped.push(Error::malformed_entry(entry));
                continue;
            };

            let tokens = self.estimator.estimate(content);
            if used + tokens <= budget {
                used += tokens;
                out.entries.push(entry.to_string());
                continue;
            }

            out.exhausted = true;
            let remaining = budget.saturating_sub(used);
            if remaining <= self.policy.min_remaining_tokens {
                debug!("Budget exhausted before '{path}' ({remaining} tokens left)");
                break;
            }

            let allowance = self.estimator.chars_for(remaining);
            let cut = if allowance > self.policy.head_tail_threshold_chars {
                head_and_tail(content, allowance)
            } else {
                format!("{}\n{TRUNCATION_MARKER}", char_prefix(content, allowance))
            };
            debug!(
                "Truncated '{path}' to {allowance} of {} characters",
                content.chars().count()
            );

            out.entries.push(format!("{path}:{cut}"));
            out.truncated_path = Some(path.to_string());
            used = budget;
            break;
        }

        out.budget = BudgetState {
            total_tokens_used: used.min(budget),
            remaining_budget: budget.saturating_sub(used),
        };
        out
    }
}

/// Truncates entries with the default policy thresholds and estimator.
#[must_use]
pub fn truncate<S: AsRef<str>>(entries: &[S], token_budget: usize) -> Vec<String> {
    Truncator::new(
        TruncationPolicy::with_budget(token_budget),
        CharRatioEstimator::default().shared(),
    )
    .truncate(entries)
    .entries
}

/// Keeps 80% of the allowance from the start and 20% from the end.
fn head_and_tail(content: &str, allowance: usize) -> String {
    let total = content.chars().count();
    let head = allowance * 4 / 5;
    let tail = allowance - head;
    format!(
        "{}\n\n... [truncated, original length {total} characters] ...\n\n{}",
        char_prefix(content, head),
        char_suffix(content, tail)
    )
}

pub(crate) fn char_prefix(text: &str, chars: usize) -> &str {
    match text.char_indices().nth(chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn char_suffix(text: &str, chars: usize) -> &str {
    let total = text.chars().count();
    if chars >= total {
        return text;
    }
    match text.char_indices().nth(total - chars) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
