use crate::config::RetryConfig;
use crate::error::FailureCategory;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Show `message` with a countdown of `wait`, then start over.
    RetryAfter {
        wait: Duration,
        message: &'static str,
    },
    /// Give up.
    Fatal,
}

/// Per-category retry rules.
///
/// Transient failures retry forever. Trust and load failures share one
/// budget of `max_failures`; the failure that exhausts it is fatal.
/// Protocol failures are always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_failures: u32,
    pub transient_wait: Duration,
    pub trust_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_failures: cfg.max_failures,
            transient_wait: cfg.transient_wait(),
            trust_wait: cfg.trust_wait(),
        }
    }
}

impl RetryPolicy {
    /// Whether failures of `category` count against the shared budget.
    pub fn uses_budget(category: FailureCategory) -> bool {
        matches!(category, FailureCategory::Trust | FailureCategory::Load)
    }

    /// `budget_failures` is the number of budgeted failures so far,
    /// including this one.
    pub fn decide(&self, category: FailureCategory, budget_failures: u32) -> RetryDecision {
        match category {
            FailureCategory::Transient => RetryDecision::RetryAfter {
                wait: self.transient_wait,
                message: "Connection error.",
            },
            FailureCategory::Trust | FailureCategory::Load
                if budget_failures >= self.max_failures =>
            {
                RetryDecision::Fatal
            }
            FailureCategory::Trust => RetryDecision::RetryAfter {
                wait: self.trust_wait,
                message: "Invalid gamepack.",
            },
            FailureCategory::Load => RetryDecision::RetryAfter {
                wait: self.trust_wait,
                message: "Classload error.",
            },
            FailureCategory::Protocol => RetryDecision::Fatal,
        }
    }
}
