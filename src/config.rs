//! Engine configuration
//!
//! Product bounds and retry budgets, loaded from the environment with
//! compiled defaults. `dotenv` is loaded by the binaries before this runs.

use std::env;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Smallest loan the product offers.
    pub min_amount: f64,
    /// Absolute product ceiling; amounts above it get a counter-offer.
    pub max_amount: f64,
    pub min_tenure_months: u32,
    pub max_tenure_months: u32,
    /// KYC retries allowed after the first failure before KYC_FAILED.
    pub kyc_max_retries: u32,
    /// Consecutive UNKNOWN-intent turns before the clarification fallback.
    pub unknown_intent_threshold: u32,
    /// Attempts per collaborator call before the turn degrades.
    pub collaborator_retry_limit: u32,
    /// Turns of history given to the fact extractor as context.
    pub extractor_context_turns: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_amount: 10_000.0,
            max_amount: 5_000_000.0,
            min_tenure_months: 6,
            max_tenure_months: 84,
            kyc_max_retries: 2,
            unknown_intent_threshold: 3,
            collaborator_retry_limit: 2,
            extractor_context_turns: 6,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_amount: env_parse("LOAN_MIN_AMOUNT", defaults.min_amount),
            max_amount: env_parse("LOAN_MAX_AMOUNT", defaults.max_amount),
            min_tenure_months: env_parse("LOAN_MIN_TENURE_MONTHS", defaults.min_tenure_months),
            max_tenure_months: env_parse("LOAN_MAX_TENURE_MONTHS", defaults.max_tenure_months),
            kyc_max_retries: env_parse("KYC_MAX_RETRIES", defaults.kyc_max_retries),
            unknown_intent_threshold: env_parse(
                "UNKNOWN_INTENT_THRESHOLD",
                defaults.unknown_intent_threshold,
            ),
            collaborator_retry_limit: env_parse(
                "COLLABORATOR_RETRY_LIMIT",
                defaults.collaborator_retry_limit,
            ),
            extractor_context_turns: env_parse(
                "EXTRACTOR_CONTEXT_TURNS",
                defaults.extractor_context_turns,
            ),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.min_amount, 10_000.0);
        assert_eq!(config.max_amount, 5_000_000.0);
        assert_eq!(config.kyc_max_retries, 2);
        assert_eq!(config.unknown_intent_threshold, 3);
    }
}
