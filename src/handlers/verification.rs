//! Verification handler
//!
//! Collects the registered phone number and drives KYC through the
//! orchestrator's side-effect dispatch, with a bounded retry budget.

use super::{combined_facts, StageHandler};
use crate::config::EngineConfig;
use crate::models::{
    DecisionOutcome, DecisionReason, FactsPatch, HandlerResult, Intent, ReplyDirective,
    SessionRecord, SideEffect, Stage,
};

pub struct VerificationHandler {
    config: EngineConfig,
}

impl VerificationHandler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl StageHandler for VerificationHandler {
    fn name(&self) -> &'static str {
        "verification"
    }

    fn handle(
        &self,
        record: &SessionRecord,
        patch: &FactsPatch,
        _intents: &[Intent],
    ) -> HandlerResult {
        let facts = combined_facts(record, patch);

        // KYC already succeeded on an earlier turn: hand over to
        // underwriting, prefetching the credit profile on the way.
        if facts.kyc_verified == Some(true) {
            let mut side_effects = Vec::new();
            if facts.credit_score.is_none() || facts.pre_approved_limit.is_none() {
                side_effects.push(SideEffect::CreditLookup);
            }
            return HandlerResult {
                facts_patch: patch.clone(),
                reply: ReplyDirective::FetchingOffer,
                proposed_stage: Stage::Underwriting,
                side_effects,
                decision: None,
            };
        }

        // Retry budget exhausted: the initial attempt plus the configured
        // retries all failed. A fresh number does not reopen the budget.
        if facts.kyc_verified == Some(false) && facts.kyc_attempts > self.config.kyc_max_retries {
            return HandlerResult {
                facts_patch: patch.clone(),
                reply: ReplyDirective::RejectionNotice {
                    reason: DecisionReason::KycFailed,
                },
                proposed_stage: Stage::Rejected,
                side_effects: Vec::new(),
                decision: Some((DecisionOutcome::Rejected, DecisionReason::KycFailed)),
            };
        }

        // A fresh phone number this turn (first attempt or a corrected
        // number after a failure) triggers a KYC request.
        if patch.phone.is_some() {
            return HandlerResult {
                facts_patch: patch.clone(),
                reply: ReplyDirective::VerifyingIdentity,
                proposed_stage: Stage::Verification,
                side_effects: vec![SideEffect::VerifyKyc],
                decision: None,
            };
        }

        // KYC failed on an earlier turn: ask for the number again.
        if facts.kyc_verified == Some(false) {
            let attempts_left = self.config.kyc_max_retries + 1 - facts.kyc_attempts;
            return HandlerResult {
                facts_patch: patch.clone(),
                reply: ReplyDirective::KycRetry { attempts_left },
                proposed_stage: Stage::Verification,
                side_effects: Vec::new(),
                decision: None,
            };
        }

        HandlerResult {
            facts_patch: patch.clone(),
            reply: ReplyDirective::AskPhone,
            proposed_stage: Stage::Verification,
            side_effects: Vec::new(),
            decision: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> VerificationHandler {
        VerificationHandler::new(EngineConfig::default())
    }

    fn record() -> SessionRecord {
        let mut record = SessionRecord::new("s1".to_string());
        record.stage = Stage::Verification;
        record
    }

    #[test]
    fn test_asks_phone_when_absent() {
        let result = handler().handle(&record(), &FactsPatch::default(), &[]);
        assert_eq!(result.reply, ReplyDirective::AskPhone);
        assert_eq!(result.proposed_stage, Stage::Verification);
    }

    #[test]
    fn test_fresh_phone_requests_kyc() {
        let patch = FactsPatch {
            phone: Some("9876543210".to_string()),
            ..FactsPatch::default()
        };
        let result = handler().handle(&record(), &patch, &[Intent::ProvideInfo]);

        assert_eq!(result.side_effects, vec![SideEffect::VerifyKyc]);
        assert_eq!(result.reply, ReplyDirective::VerifyingIdentity);
        assert_eq!(result.proposed_stage, Stage::Verification);
    }

    #[test]
    fn test_verified_kyc_proposes_underwriting() {
        let mut rec = record();
        rec.facts.phone = Some("9876543210".to_string());
        rec.facts.kyc_verified = Some(true);

        let result = handler().handle(&rec, &FactsPatch::default(), &[]);
        assert_eq!(result.proposed_stage, Stage::Underwriting);
        assert_eq!(result.side_effects, vec![SideEffect::CreditLookup]);
    }

    #[test]
    fn test_kyc_failure_retries_then_rejects() {
        let mut rec = record();
        rec.facts.phone = Some("9876543210".to_string());
        rec.facts.kyc_verified = Some(false);
        rec.facts.kyc_attempts = 1;

        let result = handler().handle(&rec, &FactsPatch::default(), &[]);
        assert_eq!(result.reply, ReplyDirective::KycRetry { attempts_left: 2 });
        assert!(result.decision.is_none());

        // Retry budget exhausted: initial attempt plus two retries
        rec.facts.kyc_attempts = 3;
        let result = handler().handle(&rec, &FactsPatch::default(), &[]);
        assert_eq!(result.proposed_stage, Stage::Rejected);
        assert_eq!(
            result.decision,
            Some((DecisionOutcome::Rejected, DecisionReason::KycFailed))
        );
    }

    #[test]
    fn test_fresh_phone_does_not_reopen_exhausted_budget() {
        let mut rec = record();
        rec.facts.phone = Some("9876543210".to_string());
        rec.facts.kyc_verified = Some(false);
        rec.facts.kyc_attempts = 3;

        let patch = FactsPatch {
            phone: Some("9123456789".to_string()),
            ..FactsPatch::default()
        };
        let result = handler().handle(&rec, &patch, &[Intent::ProvideInfo]);

        assert_eq!(result.proposed_stage, Stage::Rejected);
        assert!(result.side_effects.is_empty());
    }
}
