//! Underwriting handler
//!
//! Feeds the collected facts into the decision engine and maps its verdict
//! onto the conversation: approval preview, salary-evidence wait, or a
//! terminal rejection. Also serves the AWAITING_EVIDENCE stage, re-running
//! the engine once evidence arrives.

use super::{combined_facts, StageHandler};
use crate::config::EngineConfig;
use crate::models::{
    DecisionOutcome, FactsPatch, HandlerResult, Intent, ReplyDirective, SessionRecord,
    SideEffect, Stage,
};
use crate::underwriting::{evaluate, UnderwritingInput, Verdict};

pub struct UnderwritingHandler {
    _config: EngineConfig,
}

impl UnderwritingHandler {
    pub fn new(config: EngineConfig) -> Self {
        Self { _config: config }
    }
}

impl StageHandler for UnderwritingHandler {
    fn name(&self) -> &'static str {
        "underwriting"
    }

    fn handle(
        &self,
        record: &SessionRecord,
        patch: &FactsPatch,
        intents: &[Intent],
    ) -> HandlerResult {
        let facts = combined_facts(record, patch);

        // AWAITING_EVIDENCE: hop back to UNDERWRITING once evidence is in
        // hand; until then keep polling the evidence collaborator.
        if record.stage == Stage::AwaitingEvidence {
            if facts.salary_evidence_provided == Some(true) {
                return HandlerResult {
                    facts_patch: patch.clone(),
                    reply: ReplyDirective::FetchingOffer,
                    proposed_stage: Stage::Underwriting,
                    side_effects: Vec::new(),
                    decision: None,
                };
            }
            let reply = if intents.contains(&Intent::UploadNotice) {
                ReplyDirective::CheckingEvidence
            } else {
                ReplyDirective::EvidenceReminder
            };
            return HandlerResult {
                facts_patch: patch.clone(),
                reply,
                proposed_stage: Stage::AwaitingEvidence,
                side_effects: vec![SideEffect::AwaitSalarySlip],
                decision: None,
            };
        }

        // The credit profile is a prerequisite for any rule to fire.
        if facts.credit_score.is_none() || facts.pre_approved_limit.is_none() {
            return HandlerResult {
                facts_patch: patch.clone(),
                reply: ReplyDirective::FetchingOffer,
                proposed_stage: record.stage,
                side_effects: vec![SideEffect::CreditLookup],
                decision: None,
            };
        }

        let (requested_amount, tenure_months) = match (facts.requested_amount, facts.tenure_months)
        {
            (Some(amount), Some(tenure)) => (amount, tenure),
            // Requirement facts missing at underwriting is off-script input;
            // re-anchor rather than guess.
            _ => return HandlerResult::stay(record.stage, ReplyDirective::Clarify),
        };

        let input = UnderwritingInput {
            credit_score: facts.credit_score.unwrap_or_default(),
            requested_amount,
            pre_approved_limit: facts.pre_approved_limit.unwrap_or_default(),
            monthly_income: facts.monthly_income,
            tenure_months,
            salary_evidence_provided: facts.salary_evidence_provided.unwrap_or(false),
        };

        match evaluate(&input) {
            Verdict::Approved { interest_rate, .. } => HandlerResult {
                facts_patch: patch.clone(),
                reply: ReplyDirective::ApprovalPreview {
                    amount: requested_amount,
                    interest_rate,
                },
                proposed_stage: Stage::Decision,
                side_effects: Vec::new(),
                decision: None,
            },
            Verdict::PendingEvidence => {
                let rate =
                    crate::underwriting::ScoreBand::from_score(input.credit_score).annual_rate();
                HandlerResult {
                    facts_patch: patch.clone(),
                    reply: ReplyDirective::EvidenceRequested {
                        amount: requested_amount,
                        estimated_emi: crate::underwriting::monthly_payment(
                            requested_amount,
                            rate,
                            tenure_months,
                        ),
                    },
                    proposed_stage: Stage::AwaitingEvidence,
                    side_effects: vec![SideEffect::AwaitSalarySlip],
                    decision: None,
                }
            }
            Verdict::Rejected { reason } => HandlerResult {
                facts_patch: patch.clone(),
                reply: ReplyDirective::RejectionNotice { reason },
                proposed_stage: Stage::Rejected,
                side_effects: Vec::new(),
                decision: Some((DecisionOutcome::Rejected, reason)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionReason;

    fn handler() -> UnderwritingHandler {
        UnderwritingHandler::new(EngineConfig::default())
    }

    fn record_with_offer(amount: f64, score: u16, limit: f64) -> SessionRecord {
        let mut record = SessionRecord::new("s1".to_string());
        record.stage = Stage::Underwriting;
        record.facts.requested_amount = Some(amount);
        record.facts.tenure_months = Some(24);
        record.facts.credit_score = Some(score);
        record.facts.pre_approved_limit = Some(limit);
        record
    }

    #[test]
    fn test_missing_credit_profile_requests_lookup() {
        let mut record = SessionRecord::new("s1".to_string());
        record.stage = Stage::Underwriting;
        record.facts.requested_amount = Some(200_000.0);
        record.facts.tenure_months = Some(24);

        let result = handler().handle(&record, &FactsPatch::default(), &[]);
        assert_eq!(result.side_effects, vec![SideEffect::CreditLookup]);
        assert_eq!(result.proposed_stage, Stage::Underwriting);
    }

    #[test]
    fn test_approval_proposes_decision_stage() {
        let record = record_with_offer(200_000.0, 780, 300_000.0);
        let result = handler().handle(&record, &FactsPatch::default(), &[]);

        assert_eq!(result.proposed_stage, Stage::Decision);
        assert!(matches!(
            result.reply,
            ReplyDirective::ApprovalPreview { interest_rate, .. } if interest_rate == 10.5
        ));
        // Decision is only recorded at the terminal commit
        assert!(result.decision.is_none());
    }

    #[test]
    fn test_pending_evidence_proposes_waiting_stage() {
        let record = record_with_offer(500_000.0, 780, 300_000.0);
        let result = handler().handle(&record, &FactsPatch::default(), &[]);

        assert_eq!(result.proposed_stage, Stage::AwaitingEvidence);
        assert_eq!(result.side_effects, vec![SideEffect::AwaitSalarySlip]);
        assert!(matches!(result.reply, ReplyDirective::EvidenceRequested { .. }));
    }

    #[test]
    fn test_rejection_is_terminal_with_reason() {
        let record = record_with_offer(700_000.0, 780, 300_000.0);
        let result = handler().handle(&record, &FactsPatch::default(), &[]);

        assert_eq!(result.proposed_stage, Stage::Rejected);
        assert_eq!(
            result.decision,
            Some((
                DecisionOutcome::Rejected,
                DecisionReason::AmountExceedsMaxMultiplier
            ))
        );
    }

    #[test]
    fn test_evidence_arrival_hops_back_to_underwriting() {
        let mut record = record_with_offer(500_000.0, 780, 300_000.0);
        record.stage = Stage::AwaitingEvidence;
        record.facts.salary_evidence_provided = Some(true);
        record.facts.monthly_income = Some(100_000.0);

        let result = handler().handle(&record, &FactsPatch::default(), &[]);
        assert_eq!(result.proposed_stage, Stage::Underwriting);

        // Back at UNDERWRITING the engine re-evaluates with the evidence
        record.stage = Stage::Underwriting;
        let result = handler().handle(&record, &FactsPatch::default(), &[]);
        assert_eq!(result.proposed_stage, Stage::Decision);
    }

    #[test]
    fn test_waiting_turn_stays_in_evidence_stage() {
        let mut record = record_with_offer(500_000.0, 780, 300_000.0);
        record.stage = Stage::AwaitingEvidence;

        let result = handler().handle(&record, &FactsPatch::default(), &[Intent::SmallTalk]);
        assert_eq!(result.proposed_stage, Stage::AwaitingEvidence);
        assert_eq!(result.reply, ReplyDirective::EvidenceReminder);
        assert_eq!(result.side_effects, vec![SideEffect::AwaitSalarySlip]);
    }
}
