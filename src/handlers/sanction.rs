//! Sanction handler
//!
//! Runs the post-approval turn: derives the EMI and interest rate, requests
//! the sanction-letter side effect, and closes the session. The letter
//! collaborator never blocks the terminal transition; a slow or failing
//! letter service leaves the session COMPLETED with `letter_pending` set.

use super::{combined_facts, StageHandler};
use crate::models::{
    DecisionOutcome, FactsPatch, HandlerResult, Intent, ReplyDirective, SanctionSummary,
    SessionRecord, SideEffect, Stage,
};
use crate::underwriting::{evaluate, UnderwritingInput, Verdict};

/// Processing fee charged on the sanctioned principal.
const PROCESSING_FEE_RATE: f64 = 0.02;

pub struct SanctionHandler;

impl StageHandler for SanctionHandler {
    fn name(&self) -> &'static str {
        "sanction"
    }

    fn handle(
        &self,
        record: &SessionRecord,
        patch: &FactsPatch,
        _intents: &[Intent],
    ) -> HandlerResult {
        // Terminal sessions get an idempotent close-out reply.
        if record.is_terminal() {
            return HandlerResult::stay(record.stage, ReplyDirective::AlreadyClosed);
        }

        let facts = combined_facts(record, patch);
        let mut out_patch = patch.clone();

        let input = UnderwritingInput {
            credit_score: facts.credit_score.unwrap_or_default(),
            requested_amount: facts.requested_amount.unwrap_or_default(),
            pre_approved_limit: facts.pre_approved_limit.unwrap_or_default(),
            monthly_income: facts.monthly_income,
            tenure_months: facts.tenure_months.unwrap_or_default(),
            salary_evidence_provided: facts.salary_evidence_provided.unwrap_or(false),
        };

        // The engine is deterministic, so re-evaluating here reproduces the
        // verdict that admitted the session into DECISION.
        match evaluate(&input) {
            Verdict::Approved {
                reason,
                interest_rate,
                emi,
            } => {
                out_patch.emi_amount = Some(emi);
                out_patch.interest_rate = Some(interest_rate);

                let total_repayment = emi * input.tenure_months as f64;
                let summary = SanctionSummary {
                    customer_name: facts.customer_name.clone(),
                    amount: input.requested_amount,
                    tenure_months: input.tenure_months,
                    interest_rate,
                    emi,
                    total_interest: total_repayment - input.requested_amount,
                    total_repayment,
                    processing_fee: input.requested_amount * PROCESSING_FEE_RATE,
                };

                HandlerResult {
                    facts_patch: out_patch,
                    reply: ReplyDirective::SanctionSummary(Box::new(summary)),
                    proposed_stage: Stage::Completed,
                    side_effects: vec![SideEffect::GenerateSanctionLetter],
                    decision: Some((DecisionOutcome::Approved, reason)),
                }
            }
            // The facts backing the approval no longer evaluate to one.
            // Close the session with the engine's reason instead of
            // sanctioning a loan the rules would refuse.
            Verdict::Rejected { reason } => HandlerResult {
                facts_patch: out_patch,
                reply: ReplyDirective::RejectionNotice { reason },
                proposed_stage: Stage::Rejected,
                side_effects: Vec::new(),
                decision: Some((DecisionOutcome::Rejected, reason)),
            },
            // Unreachable when facts are immutable at DECISION; hold in
            // place rather than invent a transition the graph lacks.
            Verdict::PendingEvidence => {
                HandlerResult::stay(Stage::Decision, ReplyDirective::Clarify)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionReason;

    fn approved_record() -> SessionRecord {
        let mut record = SessionRecord::new("s1".to_string());
        record.stage = Stage::Decision;
        record.facts.requested_amount = Some(200_000.0);
        record.facts.tenure_months = Some(24);
        record.facts.credit_score = Some(780);
        record.facts.pre_approved_limit = Some(300_000.0);
        record.facts.customer_name = Some("Rajesh Kumar".to_string());
        record
    }

    #[test]
    fn test_sanction_completes_with_decision_and_derived_facts() {
        let result = SanctionHandler.handle(&approved_record(), &FactsPatch::default(), &[]);

        assert_eq!(result.proposed_stage, Stage::Completed);
        assert_eq!(
            result.decision,
            Some((
                DecisionOutcome::Approved,
                DecisionReason::WithinPreApprovedLimit
            ))
        );
        assert_eq!(result.side_effects, vec![SideEffect::GenerateSanctionLetter]);
        assert_eq!(result.facts_patch.interest_rate, Some(10.5));
        assert!(result.facts_patch.emi_amount.unwrap() > 0.0);

        match result.reply {
            ReplyDirective::SanctionSummary(summary) => {
                assert_eq!(summary.amount, 200_000.0);
                assert!((summary.total_repayment
                    - summary.total_interest
                    - summary.amount)
                    .abs()
                    < 1.0);
                assert_eq!(summary.processing_fee, 4_000.0);
            }
            other => panic!("expected sanction summary, got {:?}", other),
        }
    }

    #[test]
    fn test_terminal_record_is_idempotent() {
        let mut record = approved_record();
        record.stage = Stage::Completed;

        let result = SanctionHandler.handle(&record, &FactsPatch::default(), &[]);
        assert_eq!(result.proposed_stage, Stage::Completed);
        assert_eq!(result.reply, ReplyDirective::AlreadyClosed);
        assert!(result.decision.is_none());
    }
}
