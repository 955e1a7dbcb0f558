//! Sales handler
//!
//! Collects the loan requirement (amount, tenure, purpose) and negotiates
//! out-of-bounds requests with counter-proposals instead of refusals.

use super::{combined_facts, StageHandler};
use crate::config::EngineConfig;
use crate::models::{
    FactsPatch, HandlerResult, Intent, ReplyDirective, SessionRecord, Stage,
};

pub struct SalesHandler {
    config: EngineConfig,
}

impl SalesHandler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl StageHandler for SalesHandler {
    fn name(&self) -> &'static str {
        "sales"
    }

    fn handle(
        &self,
        record: &SessionRecord,
        patch: &FactsPatch,
        _intents: &[Intent],
    ) -> HandlerResult {
        let mut out_patch = patch.clone();

        // First contact: pitch the product and open the amount question.
        // Anything already extracted from the opening message is kept.
        if record.stage == Stage::Greeting {
            return HandlerResult {
                facts_patch: out_patch,
                reply: ReplyDirective::Greet,
                proposed_stage: Stage::Sales,
                side_effects: Vec::new(),
                decision: None,
            };
        }

        let facts = combined_facts(record, patch);

        // Amount: counter-propose at the product bounds rather than reject.
        // The counter value is recorded provisionally; a later correction
        // simply overwrites it.
        let reply = match facts.requested_amount {
            None => Some(ReplyDirective::AskAmount),
            Some(amount) if amount < self.config.min_amount => {
                out_patch.requested_amount = Some(self.config.min_amount);
                Some(ReplyDirective::AmountBelowMinimum {
                    minimum: self.config.min_amount,
                })
            }
            Some(amount) if amount > self.config.max_amount => {
                out_patch.requested_amount = Some(self.config.max_amount);
                Some(ReplyDirective::CounterOffer {
                    ceiling: self.config.max_amount,
                })
            }
            Some(_) => None,
        };
        if let Some(reply) = reply {
            return HandlerResult {
                facts_patch: out_patch,
                reply,
                proposed_stage: Stage::Sales,
                side_effects: Vec::new(),
                decision: None,
            };
        }
        let amount = facts.requested_amount.unwrap_or_default();

        // Tenure: same counter-proposal treatment at the range bounds.
        let reply = match facts.tenure_months {
            None => Some(ReplyDirective::AskTenure { amount }),
            Some(months)
                if months < self.config.min_tenure_months
                    || months > self.config.max_tenure_months =>
            {
                let clamped = months
                    .max(self.config.min_tenure_months)
                    .min(self.config.max_tenure_months);
                out_patch.tenure_months = Some(clamped);
                Some(ReplyDirective::TenureOutOfRange {
                    min_months: self.config.min_tenure_months,
                    max_months: self.config.max_tenure_months,
                    amount,
                })
            }
            Some(_) => None,
        };
        if let Some(reply) = reply {
            return HandlerResult {
                facts_patch: out_patch,
                reply,
                proposed_stage: Stage::Sales,
                side_effects: Vec::new(),
                decision: None,
            };
        }

        if facts.purpose.is_none() {
            return HandlerResult {
                facts_patch: out_patch,
                reply: ReplyDirective::AskPurpose,
                proposed_stage: Stage::Sales,
                side_effects: Vec::new(),
                decision: None,
            };
        }

        // Requirement complete and inside product bounds: hand over to KYC.
        HandlerResult {
            facts_patch: out_patch,
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
    use crate::models::LoanPurpose;

    fn handler() -> SalesHandler {
        SalesHandler::new(EngineConfig::default())
    }

    fn record_at(stage: Stage) -> SessionRecord {
        let mut record = SessionRecord::new("s1".to_string());
        record.stage = stage;
        record
    }

    #[test]
    fn test_greeting_moves_to_sales() {
        let result = handler().handle(&record_at(Stage::Greeting), &FactsPatch::default(), &[]);
        assert_eq!(result.proposed_stage, Stage::Sales);
        assert_eq!(result.reply, ReplyDirective::Greet);
    }

    #[test]
    fn test_asks_for_missing_fields_in_order() {
        let h = handler();
        let mut record = record_at(Stage::Sales);

        let result = h.handle(&record, &FactsPatch::default(), &[]);
        assert_eq!(result.reply, ReplyDirective::AskAmount);

        record.facts.requested_amount = Some(200_000.0);
        let result = h.handle(&record, &FactsPatch::default(), &[]);
        assert_eq!(result.reply, ReplyDirective::AskTenure { amount: 200_000.0 });

        record.facts.tenure_months = Some(24);
        let result = h.handle(&record, &FactsPatch::default(), &[]);
        assert_eq!(result.reply, ReplyDirective::AskPurpose);
    }

    #[test]
    fn test_complete_requirement_proposes_verification() {
        let mut record = record_at(Stage::Sales);
        record.facts.requested_amount = Some(200_000.0);
        record.facts.tenure_months = Some(24);

        let patch = FactsPatch {
            purpose: Some(LoanPurpose::Education),
            ..FactsPatch::default()
        };
        let result = handler().handle(&record, &patch, &[Intent::ProvideInfo]);

        assert_eq!(result.proposed_stage, Stage::Verification);
        assert_eq!(result.reply, ReplyDirective::AskPhone);
        assert_eq!(result.facts_patch.purpose, Some(LoanPurpose::Education));
    }

    #[test]
    fn test_over_ceiling_counter_offer() {
        let record = record_at(Stage::Sales);
        let patch = FactsPatch {
            requested_amount: Some(9_000_000.0),
            ..FactsPatch::default()
        };
        let result = handler().handle(&record, &patch, &[Intent::ProvideInfo]);

        assert_eq!(result.proposed_stage, Stage::Sales);
        assert_eq!(
            result.reply,
            ReplyDirective::CounterOffer { ceiling: 5_000_000.0 }
        );
        // Counter amount is recorded provisionally
        assert_eq!(result.facts_patch.requested_amount, Some(5_000_000.0));
    }

    #[test]
    fn test_below_minimum_counter_offer() {
        let record = record_at(Stage::Sales);
        let patch = FactsPatch {
            requested_amount: Some(5_000.0),
            ..FactsPatch::default()
        };
        let result = handler().handle(&record, &patch, &[Intent::ProvideInfo]);

        assert_eq!(
            result.reply,
            ReplyDirective::AmountBelowMinimum { minimum: 10_000.0 }
        );
        assert_eq!(result.facts_patch.requested_amount, Some(10_000.0));
    }

    #[test]
    fn test_tenure_clamped_to_range() {
        let mut record = record_at(Stage::Sales);
        record.facts.requested_amount = Some(200_000.0);

        let patch = FactsPatch {
            tenure_months: Some(120),
            ..FactsPatch::default()
        };
        let result = handler().handle(&record, &patch, &[Intent::ProvideInfo]);

        assert_eq!(result.facts_patch.tenure_months, Some(84));
        assert!(matches!(
            result.reply,
            ReplyDirective::TenureOutOfRange { max_months: 84, .. }
        ));
    }
}
