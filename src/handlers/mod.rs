//! Stage handlers
//!
//! One handler per conversation stage, all implementing a single pure
//! contract: `(record, facts patch, intents) -> HandlerResult`. Handlers
//! never touch the store or collaborators; external actions are named as
//! side-effect requests and performed by the orchestrator.

use crate::config::EngineConfig;
use crate::models::{Facts, FactsPatch, HandlerResult, Intent, ReplyDirective, SessionRecord, Stage};

mod sales;
mod sanction;
mod underwriting;
mod verification;

pub use sales::SalesHandler;
pub use sanction::SanctionHandler;
pub use underwriting::UnderwritingHandler;
pub use verification::VerificationHandler;

/// Common contract for the per-stage processing units.
pub trait StageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(
        &self,
        record: &SessionRecord,
        patch: &FactsPatch,
        intents: &[Intent],
    ) -> HandlerResult;
}

/// The facts as this turn sees them: stored facts with the extractor's
/// patch applied on top.
pub(crate) fn combined_facts(record: &SessionRecord, patch: &FactsPatch) -> Facts {
    let mut facts = record.facts.clone();
    patch.apply_to(&mut facts);
    facts
}

/// Fallback handler for repeated UNKNOWN-intent turns: re-anchors the user
/// at the current stage instead of repeating an unmet field request.
pub struct ClarificationHandler;

impl StageHandler for ClarificationHandler {
    fn name(&self) -> &'static str {
        "clarification"
    }

    fn handle(
        &self,
        record: &SessionRecord,
        _patch: &FactsPatch,
        _intents: &[Intent],
    ) -> HandlerResult {
        HandlerResult::stay(record.stage, ReplyDirective::Clarify)
    }
}

/// The closed set of handlers the router can select from. Adding a stage
/// means adding a field here and an edge to the transition graph.
pub struct HandlerSet {
    pub sales: Box<dyn StageHandler>,
    pub verification: Box<dyn StageHandler>,
    pub underwriting: Box<dyn StageHandler>,
    pub sanction: Box<dyn StageHandler>,
    pub clarification: Box<dyn StageHandler>,
}

impl HandlerSet {
    pub fn standard(config: EngineConfig) -> Self {
        Self {
            sales: Box::new(SalesHandler::new(config.clone())),
            verification: Box::new(VerificationHandler::new(config.clone())),
            underwriting: Box::new(UnderwritingHandler::new(config)),
            sanction: Box::new(SanctionHandler),
            clarification: Box::new(ClarificationHandler),
        }
    }

    /// Default stage-to-handler mapping; the router applies overrides on top.
    pub fn for_stage(&self, stage: Stage) -> &dyn StageHandler {
        match stage {
            Stage::Greeting | Stage::Sales => self.sales.as_ref(),
            Stage::Verification => self.verification.as_ref(),
            Stage::Underwriting | Stage::AwaitingEvidence => self.underwriting.as_ref(),
            Stage::Decision | Stage::Completed | Stage::Rejected => self.sanction.as_ref(),
        }
    }
}
