//! Intelligent Router
//!
//! Selects exactly one stage handler per turn. The default mapping follows
//! the session's declared stage; overrides handle abandonment (DENY at any
//! non-terminal stage) and repeated unparseable input (the clarification
//! fallback, which breaks loops of unmet field requests).

use crate::config::EngineConfig;
use crate::models::{Intent, SessionRecord, Stage};

/// Where the orchestrator sends this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Default stage handler for the given stage.
    Stage(Stage),
    /// Termination path: the user walked away.
    Abandon,
    /// Fallback clarification handler.
    Clarify,
}

pub struct Router {
    config: EngineConfig,
}

impl Router {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// `unknown_streak` counts this turn's UNKNOWN if present; the record's
    /// stored streak covers the preceding turns.
    pub fn route(&self, record: &SessionRecord, intents: &[Intent]) -> Route {
        if !record.is_terminal() && intents.contains(&Intent::Deny) {
            return Route::Abandon;
        }

        if intents.contains(&Intent::Unknown) {
            let streak = record.unknown_streak + 1;
            if streak >= self.config.unknown_intent_threshold {
                return Route::Clarify;
            }
        }

        Route::Stage(record.stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(EngineConfig::default())
    }

    fn record_at(stage: Stage) -> SessionRecord {
        let mut record = SessionRecord::new("s1".to_string());
        record.stage = stage;
        record
    }

    #[test]
    fn test_default_mapping_follows_stage() {
        for stage in [
            Stage::Greeting,
            Stage::Sales,
            Stage::Verification,
            Stage::Underwriting,
            Stage::AwaitingEvidence,
            Stage::Decision,
        ] {
            let route = router().route(&record_at(stage), &[Intent::ProvideInfo]);
            assert_eq!(route, Route::Stage(stage));
        }
    }

    #[test]
    fn test_deny_routes_to_abandonment() {
        let route = router().route(&record_at(Stage::Sales), &[Intent::Deny]);
        assert_eq!(route, Route::Abandon);
    }

    #[test]
    fn test_deny_at_terminal_stage_is_not_abandonment() {
        let route = router().route(&record_at(Stage::Completed), &[Intent::Deny]);
        assert_eq!(route, Route::Stage(Stage::Completed));
    }

    #[test]
    fn test_unknown_streak_triggers_clarification() {
        let mut record = record_at(Stage::Sales);

        record.unknown_streak = 1;
        assert_eq!(
            router().route(&record, &[Intent::Unknown]),
            Route::Stage(Stage::Sales)
        );

        record.unknown_streak = 2;
        assert_eq!(router().route(&record, &[Intent::Unknown]), Route::Clarify);
    }

    #[test]
    fn test_known_intent_does_not_count_toward_streak() {
        let mut record = record_at(Stage::Sales);
        record.unknown_streak = 5;

        let route = router().route(&record, &[Intent::ProvideInfo]);
        assert_eq!(route, Route::Stage(Stage::Sales));
    }
}
