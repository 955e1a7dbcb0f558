//! Conversation Orchestrator
//!
//! The public entry point. Owns the per-turn transaction: load (or create)
//! the session, extract facts, route to a stage handler, validate the
//! proposed transition against the stage graph, perform requested side
//! effects, and commit through the store's compare-and-swap. A conflicting
//! commit is retried once against the freshly loaded record; a second
//! conflict fails the turn instead of double-applying it.

use crate::audit::DecisionAuditLog;
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::error::OrchestrationError;
use crate::extractor::{Extraction, FactExtractor};
use crate::handlers::{HandlerSet, StageHandler};
use crate::models::{
    Actor, Decision, DecisionOutcome, DecisionReason, HandlerResult, Intent, ReplyDirective,
    SessionRecord, SideEffect, Stage, TurnReply, TurnRequest,
};
use crate::render::UtteranceRenderer;
use crate::router::{Route, Router};
use crate::session::SessionStore;
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Legal successors per stage. Self-edges cover incomplete-collection and
/// collaborator-wait turns; every non-terminal stage may fall to REJECTED
/// for abandonment or a terminal business rejection. Terminal stages have
/// no outgoing edges.
pub fn successors(stage: Stage) -> &'static [Stage] {
    match stage {
        Stage::Greeting => &[Stage::Greeting, Stage::Sales, Stage::Rejected],
        Stage::Sales => &[Stage::Sales, Stage::Verification, Stage::Rejected],
        Stage::Verification => &[
            Stage::Verification,
            Stage::Underwriting,
            Stage::Rejected,
        ],
        Stage::Underwriting => &[
            Stage::Underwriting,
            Stage::AwaitingEvidence,
            Stage::Decision,
            Stage::Rejected,
        ],
        Stage::AwaitingEvidence => &[
            Stage::AwaitingEvidence,
            Stage::Underwriting,
            Stage::Rejected,
        ],
        Stage::Decision => &[Stage::Decision, Stage::Completed, Stage::Rejected],
        Stage::Completed | Stage::Rejected => &[],
    }
}

/// Reject any handler proposal not present in the stage graph. This is a
/// programming-error-class failure, not a user-facing one.
pub fn validate_transition(from: Stage, to: Stage) -> Result<()> {
    if successors(from).contains(&to) {
        return Ok(());
    }
    Err(OrchestrationError::IllegalTransition {
        from: from.to_string(),
        to: to.to_string(),
    })
}

/// Longest message the conversation will try to interpret.
const MAX_MESSAGE_CHARS: usize = 2000;

pub struct Orchestrator {
    store: Box<dyn SessionStore>,
    extractor: FactExtractor,
    router: Router,
    handlers: HandlerSet,
    collaborators: Collaborators,
    renderer: Box<dyn UtteranceRenderer>,
    audit: DecisionAuditLog,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Box<dyn SessionStore>,
        collaborators: Collaborators,
        renderer: Box<dyn UtteranceRenderer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            extractor: FactExtractor::new(config.clone()),
            router: Router::new(config.clone()),
            handlers: HandlerSet::standard(config.clone()),
            collaborators,
            renderer,
            audit: DecisionAuditLog::new(),
            config,
        }
    }

    /// Replace the standard handler set; used by tests to inject misbehaving
    /// handlers.
    pub fn with_handlers(mut self, handlers: HandlerSet) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn audit(&self) -> &DecisionAuditLog {
        &self.audit
    }

    pub async fn session(&self, session_id: &str) -> Result<SessionRecord> {
        self.store.get(session_id).await
    }

    /// Process one inbound turn end to end.
    pub async fn handle_turn(&self, request: &TurnRequest) -> Result<TurnReply> {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut retried = false;
        loop {
            let record = self.load_or_create(&session_id).await?;

            // Archived sessions are read-only; replying is idempotent.
            if record.is_terminal() {
                debug!(session_id = %session_id, stage = %record.stage, "Turn on terminal session");
                return Ok(self.build_reply(&record, &ReplyDirective::AlreadyClosed, None));
            }

            let base_version = record.version;
            let (updated, directive) = self.run_turn(&record, request).await?;

            let utterance = self.renderer.render(&directive, &updated);
            let mut candidate = updated;
            candidate.append_turn(Actor::System, utterance.message.clone());

            match self
                .store
                .compare_and_swap(&session_id, base_version, candidate)
                .await
            {
                Ok(committed) => {
                    let audit_id = self.record_decision(&record, &committed).await?;
                    info!(
                        session_id = %session_id,
                        stage = %committed.stage,
                        version = committed.version,
                        "Turn committed"
                    );
                    return Ok(self.build_reply(&committed, &directive, audit_id));
                }
                Err(OrchestrationError::VersionConflict { .. }) if !retried => {
                    warn!(session_id = %session_id, "Version conflict; retrying turn once");
                    retried = true;
                }
                Err(OrchestrationError::VersionConflict { .. }) => {
                    error!(session_id = %session_id, "Second version conflict; dropping turn");
                    return Err(OrchestrationError::ConcurrentModification(session_id));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Abandon a session from outside the conversation (external timeout).
    /// Idempotent: abandoning a terminal session changes nothing.
    pub async fn abandon(&self, session_id: &str) -> Result<TurnReply> {
        let mut retried = false;
        loop {
            let record = self.store.get(session_id).await?;
            if record.is_terminal() {
                return Ok(self.build_reply(&record, &ReplyDirective::AlreadyClosed, None));
            }

            let base_version = record.version;
            let mut updated = record.clone();
            validate_transition(updated.stage, Stage::Rejected)?;
            updated.stage = Stage::Rejected;
            updated.decision = Some(Decision {
                outcome: DecisionOutcome::Rejected,
                reason: DecisionReason::UserAbandoned,
                decided_at: Utc::now(),
            });

            let utterance = self.renderer.render(&ReplyDirective::Abandoned, &updated);
            updated.append_turn(Actor::System, utterance.message);

            match self
                .store
                .compare_and_swap(session_id, base_version, updated)
                .await
            {
                Ok(committed) => {
                    let audit_id = self.record_decision(&record, &committed).await?;
                    return Ok(self.build_reply(&committed, &ReplyDirective::Abandoned, audit_id));
                }
                Err(OrchestrationError::VersionConflict { .. }) if !retried => retried = true,
                Err(OrchestrationError::VersionConflict { .. }) => {
                    return Err(OrchestrationError::ConcurrentModification(
                        session_id.to_string(),
                    ));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load_or_create(&self, session_id: &str) -> Result<SessionRecord> {
        match self.store.get(session_id).await {
            Ok(record) => Ok(record),
            Err(OrchestrationError::SessionNotFound(_)) => {
                info!(session_id = %session_id, "Creating new session");
                self.store.create(session_id).await
            }
            Err(e) => Err(e),
        }
    }

    /// Compute the updated record and reply for one turn. Nothing here
    /// touches the store; commit happens in the caller.
    async fn run_turn(
        &self,
        record: &SessionRecord,
        request: &TurnRequest,
    ) -> Result<(SessionRecord, ReplyDirective)> {
        // Off-script input guard: empty and over-long messages are
        // re-prompted without touching the extractor.
        let trimmed = request.message.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_MESSAGE_CHARS {
            let mut updated = record.clone();
            updated.append_turn(Actor::User, request.message.clone());
            return Ok((updated, ReplyDirective::Clarify));
        }

        let mut extraction = self.extractor.extract(
            &request.message,
            record.stage,
            record.recent_turns(self.config.extractor_context_turns),
        );

        // A caller-supplied phone counts as a provided fact
        if extraction.patch.phone.is_none() {
            if let Some(phone) = &request.phone {
                extraction.patch.phone = Some(phone.clone());
            }
        }

        let route = self.router.route(record, &extraction.intents);
        debug!(
            session_id = %record.session_id,
            stage = %record.stage,
            ?route,
            intents = ?extraction.intents,
            "Routed turn"
        );

        let mut updated = record.clone();
        updated.append_turn(Actor::User, request.message.clone());
        updated.unknown_streak = if extraction.intents.contains(&Intent::Unknown) {
            updated.unknown_streak + 1
        } else {
            0
        };

        let result = match route {
            Route::Abandon => {
                info!(session_id = %record.session_id, "User abandoned the application");
                HandlerResult {
                    facts_patch: extraction.patch.clone(),
                    reply: ReplyDirective::Abandoned,
                    proposed_stage: Stage::Rejected,
                    side_effects: Vec::new(),
                    decision: Some((DecisionOutcome::Rejected, DecisionReason::UserAbandoned)),
                }
            }
            Route::Clarify => self.invoke(self.handlers.clarification.as_ref(), record, &extraction),
            Route::Stage(stage) => {
                self.invoke(self.handlers.for_stage(stage), record, &extraction)
            }
        };

        validate_transition(record.stage, result.proposed_stage).map_err(|e| {
            error!(
                session_id = %record.session_id,
                from = %record.stage,
                to = %result.proposed_stage,
                "Handler proposed an illegal transition"
            );
            e
        })?;

        result.facts_patch.apply_to(&mut updated.facts);

        let mut directive = result.reply;
        let mut proposed_stage = result.proposed_stage;
        let mut decision = result.decision;

        // Perform the requested side effects and fold their results into
        // the facts. A failing required collaborator holds the session at
        // its current stage; the letter collaborator only degrades.
        if !self
            .dispatch_side_effects(&mut updated, &result.side_effects)
            .await
        {
            directive = ReplyDirective::TechnicalDifficulty;
            proposed_stage = record.stage;
            decision = None;
        }

        updated.stage = proposed_stage;
        if let Some((outcome, reason)) = decision {
            updated.decision = Some(Decision {
                outcome,
                reason,
                decided_at: Utc::now(),
            });
        }

        self.check_invariants(&updated)?;
        Ok((updated, directive))
    }

    fn invoke(
        &self,
        handler: &dyn StageHandler,
        record: &SessionRecord,
        extraction: &Extraction,
    ) -> HandlerResult {
        debug!(
            session_id = %record.session_id,
            handler = handler.name(),
            "Invoking stage handler"
        );
        handler.handle(record, &extraction.patch, &extraction.intents)
    }

    /// Decision set if and only if the stage is terminal; derived repayment
    /// facts present if and only if the decision is APPROVED.
    fn check_invariants(&self, record: &SessionRecord) -> Result<()> {
        if record.decision.is_some() != record.stage.is_terminal() {
            return Err(OrchestrationError::InvariantViolation(format!(
                "decision presence does not match stage {} for session {}",
                record.stage, record.session_id
            )));
        }

        let approved = matches!(
            &record.decision,
            Some(Decision {
                outcome: DecisionOutcome::Approved,
                ..
            })
        );
        let has_derived =
            record.facts.emi_amount.is_some() && record.facts.interest_rate.is_some();
        if approved != has_derived {
            return Err(OrchestrationError::InvariantViolation(format!(
                "derived repayment facts do not match decision for session {}",
                record.session_id
            )));
        }
        Ok(())
    }

    /// Returns false when a required collaborator stayed unreachable after
    /// retries, which holds the turn at its current stage.
    async fn dispatch_side_effects(
        &self,
        updated: &mut SessionRecord,
        effects: &[SideEffect],
    ) -> bool {
        for effect in effects {
            match effect {
                SideEffect::VerifyKyc => {
                    let Some(phone) = updated.facts.phone.clone() else {
                        warn!(session_id = %updated.session_id, "KYC requested without a phone");
                        continue;
                    };
                    let outcome = self
                        .retrying("kyc", || {
                            self.collaborators.kyc.verify(&phone, &updated.facts)
                        })
                        .await;
                    match outcome {
                        Ok(result) => {
                            if result.verified {
                                updated.facts.kyc_verified = Some(true);
                                if let Some(profile) = result.profile {
                                    updated.facts.customer_name = Some(profile.name);
                                }
                            } else {
                                updated.facts.kyc_verified = Some(false);
                                updated.facts.kyc_attempts += 1;
                            }
                        }
                        Err(e) => {
                            error!(session_id = %updated.session_id, error = %e, "KYC collaborator unavailable");
                            return false;
                        }
                    }
                }
                SideEffect::CreditLookup => {
                    let Some(phone) = updated.facts.phone.clone() else {
                        warn!(session_id = %updated.session_id, "Credit lookup requested without a phone");
                        continue;
                    };
                    let outcome = self
                        .retrying("credit_bureau", || self.collaborators.credit.lookup(&phone))
                        .await;
                    match outcome {
                        Ok(report) => {
                            updated.facts.credit_score = Some(report.credit_score);
                            updated.facts.pre_approved_limit = Some(report.pre_approved_limit);
                        }
                        Err(e) => {
                            error!(session_id = %updated.session_id, error = %e, "Credit bureau unavailable");
                            return false;
                        }
                    }
                }
                SideEffect::AwaitSalarySlip => {
                    let outcome = self
                        .retrying("evidence", || {
                            self.collaborators
                                .evidence
                                .await_evidence(&updated.session_id)
                        })
                        .await;
                    match outcome {
                        Ok(evidence) => {
                            if evidence.provided {
                                updated.facts.salary_evidence_provided = Some(true);
                                if let Some(income) = evidence.extracted_monthly_income {
                                    updated.facts.monthly_income = Some(income);
                                }
                            }
                        }
                        Err(e) => {
                            error!(session_id = %updated.session_id, error = %e, "Evidence collaborator unavailable");
                            return false;
                        }
                    }
                }
                SideEffect::GenerateSanctionLetter => {
                    let outcome = self
                        .retrying("letter_generator", || {
                            self.collaborators
                                .letters
                                .generate(&updated.session_id, &updated.facts)
                        })
                        .await;
                    match outcome {
                        Ok(receipt) => {
                            updated.facts.letter_path = Some(receipt.path);
                            updated.facts.letter_pending = false;
                        }
                        Err(e) => {
                            // Never block the terminal transition on a slow
                            // letter service; flag it for follow-up instead.
                            error!(
                                session_id = %updated.session_id,
                                error = %e,
                                "Letter generation failed; completing with letter pending"
                            );
                            updated.facts.letter_pending = true;
                        }
                    }
                }
            }
        }
        true
    }

    async fn retrying<T, F, Fut>(&self, label: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.collaborator_retry_limit => {
                    attempt += 1;
                    warn!(
                        collaborator = label,
                        attempt,
                        error = %e,
                        "Collaborator call failed; retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Record a freshly committed decision in the audit trail.
    async fn record_decision(
        &self,
        before: &SessionRecord,
        committed: &SessionRecord,
    ) -> Result<Option<Uuid>> {
        if before.decision.is_some() {
            return Ok(None);
        }
        match &committed.decision {
            Some(decision) => {
                let audit_id = self.audit.record(committed, decision).await?;
                info!(
                    session_id = %committed.session_id,
                    audit_id = %audit_id,
                    outcome = ?decision.outcome,
                    reason = ?decision.reason,
                    "Decision recorded"
                );
                Ok(Some(audit_id))
            }
            None => Ok(None),
        }
    }

    fn build_reply(
        &self,
        record: &SessionRecord,
        directive: &ReplyDirective,
        audit_id: Option<Uuid>,
    ) -> TurnReply {
        let utterance = self.renderer.render(directive, record);

        let mut metadata: HashMap<String, serde_json::Value> = HashMap::new();
        if let Some(decision) = &record.decision {
            metadata.insert(
                "decision".to_string(),
                serde_json::json!({
                    "outcome": decision.outcome,
                    "reason": decision.reason,
                    "decided_at": decision.decided_at,
                }),
            );
        }
        if let Some(audit_id) = audit_id {
            metadata.insert("audit_id".to_string(), serde_json::json!(audit_id));
        }
        if let Some(path) = &record.facts.letter_path {
            metadata.insert("letter_path".to_string(), serde_json::json!(path));
        }
        if record.facts.letter_pending {
            metadata.insert("letter_pending".to_string(), serde_json::json!(true));
        }

        TurnReply {
            session_id: record.session_id.clone(),
            stage: record.stage,
            message: utterance.message,
            options: utterance.options,
            final_reply: utterance.final_reply,
            metadata: if metadata.is_empty() {
                None
            } else {
                Some(metadata)
            },
        }
    }
}
