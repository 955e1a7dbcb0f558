//! Core data models for the loan conversation core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

//
// ================= Enums =================
//

/// A named point in the loan-conversation state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Greeting,
    Sales,
    Verification,
    Underwriting,
    AwaitingEvidence,
    Decision,
    Completed,
    Rejected,
}

impl Stage {
    /// Terminal stages accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Rejected)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoanPurpose {
    Personal,
    HomeImprovement,
    Education,
    Medical,
    Business,
    Wedding,
    Travel,
    DebtConsolidation,
}

/// Intent tags emitted by the fact extractor. Fixed vocabulary; the router
/// only reacts to Deny and Unknown, handlers may use the rest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Apply,
    ProvideInfo,
    Negotiate,
    Confirm,
    Deny,
    UploadNotice,
    SmallTalk,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

/// Reason taxonomy for terminal decisions. Rejection reasons are the audit
/// contract; approvals carry the rule that admitted them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionReason {
    LowCreditScore,
    EmiExceedsIncomeRatio,
    AmountExceedsMaxMultiplier,
    KycFailed,
    UserAbandoned,
    WithinPreApprovedLimit,
    IncomeVerified,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    User,
    System,
}

//
// ================= Facts =================
//

/// Structured facts accumulated over the conversation. Fields are only ever
/// enriched or corrected, never removed; derived fields (`emi_amount`,
/// `interest_rate`) are present iff the session decision is APPROVED.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Facts {
    pub phone: Option<String>,
    pub requested_amount: Option<f64>,
    pub tenure_months: Option<u32>,
    pub purpose: Option<LoanPurpose>,
    pub monthly_income: Option<f64>,
    pub credit_score: Option<u16>,
    pub pre_approved_limit: Option<f64>,
    pub salary_evidence_provided: Option<bool>,
    pub emi_amount: Option<f64>,
    pub interest_rate: Option<f64>,

    // Synthetic facts fed back from collaborator side effects
    pub customer_name: Option<String>,
    pub kyc_verified: Option<bool>,
    #[serde(default)]
    pub kyc_attempts: u32,
    pub letter_path: Option<String>,
    #[serde(default)]
    pub letter_pending: bool,
}

/// Partial facts update produced by the extractor or a handler. Only fields
/// the producer is confident about are set; `None` means "no claim".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FactsPatch {
    pub phone: Option<String>,
    pub requested_amount: Option<f64>,
    pub tenure_months: Option<u32>,
    pub purpose: Option<LoanPurpose>,
    pub monthly_income: Option<f64>,
    pub credit_score: Option<u16>,
    pub pre_approved_limit: Option<f64>,
    pub salary_evidence_provided: Option<bool>,
    pub emi_amount: Option<f64>,
    pub interest_rate: Option<f64>,
    pub customer_name: Option<String>,
    pub kyc_verified: Option<bool>,
    pub kyc_attempts: Option<u32>,
    pub letter_path: Option<String>,
    pub letter_pending: Option<bool>,
}

impl FactsPatch {
    pub fn is_empty(&self) -> bool {
        *self == FactsPatch::default()
    }

    /// Apply this patch on top of existing facts. Set fields win; unset
    /// fields leave the fact untouched.
    pub fn apply_to(&self, facts: &mut Facts) {
        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &self.$field {
                    facts.$field = Some(value.clone());
                })*
            };
        }
        merge!(
            phone,
            requested_amount,
            tenure_months,
            purpose,
            monthly_income,
            credit_score,
            pre_approved_limit,
            salary_evidence_provided,
            emi_amount,
            interest_rate,
            customer_name,
            kyc_verified,
            letter_path,
        );
        if let Some(attempts) = self.kyc_attempts {
            facts.kyc_attempts = attempts;
        }
        if let Some(pending) = self.letter_pending {
            facts.letter_pending = pending;
        }
    }
}

//
// ================= Session Record =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub outcome: DecisionOutcome,
    pub reason: DecisionReason,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub actor: Actor,
    pub text: String,
    pub stage_at_time: Stage,
    pub timestamp: DateTime<Utc>,
}

/// One record per conversation. Mutated exclusively by the orchestrator via
/// the session store's compare-and-swap; `history` is append-only and
/// `version` increases by exactly 1 per committed turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub stage: Stage,
    pub facts: Facts,
    pub decision: Option<Decision>,
    pub history: Vec<Turn>,
    pub version: u64,
    /// Consecutive turns with UNKNOWN intent; reset whenever anything parses.
    #[serde(default)]
    pub unknown_streak: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session_id: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            stage: Stage::Greeting,
            facts: Facts::default(),
            decision: None,
            history: Vec::new(),
            version: 0,
            unknown_streak: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn append_turn(&mut self, actor: Actor, text: impl Into<String>) {
        self.history.push(Turn {
            actor,
            text: text.into(),
            stage_at_time: self.stage,
            timestamp: Utc::now(),
        });
    }

    /// Last N turns, oldest first, used as the extractor's context window.
    pub fn recent_turns(&self, count: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }
}

//
// ================= Handler Contract =================
//

/// External actions a handler asks the orchestrator to perform. Handlers
/// never call collaborators directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    VerifyKyc,
    CreditLookup,
    AwaitSalarySlip,
    GenerateSanctionLetter,
}

/// Semantic reply instruction handed to the utterance renderer. The renderer
/// owns the wording; handlers own the meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ReplyDirective {
    Greet,
    AskAmount,
    AmountBelowMinimum { minimum: f64 },
    CounterOffer { ceiling: f64 },
    AskTenure { amount: f64 },
    TenureOutOfRange { min_months: u32, max_months: u32, amount: f64 },
    AskPurpose,
    AskPhone,
    VerifyingIdentity,
    KycRetry { attempts_left: u32 },
    FetchingOffer,
    EvidenceRequested { amount: f64, estimated_emi: f64 },
    EvidenceReminder,
    CheckingEvidence,
    ApprovalPreview { amount: f64, interest_rate: f64 },
    SanctionSummary(Box<SanctionSummary>),
    RejectionNotice { reason: DecisionReason },
    Clarify,
    Abandoned,
    AlreadyClosed,
    TechnicalDifficulty,
}

/// Figures the renderer needs for the approval reply and the caller needs in
/// the reply metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SanctionSummary {
    pub customer_name: Option<String>,
    pub amount: f64,
    pub tenure_months: u32,
    pub interest_rate: f64,
    pub emi: f64,
    pub total_interest: f64,
    pub total_repayment: f64,
    pub processing_fee: f64,
}

/// What a stage handler returns for one turn. The orchestrator applies the
/// patch, validates the proposed transition, performs the side effects, and
/// commits; the decision field may be set only with a terminal stage.
#[derive(Debug, Clone)]
pub struct HandlerResult {
    pub facts_patch: FactsPatch,
    pub reply: ReplyDirective,
    pub proposed_stage: Stage,
    pub side_effects: Vec<SideEffect>,
    pub decision: Option<(DecisionOutcome, DecisionReason)>,
}

impl HandlerResult {
    /// A reply that keeps the session at its current stage.
    pub fn stay(stage: Stage, reply: ReplyDirective) -> Self {
        Self {
            facts_patch: FactsPatch::default(),
            reply,
            proposed_stage: stage,
            side_effects: Vec::new(),
            decision: None,
        }
    }
}

//
// ================= Collaborator I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub name: String,
    pub monthly_salary: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycResult {
    pub verified: bool,
    pub profile: Option<CustomerProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditReport {
    pub credit_score: u16,
    pub pre_approved_limit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceOutcome {
    pub provided: bool,
    pub extracted_monthly_income: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterReceipt {
    pub path: String,
}

//
// ================= Wire Types =================
//

/// Inbound turn from the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: Option<String>,
    pub message: String,
    pub phone: Option<String>,
}

/// Outbound reply directive, already rendered to text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    pub session_id: String,
    pub stage: Stage,
    pub message: String,
    pub options: Vec<String>,
    pub final_reply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Greeting => "GREETING",
            Stage::Sales => "SALES",
            Stage::Verification => "VERIFICATION",
            Stage::Underwriting => "UNDERWRITING",
            Stage::AwaitingEvidence => "AWAITING_EVIDENCE",
            Stage::Decision => "DECISION",
            Stage::Completed => "COMPLETED",
            Stage::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for LoanPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoanPurpose::Personal => "Personal",
            LoanPurpose::HomeImprovement => "Home Improvement",
            LoanPurpose::Education => "Education",
            LoanPurpose::Medical => "Medical",
            LoanPurpose::Business => "Business",
            LoanPurpose::Wedding => "Wedding",
            LoanPurpose::Travel => "Travel",
            LoanPurpose::DebtConsolidation => "Debt Consolidation",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_apply_only_sets_claimed_fields() {
        let mut facts = Facts {
            requested_amount: Some(200_000.0),
            ..Facts::default()
        };

        let patch = FactsPatch {
            tenure_months: Some(24),
            ..FactsPatch::default()
        };
        patch.apply_to(&mut facts);

        assert_eq!(facts.requested_amount, Some(200_000.0));
        assert_eq!(facts.tenure_months, Some(24));
        assert!(facts.phone.is_none());
    }

    #[test]
    fn test_patch_corrections_overwrite() {
        let mut facts = Facts {
            requested_amount: Some(200_000.0),
            ..Facts::default()
        };

        let patch = FactsPatch {
            requested_amount: Some(300_000.0),
            ..FactsPatch::default()
        };
        patch.apply_to(&mut facts);

        assert_eq!(facts.requested_amount, Some(300_000.0));
    }

    #[test]
    fn test_session_record_round_trip() {
        let mut record = SessionRecord::new("sess-1".to_string());
        record.append_turn(Actor::User, "hi");
        record.facts.requested_amount = Some(50_000.0);
        record.version = 3;

        let json = serde_json::to_string(&record).unwrap();
        let reloaded: SessionRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(record, reloaded);
        assert_eq!(reloaded.history.len(), 1);
        assert_eq!(reloaded.recent_turns(5).len(), 1);
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Rejected.is_terminal());
        assert!(!Stage::AwaitingEvidence.is_terminal());
    }
}
