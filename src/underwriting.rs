//! Underwriting Decision Engine
//!
//! Deterministic, I/O-free evaluation of a loan application. The rule order
//! is a documented contract: a low credit score always dominates, evidence
//! requests only occur in the pre-approved-to-double band, and the
//! income-ratio gate only applies once evidence exists. Re-evaluating with
//! identical inputs always yields the identical verdict.

use crate::models::DecisionReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum credit score the product underwrites at all.
pub const MIN_CREDIT_SCORE: u16 = 700;
/// Largest multiple of the pre-approved limit the product will consider.
pub const MAX_LIMIT_MULTIPLIER: f64 = 2.0;
/// EMI may not exceed this share of verified monthly income.
pub const MAX_EMI_INCOME_RATIO: f64 = 0.5;

//
// ================= Score Bands =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScoreBand {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ScoreBand {
    pub fn from_score(score: u16) -> Self {
        match score {
            750.. => ScoreBand::Excellent,
            700..=749 => ScoreBand::Good,
            650..=699 => ScoreBand::Fair,
            _ => ScoreBand::Poor,
        }
    }

    /// Fixed annual interest rate table keyed by band. Versioned with the
    /// crate; changing a rate is a release, not a config edit.
    pub fn annual_rate(&self) -> f64 {
        match self {
            ScoreBand::Excellent => 10.5,
            ScoreBand::Good => 12.0,
            ScoreBand::Fair => 14.5,
            ScoreBand::Poor => 18.0,
        }
    }
}

impl fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoreBand::Excellent => "Excellent",
            ScoreBand::Good => "Good",
            ScoreBand::Fair => "Fair",
            ScoreBand::Poor => "Poor",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Engine I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnderwritingInput {
    pub credit_score: u16,
    pub requested_amount: f64,
    pub pre_approved_limit: f64,
    pub monthly_income: Option<f64>,
    pub tenure_months: u32,
    pub salary_evidence_provided: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Verdict {
    Approved {
        reason: DecisionReason,
        interest_rate: f64,
        emi: f64,
    },
    Rejected {
        reason: DecisionReason,
    },
    /// Amount sits in the limit-to-double band without salary evidence;
    /// the conversation must collect a salary slip and re-evaluate.
    PendingEvidence,
}

//
// ================= Engine =================
//

/// Evaluate one application. First match wins.
pub fn evaluate(input: &UnderwritingInput) -> Verdict {
    // Rule 1: credit floor dominates everything else
    if input.credit_score < MIN_CREDIT_SCORE {
        return Verdict::Rejected {
            reason: DecisionReason::LowCreditScore,
        };
    }

    let rate = ScoreBand::from_score(input.credit_score).annual_rate();

    // Rule 2: within the pre-approved limit, approve outright
    if input.requested_amount <= input.pre_approved_limit {
        let emi = monthly_payment(input.requested_amount, rate, input.tenure_months);
        return Verdict::Approved {
            reason: DecisionReason::WithinPreApprovedLimit,
            interest_rate: rate,
            emi,
        };
    }

    // Rule 3: limit-to-double band gates on salary evidence, then income ratio
    if input.requested_amount <= MAX_LIMIT_MULTIPLIER * input.pre_approved_limit {
        let income = match (input.salary_evidence_provided, input.monthly_income) {
            (true, Some(income)) => income,
            // No usable evidence yet; request it rather than guess
            _ => return Verdict::PendingEvidence,
        };

        let emi = monthly_payment(input.requested_amount, rate, input.tenure_months);
        if emi > MAX_EMI_INCOME_RATIO * income {
            return Verdict::Rejected {
                reason: DecisionReason::EmiExceedsIncomeRatio,
            };
        }
        return Verdict::Approved {
            reason: DecisionReason::IncomeVerified,
            interest_rate: rate,
            emi,
        };
    }

    // Rule 4: beyond twice the limit there is no path to approval
    Verdict::Rejected {
        reason: DecisionReason::AmountExceedsMaxMultiplier,
    }
}

/// Closed-form annuity payment: `P * r * (1+r)^n / ((1+r)^n - 1)` with the
/// monthly rate derived from the annual percentage rate.
pub fn monthly_payment(principal: f64, annual_rate_pct: f64, tenure_months: u32) -> f64 {
    if tenure_months == 0 {
        return principal;
    }
    let r = annual_rate_pct / (12.0 * 100.0);
    if r == 0.0 {
        return principal / tenure_months as f64;
    }
    let factor = (1.0 + r).powi(tenure_months as i32);
    principal * r * factor / (factor - 1.0)
}
