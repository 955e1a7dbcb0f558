//! External collaborator contracts
//!
//! KYC, credit bureau, evidence intake, and letter generation live outside
//! this core. Handlers request them by name; only the orchestrator calls
//! them, and their results come back to handlers as synthetic facts on the
//! next turn. Deterministic stubs keep the system fully functional without
//! any upstream service.

use crate::models::{CreditReport, CustomerProfile, EvidenceOutcome, Facts, KycResult, LetterReceipt};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

mod http;
pub use http::HttpCollaboratorClient;

#[async_trait::async_trait]
pub trait KycProvider: Send + Sync {
    async fn verify(&self, phone: &str, facts: &Facts) -> Result<KycResult>;
}

#[async_trait::async_trait]
pub trait CreditBureau: Send + Sync {
    async fn lookup(&self, phone: &str) -> Result<CreditReport>;
}

#[async_trait::async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn await_evidence(&self, session_id: &str) -> Result<EvidenceOutcome>;
}

#[async_trait::async_trait]
pub trait LetterGenerator: Send + Sync {
    async fn generate(&self, session_id: &str, facts: &Facts) -> Result<LetterReceipt>;
}

/// The collaborator bundle the orchestrator dispatches against.
#[derive(Clone)]
pub struct Collaborators {
    pub kyc: Arc<dyn KycProvider>,
    pub credit: Arc<dyn CreditBureau>,
    pub evidence: Arc<dyn EvidenceProvider>,
    pub letters: Arc<dyn LetterGenerator>,
}

impl Collaborators {
    /// Deterministic stub bundle for development and tests.
    pub fn stub() -> Self {
        Self {
            kyc: Arc::new(StubKycProvider),
            credit: Arc::new(StubCreditBureau::new()),
            evidence: Arc::new(StubEvidenceProvider::new()),
            letters: Arc::new(StubLetterGenerator),
        }
    }
}

//
// ================= Deterministic Stubs =================
//

const STUB_NAMES: &[&str] = &[
    "Rajesh Kumar",
    "Priya Sharma",
    "Amit Patel",
    "Sunita Verma",
    "Vikram Singh",
    "Anita Desai",
];

fn digit_sum(phone: &str) -> u32 {
    phone.chars().filter_map(|c| c.to_digit(10)).sum()
}

/// Verifies any plausible mobile number not ending in 0, with a profile
/// derived from the digits so the same customer always looks the same.
pub struct StubKycProvider;

#[async_trait::async_trait]
impl KycProvider for StubKycProvider {
    async fn verify(&self, phone: &str, _facts: &Facts) -> Result<KycResult> {
        let verified = phone.len() == 10
            && phone.starts_with(['6', '7', '8', '9'])
            && !phone.ends_with('0');

        if !verified {
            return Ok(KycResult {
                verified: false,
                profile: None,
            });
        }

        let seed = digit_sum(phone);
        Ok(KycResult {
            verified: true,
            profile: Some(CustomerProfile {
                name: STUB_NAMES[(seed as usize) % STUB_NAMES.len()].to_string(),
                monthly_salary: 30_000.0 + f64::from(seed % 8) * 10_000.0,
            }),
        })
    }
}

/// Phone-seeded credit report, optionally pinned to a fixed report for
/// scripted demos and tests.
pub struct StubCreditBureau {
    fixed: Option<CreditReport>,
}

impl StubCreditBureau {
    pub fn new() -> Self {
        Self { fixed: None }
    }

    pub fn with_report(report: CreditReport) -> Self {
        Self { fixed: Some(report) }
    }
}

impl Default for StubCreditBureau {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CreditBureau for StubCreditBureau {
    async fn lookup(&self, phone: &str) -> Result<CreditReport> {
        if let Some(report) = &self.fixed {
            return Ok(report.clone());
        }

        let seed = digit_sum(phone);
        let credit_score = 600 + (seed * 7) % 251;
        // Limit scales with score, rounded to the nearest 10k
        let raw_limit = f64::from(credit_score - 500) * 1_500.0;
        let pre_approved_limit =
            (raw_limit / 10_000.0).round() * 10_000.0;

        Ok(CreditReport {
            credit_score: credit_score as u16,
            pre_approved_limit: pre_approved_limit.clamp(50_000.0, 2_000_000.0),
        })
    }
}

/// Evidence intake with an explicit deposit hook: nothing is "uploaded"
/// until the driving test or demo says so.
pub struct StubEvidenceProvider {
    deposits: Arc<RwLock<HashMap<String, EvidenceOutcome>>>,
}

impl StubEvidenceProvider {
    pub fn new() -> Self {
        Self {
            deposits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Simulate the customer uploading a salary slip.
    pub async fn supply(&self, session_id: &str, monthly_income: f64) {
        let mut deposits = self.deposits.write().await;
        deposits.insert(
            session_id.to_string(),
            EvidenceOutcome {
                provided: true,
                extracted_monthly_income: Some(monthly_income),
            },
        );
    }
}

impl Default for StubEvidenceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EvidenceProvider for StubEvidenceProvider {
    async fn await_evidence(&self, session_id: &str) -> Result<EvidenceOutcome> {
        let deposits = self.deposits.read().await;
        Ok(deposits.get(session_id).cloned().unwrap_or(EvidenceOutcome {
            provided: false,
            extracted_monthly_income: None,
        }))
    }
}

pub struct StubLetterGenerator;

#[async_trait::async_trait]
impl LetterGenerator for StubLetterGenerator {
    async fn generate(&self, session_id: &str, _facts: &Facts) -> Result<LetterReceipt> {
        Ok(LetterReceipt {
            path: format!("letters/{}.pdf", session_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_kyc_is_deterministic() {
        let kyc = StubKycProvider;
        let facts = Facts::default();

        let first = kyc.verify("9876543210", &facts).await.unwrap();
        // Ends in 0: this stub treats it as an unregistered customer
        assert!(!first.verified);

        let a = kyc.verify("9876543211", &facts).await.unwrap();
        let b = kyc.verify("9876543211", &facts).await.unwrap();
        assert!(a.verified);
        assert_eq!(
            a.profile.as_ref().map(|p| p.name.clone()),
            b.profile.as_ref().map(|p| p.name.clone())
        );
    }

    #[tokio::test]
    async fn test_stub_bureau_same_phone_same_report() {
        let bureau = StubCreditBureau::new();
        let a = bureau.lookup("9876543211").await.unwrap();
        let b = bureau.lookup("9876543211").await.unwrap();
        assert_eq!(a.credit_score, b.credit_score);
        assert_eq!(a.pre_approved_limit, b.pre_approved_limit);
        assert!(a.pre_approved_limit >= 50_000.0);
    }

    #[tokio::test]
    async fn test_evidence_flows_after_deposit() {
        let evidence = StubEvidenceProvider::new();

        let before = evidence.await_evidence("s1").await.unwrap();
        assert!(!before.provided);

        evidence.supply("s1", 80_000.0).await;
        let after = evidence.await_evidence("s1").await.unwrap();
        assert!(after.provided);
        assert_eq!(after.extracted_monthly_income, Some(80_000.0));
    }
}
