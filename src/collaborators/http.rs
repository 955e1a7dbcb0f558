//! HTTP-backed collaborator clients
//!
//! One shared client against the collaborator gateway configured via
//! `COLLABORATOR_API_BASE_URL`. Each trait maps to a single JSON endpoint.

use super::{Collaborators, CreditBureau, EvidenceProvider, KycProvider, LetterGenerator};
use crate::error::OrchestrationError;
use crate::models::{CreditReport, EvidenceOutcome, Facts, KycResult, LetterReceipt};
use crate::Result;
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct HttpCollaboratorClient {
    client: Client,
    base_url: String,
}

impl HttpCollaboratorClient {
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("COLLABORATOR_API_BASE_URL").ok()?;

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(15))
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full collaborator bundle backed by this client, or `None` when no
    /// gateway is configured.
    pub fn bundle_from_env() -> Option<Collaborators> {
        let client = Self::from_env()?;
        let shared = Arc::new(client);
        Some(Collaborators {
            kyc: shared.clone(),
            credit: shared.clone(),
            evidence: shared.clone(),
            letters: shared,
        })
    }

    async fn post_json(&self, path: &str, collaborator: &'static str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| OrchestrationError::CollaboratorError {
                collaborator,
                detail: format!("request failed for {}: {}", path, e),
            })?;

        let status = response.status();
        let body = response.json::<Value>().await.map_err(|e| {
            OrchestrationError::CollaboratorError {
                collaborator,
                detail: format!("invalid JSON response: {}", e),
            }
        })?;

        if !status.is_success() {
            return Err(OrchestrationError::CollaboratorError {
                collaborator,
                detail: format!("{} returned {}: {}", path, status, body),
            });
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl KycProvider for HttpCollaboratorClient {
    async fn verify(&self, phone: &str, facts: &Facts) -> Result<KycResult> {
        let body = json!({ "phone": phone, "facts": facts });
        let response = self.post_json("/kyc/verify", "kyc", &body).await?;
        serde_json::from_value(response).map_err(OrchestrationError::from)
    }
}

#[async_trait::async_trait]
impl CreditBureau for HttpCollaboratorClient {
    async fn lookup(&self, phone: &str) -> Result<CreditReport> {
        let body = json!({ "phone": phone });
        let response = self.post_json("/credit/lookup", "credit_bureau", &body).await?;
        serde_json::from_value(response).map_err(OrchestrationError::from)
    }
}

#[async_trait::async_trait]
impl EvidenceProvider for HttpCollaboratorClient {
    async fn await_evidence(&self, session_id: &str) -> Result<EvidenceOutcome> {
        let body = json!({ "session_id": session_id });
        let response = self.post_json("/evidence/poll", "evidence", &body).await?;
        serde_json::from_value(response).map_err(OrchestrationError::from)
    }
}

#[async_trait::async_trait]
impl LetterGenerator for HttpCollaboratorClient {
    async fn generate(&self, session_id: &str, facts: &Facts) -> Result<LetterReceipt> {
        let body = json!({ "session_id": session_id, "decision_facts": facts });
        let response = self
            .post_json("/letters/generate", "letter_generator", &body)
            .await?;
        serde_json::from_value(response).map_err(OrchestrationError::from)
    }
}
