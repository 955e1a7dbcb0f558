use loan_agent_orchestrator::{
    collaborators::{Collaborators, StubCreditBureau, StubEvidenceProvider, StubKycProvider, StubLetterGenerator},
    config::EngineConfig,
    models::{CreditReport, TurnRequest},
    orchestrator::Orchestrator,
    render::TemplateRenderer,
    session::InMemorySessionStore,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    dotenv::dotenv().ok();

    info!("Loan Conversation Orchestrator - scripted demo");

    // Pinned credit report so the demo always walks the approval path
    let evidence = Arc::new(StubEvidenceProvider::new());
    let collaborators = Collaborators {
        kyc: Arc::new(StubKycProvider),
        credit: Arc::new(StubCreditBureau::with_report(CreditReport {
            credit_score: 780,
            pre_approved_limit: 300_000.0,
        })),
        evidence: evidence.clone(),
        letters: Arc::new(StubLetterGenerator),
    };

    let orchestrator = Orchestrator::new(
        Box::new(InMemorySessionStore::new()),
        collaborators,
        Box::new(TemplateRenderer),
        EngineConfig::from_env(),
    );

    let session_id = "demo-session".to_string();
    let script = [
        "hi",
        "I need 2 lakh",
        "24 months",
        "3",
        "9876543211",
        "ok",
        "go ahead",
        "ok",
    ];

    for message in script {
        println!("\nUser:  {}", message);

        let reply = orchestrator
            .handle_turn(&TurnRequest {
                session_id: Some(session_id.clone()),
                message: message.to_string(),
                phone: None,
            })
            .await?;

        println!("Agent: {}", reply.message);
        println!("       [stage: {} | final: {}]", reply.stage, reply.final_reply);

        if reply.final_reply {
            break;
        }
    }

    let record = orchestrator.session(&session_id).await?;
    println!("\n=== SESSION SUMMARY ===");
    println!("Stage:    {}", record.stage);
    println!("Version:  {}", record.version);
    if let Some(decision) = &record.decision {
        println!("Decision: {:?} ({:?})", decision.outcome, decision.reason);
    }

    for audit in orchestrator.audit().list_for_session(&session_id).await? {
        println!("Audit:    {} hash={}", audit.audit_id, &audit.record_hash[..16]);
    }

    Ok(())
}
