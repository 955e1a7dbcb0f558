//! Utterance rendering
//!
//! Turns a semantic reply directive into user-facing text. This is the
//! pluggable seam for any richer phrasing layer; the orchestrator and
//! handlers never produce wording themselves.

use crate::models::{DecisionReason, ReplyDirective, SessionRecord};

/// Rendered reply for one turn.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub message: String,
    pub options: Vec<String>,
    pub final_reply: bool,
}

pub trait UtteranceRenderer: Send + Sync {
    fn render(&self, directive: &ReplyDirective, record: &SessionRecord) -> Utterance;
}

const PURPOSE_OPTIONS: &[&str] = &[
    "Personal",
    "Home improvement",
    "Education",
    "Medical",
    "Business",
    "Wedding",
    "Travel",
    "Debt consolidation",
];

/// Fixed-template renderer. Wording is deliberately plain; the directive
/// carries every number the text needs.
pub struct TemplateRenderer;

impl UtteranceRenderer for TemplateRenderer {
    fn render(&self, directive: &ReplyDirective, record: &SessionRecord) -> Utterance {
        let mut options = Vec::new();
        let mut final_reply = false;

        let message = match directive {
            ReplyDirective::Greet => {
                "Welcome! I can help you get a personal loan of \u{20b9}10,000 to \u{20b9}50,00,000 \
                 with approval in minutes. How much would you like to borrow?"
                    .to_string()
            }
            ReplyDirective::AskAmount => {
                "How much would you like to borrow? We offer loans from \u{20b9}10,000 to \u{20b9}50,00,000."
                    .to_string()
            }
            ReplyDirective::AmountBelowMinimum { minimum } => format!(
                "Our minimum loan amount is \u{20b9}{:.0}. Shall we proceed with \u{20b9}{:.0}, \
                 or would you like a different amount?",
                minimum, minimum
            ),
            ReplyDirective::CounterOffer { ceiling } => format!(
                "That's above our maximum of \u{20b9}{:.0}. Would \u{20b9}{:.0} work for you?",
                ceiling, ceiling
            ),
            ReplyDirective::AskTenure { amount } => format!(
                "\u{20b9}{:.0} it is. Over how many months would you like to repay? \
                 We offer 6 to 84 months; a longer tenure means a lower EMI.",
                amount
            ),
            ReplyDirective::TenureOutOfRange {
                min_months,
                max_months,
                amount,
            } => format!(
                "For a loan of \u{20b9}{:.0} we offer tenures between {} and {} months. \
                 I've noted the closest option; tell me if you'd prefer another.",
                amount, min_months, max_months
            ),
            ReplyDirective::AskPurpose => {
                options = PURPOSE_OPTIONS.iter().map(|s| s.to_string()).collect();
                "What's the purpose of this loan? Pick a number or just tell me:\n\
                 1. Personal  2. Home improvement  3. Education  4. Medical\n\
                 5. Business  6. Wedding  7. Travel  8. Debt consolidation"
                    .to_string()
            }
            ReplyDirective::AskPhone => {
                "Great, your requirement is noted. To verify your details, please share \
                 your 10-digit registered mobile number."
                    .to_string()
            }
            ReplyDirective::VerifyingIdentity => {
                "Thanks! I'm verifying your details now. Send any message to continue once \
                 you're ready."
                    .to_string()
            }
            ReplyDirective::KycRetry { attempts_left } => format!(
                "I couldn't find that number in our records. Please double-check and share \
                 your registered mobile number ({} attempt(s) left).",
                attempts_left
            ),
            ReplyDirective::FetchingOffer => {
                "You're verified! I'm checking your credit profile and pre-approved offer. \
                 Send any message to continue."
                    .to_string()
            }
            ReplyDirective::EvidenceRequested {
                amount,
                estimated_emi,
            } => format!(
                "Your profile looks good. For \u{20b9}{:.0} (estimated EMI \u{20b9}{:.0}) I need to \
                 verify your income. Please upload your latest salary slip.",
                amount, estimated_emi
            ),
            ReplyDirective::EvidenceReminder => {
                "I'm still waiting for your salary slip. Upload it and let me know, and \
                 I'll take it from there."
                    .to_string()
            }
            ReplyDirective::CheckingEvidence => {
                "Thanks! I'm checking your salary slip now. Send any message to continue."
                    .to_string()
            }
            ReplyDirective::ApprovalPreview {
                amount,
                interest_rate,
            } => format!(
                "Good news! \u{20b9}{:.0} is approved in principle at {:.1}% p.a. \
                 Send any message and I'll prepare your sanction letter.",
                amount, interest_rate
            ),
            ReplyDirective::SanctionSummary(summary) => {
                final_reply = true;
                let name = summary.customer_name.as_deref().unwrap_or("Customer");
                let letter_line = if record.facts.letter_pending {
                    "Your sanction letter will be emailed to you shortly.".to_string()
                } else {
                    match &record.facts.letter_path {
                        Some(path) => format!("Your sanction letter is ready: {}", path),
                        None => "Your sanction letter is being prepared.".to_string(),
                    }
                };
                format!(
                    "Congratulations {}! Your loan is approved.\n\
                     Amount: \u{20b9}{:.0} | Tenure: {} months | Rate: {:.1}% p.a.\n\
                     EMI: \u{20b9}{:.0} | Total interest: \u{20b9}{:.0} | Total repayment: \u{20b9}{:.0}\n\
                     Processing fee: \u{20b9}{:.0}\n{}",
                    name,
                    summary.amount,
                    summary.tenure_months,
                    summary.interest_rate,
                    summary.emi,
                    summary.total_interest,
                    summary.total_repayment,
                    summary.processing_fee,
                    letter_line
                )
            }
            ReplyDirective::RejectionNotice { reason } => {
                final_reply = true;
                format!(
                    "Thank you for your interest. Unfortunately we can't approve this \
                     application: {}",
                    rejection_text(*reason, record)
                )
            }
            ReplyDirective::Clarify => format!(
                "I want to make sure I'm helping you properly. We're at the {} step; \
                 could you rephrase that, or tell me what you'd like to do?",
                record.stage
            ),
            ReplyDirective::Abandoned => {
                final_reply = true;
                "No problem, I've closed this application. Start a new conversation any \
                 time you'd like to apply."
                    .to_string()
            }
            ReplyDirective::AlreadyClosed => {
                final_reply = true;
                "This application is already closed. Please start a new conversation for \
                 a fresh application."
                    .to_string()
            }
            ReplyDirective::TechnicalDifficulty => {
                "I'm having a technical difficulty on my side. Your application is safe; \
                 please try again in a moment."
                    .to_string()
            }
        };

        Utterance {
            message,
            options,
            final_reply,
        }
    }
}

fn rejection_text(reason: DecisionReason, record: &SessionRecord) -> String {
    match reason {
        DecisionReason::LowCreditScore => match record.facts.credit_score {
            Some(score) => format!(
                "your credit score ({}) is below our minimum requirement of 700. \
                 Paying bills on time and clearing dues will improve it.",
                score
            ),
            None => "your credit score is below our minimum requirement of 700.".to_string(),
        },
        DecisionReason::EmiExceedsIncomeRatio => {
            "the EMI would exceed half of your verified monthly income. A smaller amount \
             or longer tenure may qualify."
                .to_string()
        }
        DecisionReason::AmountExceedsMaxMultiplier => match record.facts.pre_approved_limit {
            Some(limit) => format!(
                "the requested amount exceeds \u{20b9}{:.0}, the maximum for your profile.",
                2.0 * limit
            ),
            None => "the requested amount exceeds the maximum for your profile.".to_string(),
        },
        DecisionReason::KycFailed => {
            "we couldn't verify your identity with the number provided.".to_string()
        }
        DecisionReason::UserAbandoned => "the application was cancelled.".to_string(),
        // Approval reasons never reach a rejection notice
        DecisionReason::WithinPreApprovedLimit | DecisionReason::IncomeVerified => {
            "of an internal processing issue.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SanctionSummary, SessionRecord, Stage};

    #[test]
    fn test_terminal_directives_are_final() {
        let renderer = TemplateRenderer;
        let record = SessionRecord::new("s1".to_string());

        let summary = ReplyDirective::SanctionSummary(Box::new(SanctionSummary {
            customer_name: Some("Priya Sharma".to_string()),
            amount: 200_000.0,
            tenure_months: 24,
            interest_rate: 10.5,
            emi: 9_300.0,
            total_interest: 23_200.0,
            total_repayment: 223_200.0,
            processing_fee: 4_000.0,
        }));

        assert!(renderer.render(&summary, &record).final_reply);
        assert!(renderer
            .render(
                &ReplyDirective::RejectionNotice {
                    reason: DecisionReason::LowCreditScore
                },
                &record
            )
            .final_reply);
        assert!(!renderer
            .render(&ReplyDirective::AskAmount, &record)
            .final_reply);
    }

    #[test]
    fn test_purpose_prompt_offers_menu() {
        let renderer = TemplateRenderer;
        let record = SessionRecord::new("s1".to_string());

        let utterance = renderer.render(&ReplyDirective::AskPurpose, &record);
        assert_eq!(utterance.options.len(), 8);
        assert!(utterance.message.to_lowercase().contains("purpose"));
    }

    #[test]
    fn test_letter_pending_changes_sanction_wording() {
        let renderer = TemplateRenderer;
        let mut record = SessionRecord::new("s1".to_string());
        record.stage = Stage::Completed;
        record.facts.letter_pending = true;

        let summary = ReplyDirective::SanctionSummary(Box::new(SanctionSummary {
            customer_name: None,
            amount: 200_000.0,
            tenure_months: 24,
            interest_rate: 10.5,
            emi: 9_300.0,
            total_interest: 23_200.0,
            total_repayment: 223_200.0,
            processing_fee: 4_000.0,
        }));

        let utterance = renderer.render(&summary, &record);
        assert!(utterance.message.contains("emailed to you shortly"));
    }
}
