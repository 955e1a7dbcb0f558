//! Fact Extractor
//!
//! Converts a free-text user message plus the current stage into a partial
//! facts patch and a set of intent tags. Pure function of its inputs: no
//! session mutation, no I/O. Ambiguous values yield no patch field — a
//! handler re-prompts instead of guessing.

use crate::config::EngineConfig;
use crate::models::{Actor, FactsPatch, Intent, LoanPurpose, Stage, Turn};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref AMOUNT_LAKH: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s*(?:lakh|lac)s?\b").unwrap();
    static ref AMOUNT_CRORE: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s*crores?\b").unwrap();
    static ref AMOUNT_K: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s*k\b").unwrap();
    static ref AMOUNT_RUPEE: Regex = Regex::new(r"₹\s*(\d+(?:\.\d+)?)").unwrap();
    static ref AMOUNT_PLAIN: Regex = Regex::new(r"\b(\d{4,})\b").unwrap();
    static ref TENURE_MONTHS: Regex = Regex::new(r"(\d+)\s*(?:months?|mon\b)").unwrap();
    static ref TENURE_YEARS: Regex = Regex::new(r"(\d+)\s*(?:years?|yrs?\b)").unwrap();
    static ref BARE_NUMBER: Regex = Regex::new(r"^\s*(\d{2,3})\s*$").unwrap();
    static ref PHONE_10: Regex = Regex::new(r"\b([6-9]\d{9})\b").unwrap();
    static ref NON_DIGIT: Regex = Regex::new(r"\D").unwrap();
}

/// Single words matched against whole tokens; phrases matched by substring.
const DENY_WORDS: &[&str] = &["no", "nope", "cancel", "quit", "exit", "bye", "goodbye", "stop"];
const DENY_PHRASES: &[&str] = &["not interested", "end chat", "leave me", "don't want", "do not want"];

const CONFIRM_WORDS: &[&str] = &["yes", "yeah", "yep", "ok", "okay", "sure", "fine", "proceed", "confirm", "agreed"];
const CONFIRM_PHRASES: &[&str] = &["go ahead", "sounds good", "that works"];

const APPLY_WORDS: &[&str] = &["loan", "apply", "borrow", "need", "want"];

const NEGOTIATE_WORDS: &[&str] = &["lower", "reduce", "cheaper", "discount", "negotiate"];
const NEGOTIATE_PHRASES: &[&str] = &["better rate", "less interest", "too high", "too much"];

const UPLOAD_WORDS: &[&str] = &["uploaded", "attached", "payslip", "slip"];
const UPLOAD_PHRASES: &[&str] = &["salary slip", "sent the document", "uploaded the"];

const SMALL_TALK_WORDS: &[&str] = &["hi", "hello", "hey", "thanks", "thank", "help"];
const SMALL_TALK_PHRASES: &[&str] = &["how are you", "good morning", "good evening"];

/// What one message yielded: confident facts plus intent tags.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub patch: FactsPatch,
    pub intents: Vec<Intent>,
}

impl Extraction {
    pub fn has_intent(&self, intent: Intent) -> bool {
        self.intents.contains(&intent)
    }
}

pub struct FactExtractor {
    config: EngineConfig,
}

impl FactExtractor {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Extract facts and intents from one user message. The recent turns are
    /// the context window; stage gates which units are expected.
    pub fn extract(&self, message: &str, stage: Stage, recent_turns: &[Turn]) -> Extraction {
        let text = message.to_lowercase();
        let mut extraction = Extraction::default();

        match stage {
            Stage::Greeting | Stage::Sales => {
                extraction.patch.requested_amount = self.extract_amount(&text);
                extraction.patch.tenure_months = extract_tenure(&text, &self.config);
                extraction.patch.purpose =
                    extract_purpose(&text, purpose_menu_shown(recent_turns));
            }
            Stage::Verification => {
                extraction.patch.phone = extract_phone(&text);
            }
            Stage::AwaitingEvidence => {
                extraction.patch.monthly_income = self.extract_amount(&text);
            }
            // Underwriting and post-decision stages collect nothing new
            // from free text; side-effect facts arrive synthetically.
            _ => {}
        }

        extraction.intents = classify_intents(&text, &extraction.patch);
        extraction
    }

    /// Amount in rupees: explicit units win, then currency marker, then any
    /// number large enough to be money. Values beyond any plausible product
    /// bound are discarded as noise rather than guessed at.
    fn extract_amount(&self, text: &str) -> Option<f64> {
        let raw = text.replace(',', "");

        let amount = if let Some(cap) = AMOUNT_CRORE.captures(&raw) {
            cap[1].parse::<f64>().ok().map(|v| v * 10_000_000.0)
        } else if let Some(cap) = AMOUNT_LAKH.captures(&raw) {
            cap[1].parse::<f64>().ok().map(|v| v * 100_000.0)
        } else if let Some(cap) = AMOUNT_K.captures(&raw) {
            cap[1].parse::<f64>().ok().map(|v| v * 1_000.0)
        } else if let Some(cap) = AMOUNT_RUPEE.captures(&raw) {
            cap[1].parse::<f64>().ok()
        } else if let Some(cap) = AMOUNT_PLAIN.captures(&raw) {
            cap[1].parse::<f64>().ok()
        } else {
            None
        };

        amount.filter(|v| *v > 0.0 && *v <= self.config.max_amount * 100.0)
    }
}

fn extract_tenure(text: &str, config: &EngineConfig) -> Option<u32> {
    let raw = text.replace(',', "");

    if let Some(cap) = TENURE_YEARS.captures(&raw) {
        return cap[1].parse::<u32>().ok().map(|v| v * 12);
    }
    if let Some(cap) = TENURE_MONTHS.captures(&raw) {
        return cap[1].parse::<u32>().ok();
    }
    // A bare small number on its own line reads as months when it sits in
    // the product's tenure range; anything else stays ambiguous.
    if let Some(cap) = BARE_NUMBER.captures(&raw) {
        let n: u32 = cap[1].parse().ok()?;
        if n >= config.min_tenure_months && n <= config.max_tenure_months {
            return Some(n);
        }
    }
    None
}

fn extract_phone(text: &str) -> Option<String> {
    let digits = NON_DIGIT.replace_all(text, "");

    let candidate = if digits.len() == 12 && digits.starts_with("91") {
        digits[2..].to_string()
    } else {
        digits.to_string()
    };

    if candidate.len() == 10 && candidate.starts_with(['6', '7', '8', '9']) {
        return Some(candidate);
    }

    // Fall back to a 10-digit run embedded in mixed text
    PHONE_10
        .captures(text)
        .map(|cap| cap[1].to_string())
}

/// True when the previous system turn showed the numbered purpose menu, which
/// makes a lone digit a menu selection rather than noise.
fn purpose_menu_shown(recent_turns: &[Turn]) -> bool {
    recent_turns
        .iter()
        .rev()
        .find(|t| t.actor == Actor::System)
        .map(|t| t.text.to_lowercase().contains("purpose"))
        .unwrap_or(false)
}

fn extract_purpose(text: &str, menu_shown: bool) -> Option<LoanPurpose> {
    let trimmed = text.trim();
    let menu = [
        LoanPurpose::Personal,
        LoanPurpose::HomeImprovement,
        LoanPurpose::Education,
        LoanPurpose::Medical,
        LoanPurpose::Business,
        LoanPurpose::Wedding,
        LoanPurpose::Travel,
        LoanPurpose::DebtConsolidation,
    ];
    if menu_shown && trimmed.len() == 1 {
        if let Some(digit) = trimmed.chars().next().and_then(|c| c.to_digit(10)) {
            if (1..=8).contains(&digit) {
                return Some(menu[(digit - 1) as usize]);
            }
        }
    }

    let keyword_map: &[(&[&str], LoanPurpose)] = &[
        (&["home", "house", "renovation", "repair"], LoanPurpose::HomeImprovement),
        (&["education", "study", "course", "college", "school"], LoanPurpose::Education),
        (&["medical", "health", "hospital", "treatment"], LoanPurpose::Medical),
        (&["business", "startup", "office"], LoanPurpose::Business),
        (&["wedding", "marriage", "shaadi"], LoanPurpose::Wedding),
        (&["travel", "vacation", "trip", "holiday"], LoanPurpose::Travel),
        (&["debt", "consolidation", "payoff"], LoanPurpose::DebtConsolidation),
        (&["personal", "general"], LoanPurpose::Personal),
    ];

    for (keywords, purpose) in keyword_map {
        if keywords.iter().any(|kw| text.contains(kw)) {
            return Some(*purpose);
        }
    }
    None
}

fn classify_intents(text: &str, patch: &FactsPatch) -> Vec<Intent> {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .collect();

    let has_word = |words: &[&str]| tokens.iter().any(|t| words.contains(t));
    let has_phrase = |phrases: &[&str]| phrases.iter().any(|p| text.contains(p));

    let mut intents = Vec::new();

    if has_word(DENY_WORDS) || has_phrase(DENY_PHRASES) {
        intents.push(Intent::Deny);
    }
    if has_word(CONFIRM_WORDS) || has_phrase(CONFIRM_PHRASES) {
        intents.push(Intent::Confirm);
    }
    if has_word(NEGOTIATE_WORDS) || has_phrase(NEGOTIATE_PHRASES) {
        intents.push(Intent::Negotiate);
    }
    if has_word(UPLOAD_WORDS) || has_phrase(UPLOAD_PHRASES) {
        intents.push(Intent::UploadNotice);
    }
    if has_word(APPLY_WORDS) {
        intents.push(Intent::Apply);
    }
    if has_word(SMALL_TALK_WORDS) || has_phrase(SMALL_TALK_PHRASES) {
        intents.push(Intent::SmallTalk);
    }
    if !patch.is_empty() {
        intents.push(Intent::ProvideInfo);
    }

    if intents.is_empty() {
        intents.push(Intent::Unknown);
    }
    intents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FactExtractor {
        FactExtractor::new(EngineConfig::default())
    }

    #[test]
    fn test_amount_units() {
        let ex = extractor();
        let cases = vec![
            ("i need 5 lakh", 500_000.0),
            ("2.5 lakhs please", 250_000.0),
            ("maybe 1 crore", 10_000_000.0),
            ("50k would do", 50_000.0),
            ("₹50,000", 50_000.0),
            ("give me 200000", 200_000.0),
        ];

        for (msg, expected) in cases {
            let result = ex.extract(msg, Stage::Sales, &[]);
            assert_eq!(result.patch.requested_amount, Some(expected), "{}", msg);
            assert!(result.has_intent(Intent::ProvideInfo));
        }
    }

    #[test]
    fn test_tenure_units() {
        let ex = extractor();
        assert_eq!(
            ex.extract("2 years", Stage::Sales, &[]).patch.tenure_months,
            Some(24)
        );
        assert_eq!(
            ex.extract("18 months", Stage::Sales, &[]).patch.tenure_months,
            Some(18)
        );
        assert_eq!(
            ex.extract("24", Stage::Sales, &[]).patch.tenure_months,
            Some(24)
        );
        // Out of product range: stays ambiguous
        assert_eq!(
            ex.extract("3", Stage::Sales, &[]).patch.tenure_months,
            None
        );
    }

    #[test]
    fn test_amount_and_tenure_in_one_message() {
        let ex = extractor();
        let result = ex.extract("5 lakh for 24 months", Stage::Sales, &[]);
        assert_eq!(result.patch.requested_amount, Some(500_000.0));
        assert_eq!(result.patch.tenure_months, Some(24));
    }

    #[test]
    fn test_phone_formats() {
        let ex = extractor();
        let cases = vec![
            "9876543210",
            "+91 9876543210",
            "my number is 9876543210",
            "91-9876-543-210",
        ];
        for msg in cases {
            let result = ex.extract(msg, Stage::Verification, &[]);
            assert_eq!(result.patch.phone.as_deref(), Some("9876543210"), "{}", msg);
        }

        // Landline-style prefix is not a mobile number
        let result = ex.extract("0112345678", Stage::Verification, &[]);
        assert_eq!(result.patch.phone, None);
    }

    #[test]
    fn test_purpose_menu_and_keywords() {
        let ex = extractor();
        let menu_prompt = vec![Turn {
            actor: Actor::System,
            text: "What's the purpose of this loan? 1. Personal ...".to_string(),
            stage_at_time: Stage::Sales,
            timestamp: chrono::Utc::now(),
        }];

        assert_eq!(
            ex.extract("3", Stage::Sales, &menu_prompt).patch.purpose,
            Some(LoanPurpose::Education)
        );
        // Without the menu in context, a lone digit is not a purpose
        assert_eq!(ex.extract("3", Stage::Sales, &[]).patch.purpose, None);
        assert_eq!(
            ex.extract("it's for my wedding", Stage::Sales, &[]).patch.purpose,
            Some(LoanPurpose::Wedding)
        );
        assert_eq!(
            ex.extract("home renovation", Stage::Sales, &[]).patch.purpose,
            Some(LoanPurpose::HomeImprovement)
        );
    }

    #[test]
    fn test_deny_and_confirm_intents() {
        let ex = extractor();
        assert!(ex
            .extract("no, not interested", Stage::Sales, &[])
            .has_intent(Intent::Deny));
        assert!(ex
            .extract("yes please proceed", Stage::Sales, &[])
            .has_intent(Intent::Confirm));
        // "know" must not trigger Deny via substring match
        assert!(!ex
            .extract("I know the rate already", Stage::Sales, &[])
            .has_intent(Intent::Deny));
    }

    #[test]
    fn test_unknown_on_garbage() {
        let ex = extractor();
        let result = ex.extract("qwerty asdf", Stage::Sales, &[]);
        assert!(result.patch.is_empty());
        assert_eq!(result.intents, vec![Intent::Unknown]);
    }

    #[test]
    fn test_income_at_evidence_stage() {
        let ex = extractor();
        let result = ex.extract("my salary is 40000", Stage::AwaitingEvidence, &[]);
        assert_eq!(result.patch.monthly_income, Some(40_000.0));
        // Amount units are not read as loan amounts outside sales
        assert_eq!(result.patch.requested_amount, None);
    }
}
