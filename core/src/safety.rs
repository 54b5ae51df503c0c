//! Lexical safety classification of user utterances and generated replies.
//!
//! Every check is a pure function of (text, phrase set). Matching is a
//! case-folded substring search: false positives are accepted, a missed
//! crisis signal is not.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::messages::HELPLINES;
use crate::policy::{PhraseSet, SafetyPolicy};

/// Returns the helpline message when the utterance contains any crisis keyword.
pub fn detect_crisis(policy: &SafetyPolicy, utterance: &str) -> Option<&'static str> {
    policy
        .first_match(PhraseSet::Crisis, utterance)
        .map(|_| HELPLINES)
}

/// Acute panic language. Only flags the reply for a banner; never short-circuits.
pub fn detect_urgency(policy: &SafetyPolicy, utterance: &str) -> bool {
    policy.first_match(PhraseSet::Urgent, utterance).is_some()
}

/// Diagnosis or medication requests.
pub fn detect_medical_advice_request(policy: &SafetyPolicy, utterance: &str) -> bool {
    policy
        .first_match(PhraseSet::MedicalRequest, utterance)
        .is_some()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationOutcome {
    pub safe: bool,
    /// Empty when `safe`.
    pub reason: String,
}

impl ValidationOutcome {
    pub fn passed() -> Self {
        Self {
            safe: true,
            reason: String::new(),
        }
    }
}

/// Post-generation backstop: rejects text containing prohibited medical phrasing.
/// The first matching phrase (in policy order) is reported.
pub fn validate_response(policy: &SafetyPolicy, response: &str) -> ValidationOutcome {
    match policy.first_match(PhraseSet::ProhibitedResponse, response) {
        Some(phrase) => ValidationOutcome {
            safe: false,
            reason: format!("Contains prohibited phrase: '{phrase}'"),
        },
        None => ValidationOutcome::passed(),
    }
}

/// All three utterance flags plus the phrase that tripped each one.
///
/// An audit aid for reviewers and the CLI; the pipeline runs the individual
/// checks in its own fixed order instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Classification {
    pub policy_version: String,
    pub crisis: bool,
    pub medical_request: bool,
    pub urgent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crisis_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_request_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgent_match: Option<String>,
}

pub fn classify(policy: &SafetyPolicy, utterance: &str) -> Classification {
    let crisis_match = policy.first_match(PhraseSet::Crisis, utterance);
    let medical_request_match = policy.first_match(PhraseSet::MedicalRequest, utterance);
    let urgent_match = policy.first_match(PhraseSet::Urgent, utterance);

    Classification {
        policy_version: policy.version.clone(),
        crisis: crisis_match.is_some(),
        medical_request: medical_request_match.is_some(),
        urgent: urgent_match.is_some(),
        crisis_match: crisis_match.map(str::to_string),
        medical_request_match: medical_request_match.map(str::to_string),
        urgent_match: urgent_match.map(str::to_string),
    }
}
