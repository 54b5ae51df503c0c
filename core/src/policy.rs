use std::path::Path;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const BUILTIN_POLICY: &str = include_str!("../policy/default_policy.json");

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("policy document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("policy version must not be blank")]
    BlankVersion,
    #[error("phrase set '{0}' must contain at least one phrase")]
    EmptySet(&'static str),
    #[error("phrase set '{set}' contains a blank phrase at index {index}")]
    BlankPhrase { set: &'static str, index: usize },
}

/// Which phrase list a lookup runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseSet {
    Crisis,
    Urgent,
    MedicalRequest,
    ProhibitedResponse,
}

impl PhraseSet {
    pub fn as_str(self) -> &'static str {
        match self {
            PhraseSet::Crisis => "crisis_keywords",
            PhraseSet::Urgent => "urgent_phrases",
            PhraseSet::MedicalRequest => "medical_request_phrases",
            PhraseSet::ProhibitedResponse => "prohibited_response_phrases",
        }
    }
}

/// Versioned phrase sets driving every lexical safety decision.
///
/// The sets are data, not code: compliance reviewers can read and amend the
/// JSON document without touching the classifier. All phrases are stored
/// trimmed and case-folded, so matching only has to fold the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SafetyPolicy {
    pub version: String,
    pub crisis_keywords: Vec<String>,
    pub urgent_phrases: Vec<String>,
    pub medical_request_phrases: Vec<String>,
    pub prohibited_response_phrases: Vec<String>,
}

impl SafetyPolicy {
    /// The policy shipped with the crate (`policy/default_policy.json`).
    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_POLICY).expect("invalid embedded default policy")
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, PolicyError> {
        let parsed: SafetyPolicy = serde_json::from_str(raw)?;
        parsed.normalized()
    }

    fn normalized(self) -> Result<Self, PolicyError> {
        let version = self.version.trim().to_string();
        if version.is_empty() {
            return Err(PolicyError::BlankVersion);
        }

        Ok(Self {
            version,
            crisis_keywords: normalize_set(PhraseSet::Crisis, self.crisis_keywords)?,
            urgent_phrases: normalize_set(PhraseSet::Urgent, self.urgent_phrases)?,
            medical_request_phrases: normalize_set(
                PhraseSet::MedicalRequest,
                self.medical_request_phrases,
            )?,
            prohibited_response_phrases: normalize_set(
                PhraseSet::ProhibitedResponse,
                self.prohibited_response_phrases,
            )?,
        })
    }

    pub fn phrases(&self, set: PhraseSet) -> &[String] {
        match set {
            PhraseSet::Crisis => &self.crisis_keywords,
            PhraseSet::Urgent => &self.urgent_phrases,
            PhraseSet::MedicalRequest => &self.medical_request_phrases,
            PhraseSet::ProhibitedResponse => &self.prohibited_response_phrases,
        }
    }

    /// First phrase of `set` (in document order) contained in `text`.
    ///
    /// Plain substring search over the case-folded text: no tokenization,
    /// no stemming. "overdosed" matches "overdose".
    pub fn first_match(&self, set: PhraseSet, text: &str) -> Option<&str> {
        let folded = text.to_lowercase();
        self.phrases(set)
            .iter()
            .find(|phrase| folded.contains(phrase.as_str()))
            .map(String::as_str)
    }
}

fn normalize_set(set: PhraseSet, phrases: Vec<String>) -> Result<Vec<String>, PolicyError> {
    if phrases.is_empty() {
        return Err(PolicyError::EmptySet(set.as_str()));
    }

    let mut out: Vec<String> = Vec::with_capacity(phrases.len());
    for (index, phrase) in phrases.into_iter().enumerate() {
        let folded = phrase.trim().to_lowercase();
        if folded.is_empty() {
            return Err(PolicyError::BlankPhrase {
                set: set.as_str(),
                index,
            });
        }
        if !out.contains(&folded) {
            out.push(folded);
        }
    }
    Ok(out)
}
