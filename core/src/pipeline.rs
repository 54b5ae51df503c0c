//! The answer pipeline: one utterance in, one safe, attributed reply out.
//!
//! Processing is an explicit state machine. Stages only ever move forward,
//! and both safety checks run before any retrieval or model call, so the
//! crisis and medical-redirect replies cannot depend on either.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::PipelineSettings;
use crate::generation::{GenerationError, GenerationRequest, Generator, build_prompt};
use crate::interaction_log::{InteractionLogEntry, InteractionLogger};
use crate::messages::{
    DISCLAIMER, GENERATION_FALLBACK, MEDICAL_REDIRECT, SOURCES_HEADING, URGENT_BANNER,
};
use crate::policy::SafetyPolicy;
use crate::retrieval::{RetrievalResult, Retriever};
use crate::safety::{
    detect_crisis, detect_medical_advice_request, detect_urgency, validate_response,
};

/// Which terminal state produced the reply. Exactly one per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Crisis,
    MedicalRedirect,
    ValidationFailed,
    Normal,
}

impl Terminal {
    pub fn as_str(self) -> &'static str {
        match self {
            Terminal::Crisis => "crisis",
            Terminal::MedicalRedirect => "medical_redirect",
            Terminal::ValidationFailed => "validation_failed",
            Terminal::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PipelineMetadata {
    pub is_crisis: bool,
    pub is_medical_request: bool,
    pub is_urgent: bool,
    /// De-duplicated source ids, first-seen order. Empty when retrieval never ran.
    pub sources: Vec<String>,
    pub validation_failed: bool,
    /// Set once retrieval has run: whether the context cleared the length threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub had_source_content: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PipelineResult {
    pub reply: String,
    pub outcome: Terminal,
    pub metadata: PipelineMetadata,
}

impl PipelineResult {
    fn crisis(helplines: &str) -> Self {
        Self {
            reply: helplines.to_string(),
            outcome: Terminal::Crisis,
            metadata: PipelineMetadata {
                is_crisis: true,
                ..PipelineMetadata::default()
            },
        }
    }

    fn medical_redirect() -> Self {
        Self {
            reply: MEDICAL_REDIRECT.to_string(),
            outcome: Terminal::MedicalRedirect,
            metadata: PipelineMetadata {
                is_medical_request: true,
                ..PipelineMetadata::default()
            },
        }
    }

    fn validation_failed(urgent: bool, retrieval: &RetrievalResult, reason: String) -> Self {
        Self {
            reply: MEDICAL_REDIRECT.to_string(),
            outcome: Terminal::ValidationFailed,
            metadata: PipelineMetadata {
                is_urgent: urgent,
                sources: retrieval.unique_sources(),
                validation_failed: true,
                had_source_content: Some(retrieval.sufficient),
                validation_reason: Some(reason),
                ..PipelineMetadata::default()
            },
        }
    }
}

/// Pipeline states in evaluation order. Data produced by a stage travels
/// with the next state; `Finish` holds the reply.
#[derive(Debug)]
pub enum PipelineStage {
    CrisisCheck,
    MedicalRequestCheck,
    UrgencyFlag,
    Retrieve {
        urgent: bool,
    },
    Generate {
        urgent: bool,
        retrieval: RetrievalResult,
    },
    Validate {
        urgent: bool,
        retrieval: RetrievalResult,
        draft: String,
    },
    Augment {
        urgent: bool,
        retrieval: RetrievalResult,
        draft: String,
    },
    Finish(PipelineResult),
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::CrisisCheck => "crisis_check",
            PipelineStage::MedicalRequestCheck => "medical_request_check",
            PipelineStage::UrgencyFlag => "urgency_flag",
            PipelineStage::Retrieve { .. } => "retrieve",
            PipelineStage::Generate { .. } => "generate",
            PipelineStage::Validate { .. } => "validate",
            PipelineStage::Augment { .. } => "augment",
            PipelineStage::Finish(_) => "finish",
        }
    }

    fn ordinal(&self) -> u8 {
        match self {
            PipelineStage::CrisisCheck => 0,
            PipelineStage::MedicalRequestCheck => 1,
            PipelineStage::UrgencyFlag => 2,
            PipelineStage::Retrieve { .. } => 3,
            PipelineStage::Generate { .. } => 4,
            PipelineStage::Validate { .. } => 5,
            PipelineStage::Augment { .. } => 6,
            PipelineStage::Finish(_) => 7,
        }
    }
}

/// Final reply for the normal path: optional distress banner, trimmed
/// draft, de-duplicated citation (when there are sources), disclaimer.
pub fn augment(draft: &str, urgent: bool, sources: &[String]) -> String {
    let body = draft.trim();
    let mut reply = if urgent {
        format!("{URGENT_BANNER}{body}")
    } else {
        body.to_string()
    };
    reply.truncate(reply.trim_end().len());

    if !sources.is_empty() {
        reply.push_str(SOURCES_HEADING);
        reply.push_str(&sources.join(", "));
    }
    reply.push_str(DISCLAIMER);
    reply
}

#[derive(Clone)]
pub struct AnswerPipeline {
    settings: PipelineSettings,
    policy: Arc<SafetyPolicy>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
    logger: Arc<dyn InteractionLogger>,
}

impl AnswerPipeline {
    /// `settings` accepts a `&PipelineConfig` directly.
    pub fn new(
        settings: impl Into<PipelineSettings>,
        policy: Arc<SafetyPolicy>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        logger: Arc<dyn InteractionLogger>,
    ) -> Self {
        Self {
            settings: settings.into(),
            policy,
            retriever,
            generator,
            logger,
        }
    }

    pub fn policy(&self) -> &SafetyPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Answer one user utterance. Never fails: every collaborator failure
    /// degrades to a fixed reply, and the exchange is logged exactly once.
    pub async fn answer_question(&self, utterance: &str) -> PipelineResult {
        self.run(utterance).await.0
    }

    /// Like `answer_question`, also returning the names of the stages visited.
    ///
    /// The invocation runs on its own task: dropping the returned future (a
    /// disconnected client, a caller-side timeout) does not stop it, so work
    /// already started still ends with its audit record.
    pub async fn run(&self, utterance: &str) -> (PipelineResult, Vec<&'static str>) {
        let pipeline = self.clone();
        let utterance = utterance.to_string();
        let task = tokio::spawn(async move { pipeline.drive(&utterance).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::error!(error = %e, "answer pipeline task cancelled");
                let reply = augment(GENERATION_FALLBACK, false, &[]);
                let result = PipelineResult {
                    reply,
                    outcome: Terminal::Normal,
                    metadata: PipelineMetadata::default(),
                };
                (result, Vec::new())
            }
        }
    }

    async fn drive(&self, utterance: &str) -> (PipelineResult, Vec<&'static str>) {
        let mut visited = Vec::with_capacity(8);
        let mut stage = PipelineStage::CrisisCheck;

        let result = loop {
            stage = match stage {
                PipelineStage::Finish(result) => break result,
                current => {
                    let (from, from_ordinal) = (current.name(), current.ordinal());
                    visited.push(from);
                    let next = self.step(utterance, current).await;
                    debug_assert!(
                        next.ordinal() > from_ordinal,
                        "pipeline moved backwards: {from} -> {}",
                        next.name()
                    );
                    tracing::debug!(from, to = next.name(), "pipeline transition");
                    next
                }
            };
        };

        tracing::info!(
            outcome = result.outcome.as_str(),
            is_urgent = result.metadata.is_urgent,
            sources = result.metadata.sources.len(),
            policy_version = %self.policy.version,
            "answer pipeline finished"
        );
        self.record(utterance, &result).await;
        (result, visited)
    }

    async fn step(&self, utterance: &str, stage: PipelineStage) -> PipelineStage {
        match stage {
            PipelineStage::CrisisCheck => match detect_crisis(&self.policy, utterance) {
                Some(helplines) => PipelineStage::Finish(PipelineResult::crisis(helplines)),
                None => PipelineStage::MedicalRequestCheck,
            },
            PipelineStage::MedicalRequestCheck => {
                if detect_medical_advice_request(&self.policy, utterance) {
                    PipelineStage::Finish(PipelineResult::medical_redirect())
                } else {
                    PipelineStage::UrgencyFlag
                }
            }
            PipelineStage::UrgencyFlag => PipelineStage::Retrieve {
                urgent: detect_urgency(&self.policy, utterance),
            },
            PipelineStage::Retrieve { urgent } => PipelineStage::Generate {
                urgent,
                retrieval: self.retrieve(utterance).await,
            },
            PipelineStage::Generate { urgent, retrieval } => {
                let draft = self.generate(&retrieval, utterance).await;
                PipelineStage::Validate {
                    urgent,
                    retrieval,
                    draft,
                }
            }
            PipelineStage::Validate {
                urgent,
                retrieval,
                draft,
            } => {
                let outcome = validate_response(&self.policy, &draft);
                if outcome.safe {
                    PipelineStage::Augment {
                        urgent,
                        retrieval,
                        draft,
                    }
                } else {
                    tracing::warn!(
                        reason = %outcome.reason,
                        "generated reply rejected by validator"
                    );
                    PipelineStage::Finish(PipelineResult::validation_failed(
                        urgent,
                        &retrieval,
                        outcome.reason,
                    ))
                }
            }
            PipelineStage::Augment {
                urgent,
                retrieval,
                draft,
            } => {
                let sources = retrieval.unique_sources();
                let reply = augment(&draft, urgent, &sources);
                PipelineStage::Finish(PipelineResult {
                    reply,
                    outcome: Terminal::Normal,
                    metadata: PipelineMetadata {
                        is_urgent: urgent,
                        sources,
                        had_source_content: Some(retrieval.sufficient),
                        ..PipelineMetadata::default()
                    },
                })
            }
            finished @ PipelineStage::Finish(_) => finished,
        }
    }

    async fn retrieve(&self, question: &str) -> RetrievalResult {
        let k = self.settings.retrieval_k;
        match self.retriever.retrieve(question, k).await {
            Ok(mut passages) => {
                passages.truncate(k);
                RetrievalResult::from_passages(&passages, self.settings.min_context_length)
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieval failed, answering without context");
                RetrievalResult::empty()
            }
        }
    }

    async fn generate(&self, retrieval: &RetrievalResult, question: &str) -> String {
        let request = GenerationRequest {
            prompt: build_prompt(retrieval, question),
            temperature: self.settings.temperature,
            max_output_tokens: self.settings.max_output_tokens,
        };

        let timeout = self.settings.generation_timeout;
        let call = self.generator.generate(&request);
        let outcome = match tokio::time::timeout(timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GenerationError::Timeout(timeout)),
        };

        match outcome {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "generation failed, using fallback reply");
                GENERATION_FALLBACK.to_string()
            }
        }
    }

    async fn record(&self, utterance: &str, result: &PipelineResult) {
        let entry = InteractionLogEntry::new(utterance, result);
        if let Err(e) = self.logger.append(&entry).await {
            tracing::warn!(error = %e, "failed to write interaction log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::interaction_log::LogError;
    use crate::messages::HELPLINES;
    use crate::retrieval::{RetrievalError, RetrievedPassage};

    const ALL_STAGES: [&str; 7] = [
        "crisis_check",
        "medical_request_check",
        "urgency_flag",
        "retrieve",
        "generate",
        "validate",
        "augment",
    ];

    struct FakeRetriever {
        passages: Option<Vec<RetrievedPassage>>,
        calls: AtomicUsize,
        last_k: AtomicUsize,
    }

    impl FakeRetriever {
        fn returning(passages: Vec<RetrievedPassage>) -> Self {
            Self {
                passages: Some(passages),
                calls: AtomicUsize::new(0),
                last_k: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                passages: None,
                calls: AtomicUsize::new(0),
                last_k: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Retriever for FakeRetriever {
        async fn retrieve(
            &self,
            _query: &str,
            k: usize,
        ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_k.store(k, Ordering::SeqCst);
            self.passages
                .clone()
                .ok_or_else(|| RetrievalError::Unavailable("index offline".to_string()))
        }
    }

    enum Script {
        Reply(String),
        Fail,
        Hang,
    }

    struct FakeGenerator {
        script: Script,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl FakeGenerator {
        fn new(script: Script) -> Self {
            Self {
                script,
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            }
        }

        fn replying(text: &str) -> Self {
            Self::new(Script::Reply(text.to_string()))
        }
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = Some(request.prompt.clone());
            match &self.script {
                Script::Reply(text) => Ok(text.clone()),
                Script::Fail => Err(GenerationError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                }),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("too late".to_string())
                }
            }
        }
    }

    #[derive(Default)]
    struct MemoryLog {
        entries: Mutex<Vec<InteractionLogEntry>>,
        broken: bool,
    }

    #[async_trait]
    impl InteractionLogger for MemoryLog {
        async fn append(&self, entry: &InteractionLogEntry) -> Result<(), LogError> {
            if self.broken {
                return Err(LogError::Write(std::io::Error::other("disk full")));
            }
            self.entries.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    struct Harness {
        pipeline: AnswerPipeline,
        retriever: Arc<FakeRetriever>,
        generator: Arc<FakeGenerator>,
        log: Arc<MemoryLog>,
    }

    impl Harness {
        fn with(retriever: FakeRetriever, generator: FakeGenerator, log: MemoryLog) -> Self {
            Self::with_settings(PipelineSettings::default(), retriever, generator, log)
        }

        fn with_settings(
            settings: PipelineSettings,
            retriever: FakeRetriever,
            generator: FakeGenerator,
            log: MemoryLog,
        ) -> Self {
            let retriever = Arc::new(retriever);
            let generator = Arc::new(generator);
            let log = Arc::new(log);
            let pipeline = AnswerPipeline::new(
                settings,
                Arc::new(SafetyPolicy::builtin()),
                retriever.clone(),
                generator.clone(),
                log.clone(),
            );
            Self {
                pipeline,
                retriever,
                generator,
                log,
            }
        }

        fn standard(reply: &str) -> Self {
            Self::with(
                FakeRetriever::returning(vec![
                    RetrievedPassage::new(
                        "Slow diaphragmatic breathing activates the parasympathetic nervous system and eases panic symptoms.",
                        "breathing.pdf",
                    ),
                    RetrievedPassage::new("Name five things you can see.", "grounding.pdf"),
                ]),
                FakeGenerator::replying(reply),
                MemoryLog::default(),
            )
        }

        async fn ask(&self, utterance: &str) -> PipelineResult {
            self.pipeline.answer_question(utterance).await
        }

        fn collaborator_calls(&self) -> (usize, usize) {
            (
                self.retriever.calls.load(Ordering::SeqCst),
                self.generator.calls.load(Ordering::SeqCst),
            )
        }

        fn entries(&self) -> Vec<InteractionLogEntry> {
            self.log.entries.lock().unwrap().clone()
        }
    }

    #[test]
    fn augment_orders_banner_body_citation_disclaimer() {
        let sources = ["a.pdf".to_string(), "b.pdf".to_string()];
        let reply = augment("  Breathe in for four.\n", true, &sources);
        let body = "Breathe in for four.";
        assert_eq!(
            reply,
            format!("{URGENT_BANNER}{body}{SOURCES_HEADING}a.pdf, b.pdf{DISCLAIMER}")
        );
    }

    #[test]
    fn augment_without_sources_has_no_citation() {
        let reply = augment("Hello", false, &[]);
        assert_eq!(reply, format!("Hello{DISCLAIMER}"));
        assert!(!reply.contains("Sources"));
    }

    #[tokio::test]
    async fn crisis_keyword_returns_helplines_without_collaborators() {
        let h = Harness::standard("unused");
        let (result, visited) = h.pipeline.run("I want to kill myself").await;

        assert_eq!(result.reply, HELPLINES);
        assert_eq!(result.outcome, Terminal::Crisis);
        assert!(result.metadata.is_crisis);
        assert!(result.metadata.sources.is_empty());
        assert_eq!(visited, vec!["crisis_check"]);
        assert_eq!(h.collaborator_calls(), (0, 0));

        let entries = h.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_crisis);
        assert!(entries[0].sources.is_empty());
        assert_eq!(entries[0].answer, HELPLINES);
    }

    #[tokio::test]
    async fn crisis_wins_over_medical_and_urgent_content() {
        let h = Harness::standard("unused");
        let utterance = "Having a panic attack, WHAT MEDICATION stops it? I want to die";
        let result = h.ask(utterance).await;
        assert_eq!(result.reply, HELPLINES);
        assert!(result.metadata.is_crisis);
        assert!(!result.metadata.is_medical_request);
        assert!(!result.metadata.is_urgent);
    }

    #[tokio::test]
    async fn medical_request_redirects_without_retrieval_or_generation() {
        let h = Harness::standard("unused");
        let (result, visited) = h.pipeline.run("What medication should I take?").await;

        assert_eq!(result.reply, MEDICAL_REDIRECT);
        assert_eq!(result.outcome, Terminal::MedicalRedirect);
        assert!(result.metadata.is_medical_request);
        assert!(!result.metadata.is_crisis);
        assert_eq!(visited, vec!["crisis_check", "medical_request_check"]);
        assert_eq!(h.collaborator_calls(), (0, 0));
        assert_eq!(h.entries().len(), 1);
        assert!(h.entries()[0].is_medical_request);
    }

    #[tokio::test]
    async fn urgent_utterance_gets_banner_and_disclaimer() {
        let h = Harness::standard("Let's breathe together: in for four, out for six.");
        let (result, visited) = h.pipeline.run("I'm having a panic attack right now").await;

        assert_eq!(visited, ALL_STAGES.to_vec());
        assert_eq!(result.outcome, Terminal::Normal);
        assert!(result.metadata.is_urgent);
        assert!(result.reply.starts_with(URGENT_BANNER));
        assert!(result.reply.ends_with(DISCLAIMER));
        assert_eq!(h.collaborator_calls(), (1, 1));
    }

    #[tokio::test]
    async fn normal_path_cites_deduplicated_sources() {
        let h = Harness::with(
            FakeRetriever::returning(vec![
                RetrievedPassage::new("one", "a.pdf"),
                RetrievedPassage::new("two", "a.pdf"),
                RetrievedPassage::new("three", "b.pdf"),
            ]),
            FakeGenerator::replying("Grounding can help."),
            MemoryLog::default(),
        );
        let result = h.ask("What are grounding techniques?").await;

        assert!(result.reply.contains("📚 **Sources:** a.pdf, b.pdf"));
        assert!(result.reply.ends_with(DISCLAIMER));
        assert!(!result.reply.starts_with(URGENT_BANNER));
        assert_eq!(result.metadata.sources, vec!["a.pdf", "b.pdf"]);

        let entries = h.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].sources, vec!["a.pdf", "b.pdf"]);
        assert_eq!(entries[0].had_pdf_content, Some(false));
        assert!(!entries[0].is_crisis);
    }

    #[tokio::test]
    async fn validation_failure_replaces_generated_text_with_redirect() {
        let h = Harness::standard("Based on this, you have generalized anxiety disorder.");
        let (result, visited) = h.pipeline.run("Why do I feel on edge all day?").await;

        assert_eq!(result.reply, MEDICAL_REDIRECT);
        assert_eq!(result.outcome, Terminal::ValidationFailed);
        assert!(result.metadata.validation_failed);
        assert_eq!(
            result.metadata.validation_reason.as_deref(),
            Some("Contains prohibited phrase: 'you have'")
        );
        assert_eq!(visited, ALL_STAGES[..6].to_vec());

        let entries = h.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].validation_failed);
        assert_eq!(entries[0].answer, MEDICAL_REDIRECT);
        assert_eq!(
            entries[0].reason.as_deref(),
            Some("Contains prohibited phrase: 'you have'")
        );
    }

    #[tokio::test]
    async fn empty_retrieval_still_answers_without_sources() {
        let h = Harness::with(
            FakeRetriever::returning(Vec::new()),
            FakeGenerator::replying("Try a slow exhale."),
            MemoryLog::default(),
        );
        let result = h.ask("How can I calm down quickly?").await;

        assert_eq!(result.outcome, Terminal::Normal);
        assert!(!result.reply.contains("Sources"));
        assert!(result.reply.ends_with(DISCLAIMER));
        assert!(result.metadata.sources.is_empty());

        let prompt = h.generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains(crate::messages::NO_CONTEXT_FALLBACK));

        let entries = h.entries();
        assert_eq!(entries[0].had_pdf_content, Some(false));
    }

    #[tokio::test]
    async fn sufficient_context_is_recorded() {
        let h = Harness::standard("Slow breathing helps.");
        let result = h.ask("Does breathing help?").await;
        assert_eq!(result.metadata.had_source_content, Some(true));
        assert_eq!(h.entries()[0].had_pdf_content, Some(true));
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_no_context() {
        let h = Harness::with(
            FakeRetriever::failing(),
            FakeGenerator::replying("General advice."),
            MemoryLog::default(),
        );
        let result = h.ask("How do I relax?").await;

        assert_eq!(result.outcome, Terminal::Normal);
        assert_eq!(h.collaborator_calls(), (1, 1));
        assert!(result.metadata.sources.is_empty());
        assert!(result.reply.starts_with("General advice."));
    }

    #[tokio::test]
    async fn generation_failure_uses_fallback_text() {
        let h = Harness::with(
            FakeRetriever::returning(Vec::new()),
            FakeGenerator::new(Script::Fail),
            MemoryLog::default(),
        );
        let result = h.ask("What is mindfulness?").await;

        assert_eq!(result.outcome, Terminal::Normal);
        assert!(result.reply.starts_with(GENERATION_FALLBACK));
        assert!(result.reply.ends_with(DISCLAIMER));
        assert!(!result.reply.contains("overloaded"));
        assert_eq!(h.entries().len(), 1);
    }

    #[tokio::test]
    async fn generation_timeout_is_treated_as_failure() {
        let settings = PipelineSettings {
            generation_timeout: Duration::from_millis(50),
            ..PipelineSettings::default()
        };
        let h = Harness::with_settings(
            settings,
            FakeRetriever::returning(Vec::new()),
            FakeGenerator::new(Script::Hang),
            MemoryLog::default(),
        );
        let result = h.ask("What is mindfulness?").await;
        assert!(result.reply.starts_with(GENERATION_FALLBACK));
    }

    #[tokio::test]
    async fn abandoned_caller_still_gets_one_audit_record() {
        let settings = PipelineSettings {
            generation_timeout: Duration::from_millis(200),
            ..PipelineSettings::default()
        };
        let h = Harness::with_settings(
            settings,
            FakeRetriever::returning(Vec::new()),
            FakeGenerator::new(Script::Hang),
            MemoryLog::default(),
        );
        let waited = Duration::from_millis(50);
        let call = h.ask("I'm having a panic attack right now");
        assert!(tokio::time::timeout(waited, call).await.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.collaborator_calls(), (1, 1));
        let entries = h.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_urgent);
        let expected = format!("{URGENT_BANNER}{GENERATION_FALLBACK}");
        assert!(entries[0].answer.starts_with(&expected));
    }

    #[tokio::test]
    async fn log_failure_does_not_affect_the_reply() {
        let h = Harness::with(
            FakeRetriever::returning(Vec::new()),
            FakeGenerator::replying("Take a short walk."),
            MemoryLog {
                broken: true,
                ..MemoryLog::default()
            },
        );
        let result = h.ask("Any tips for stress?").await;
        assert_eq!(result.outcome, Terminal::Normal);
        assert!(result.reply.starts_with("Take a short walk."));
    }

    #[tokio::test]
    async fn retriever_receives_configured_k_and_extra_passages_are_dropped() {
        let settings = PipelineSettings {
            retrieval_k: 2,
            ..PipelineSettings::default()
        };
        let h = Harness::with_settings(
            settings,
            FakeRetriever::returning(vec![
                RetrievedPassage::new("one", "a.pdf"),
                RetrievedPassage::new("two", "b.pdf"),
                RetrievedPassage::new("three", "c.pdf"),
            ]),
            FakeGenerator::replying("ok"),
            MemoryLog::default(),
        );
        let result = h.ask("grounding").await;
        assert_eq!(h.retriever.last_k.load(Ordering::SeqCst), 2);
        assert_eq!(result.metadata.sources, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn prompt_carries_context_and_verbatim_question() {
        let h = Harness::standard("ok");
        h.ask("Why does my Chest feel TIGHT?").await;

        let prompt = h.generator.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Why does my Chest feel TIGHT?"));
        assert!(prompt.contains("Slow diaphragmatic breathing"));
        assert!(prompt.contains("\n\n---\n\n"));
    }

    #[tokio::test]
    async fn concurrent_invocations_log_once_each() {
        let h = Harness::standard("Breathe.");
        let mut handles = Vec::new();
        for i in 0..16 {
            let pipeline = h.pipeline.clone();
            handles.push(tokio::spawn(async move {
                pipeline
                    .answer_question(&format!("question number {i}"))
                    .await
            }));
        }
        for handle in handles {
            let result = handle.await.expect("task");
            assert_eq!(result.outcome, Terminal::Normal);
        }
        assert_eq!(h.entries().len(), 16);
    }

    #[tokio::test]
    async fn empty_utterance_takes_the_normal_path() {
        let h = Harness::standard("How can I help?");
        let (result, visited) = h.pipeline.run("").await;
        assert_eq!(visited, ALL_STAGES.to_vec());
        assert_eq!(result.outcome, Terminal::Normal);
    }

    #[tokio::test]
    async fn every_builtin_crisis_keyword_short_circuits() {
        for keyword in &SafetyPolicy::builtin().crisis_keywords {
            let h = Harness::standard("unused");
            let utterance = format!("Honestly {} TODAY", keyword.to_uppercase());
            let result = h.ask(&utterance).await;
            assert_eq!(result.reply, HELPLINES, "{keyword}");
            assert_eq!(result.outcome, Terminal::Crisis, "{keyword}");
            assert!(result.metadata.is_crisis, "{keyword}");
            assert_eq!(h.collaborator_calls(), (0, 0), "{keyword}");
        }
    }

    #[tokio::test]
    async fn every_builtin_medical_phrase_redirects() {
        for phrase in &SafetyPolicy::builtin().medical_request_phrases {
            let h = Harness::standard("unused");
            let utterance = format!("Honestly {} TODAY", phrase.to_uppercase());
            let result = h.ask(&utterance).await;
            assert_eq!(result.reply, MEDICAL_REDIRECT, "{phrase}");
            assert_eq!(result.outcome, Terminal::MedicalRedirect, "{phrase}");
            assert!(result.metadata.is_medical_request, "{phrase}");
            assert_eq!(h.collaborator_calls(), (0, 0), "{phrase}");
        }
    }
}
