use async_trait::async_trait;

use crate::messages::NO_CONTEXT_FALLBACK;
use crate::retrieval::RetrievalResult;

const PROMPT_PREAMBLE: &str = "You are a warm, compassionate mental health support assistant specializing in anxiety and panic management.

🎯 YOUR MISSION:
Help users feel heard, validated, and empowered with practical coping strategies.

⚠️ CRITICAL RULES:
1. **NO MEDICAL ADVICE**: Never diagnose conditions or recommend medications
2. **EMERGENCY FIRST**: If crisis detected, prioritize safety over everything
3. **BE EMPATHETIC**: Validate feelings before giving advice
4. **STAY GROUNDED**: Use simple, calming language
5. **CITE SOURCES**: Mention when using PDF content vs. general knowledge

✅ YOU CAN HELP WITH:
- Breathing exercises & grounding techniques
- Coping strategies for panic attacks
- Relaxation methods & mindfulness
- Understanding anxiety symptoms
- Self-care practices

❌ REDIRECT TO PROFESSIONALS FOR:
- Medical diagnosis or treatment plans
- Medication advice
- Serious mental health conditions
- Crisis situations (provide helplines)

📚 CONTEXT FROM TRUSTED RESOURCES:
";

const THIN_CONTEXT_NOTE: &str = "(The retrieved material below is brief. Rely primarily on general evidence-based knowledge and use it only where it clearly applies.)\n\n";

const QUESTION_HEADING: &str = "\n\n❓ USER QUESTION:\n";

const PROMPT_CLOSING: &str = "\n\nRespond with warmth, empathy, and practical guidance:";

/// Fill the fixed instruction template with retrieved context and the verbatim question.
pub fn build_prompt(retrieval: &RetrievalResult, question: &str) -> String {
    let mut prompt = String::with_capacity(
        PROMPT_PREAMBLE.len() + retrieval.concatenated_context.len() + question.len() + 256,
    );
    prompt.push_str(PROMPT_PREAMBLE);

    if !retrieval.has_context() {
        prompt.push_str(NO_CONTEXT_FALLBACK);
    } else {
        if !retrieval.sufficient {
            prompt.push_str(THIN_CONTEXT_NOTE);
        }
        prompt.push_str(&retrieval.concatenated_context);
    }

    prompt.push_str(QUESTION_HEADING);
    prompt.push_str(question);
    prompt.push_str(PROMPT_CLOSING);
    prompt
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation service returned status {status}")]
    Status { status: u16, body: String },
    #[error("generation response could not be parsed: {0}")]
    Malformed(String),
    #[error("generation response contained no text")]
    EmptyCompletion,
    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Single-shot text completion from a hosted model. Stateless: each call
/// carries the full instruction, context and question.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
