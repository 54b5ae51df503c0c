//! Fixed, pre-approved texts. These are deliberately not configuration:
//! every wording change goes through review together with the code.

/// Crisis resources returned verbatim whenever a crisis keyword matches.
pub const HELPLINES: &str = "
🚨 **CRISIS SUPPORT - YOU'RE NOT ALONE**

Please reach out to trained counselors who care and want to help:

**India 🇮🇳:**
• **iCall:** 9152987821 (Mon-Sat, 8 AM - 10 PM)
• **Vandrevala Foundation:** 1860-2662-345 / 1800-2333-330 (24/7)
• **AASRA:** 91-22-27546669 (24/7)

**USA 🇺🇸:**
• **988 Suicide & Crisis Lifeline:** Call/Text 988 (24/7)
• **Crisis Text Line:** Text \"HELLO\" to 741741

**UK 🇬🇧:**
• **Samaritans:** 116 123 (24/7)

**Emergency:** Call 911/112 or go to your nearest emergency room.

━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
After reaching out, I'm here to help with coping strategies. Your life matters. 💙
";

/// Reply for diagnosis/medication requests and for generated text that fails validation.
pub const MEDICAL_REDIRECT: &str = "I cannot provide medical diagnoses or medication advice. Please consult a qualified healthcare provider for medical questions.

However, I can help with:
✅ Coping strategies and relaxation techniques
✅ Breathing exercises and grounding methods
✅ General information about anxiety management

What would you like to learn about?";

/// Appended to every normal-path reply.
pub const DISCLAIMER: &str = "

⚠️ **Important**: This chatbot provides educational information only. It does NOT replace professional mental health care. If you're in crisis, please contact emergency services or crisis helplines immediately.";

/// Prefix for replies to utterances flagged as urgent.
pub const URGENT_BANNER: &str =
    "🚨 **I can see you're in distress right now. Let's focus on immediate relief:**\n\n";

/// Stands in for the generated text when the model call fails or times out.
pub const GENERATION_FALLBACK: &str =
    "I'm having trouble generating a response right now. Could you try rephrasing your question?";

/// Placed in the prompt's context block when retrieval produced nothing.
pub const NO_CONTEXT_FALLBACK: &str =
    "No specific PDF content available. Use general evidence-based knowledge.";

pub const SOURCES_HEADING: &str = "\n\n📚 **Sources:** ";
