use calmline_core::bootstrap::resolve_policy;
use calmline_core::safety::classify;

use crate::util::{exit_error, print_json};

/// Classify `text` against the active policy. Touches no collaborator and
/// needs no credentials.
pub fn run(policy_path: Option<&std::path::Path>, text: &str) -> i32 {
    let policy = match resolve_policy(policy_path) {
        Ok(policy) => policy,
        Err(e) => exit_error(
            &e.to_string(),
            Some("Check --policy / CALMLINE_POLICY_PATH, or unset it to use the built-in policy."),
        ),
    };

    match serde_json::to_value(classify(&policy, text)) {
        Ok(value) => {
            print_json(&value);
            0
        }
        Err(e) => exit_error(&format!("Failed to render classification: {e}"), None),
    }
}
