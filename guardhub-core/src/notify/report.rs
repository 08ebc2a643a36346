//! Turning arbitrary backend errors into something a user can read.

/// Fallback when an error carries no usable text.
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

const KNOWN_CODES: &[(&[&str], &str)] = &[
    (
        &["permission-denied", "permission denied", "insufficient permissions"],
        "You don't have permission to perform this action.",
    ),
    (
        &["unauthenticated", "id-token-expired", "session expired"],
        "Your session has expired. Please sign in again.",
    ),
    (
        &["not-found", "not found", "no such document"],
        "The requested record could not be found.",
    ),
    (
        &["already-exists", "already exists", "duplicate"],
        "A record with these details already exists.",
    ),
    (
        &["deadline-exceeded", "timed out", "timeout"],
        "The request took too long. Please try again.",
    ),
    (
        &["resource-exhausted", "quota", "too many requests"],
        "Too many requests right now. Please wait a moment and retry.",
    ),
    (
        &["unavailable", "network", "connection refused", "failed to fetch"],
        "The service is unreachable. Check your connection and try again.",
    ),
];

/// Best-effort human-readable description of an error message.
///
/// Known backend codes map to fixed sentences; anything else is shown as
/// its first line with common prefixes stripped.
pub fn describe_error(message: &str) -> String {
    if let Some(sentence) = known_sentence(message) {
        return sentence.to_string();
    }

    let first_line = message.lines().next().unwrap_or_default().trim();
    let stripped = ["Error:", "error:", "FirebaseError:", "Firebase:"]
        .iter()
        .fold(first_line, |s, prefix| {
            s.strip_prefix(prefix).map(str::trim).unwrap_or(s)
        });

    if stripped.is_empty() {
        GENERIC_MESSAGE.to_string()
    } else {
        stripped.to_string()
    }
}

/// Like [`describe_error`] over a cause chain, outermost first.
///
/// A known code anywhere in the chain wins; otherwise the outermost message
/// is described.
pub fn describe_chain<S: AsRef<str>>(messages: &[S]) -> String {
    let known = messages.iter().find_map(|m| known_sentence(m.as_ref()));
    match (known, messages.first()) {
        (Some(sentence), _) => sentence.to_string(),
        (None, Some(outer)) => describe_error(outer.as_ref()),
        (None, None) => GENERIC_MESSAGE.to_string(),
    }
}

fn known_sentence(message: &str) -> Option<&'static str> {
    let lowered = message.to_ascii_lowercase();
    KNOWN_CODES
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| lowered.contains(n)))
        .map(|(_, sentence)| *sentence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_fixed_sentences() {
        assert_eq!(
            describe_error("FirebaseError: [code=permission-denied]: Missing or insufficient permissions."),
            "You don't have permission to perform this action."
        );
        assert_eq!(
            describe_error("request timed out after 10s"),
            "The request took too long. Please try again."
        );
        assert_eq!(
            describe_error("service unavailable"),
            "The service is unreachable. Check your connection and try again."
        );
    }

    #[test]
    fn unknown_messages_keep_their_first_line() {
        assert_eq!(describe_error("boom"), "boom");
        assert_eq!(
            describe_error("Error: invoice total must be positive\n  at validate()"),
            "invoice total must be positive"
        );
    }

    #[test]
    fn empty_messages_fall_back_to_generic_text() {
        assert_eq!(describe_error(""), GENERIC_MESSAGE);
        assert_eq!(describe_error("Error:   "), GENERIC_MESSAGE);
    }

    #[test]
    fn codes_under_a_context_are_still_recognised() {
        assert_eq!(
            describe_chain(&["loading invoices", "unavailable: backend offline"]),
            "The service is unreachable. Check your connection and try again."
        );
        assert_eq!(
            describe_chain(&["loading invoices", "row 4 is malformed"]),
            "loading invoices"
        );
        assert_eq!(describe_chain::<&str>(&[]), GENERIC_MESSAGE);
    }
}
