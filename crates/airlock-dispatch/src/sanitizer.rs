//! Output sanitizer: exact-match redaction of profile-scoped secret values
//! from every textual field before a snapshot leaves the dispatcher.

/// Replacement marker for secrets too short to carry an identifying suffix.
const REDACTED_SHORT: &str = "[REDACTED]";

/// Redacts every exact occurrence of each secret in `text`.
///
/// Secrets are processed longest-first so a short secret can never shadow a
/// substring of a longer one. Values longer than four characters keep their
/// last four characters as an identifying suffix; shorter values are
/// replaced wholesale. Returns the rewritten text and whether anything was
/// redacted.
pub fn redact_secrets(text: &str, secrets: &[String]) -> (String, bool) {
    let mut ordered: Vec<&str> = secrets
        .iter()
        .map(String::as_str)
        .filter(|secret| !secret.is_empty())
        .collect();
    ordered.sort_by(|left, right| right.len().cmp(&left.len()).then(left.cmp(right)));
    ordered.dedup();

    let mut rewritten = text.to_string();
    let mut redacted = false;
    for secret in ordered {
        if !rewritten.contains(secret) {
            continue;
        }
        redacted = true;
        let marker = redaction_marker(secret);
        rewritten = rewritten.replace(secret, &marker);
    }
    (rewritten, redacted)
}

fn redaction_marker(secret: &str) -> String {
    if secret.chars().count() > 4 {
        let suffix: String = secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("[REDACTED...{suffix}]")
    } else {
        REDACTED_SHORT.to_string()
    }
}
