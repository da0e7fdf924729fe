//! Comparable keys for names, emails and profile URLs.
//!
//! Every textual comparison in duplicate detection goes through [`normalize`].

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Person;

static LINKEDIN_PROFILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"linkedin\.com/in/([^/?]+)").expect("linkedin profile pattern is valid")
});

// Auto-generated transcription labels ("Participant 1", "Speaker 2", "Unknown").
static PLACEHOLDER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(participant|speaker|interviewee|respondent|user|person|unknown)\s*\d*$")
        .expect("placeholder pattern is valid")
});

static PLACEHOLDER_ROLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(participant|speaker|interviewee|respondent|user|person)")
        .expect("placeholder role pattern is valid")
});

/// Lower-cases, trims and collapses internal whitespace runs to one space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalizes an optional field; absent values become the empty string.
pub fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Normalized email, or `None` when the value has no `@`.
pub fn email_key(email: Option<&str>) -> Option<String> {
    let normalized = normalize_opt(email);
    if normalized.contains('@') {
        Some(normalized)
    } else {
        None
    }
}

/// Profile identifier of a LinkedIn URL.
///
/// `https://linkedin.com/in/jdoe/` and `linkedin.com/in/JDoe` both yield `jdoe`.
pub fn linkedin_key(url: Option<&str>) -> Option<String> {
    let lowered = url?.trim().to_lowercase();
    let captures = LINKEDIN_PROFILE.captures(&lowered)?;
    let handle = captures.get(1)?.as_str().trim_end_matches('/');
    if handle.is_empty() {
        None
    } else {
        Some(handle.to_string())
    }
}

/// Explicit first name, else the first token of the display name when that
/// token is longer than one character.
pub fn first_name(person: &Person) -> Option<String> {
    if let Some(explicit) = person.firstname.as_deref() {
        let normalized = normalize(explicit);
        if !normalized.is_empty() {
            return Some(normalized);
        }
    }

    let name = normalize_opt(person.name.as_deref());
    let token = name.split(' ').next()?;
    if token.chars().count() > 1 {
        Some(token.to_string())
    } else {
        None
    }
}

/// True for transcription labels like "Participant 1" or "Unknown".
pub fn is_placeholder_name(name: Option<&str>) -> bool {
    match name {
        Some(name) => PLACEHOLDER_NAME.is_match(&normalize(name)),
        None => false,
    }
}

/// Role word used to cluster placeholder-named people regardless of their
/// trailing number.
///
/// Only placeholder names have a key, and bare "Unknown" has none.
pub fn placeholder_group_key(name: Option<&str>) -> Option<String> {
    if !is_placeholder_name(name) {
        return None;
    }
    let normalized = normalize_opt(name);
    PLACEHOLDER_ROLE
        .captures(&normalized)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// True when an optional text field carries a usable value.
pub fn is_present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_named(name: Option<&str>, firstname: Option<&str>) -> Person {
        Person {
            name: name.map(str::to_string),
            firstname: firstname.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  Jane \t  DOE\n"), "jane doe");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize_opt(None), "");
    }

    #[test]
    fn email_key_requires_at_sign() {
        assert_eq!(email_key(Some(" A@X.com ")), Some("a@x.com".to_string()));
        assert_eq!(email_key(Some("not-an-email")), None);
        assert_eq!(email_key(None), None);
    }

    #[test]
    fn linkedin_variants_share_a_key() {
        let a = linkedin_key(Some("https://linkedin.com/in/jdoe/"));
        let b = linkedin_key(Some("linkedin.com/in/JDoe"));
        let c = linkedin_key(Some("https://www.linkedin.com/in/jdoe?trk=abc"));
        assert_eq!(a, Some("jdoe".to_string()));
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn linkedin_without_profile_path_has_no_key() {
        assert_eq!(linkedin_key(Some("https://linkedin.com/company/acme")), None);
        assert_eq!(linkedin_key(Some("")), None);
        assert_eq!(linkedin_key(None), None);
    }

    #[test]
    fn first_name_prefers_explicit_field() {
        let p = person_named(Some("Timothy Wolf"), Some(" Tim "));
        assert_eq!(first_name(&p), Some("tim".to_string()));
    }

    #[test]
    fn first_name_falls_back_to_display_name() {
        assert_eq!(
            first_name(&person_named(Some("Tim Wolf"), None)),
            Some("tim".to_string())
        );
        assert_eq!(first_name(&person_named(Some("J Wolf"), None)), None);
        assert_eq!(first_name(&person_named(None, None)), None);
    }

    #[test]
    fn placeholder_names_are_detected() {
        assert!(is_placeholder_name(Some("Participant 1")));
        assert!(is_placeholder_name(Some("speaker2")));
        assert!(is_placeholder_name(Some("  UNKNOWN ")));
        assert!(is_placeholder_name(Some("Respondent")));
        assert!(!is_placeholder_name(Some("Participant One")));
        assert!(!is_placeholder_name(Some("Personal Trainer")));
        assert!(!is_placeholder_name(None));
    }

    #[test]
    fn placeholder_key_is_the_role_word() {
        assert_eq!(
            placeholder_group_key(Some("Participant 12")),
            Some("participant".to_string())
        );
        assert_eq!(
            placeholder_group_key(Some("user")),
            Some("user".to_string())
        );
        assert_eq!(placeholder_group_key(Some("Unknown")), None);
        assert_eq!(placeholder_group_key(Some("Jane Doe")), None);
    }
}
