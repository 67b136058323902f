//! Verdict grammar for the judgment model
//!
//! The judgment model is instructed to answer with a single line starting
//! with `ALLOW` or `DISALLOW`. Anything else is an anomaly and resolves to
//! allow, so a misbehaving judge degrades availability of the check rather
//! than availability of the backend.

/// Reason used when the judge denies without giving one
pub const DEFAULT_DENIAL_REASON: &str = "content violates the admission policy";

const ALLOW_PREFIX: &str = "ALLOW";
const DISALLOW_PREFIX: &str = "DISALLOW";

/// Outcome of one admission evaluation. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyVerdict {
    pub allowed: bool,
    /// Present iff the request was denied
    pub reason: Option<String>,
    /// Present when the evaluation itself failed and the verdict fell open
    pub evaluation_error: Option<String>,
}

impl PolicyVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            evaluation_error: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            evaluation_error: None,
        }
    }

    /// Allow because the evaluation could not complete.
    pub fn fail_open(error: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: None,
            evaluation_error: Some(error.into()),
        }
    }
}

/// What the judge's reply parsed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedVerdict {
    Allowed,
    Denied(String),
    /// Neither prefix matched; resolves to allow
    Anomalous,
}

/// Parse the raw reply from the judgment model.
///
/// `ALLOW...` allows regardless of trailing content. `DISALLOW` denies, with
/// the text after an optional `:` (trimmed) as the reason; an empty reason
/// becomes [`DEFAULT_DENIAL_REASON`].
pub fn parse_verdict(raw: &str) -> ParsedVerdict {
    if raw.starts_with(ALLOW_PREFIX) {
        return ParsedVerdict::Allowed;
    }

    if let Some(rest) = raw.strip_prefix(DISALLOW_PREFIX) {
        let reason = rest.strip_prefix(':').unwrap_or(rest).trim();
        let reason = if reason.is_empty() {
            DEFAULT_DENIAL_REASON.to_string()
        } else {
            reason.to_string()
        };
        return ParsedVerdict::Denied(reason);
    }

    ParsedVerdict::Anomalous
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ALLOW")]
    #[case("ALLOW.")]
    #[case("ALLOWED")]
    #[case("ALLOW: looks fine")]
    fn allow_prefix_allows_regardless_of_trailing_content(#[case] raw: &str) {
        assert_eq!(parse_verdict(raw), ParsedVerdict::Allowed);
    }

    #[rstest]
    #[case("DISALLOW: prohibited content", "prohibited content")]
    #[case("DISALLOW:   padded reason  ", "padded reason")]
    #[case("DISALLOW: multi word reason here", "multi word reason here")]
    fn disallow_with_reason_denies_with_trimmed_reason(#[case] raw: &str, #[case] reason: &str) {
        assert_eq!(parse_verdict(raw), ParsedVerdict::Denied(reason.to_string()));
    }

    #[rstest]
    #[case("DISALLOW")]
    #[case("DISALLOW:")]
    #[case("DISALLOW:   ")]
    fn disallow_without_reason_uses_default(#[case] raw: &str) {
        assert_eq!(
            parse_verdict(raw),
            ParsedVerdict::Denied(DEFAULT_DENIAL_REASON.to_string())
        );
    }

    #[rstest]
    #[case("")]
    #[case("maybe")]
    #[case("I think this is fine")]
    #[case("allow")]
    #[case("disallow: lowercase does not count")]
    fn anything_else_is_anomalous(#[case] raw: &str) {
        assert_eq!(parse_verdict(raw), ParsedVerdict::Anomalous);
    }

    #[test]
    fn fail_open_verdict_carries_the_error() {
        let verdict = PolicyVerdict::fail_open("connection refused");
        assert!(verdict.allowed);
        assert!(verdict.reason.is_none());
        assert_eq!(verdict.evaluation_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn denied_verdict_carries_the_reason() {
        let verdict = PolicyVerdict::deny("prohibited content");
        assert!(!verdict.allowed);
        assert_eq!(verdict.reason.as_deref(), Some("prohibited content"));
        assert!(verdict.evaluation_error.is_none());
    }
}
