//! Subject validation and hierarchical wildcard matching.
//!
//! Subjects are dot-delimited tokens (`orders.us.created`). Subscription
//! patterns may use two wildcard tokens:
//! - `*` matches exactly one token
//! - `>` matches one or more trailing tokens and must be the last token

pub const TOKEN_SEPARATOR: char = '.';
pub const WILDCARD_SINGLE: &str = "*";
pub const WILDCARD_TAIL: &str = ">";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectError {
    #[error("subject is empty")]
    Empty,
    #[error("subject {0:?} contains an empty token")]
    EmptyToken(String),
    #[error("subject {0:?} contains whitespace")]
    Whitespace(String),
    #[error("subject {0:?} contains a wildcard; wildcards are only valid in subscriptions")]
    WildcardNotAllowed(String),
    #[error("subject {0:?} has '>' before the last token")]
    TailNotLast(String),
}

/// Validate a subject that will be published to (no wildcards).
///
/// ```
/// use courier_common::validate_subject;
///
/// assert!(validate_subject("orders.created").is_ok());
/// assert!(validate_subject("orders.*").is_err());
/// ```
pub fn validate_subject(subject: &str) -> Result<(), SubjectError> {
    check_tokens(subject)?;
    if subject
        .split(TOKEN_SEPARATOR)
        .any(|token| token == WILDCARD_SINGLE || token == WILDCARD_TAIL)
    {
        return Err(SubjectError::WildcardNotAllowed(subject.to_string()));
    }
    Ok(())
}

/// Validate a subscription pattern.
///
/// ```
/// use courier_common::validate_pattern;
///
/// assert!(validate_pattern("orders.*.created").is_ok());
/// assert!(validate_pattern("orders.>").is_ok());
/// assert!(validate_pattern("orders.>.created").is_err());
/// ```
pub fn validate_pattern(pattern: &str) -> Result<(), SubjectError> {
    check_tokens(pattern)?;
    let mut tokens = pattern.split(TOKEN_SEPARATOR).peekable();
    while let Some(token) = tokens.next() {
        if token == WILDCARD_TAIL && tokens.peek().is_some() {
            return Err(SubjectError::TailNotLast(pattern.to_string()));
        }
    }
    Ok(())
}

fn check_tokens(subject: &str) -> Result<(), SubjectError> {
    if subject.is_empty() {
        return Err(SubjectError::Empty);
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(SubjectError::Whitespace(subject.to_string()));
    }
    if subject.split(TOKEN_SEPARATOR).any(str::is_empty) {
        return Err(SubjectError::EmptyToken(subject.to_string()));
    }
    Ok(())
}

/// Returns true when `subject` is matched by `pattern`.
///
/// ```
/// use courier_common::subject_matches;
///
/// assert!(subject_matches("tests.>", "tests.0"));
/// assert!(!subject_matches("tests.>", "tests"));
/// assert!(subject_matches("a.*.c", "a.b.c"));
/// ```
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split(TOKEN_SEPARATOR);
    let mut subject_tokens = subject.split(TOKEN_SEPARATOR);
    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            // '>' needs at least one token left to swallow.
            (Some(WILDCARD_TAIL), Some(_)) => return pattern_tokens.next().is_none(),
            (Some(WILDCARD_SINGLE), Some(_)) => continue,
            (Some(p), Some(s)) if p == s => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}
