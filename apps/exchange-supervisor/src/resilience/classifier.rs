//! Error Classifier
//!
//! Maps raw connector errors onto the closed retry/fatal taxonomy that
//! drives the call pipeline. Classification is pure and unit-testable
//! independent of any network call.
//!
//! | Kind                 | Retried | Fatal |
//! |----------------------|---------|-------|
//! | Transient            | yes     | no    |
//! | VenueBusy            | yes     | no    |
//! | Delisted             | no      | yes   |
//! | CredentialInvalid    | no      | yes   |
//! | CredentialDisabled   | no      | yes   |
//! | Unknown              | no      | no    |

use serde::{Deserialize, Serialize};

use crate::application::ports::ExchangeError;

/// Closed taxonomy of classified exchange errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network-level or timeout failure; worth retrying.
    Transient,
    /// Venue is rate limiting; retried with backoff.
    VenueBusy,
    /// The instrument is no longer tradable. Fatal, never retried.
    Delisted,
    /// Credentials rejected. Fatal; the session should be torn down.
    CredentialInvalid,
    /// Credentials disabled on the venue side. Fatal.
    CredentialDisabled,
    /// Anything else: surfaced once, not retried, not escalated.
    Unknown,
}

/// Verdict produced for one failed call.
///
/// Invariant: `fatal == true` implies `retry == false`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ClassifiedError {
    /// Taxonomy bucket.
    pub kind: ErrorKind,
    /// Whether the pipeline may retry the call.
    pub retry: bool,
    /// Whether the error ends this session's ability to make progress.
    pub fatal: bool,
    /// The raw error description, for logging and event payloads.
    pub message: String,
}

/// Classify a raw connector error.
pub fn classify(error: &ExchangeError) -> ClassifiedError {
    let message = error.to_string();
    let lower = message.to_lowercase();

    let delisted = lower.contains("delisted");
    let invalid_keys = lower.contains("invalid api key");
    let disabled_keys = lower.contains("disabled");
    let rate_limited = lower.contains("rate limit") || lower.contains("too many requests");

    let kind = match error {
        ExchangeError::AuthenticationFailed => ErrorKind::CredentialInvalid,
        _ if delisted => ErrorKind::Delisted,
        _ if invalid_keys => ErrorKind::CredentialInvalid,
        _ if disabled_keys => ErrorKind::CredentialDisabled,
        ExchangeError::RateLimited { .. } => ErrorKind::VenueBusy,
        _ if rate_limited => ErrorKind::VenueBusy,
        ExchangeError::Network { .. }
        | ExchangeError::Timeout { .. }
        | ExchangeError::NotConnected => ErrorKind::Transient,
        ExchangeError::Api { .. } | ExchangeError::OrderRejected { .. } => ErrorKind::Unknown,
    };

    let fatal = matches!(
        kind,
        ErrorKind::Delisted | ErrorKind::CredentialInvalid | ErrorKind::CredentialDisabled
    );
    let retryable_kind = matches!(kind, ErrorKind::Transient | ErrorKind::VenueBusy);

    // Retry only when the type is retryable AND nothing fatal or delisted
    // showed up; fatal and delisted errors are never retried regardless.
    let retry = retryable_kind && !fatal && !delisted;

    ClassifiedError {
        kind,
        retry,
        fatal,
        message,
    }
}
