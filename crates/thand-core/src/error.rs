//! Error kinds shared across the broker (spec §7)
//!
//! These are *kinds*, not one giant enum of every failure mode: each
//! component that needs a typed error wraps one of these. `retryable` tracks
//! the orchestrator's retry policy decision; it is meaningful only for
//! `TransientProvider` vs `FatalProvider`.

use serde::{Deserialize, Serialize};

/// A broker-level error, tagged with the taxonomy from spec §7.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ThandError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ThandError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn transient_provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientProvider, message)
    }

    pub fn fatal_provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FatalProvider, message)
    }

    pub fn expression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Expression, message)
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cleanup, message)
    }

    pub fn termination(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Termination, message)
    }

    /// Whether the orchestrator's retry policy should retry the call that
    /// produced this error (spec §7: only `TransientProvider` is retryable).
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::TransientProvider)
    }
}

/// Error kinds from spec §7. Intentionally kinds, not concrete Rust types -
/// every layer that needs a typed error wraps one of these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request: empty reason, nil role, bad duration, unknown
    /// provider, empty identities. Not retried.
    Validation,
    /// Session missing/expired/invalid, or authenticator not in role.
    Auth,
    /// Network or engine error the orchestrator's retry policy should retry.
    TransientProvider,
    /// Explicit non-retryable provider failure (e.g. permission denied).
    FatalProvider,
    /// jq-style expression parse/compile failure.
    Expression,
    /// Failure to run the deferred revocation step.
    Cleanup,
    /// Operator-driven cancellation. Not an error to the caller.
    Termination,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::TransientProvider => "transient_provider",
            ErrorKind::FatalProvider => "fatal_provider",
            ErrorKind::Expression => "expression",
            ErrorKind::Cleanup => "cleanup",
            ErrorKind::Termination => "termination",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_provider_is_retryable() {
        assert!(ThandError::transient_provider("timeout").is_retryable());
        assert!(!ThandError::fatal_provider("denied").is_retryable());
        assert!(!ThandError::validation("bad").is_retryable());
    }

    #[test]
    fn display_matches_kind_name() {
        let err = ThandError::cleanup("revoke failed");
        assert_eq!(err.to_string(), "cleanup: revoke failed");
    }
}
