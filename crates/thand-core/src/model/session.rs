//! `LocalSession` (spec §3, §4.5, §8 invariant 5)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ThandError;

/// A provider-scoped credential container, persisted encrypted under the
/// login-server's file (spec §4.5/§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalSession {
    pub uuid: Uuid,
    pub user: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Authoritative over refresh-token presence (spec §3 invariant).
    pub expiry: DateTime<Utc>,
    pub endpoint: String,
    pub provider: String,
}

impl LocalSession {
    /// `Expiry` is authoritative over any refresh-token presence: a session
    /// with a live refresh token but a past `expiry` is still expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Returns the first non-expired session whose provider is in `providers`
/// (or any session if `providers` is empty), preserving `sessions`' order
/// (spec §4.5, §8 invariant 5).
pub fn first_active_session<'a>(
    sessions: &'a [LocalSession],
    providers: &[String],
    now: DateTime<Utc>,
) -> Result<&'a LocalSession, ThandError> {
    sessions
        .iter()
        .find(|s| {
            (providers.is_empty() || providers.iter().any(|p| p == &s.provider))
                && !s.is_expired(now)
        })
        .ok_or_else(|| ThandError::auth("no active session matches the requested providers"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(provider: &str, expiry: DateTime<Utc>) -> LocalSession {
        LocalSession {
            uuid: Uuid::new_v4(),
            user: "u@example.com".into(),
            access_token: "token".into(),
            refresh_token: None,
            expiry,
            endpoint: "https://example.com".into(),
            provider: provider.into(),
        }
    }

    #[test]
    fn returns_first_non_expired_matching_provider() {
        let now = Utc::now();
        let sessions = vec![
            session("okta", now - Duration::minutes(5)),
            session("aws-prod", now + Duration::hours(1)),
            session("aws-prod", now + Duration::hours(2)),
        ];
        let found = first_active_session(&sessions, &["aws-prod".to_string()], now).unwrap();
        assert_eq!(found.expiry, sessions[1].expiry);
    }

    #[test]
    fn all_expired_is_an_error() {
        let now = Utc::now();
        let sessions = vec![session("aws-prod", now - Duration::minutes(1))];
        assert!(first_active_session(&sessions, &[], now).is_err());
    }

    #[test]
    fn expiry_is_authoritative_over_refresh_token() {
        let now = Utc::now();
        let mut s = session("aws-prod", now - Duration::seconds(1));
        s.refresh_token = Some("still-has-one".into());
        assert!(s.is_expired(now));
    }

    #[test]
    fn empty_provider_filter_matches_any() {
        let now = Utc::now();
        let sessions = vec![session("okta", now + Duration::hours(1))];
        assert!(first_active_session(&sessions, &[], now).is_ok());
    }
}
