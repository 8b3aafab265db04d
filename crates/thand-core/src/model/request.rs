//! `ElevateRequest` (spec §3)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::error::ThandError;
use crate::model::role::Role;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ElevateRequest {
    pub reason: String,
    /// Raw duration string as supplied by the caller (ISO-8601 or Go
    /// style); validated and parsed via [`ElevateRequest::validate`].
    pub duration: String,
    /// Ordered; the first entry is the primary provider (spec §5).
    pub providers: Vec<String>,
    pub identities: Vec<String>,
    pub authenticator: String,
    pub role: Role,
    pub workflow: String,
    #[serde(default)]
    pub session: Option<String>,
}

impl ElevateRequest {
    /// Validates every invariant from spec §3 and returns the parsed
    /// duration. Does not mutate `self`.
    pub fn validate(&self) -> Result<Duration, ThandError> {
        if self.reason.trim().is_empty() {
            return Err(ThandError::validation("reason must not be empty"));
        }
        if self.providers.is_empty() {
            return Err(ThandError::validation("providers must not be empty"));
        }
        if self.identities.is_empty() {
            return Err(ThandError::validation("identities must not be empty"));
        }
        if self.authenticator.trim().is_empty() {
            return Err(ThandError::validation("authenticator must not be empty"));
        }
        if self.workflow.trim().is_empty() {
            return Err(ThandError::validation("workflow must not be empty"));
        }
        if self.role.name.trim().is_empty() {
            return Err(ThandError::validation("role must not be nil/unnamed"));
        }

        let primary_provider = &self.providers[0];
        if !self.role.providers.iter().any(|p| p == primary_provider) {
            return Err(ThandError::validation(format!(
                "role {:?} does not reference provider {:?}",
                self.role.name, primary_provider
            )));
        }

        if !self.role.authenticators.is_empty()
            && !self
                .role
                .authenticators
                .iter()
                .any(|a| a == &self.authenticator)
        {
            return Err(ThandError::validation(format!(
                "authenticator {:?} is not permitted by role {:?}",
                self.authenticator, self.role.name
            )));
        }

        parse_duration(&self.duration)
    }
}
