//! Provider contract (spec §4.4): a capability-tagged interface over
//! {Authorizer, RBAC, Identities, Notifier}.
//!
//! Spec §9 replaces runtime interface-assertion probes with an explicit
//! capability-tag set: a provider declares which capabilities it implements
//! via [`Provider::capabilities`], and callers check
//! [`Provider::has_capability`] before dispatch instead of attempting a
//! downcast and handling failure. This crate only defines the contract;
//! concrete provider bodies live in `thand-providers` (spec §1 out-of-scope
//! list - every concrete provider except the ones this repo implements for
//! testing is contract-only here).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ThandError;
use crate::model::{AuthorizeRoleResponse, LocalSession, RevokeRoleRequest, RevokeRoleResponse};

/// A capability a provider may implement (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Authorizer,
    Rbac,
    Identities,
    Notifier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeUser {
    pub identity: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRoleRequest {
    pub identity: String,
    pub role_name: String,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityPage {
    pub identities: Vec<String>,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Every capability's method set is narrow and independently implementable;
/// a provider struct implements only the traits for capabilities it
/// declares in [`Provider::capabilities`].
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize_session(&self, user: &AuthorizeUser) -> Result<String, ThandError>;
    async fn create_session(&self, user: &AuthorizeUser) -> Result<LocalSession, ThandError>;
    async fn validate_session(&self, session: &LocalSession) -> Result<(), ThandError>;
    async fn renew_session(&self, session: &LocalSession) -> Result<LocalSession, ThandError>;
}

#[async_trait]
pub trait Rbac: Send + Sync {
    async fn authorize_role(
        &self,
        req: &AuthorizeRoleRequest,
    ) -> Result<AuthorizeRoleResponse, ThandError>;
    async fn revoke_role(&self, req: &RevokeRoleRequest) -> Result<RevokeRoleResponse, ThandError>;
    async fn get_role(&self, name: &str) -> Result<Option<Value>, ThandError>;
    async fn list_roles(&self) -> Result<Vec<String>, ThandError>;
    async fn get_permission(&self, name: &str) -> Result<Option<Value>, ThandError>;
    async fn list_permissions(&self) -> Result<Vec<String>, ThandError>;
}

#[async_trait]
pub trait Identities: Send + Sync {
    async fn synchronize_users(
        &self,
        continuation_token: Option<String>,
    ) -> Result<IdentityPage, ThandError>;
    async fn synchronize_groups(
        &self,
        continuation_token: Option<String>,
    ) -> Result<IdentityPage, ThandError>;
    async fn synchronize_identities(
        &self,
        continuation_token: Option<String>,
    ) -> Result<IdentityPage, ThandError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(&self, req: &NotificationRequest) -> Result<(), ThandError>;
}

/// The capability-tagged runtime provider (spec §4.4/§9).
///
/// A provider need not implement every capability trait; it reports which
/// ones it has via `capabilities()`. Optional traits are exposed as
/// `Option<&dyn Trait>` rather than attempted downcasts, so "capability
/// absent" is a first-class, testable path (spec §9).
pub trait Provider: Send + Sync {
    /// Case-insensitive provider-kind name (e.g. `aws-prod`, `okta`).
    fn kind(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }

    fn as_authorizer(&self) -> Option<&dyn Authorizer> {
        None
    }

    fn as_rbac(&self) -> Option<&dyn Rbac> {
        None
    }

    fn as_identities(&self) -> Option<&dyn Identities> {
        None
    }

    fn as_notifier(&self) -> Option<&dyn Notifier> {
        None
    }
}

/// Timestamp stamped onto an [`AuthorizeRoleResponse`] by callers that don't
/// go through a live clock in tests.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NotifierOnly;

    impl Provider for NotifierOnly {
        fn kind(&self) -> &str {
            "test-notifier"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::Notifier]
        }

        fn as_notifier(&self) -> Option<&dyn Notifier> {
            None // stand-in: a real impl would return Some(self)
        }
    }

    #[test]
    fn has_capability_reflects_declared_set() {
        let p = NotifierOnly;
        assert!(p.has_capability(Capability::Notifier));
        assert!(!p.has_capability(Capability::Rbac));
    }
}
