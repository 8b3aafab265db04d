//! In-memory fixture provider (spec §4.4): implements all four capabilities
//! against process-local state, for use in tests and local DSL dry-runs
//! where no real provider service is available.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use thand_core::model::{AuthorizeRoleResponse, LocalSession, RevokeRoleRequest, RevokeRoleResponse};
use thand_core::provider::{
    Authorizer, AuthorizeRoleRequest, AuthorizeUser, Capability, Identities, IdentityPage,
    NotificationRequest, Notifier, Provider, Rbac,
};
use thand_core::ThandError;

/// Backs all four capabilities with simple in-memory bookkeeping. Useful as
/// a DSL dry-run target and as the fixture behind the runner's unit tests
/// that need a real (not mocked) `Provider` implementor.
pub struct InMemoryProvider {
    kind: String,
    sessions: Mutex<HashMap<String, LocalSession>>,
    granted_roles: Mutex<HashMap<String, AuthorizeRoleResponse>>,
    notifications: Mutex<Vec<NotificationRequest>>,
}

impl InMemoryProvider {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            sessions: Mutex::new(HashMap::new()),
            granted_roles: Mutex::new(HashMap::new()),
            notifications: Mutex::new(Vec::new()),
        }
    }

    /// Notifications sent so far, for test assertions.
    pub fn sent_notifications(&self) -> Vec<NotificationRequest> {
        self.notifications.lock().unwrap().clone()
    }

    /// Whether `identity` currently holds a granted role.
    pub fn has_granted_role(&self, identity: &str) -> bool {
        self.granted_roles.lock().unwrap().contains_key(identity)
    }
}

impl Provider for InMemoryProvider {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Authorizer, Capability::Rbac, Capability::Identities, Capability::Notifier]
    }

    fn as_authorizer(&self) -> Option<&dyn Authorizer> {
        Some(self)
    }

    fn as_rbac(&self) -> Option<&dyn Rbac> {
        Some(self)
    }

    fn as_identities(&self) -> Option<&dyn Identities> {
        Some(self)
    }

    fn as_notifier(&self) -> Option<&dyn Notifier> {
        Some(self)
    }
}

#[async_trait]
impl Authorizer for InMemoryProvider {
    async fn authorize_session(&self, user: &AuthorizeUser) -> Result<String, ThandError> {
        Ok(format!("{}?identity={}", user.redirect_uri, user.identity))
    }

    async fn create_session(&self, user: &AuthorizeUser) -> Result<LocalSession, ThandError> {
        let session = LocalSession {
            uuid: Uuid::new_v4(),
            user: user.identity.clone(),
            access_token: format!("fixture-token-{}", Uuid::new_v4()),
            refresh_token: Some(format!("fixture-refresh-{}", Uuid::new_v4())),
            expiry: Utc::now() + ChronoDuration::hours(1),
            endpoint: user.redirect_uri.clone(),
            provider: self.kind.clone(),
        };
        self.sessions.lock().unwrap().insert(user.identity.clone(), session.clone());
        Ok(session)
    }

    async fn validate_session(&self, session: &LocalSession) -> Result<(), ThandError> {
        if session.is_expired(Utc::now()) {
            return Err(ThandError::auth("session has expired"));
        }
        Ok(())
    }

    async fn renew_session(&self, session: &LocalSession) -> Result<LocalSession, ThandError> {
        let mut renewed = session.clone();
        renewed.expiry = Utc::now() + ChronoDuration::hours(1);
        self.sessions.lock().unwrap().insert(renewed.user.clone(), renewed.clone());
        Ok(renewed)
    }
}

#[async_trait]
impl Rbac for InMemoryProvider {
    async fn authorize_role(
        &self,
        req: &AuthorizeRoleRequest,
    ) -> Result<AuthorizeRoleResponse, ThandError> {
        let response = AuthorizeRoleResponse {
            identity: req.identity.clone(),
            provider: self.kind.clone(),
            metadata: json!({"role": req.role_name, "duration_seconds": req.duration_seconds}),
            authorized_at: Utc::now(),
        };
        self.granted_roles.lock().unwrap().insert(req.identity.clone(), response.clone());
        Ok(response)
    }

    async fn revoke_role(&self, req: &RevokeRoleRequest) -> Result<RevokeRoleResponse, ThandError> {
        let prior = self.granted_roles.lock().unwrap().remove(&req.identity);
        Ok(RevokeRoleResponse {
            identity: req.identity.clone(),
            provider: self.kind.clone(),
            metadata: prior.map(|p| p.metadata).unwrap_or(Value::Null),
            revoked_at: Utc::now(),
        })
    }

    async fn get_role(&self, name: &str) -> Result<Option<Value>, ThandError> {
        Ok(Some(json!({"name": name})))
    }

    async fn list_roles(&self) -> Result<Vec<String>, ThandError> {
        Ok(self.granted_roles.lock().unwrap().keys().cloned().collect())
    }

    async fn get_permission(&self, name: &str) -> Result<Option<Value>, ThandError> {
        Ok(Some(json!({"name": name})))
    }

    async fn list_permissions(&self) -> Result<Vec<String>, ThandError> {
        Ok(vec![])
    }
}

#[async_trait]
impl Identities for InMemoryProvider {
    async fn synchronize_users(
        &self,
        _continuation_token: Option<String>,
    ) -> Result<IdentityPage, ThandError> {
        Ok(IdentityPage { identities: vec![], continuation_token: None })
    }

    async fn synchronize_groups(
        &self,
        _continuation_token: Option<String>,
    ) -> Result<IdentityPage, ThandError> {
        Ok(IdentityPage { identities: vec![], continuation_token: None })
    }

    async fn synchronize_identities(
        &self,
        _continuation_token: Option<String>,
    ) -> Result<IdentityPage, ThandError> {
        Ok(IdentityPage { identities: vec![], continuation_token: None })
    }
}

#[async_trait]
impl Notifier for InMemoryProvider {
    async fn send_notification(&self, req: &NotificationRequest) -> Result<(), ThandError> {
        self.notifications.lock().unwrap().push(req.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn authorize_then_revoke_round_trips_granted_role() {
        let provider = InMemoryProvider::new("aws-prod");
        provider
            .authorize_role(&AuthorizeRoleRequest {
                identity: "u@example.com".into(),
                role_name: "billing-reader".into(),
                duration_seconds: 3600,
            })
            .await
            .unwrap();
        assert!(provider.has_granted_role("u@example.com"));

        provider
            .revoke_role(&RevokeRoleRequest {
                identity: "u@example.com".into(),
                provider: "aws-prod".into(),
                prior: None,
            })
            .await
            .unwrap();
        assert!(!provider.has_granted_role("u@example.com"));
    }

    #[tokio::test]
    async fn notify_records_sent_notification() {
        let provider = InMemoryProvider::new("aws-prod");
        provider
            .send_notification(&NotificationRequest {
                to: vec!["a@x.com".into()],
                subject: "s".into(),
                body: "b".into(),
            })
            .await
            .unwrap();
        assert_eq!(provider.sent_notifications().len(), 1);
    }

    #[tokio::test]
    async fn expired_session_fails_validation() {
        let provider = InMemoryProvider::new("aws-prod");
        let mut session = provider
            .create_session(&AuthorizeUser {
                identity: "u@example.com".into(),
                redirect_uri: "https://example.com/callback".into(),
            })
            .await
            .unwrap();
        session.expiry = Utc::now() - ChronoDuration::minutes(1);
        assert!(provider.validate_session(&session).await.is_err());
    }

    #[test]
    fn declares_all_four_capabilities() {
        let provider = InMemoryProvider::new("aws-prod");
        assert!(provider.has_capability(Capability::Authorizer));
        assert!(provider.has_capability(Capability::Rbac));
        assert!(provider.has_capability(Capability::Identities));
        assert!(provider.has_capability(Capability::Notifier));
    }
}
