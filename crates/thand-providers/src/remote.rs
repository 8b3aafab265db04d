//! Remote provider proxy (spec §4.4): forwards every capability call to a
//! provider service over HTTP, at `POST {base_url}/provider/{key}/<method>`.
//! A 404 response is mapped to "provider does not exist" so the caller sees
//! the same error shape it would for an unregistered local provider.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use thand_core::model::{AuthorizeRoleResponse, LocalSession, RevokeRoleRequest, RevokeRoleResponse};
use thand_core::provider::{
    Authorizer, AuthorizeRoleRequest, AuthorizeUser, Capability, Identities, IdentityPage,
    NotificationRequest, Notifier, Provider, Rbac,
};
use thand_core::ThandError;

/// Proxies every capability dispatch over HTTP to an operator-run provider
/// service. `key` is the path segment identifying the provider instance
/// (spec §4.4 `/provider/{key}/<method>`).
pub struct RemoteProvider {
    kind: String,
    key: String,
    base_url: String,
    capabilities: Vec<Capability>,
    client: Client,
}

impl RemoteProvider {
    pub fn new(kind: impl Into<String>, key: impl Into<String>, base_url: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
            base_url: base_url.into(),
            capabilities,
            client: Client::new(),
        }
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, ThandError> {
        let url = format!("{}/provider/{}/{}", self.base_url.trim_end_matches('/'), self.key, method);
        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            ThandError::transient_provider(format!("provider request to {url:?} failed: {e}"))
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                Err(ThandError::validation(format!("provider does not exist: {:?}", self.key)))
            }
            status if status.is_success() => response.json::<Value>().await.map_err(|e| {
                ThandError::transient_provider(format!("malformed provider response: {e}"))
            }),
            status if status.is_server_error() => Err(ThandError::transient_provider(format!(
                "provider {:?} returned {status}",
                self.key
            ))),
            status => Err(ThandError::fatal_provider(format!(
                "provider {:?} returned {status}",
                self.key
            ))),
        }
    }
}

impl Provider for RemoteProvider {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn as_authorizer(&self) -> Option<&dyn Authorizer> {
        self.has_capability(Capability::Authorizer).then_some(self as &dyn Authorizer)
    }

    fn as_rbac(&self) -> Option<&dyn Rbac> {
        self.has_capability(Capability::Rbac).then_some(self as &dyn Rbac)
    }

    fn as_identities(&self) -> Option<&dyn Identities> {
        self.has_capability(Capability::Identities).then_some(self as &dyn Identities)
    }

    fn as_notifier(&self) -> Option<&dyn Notifier> {
        self.has_capability(Capability::Notifier).then_some(self as &dyn Notifier)
    }
}

#[async_trait]
impl Authorizer for RemoteProvider {
    async fn authorize_session(&self, user: &AuthorizeUser) -> Result<String, ThandError> {
        let response = self.call("authorize_session", serde_json::to_value(user).unwrap_or(Value::Null)).await?;
        response["redirect_url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ThandError::transient_provider("authorize_session response missing redirect_url"))
    }

    async fn create_session(&self, user: &AuthorizeUser) -> Result<LocalSession, ThandError> {
        let response = self.call("create_session", serde_json::to_value(user).unwrap_or(Value::Null)).await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed session response: {e}")))
    }

    async fn validate_session(&self, session: &LocalSession) -> Result<(), ThandError> {
        self.call("validate_session", serde_json::to_value(session).unwrap_or(Value::Null)).await?;
        Ok(())
    }

    async fn renew_session(&self, session: &LocalSession) -> Result<LocalSession, ThandError> {
        let response = self.call("renew_session", serde_json::to_value(session).unwrap_or(Value::Null)).await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed session response: {e}")))
    }
}

#[async_trait]
impl Rbac for RemoteProvider {
    async fn authorize_role(
        &self,
        req: &AuthorizeRoleRequest,
    ) -> Result<AuthorizeRoleResponse, ThandError> {
        let response = self.call("authorize_role", serde_json::to_value(req).unwrap_or(Value::Null)).await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed authorize_role response: {e}")))
    }

    async fn revoke_role(&self, req: &RevokeRoleRequest) -> Result<RevokeRoleResponse, ThandError> {
        let response = self.call("revoke_role", serde_json::to_value(req).unwrap_or(Value::Null)).await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed revoke_role response: {e}")))
    }

    async fn get_role(&self, name: &str) -> Result<Option<Value>, ThandError> {
        let response = self.call("get_role", serde_json::json!({"name": name})).await?;
        Ok(if response.is_null() { None } else { Some(response) })
    }

    async fn list_roles(&self) -> Result<Vec<String>, ThandError> {
        let response = self.call("list_roles", Value::Null).await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed list_roles response: {e}")))
    }

    async fn get_permission(&self, name: &str) -> Result<Option<Value>, ThandError> {
        let response = self.call("get_permission", serde_json::json!({"name": name})).await?;
        Ok(if response.is_null() { None } else { Some(response) })
    }

    async fn list_permissions(&self) -> Result<Vec<String>, ThandError> {
        let response = self.call("list_permissions", Value::Null).await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed list_permissions response: {e}")))
    }
}

#[async_trait]
impl Identities for RemoteProvider {
    async fn synchronize_users(&self, continuation_token: Option<String>) -> Result<IdentityPage, ThandError> {
        let response = self
            .call("synchronize_users", serde_json::json!({"continuation_token": continuation_token}))
            .await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed identity page: {e}")))
    }

    async fn synchronize_groups(&self, continuation_token: Option<String>) -> Result<IdentityPage, ThandError> {
        let response = self
            .call("synchronize_groups", serde_json::json!({"continuation_token": continuation_token}))
            .await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed identity page: {e}")))
    }

    async fn synchronize_identities(&self, continuation_token: Option<String>) -> Result<IdentityPage, ThandError> {
        let response = self
            .call("synchronize_identities", serde_json::json!({"continuation_token": continuation_token}))
            .await?;
        serde_json::from_value(response)
            .map_err(|e| ThandError::transient_provider(format!("malformed identity page: {e}")))
    }
}

#[async_trait]
impl Notifier for RemoteProvider {
    async fn send_notification(&self, req: &NotificationRequest) -> Result<(), ThandError> {
        self.call("send_notification", serde_json::to_value(req).unwrap_or(Value::Null)).await?;
        Ok(())
    }
}
