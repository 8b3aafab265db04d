//! The three core functions the runner must provide (spec §4.6).

use async_trait::async_trait;
use serde_json::{json, Value};
use thand_core::model::AuthorizeRoleResponse;
use thand_core::provider::{AuthorizeRoleRequest, Capability, NotificationRequest};
use thand_core::ThandError;

use super::context::FunctionContext;
use super::registry::Function;

/// `thand.notify`: looks up a notifier provider by name or kind, marshals
/// `with` plus the surrounding task into a [`NotificationRequest`], and
/// dispatches it. The provider must have the `Notifier` capability.
pub struct NotifyFunction;

#[async_trait]
impl Function for NotifyFunction {
    fn name(&self) -> &str {
        "thand.notify"
    }

    fn required_params(&self) -> &[&str] {
        &["provider", "to", "subject", "body"]
    }

    async fn execute(&self, ctx: &FunctionContext<'_>, with: &Value) -> Result<Value, ThandError> {
        let provider_name = with["provider"]
            .as_str()
            .ok_or_else(|| ThandError::validation("thand.notify: `provider` must be a string"))?;

        let provider = ctx.providers.lookup(provider_name).ok_or_else(|| {
            ThandError::validation(format!("provider does not exist: {provider_name:?}"))
        })?;

        if !provider.has_capability(Capability::Notifier) {
            return Err(ThandError::validation(format!(
                "provider {provider_name:?} does not implement the notifier capability"
            )));
        }
        let notifier = provider.as_notifier().ok_or_else(|| {
            ThandError::validation(format!(
                "provider {provider_name:?} declares the notifier capability but has no implementation"
            ))
        })?;

        let to = parse_to_field(&with["to"])?;
        let subject = with["subject"].as_str().unwrap_or_default().to_string();
        let body = with["body"].as_str().unwrap_or_default().to_string();

        notifier
            .send_notification(&NotificationRequest { to, subject, body })
            .await?;

        Ok(json!({"notified": true}))
    }
}

/// Normalizes the `to` field: a single (optionally comma-delimited) string
/// or an array, always to a flat `Vec<String>` (spec §4.6).
fn parse_to_field(value: &Value) -> Result<Vec<String>, ThandError> {
    match value {
        Value::String(s) => Ok(s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| ThandError::validation("thand.notify: `to` entries must be strings"))
            })
            .collect(),
        Value::Null => Err(ThandError::validation("thand.notify: `to` is required")),
        _ => Err(ThandError::validation(
            "thand.notify: `to` must be a string or array of strings",
        )),
    }
}

/// `thand.authorize`: extracts the elevation request from the task context,
/// resolves the named provider, calls `AuthorizeRole`, and records the
/// response under `authorizations[identity]` for every requested identity.
pub struct AuthorizeFunction;

#[async_trait]
impl Function for AuthorizeFunction {
    fn name(&self) -> &str {
        "thand.authorize"
    }

    /// Default export merges the authorize response into the workflow
    /// context (spec §4.6: "`${ $context + . }` semantics").
    fn default_export(&self) -> Option<Value> {
        Some(json!("${ $context + . }"))
    }

    async fn execute(&self, ctx: &FunctionContext<'_>, _with: &Value) -> Result<Value, ThandError> {
        let provider_name = ctx.request.providers.first().ok_or_else(|| {
            ThandError::validation("elevate request has no providers to authorize against")
        })?;

        let provider = ctx.providers.lookup(provider_name).ok_or_else(|| {
            ThandError::validation(format!("provider does not exist: {provider_name:?}"))
        })?;

        if !provider.has_capability(Capability::Rbac) {
            return Err(ThandError::validation(format!(
                "provider {provider_name:?} does not implement the rbac capability"
            )));
        }
        let rbac = provider.as_rbac().ok_or_else(|| {
            ThandError::validation(format!(
                "provider {provider_name:?} declares the rbac capability but has no implementation"
            ))
        })?;

        let duration = thand_core::duration::parse_duration(&ctx.request.duration)?;

        let mut authorizations = ctx.context["authorizations"]
            .as_object()
            .cloned()
            .unwrap_or_default();

        for identity in &ctx.request.identities {
            let response = rbac
                .authorize_role(&AuthorizeRoleRequest {
                    identity: identity.clone(),
                    role_name: ctx.request.role.name.clone(),
                    duration_seconds: duration.as_secs(),
                })
                .await?;

            tracing::info!(
                identity = %identity,
                provider = %provider_name,
                scheduled_revocation_at = %(ctx.now + chrono::Duration::seconds(duration.as_secs() as i64)),
                "scheduled revocation recorded"
            );

            let encoded = serde_json::to_value(&response).map_err(|e| {
                ThandError::validation(format!("failed to serialize authorize response: {e}"))
            })?;
            authorizations.insert(identity.clone(), encoded);
        }

        Ok(json!({ "authorizations": authorizations }))
    }
}

/// `thand.revoke`: symmetric with `thand.authorize`. Reads a recorded
/// [`AuthorizeRoleResponse`] when available (supplying revocation metadata
/// such as a prior profile id), calls `RevokeRole`, and is safe to call
/// when no prior authorization was recorded (best-effort cleanup).
pub struct RevokeFunction;

#[async_trait]
impl Function for RevokeFunction {
    fn name(&self) -> &str {
        "thand.revoke"
    }

    fn default_export(&self) -> Option<Value> {
        Some(json!("${ $context + . }"))
    }

    async fn execute(&self, ctx: &FunctionContext<'_>, _with: &Value) -> Result<Value, ThandError> {
        let provider_name = ctx.request.providers.first().ok_or_else(|| {
            ThandError::validation("elevate request has no providers to revoke against")
        })?;

        let provider = ctx.providers.lookup(provider_name).ok_or_else(|| {
            ThandError::validation(format!("provider does not exist: {provider_name:?}"))
        })?;

        if !provider.has_capability(Capability::Rbac) {
            return Err(ThandError::validation(format!(
                "provider {provider_name:?} does not implement the rbac capability"
            )));
        }
        let rbac = provider.as_rbac().ok_or_else(|| {
            ThandError::validation(format!(
                "provider {provider_name:?} declares the rbac capability but has no implementation"
            ))
        })?;

        let authorizations = ctx.context["authorizations"].as_object().cloned();
        let mut revocations = ctx.context["revocations"]
            .as_object()
            .cloned()
            .unwrap_or_default();

        for identity in &ctx.request.identities {
            let prior: Option<AuthorizeRoleResponse> = authorizations
                .as_ref()
                .and_then(|m| m.get(identity))
                .and_then(|v| serde_json::from_value(v.clone()).ok());

            let response = rbac
                .revoke_role(&thand_core::model::RevokeRoleRequest {
                    identity: identity.clone(),
                    provider: provider_name.clone(),
                    prior,
                })
                .await?;

            let encoded = serde_json::to_value(&response).map_err(|e| {
                ThandError::validation(format!("failed to serialize revoke response: {e}"))
            })?;
            revocations.insert(identity.clone(), encoded);
        }

        Ok(json!({ "revocations": revocations }))
    }
}

/// `thand.wait`: pauses the workflow for the task's `with.duration` window
/// by returning the reserved `$status: "waiting"` directive (spec §4.8
/// "Honor status transitions dictated by handlers"). The orchestrator is
/// responsible for scheduling the actual timer (spec §4.9); this function
/// only marks the pause point.
pub struct WaitFunction;

#[async_trait]
impl Function for WaitFunction {
    fn name(&self) -> &str {
        "thand.wait"
    }

    fn required_params(&self) -> &[&str] {
        &["duration"]
    }

    async fn execute(&self, _ctx: &FunctionContext<'_>, with: &Value) -> Result<Value, ThandError> {
        let duration = with["duration"]
            .as_str()
            .ok_or_else(|| ThandError::validation("thand.wait: `duration` must be a string"))?;
        thand_core::duration::parse_duration(duration)?;
        Ok(json!({"$status": "waiting", "$resume_after": duration}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use thand_core::model::{PermissionSet, RevokeRoleRequest, RevokeRoleResponse};
    use thand_core::provider::{AuthorizeRoleRequest as Req, Provider, Rbac};
    use thand_core::{ElevateRequest, Role};

    struct FakeRbacProvider {
        revoked: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Rbac for FakeRbacProvider {
        async fn authorize_role(&self, req: &Req) -> Result<AuthorizeRoleResponse, ThandError> {
            Ok(AuthorizeRoleResponse {
                identity: req.identity.clone(),
                provider: "aws-prod".into(),
                metadata: json!({"prior_profile": "standard-user"}),
                authorized_at: thand_core::provider::now(),
            })
        }

        async fn revoke_role(&self, req: &RevokeRoleRequest) -> Result<RevokeRoleResponse, ThandError> {
            self.revoked.lock().unwrap().push(req.identity.clone());
            Ok(RevokeRoleResponse {
                identity: req.identity.clone(),
                provider: req.provider.clone(),
                metadata: Value::Null,
                revoked_at: thand_core::provider::now(),
            })
        }

        async fn get_role(&self, _name: &str) -> Result<Option<Value>, ThandError> {
            Ok(None)
        }
        async fn list_roles(&self) -> Result<Vec<String>, ThandError> {
            Ok(vec![])
        }
        async fn get_permission(&self, _name: &str) -> Result<Option<Value>, ThandError> {
            Ok(None)
        }
        async fn list_permissions(&self) -> Result<Vec<String>, ThandError> {
            Ok(vec![])
        }
    }

    impl Provider for FakeRbacProvider {
        fn kind(&self) -> &str {
            "aws-prod"
        }
        fn capabilities(&self) -> &[Capability] {
            &[Capability::Rbac]
        }
        fn as_rbac(&self) -> Option<&dyn Rbac> {
            Some(self)
        }
    }

    fn request() -> ElevateRequest {
        ElevateRequest {
            reason: "access to billing".into(),
            duration: "PT1H".into(),
            providers: vec!["aws-prod".into()],
            identities: vec!["u@example.com".into()],
            authenticator: "oauth2.google".into(),
            role: Role {
                name: "billing-reader".into(),
                description: String::new(),
                providers: vec!["aws-prod".into()],
                inherits: vec![],
                permissions: PermissionSet::default(),
                resources: PermissionSet::default(),
                authenticators: vec![],
                workflows: vec!["elevate".into()],
                enabled: true,
            },
            workflow: "elevate".into(),
            session: None,
        }
    }

    #[test]
    fn to_field_accepts_comma_string_and_array() {
        assert_eq!(
            parse_to_field(&json!("a@x.com, b@x.com")).unwrap(),
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );
        assert_eq!(
            parse_to_field(&json!(["a@x.com", "b@x.com"])).unwrap(),
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );
    }

    #[tokio::test]
    async fn authorize_records_response_under_identity() {
        let provider: Arc<dyn Provider> = Arc::new(FakeRbacProvider { revoked: Default::default() });
        let lookup = move |_: &str| Some(provider.clone());
        let req = request();
        let doc = json!({});
        let ctx = FunctionContext {
            context: &doc,
            variables: &HashMap::new(),
            request: &req,
            providers: &lookup,
            now: thand_core::provider::now(),
        };

        let output = AuthorizeFunction.execute(&ctx, &Value::Null).await.unwrap();
        assert!(output["authorizations"]["u@example.com"]["metadata"]["prior_profile"]
            .as_str()
            .is_some());
    }

    #[tokio::test]
    async fn revoke_is_best_effort_without_prior_authorization() {
        let provider = Arc::new(FakeRbacProvider { revoked: Default::default() });
        let provider_dyn: Arc<dyn Provider> = provider.clone();
        let lookup = move |_: &str| Some(provider_dyn.clone());
        let req = request();
        let doc = json!({}); // no prior `authorizations` recorded
        let ctx = FunctionContext {
            context: &doc,
            variables: &HashMap::new(),
            request: &req,
            providers: &lookup,
            now: thand_core::provider::now(),
        };

        let output = RevokeFunction.execute(&ctx, &Value::Null).await.unwrap();
        assert_eq!(output["revocations"]["u@example.com"]["identity"], json!("u@example.com"));
        assert_eq!(provider.revoked.lock().unwrap().as_slice(), ["u@example.com"]);
    }
}
