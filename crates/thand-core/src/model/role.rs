//! `Role` and composite-role resolution (spec §3, §8 invariant 4, §9 S3)

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ThandError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionSet {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl PermissionSet {
    /// Set-unions `self` with `other`, deduplicated, order not significant
    /// (spec §8 invariant 4: "Inherited permissions are set-unioned").
    fn union(&self, other: &PermissionSet) -> PermissionSet {
        PermissionSet {
            allow: union_dedup(&self.allow, &other.allow),
            deny: union_dedup(&self.deny, &other.deny),
        }
    }
}

fn union_dedup(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in a.iter().chain(b.iter()) {
        if seen.insert(item.clone()) {
            out.push(item.clone());
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub providers: Vec<String>,
    /// Each entry is either a bare role name or `provider:roleName` (split
    /// on the *first* colon only, so embedded-colon role names like cloud
    /// ARNs survive intact).
    #[serde(default)]
    pub inherits: Vec<String>,
    #[serde(default)]
    pub permissions: PermissionSet,
    #[serde(default)]
    pub resources: PermissionSet,
    #[serde(default)]
    pub authenticators: Vec<String>,
    #[serde(default)]
    pub workflows: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// A parsed `Inherits` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritRef {
    pub provider: Option<String>,
    pub role_name: String,
}

impl InheritRef {
    /// Splits on the first colon only - preserves cloud ARNs such as
    /// `aws-prod:arn:aws:iam::123456789012:role/TestRole`.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once(':') {
            Some((provider, role_name)) => InheritRef {
                provider: Some(provider.to_string()),
                role_name: role_name.to_string(),
            },
            None => InheritRef {
                provider: None,
                role_name: spec.to_string(),
            },
        }
    }
}

/// Resolves `role`'s full permission/resource closure by recursively
/// merging every role it inherits from, looked up via `resolver`.
/// `resolver(provider, role_name)` returns `None` for an unknown provider
/// prefix, which falls back to a global (provider-less) lookup per §8
/// invariant 4 ("An unknown provider prefix falls back to global role
/// resolution").
pub fn resolve_composite_role<F>(role: &Role, mut resolver: F) -> Result<Role, ThandError>
where
    F: FnMut(Option<&str>, &str) -> Option<Role>,
{
    let mut visited = HashSet::new();
    resolve_inner(role, &mut resolver, &mut visited)
}

fn resolve_inner<F>(
    role: &Role,
    resolver: &mut F,
    visited: &mut HashSet<String>,
) -> Result<Role, ThandError>
where
    F: FnMut(Option<&str>, &str) -> Option<Role>,
{
    if !visited.insert(role.name.clone()) {
        return Err(ThandError::validation(format!(
            "cycle detected while resolving role inheritance at {:?}",
            role.name
        )));
    }

    let mut merged_permissions = role.permissions.clone();
    let mut merged_resources = role.resources.clone();

    for spec in &role.inherits {
        let reference = InheritRef::parse(spec);
        let parent = resolver(reference.provider.as_deref(), &reference.role_name)
            .or_else(|| resolver(None, &reference.role_name))
            .ok_or_else(|| {
                ThandError::validation(format!("unresolvable inherited role {spec:?}"))
            })?;
        let resolved_parent = resolve_inner(&parent, resolver, visited)?;
        merged_permissions = merged_permissions.union(&resolved_parent.permissions);
        merged_resources = merged_resources.union(&resolved_parent.resources);
    }

    Ok(Role {
        permissions: merged_permissions,
        resources: merged_resources,
        ..role.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent_role() -> Role {
        Role {
            name: "aws-prod:arn:aws:iam::123456789012:role/TestRole".to_string(),
            description: String::new(),
            providers: vec!["aws-prod".into()],
            inherits: vec![],
            permissions: PermissionSet {
                allow: vec![
                    "s3:GetObject".into(),
                    "s3:ListBucket".into(),
                    "ec2:DescribeInstances".into(),
                ],
                deny: vec![],
            },
            resources: PermissionSet::default(),
            authenticators: vec![],
            workflows: vec![],
            enabled: true,
        }
    }

    fn child_role() -> Role {
        Role {
            name: "app-role".to_string(),
            description: String::new(),
            providers: vec!["aws-prod".into()],
            inherits: vec!["aws-prod:arn:aws:iam::123456789012:role/TestRole".to_string()],
            permissions: PermissionSet {
                allow: vec!["app:deploy".into()],
                deny: vec![],
            },
            resources: PermissionSet::default(),
            authenticators: vec![],
            workflows: vec![],
            enabled: true,
        }
    }

    #[test]
    fn inherit_ref_splits_on_first_colon_only() {
        let r = InheritRef::parse("aws-prod:arn:aws:iam::123456789012:role/TestRole");
        assert_eq!(r.provider.as_deref(), Some("aws-prod"));
        assert_eq!(r.role_name, "arn:aws:iam::123456789012:role/TestRole");
    }

    #[test]
    fn bare_role_has_no_provider_prefix() {
        let r = InheritRef::parse("billing-reader");
        assert_eq!(r.provider, None);
        assert_eq!(r.role_name, "billing-reader");
    }

    #[test]
    fn s3_composite_role_is_union_of_parent_and_child() {
        let parent = parent_role();
        let child = child_role();
        let resolved = resolve_composite_role(&child, |_, name| {
            if name == parent.name {
                Some(parent.clone())
            } else {
                None
            }
        })
        .unwrap();

        let mut allow = resolved.permissions.allow.clone();
        allow.sort();
        let mut expected = vec![
            "app:deploy".to_string(),
            "s3:GetObject".to_string(),
            "s3:ListBucket".to_string(),
            "ec2:DescribeInstances".to_string(),
        ];
        expected.sort();
        assert_eq!(allow, expected);
    }

    #[test]
    fn unknown_provider_prefix_falls_back_to_global_lookup() {
        let mut role = child_role();
        role.inherits = vec!["no-such-provider:some-global-role".to_string()];
        let global = Role {
            name: "some-global-role".to_string(),
            permissions: PermissionSet {
                allow: vec!["global:read".into()],
                deny: vec![],
            },
            ..parent_role()
        };
        let resolved = resolve_composite_role(&role, |provider, name| {
            if provider == Some("no-such-provider") {
                None
            } else if name == "some-global-role" {
                Some(global.clone())
            } else {
                None
            }
        })
        .unwrap();
        assert!(resolved.permissions.allow.contains(&"global:read".to_string()));
    }
}
