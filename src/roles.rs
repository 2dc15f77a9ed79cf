use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

const VIEWER_REALM_ROLE: &str = "tornjak-viewer-realm-role";
const ADMIN_REALM_ROLE: &str = "tornjak-admin-realm-role";

/// Immutable mapping from identity-provider realm roles to internal roles.
///
/// Built once at startup (from configuration or [`RoleMapping::default`]) and
/// handed to a [`RoleTranslator`]; it is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleMapping {
    roles: HashMap<String, String>,
}

impl RoleMapping {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            roles: entries
                .into_iter()
                .map(|(provider, internal)| (provider.into(), internal.into()))
                .collect(),
        }
    }

    pub fn get(&self, provider_role: &str) -> Option<&str> {
        self.roles.get(provider_role).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl Default for RoleMapping {
    fn default() -> Self {
        Self::new([(VIEWER_REALM_ROLE, "viewer"), (ADMIN_REALM_ROLE, "admin")])
    }
}

/// Translates provider realm roles into the internal role vocabulary.
#[derive(Debug, Clone, Default)]
pub struct RoleTranslator {
    mapping: RoleMapping,
}

impl RoleTranslator {
    pub fn new(mapping: RoleMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &RoleMapping {
        &self.mapping
    }

    /// Unknown roles are dropped, order follows the input and duplicates are kept.
    pub fn translate<S: AsRef<str>>(&self, provider_roles: &[S]) -> Vec<String> {
        provider_roles
            .iter()
            .filter_map(|role| self.mapping.get(role.as_ref()))
            .map(str::to_string)
            .collect()
    }
}
