use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

/// Trait for accessing standard JWT/OIDC claims
///
/// The verifier checks issuer, audience and expiration through this trait,
/// independently of how a provider lays out its custom claims.
pub trait StandardClaims {
    /// Get the issuer (iss) claim, if present
    fn iss(&self) -> Option<&str>;

    /// Get the subject (sub) claim, if present
    fn sub(&self) -> Option<&str>;

    /// Get the audience (aud) claim
    fn aud(&self) -> &[String];

    /// Get the expiration time (exp) claim as a Unix timestamp
    fn exp(&self) -> i64;
}

/// JWT claims issued by a Keycloak realm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeycloakClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audiences, accepted as a single string or a list
    #[serde(default, deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    /// Expiration time as Unix timestamp
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Realm-level roles granted to the subject
    #[serde(rename = "realm_access", alias = "realmAccess", default)]
    pub realm_access: RealmAccess,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

impl KeycloakClaims {
    pub fn realm_roles(&self) -> &[String] {
        &self.realm_access.roles
    }
}

impl StandardClaims for KeycloakClaims {
    fn iss(&self) -> Option<&str> {
        self.iss.as_deref()
    }

    fn sub(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    fn aud(&self) -> &[String] {
        &self.aud
    }

    fn exp(&self) -> i64 {
        self.exp
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(aud) => aud,
    })
}
