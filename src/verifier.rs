use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::decode;
use jsonwebtoken::decode_header;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::Algorithm;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use serde_json::error::Category;
use tracing::debug;

use crate::claims::KeycloakClaims;
use crate::claims::StandardClaims;
use crate::error::Error;
use crate::error::Result;
use crate::error::VerificationFailure;
use crate::jwks_cache::JwksCache;
use crate::key_source::VerificationKey;

const BEARER_SCHEME: &str = "Bearer";

/// Signing algorithms accepted by the verifier
///
/// Symmetric algorithms are never accepted: a JWKS only carries public keys.
pub const ACCEPTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// A token that passed verification
#[derive(Debug, Clone)]
pub struct ParsedToken {
    /// The raw compact JWT
    pub raw: String,
    pub header: Header,
    pub claims: KeycloakClaims,
    pub valid: bool,
}

impl ParsedToken {
    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.header.alg
    }

    pub fn realm_roles(&self) -> &[String] {
        self.claims.realm_roles()
    }
}

/// Extract the token from an `Authorization` header value
///
/// The value must be exactly `Bearer <token>`. `hint` tells the caller where
/// a token can be obtained.
pub fn bearer_token<'a>(authorization: &'a str, hint: &str) -> Result<&'a str> {
    if authorization.trim().is_empty() {
        return Err(Error::MissingOrMalformedCredential {
            reason: "Authorization header missing".to_string(),
            hint: hint.to_string(),
        });
    }

    let fields: Vec<&str> = authorization.split_whitespace().collect();
    match fields.as_slice() {
        [BEARER_SCHEME, token] => Ok(*token),
        _ => Err(Error::MissingOrMalformedCredential {
            reason: "Expected a bearer token".to_string(),
            hint: hint.to_string(),
        }),
    }
}

/// Verifies bearer JWTs against the keys of a [`JwksCache`]
pub struct TokenVerifier {
    jwks_cache: Arc<JwksCache>,
    expected_issuer: Option<String>,
    leeway: Duration,
    token_hint: String,
}

impl TokenVerifier {
    pub fn new(jwks_cache: Arc<JwksCache>) -> Self {
        Self {
            jwks_cache,
            expected_issuer: None,
            leeway: Duration::ZERO,
            token_hint: String::new(),
        }
    }

    /// Require the `iss` claim to equal `issuer`
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Clock skew tolerated on `exp`
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Where callers without a valid credential can obtain a token
    pub fn with_token_hint(mut self, hint: impl Into<String>) -> Self {
        self.token_hint = hint.into();
        self
    }

    pub fn token_hint(&self) -> &str {
        &self.token_hint
    }

    pub fn jwks_cache(&self) -> &Arc<JwksCache> {
        &self.jwks_cache
    }

    /// Verify the bearer token carried by an `Authorization` header value
    pub async fn verify(&self, authorization: &str, expected_audience: &str) -> Result<ParsedToken> {
        let token = bearer_token(authorization, &self.token_hint)?;
        self.verify_token(token, expected_audience).await
    }

    /// Verify a compact JWT
    pub async fn verify_token(&self, token: &str, expected_audience: &str) -> Result<ParsedToken> {
        let header = decode_header(token).map_err(|e| Error::MalformedToken(e.to_string()))?;

        let kid = header
            .kid
            .clone()
            .ok_or_else(|| Error::MalformedToken("missing 'kid' in token header".to_string()))?;

        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            debug!(alg = ?header.alg, "Rejecting token signed with an unaccepted algorithm");
            return Err(Error::TokenVerificationFailed(VerificationFailure::Algorithm));
        }

        let key = self.jwks_cache.lookup(&kid).await.map_err(|error| match error {
            Error::UnknownKey(kid) => {
                debug!(kid = %kid, "Rejecting token signed with an unknown key");
                Error::TokenVerificationFailed(VerificationFailure::UnknownKey)
            }
            other => other,
        })?;

        if !key.permits(header.alg) {
            debug!(
                kid = %kid,
                alg = ?header.alg,
                published = ?key.algorithm(),
                "Rejecting token whose algorithm differs from the key's"
            );
            return Err(Error::TokenVerificationFailed(VerificationFailure::Algorithm));
        }

        self.validate_jwt(token, header, &key, expected_audience)
    }

    /// Check signature, audience, expiry and (optionally) issuer
    fn validate_jwt(
        &self,
        token: &str,
        header: Header,
        key: &VerificationKey,
        expected_audience: &str,
    ) -> Result<ParsedToken> {
        if expected_audience.is_empty() {
            return Err(reject(VerificationFailure::Audience));
        }

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[expected_audience]);
        validation.set_required_spec_claims(&["exp", "aud"]);
        validation.leeway = self.leeway.as_secs();

        let token_data =
            decode::<KeycloakClaims>(token, key.decoding_key(), &validation).map_err(|e| {
                if is_malformed(&e) {
                    debug!(error = %e, "Rejecting token with an undecodable payload");
                    Error::MalformedToken(e.to_string())
                } else {
                    reject(VerificationFailure::from(e))
                }
            })?;

        if let Some(expected_issuer) = &self.expected_issuer {
            if token_data.claims.iss() != Some(expected_issuer.as_str()) {
                return Err(reject(VerificationFailure::Issuer));
            }
        }

        // `exp` must lie strictly in the future.
        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        if token_data.claims.exp().saturating_add(leeway) <= Utc::now().timestamp() {
            return Err(reject(VerificationFailure::Expired));
        }

        Ok(ParsedToken {
            raw: token.to_string(),
            header: token_data.header,
            claims: token_data.claims,
            valid: true,
        })
    }
}

/// Whether decoding failed because the token is not a JWT at all, as opposed
/// to a well-formed token with unacceptable claims
fn is_malformed(error: &jsonwebtoken::errors::Error) -> bool {
    match error.kind() {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Utf8(_) => true,
        ErrorKind::Json(e) => matches!(e.classify(), Category::Syntax | Category::Eof),
        _ => false,
    }
}

fn reject(reason: VerificationFailure) -> Error {
    debug!(reason = %reason, "Token verification failed");
    Error::TokenVerificationFailed(reason)
}
