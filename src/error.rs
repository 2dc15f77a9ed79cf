use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authenticator setup failed: {0}")]
    Setup(String),
    #[error("{reason}. Please obtain an access token here: {hint}")]
    MissingOrMalformedCredential { reason: String, hint: String },
    #[error("The provided token is not a well-formed JWT: {0}")]
    MalformedToken(String),
    #[error("No signing key with kid '{0}' is known")]
    UnknownKey(String),
    /// The reason is kept for logs only; `Display` stays opaque so callers
    /// cannot use the error text as a verification oracle.
    #[error("Token verification failed")]
    TokenVerificationFailed(VerificationFailure),
    #[error("Key source error: {0}")]
    KeySource(String),
    #[error("OIDC discovery error: {0}")]
    Discovery(String),
}

/// Why a token failed verification once its key had been resolved (or not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationFailure {
    Signature,
    Expired,
    Audience,
    Issuer,
    Algorithm,
    UnknownKey,
    Claims,
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Signature => "signature",
            Self::Expired => "expired",
            Self::Audience => "audience",
            Self::Issuer => "issuer",
            Self::Algorithm => "algorithm",
            Self::UnknownKey => "unknown_key",
            Self::Claims => "claims",
        };
        f.write_str(reason)
    }
}

impl Error {
    /// Whether this error belongs to a single request and should be answered
    /// with an authentication failure (HTTP 401) rather than a server fault.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingOrMalformedCredential { .. }
                | Self::MalformedToken(_)
                | Self::UnknownKey(_)
                | Self::TokenVerificationFailed(_)
        )
    }

    /// The verification reason code, if this is a `TokenVerificationFailed`.
    pub fn verification_failure(&self) -> Option<VerificationFailure> {
        match self {
            Self::TokenVerificationFailed(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerificationFailure {
    fn from(error: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match error.kind() {
            ErrorKind::InvalidSignature => Self::Signature,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidAudience => Self::Audience,
            ErrorKind::InvalidIssuer => Self::Issuer,
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => Self::Algorithm,
            ErrorKind::MissingRequiredClaim(claim) if claim == "exp" => Self::Expired,
            ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => Self::Audience,
            _ => Self::Claims,
        }
    }
}

pub(crate) fn openid_discovery_error(error: reqwest::Error) -> Error {
    Error::Discovery(format!("Failed to fetch OpenID config: {error}"))
}

pub(crate) fn fetch_jwks_error(error: reqwest::Error) -> Error {
    Error::KeySource(format!("Failed to fetch JWKS: {error}"))
}
