//! # Keyward
//!
//! Bearer JWT authentication against an OpenID Connect provider such as Keycloak.
//!
//! Incoming requests carry `Authorization: Bearer <jwt>`. The token signature is
//! checked against the provider's JWKS, which is cached and kept fresh, then the
//! audience and expiry are validated and the realm roles in the token are
//! translated into the application's own role names.
//!
//! ## Features
//!
//! - OIDC discovery of the JWKS endpoint
//! - JWKS from a polled URL or a static JSON document
//! - Scheduled JWKS refresh plus refresh on unknown `kid`, rate limited and
//!   coalesced across concurrent requests
//! - Refresh failures reported to an injectable error sink, stale keys kept
//! - Audience and expiration validation, asymmetric algorithms only
//! - Realm role translation through an explicit mapping table
//!
//! ## Example
//!
//! ```rust,no_run
//! use keyward::{Authenticator, AuthenticatorConfig};
//! use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthenticatorConfig::new(
//!         "https://keycloak.example.com/realms/tornjak",
//!         "tornjak",
//!     )
//!     .with_rate_limit_interval(Duration::from_secs(300));
//!
//!     let authenticator = Authenticator::new(config).await?;
//!
//!     let mut headers = HeaderMap::new();
//!     headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer eyJhbGciOiJSUzI1NiIs..."));
//!
//!     let user = authenticator.authenticate_request(&headers).await?;
//!     println!("Roles: {:?}", user.roles);
//!
//!     Ok(())
//! }
//! ```

mod authenticator;
mod claims;
mod config;
mod discovery;
mod error;
mod jwks_cache;
mod key_source;
mod roles;
mod sink;
mod verifier;

// Re-exports for public API
pub use authenticator::Authenticate;
pub use authenticator::Authenticator;
pub use authenticator::UserInfo;
pub use claims::KeycloakClaims;
pub use claims::RealmAccess;
pub use claims::StandardClaims;
pub use config::AuthenticatorConfig;
pub use config::RefreshOptions;
pub use discovery::discover;
pub use discovery::ProviderMetadata;
pub use error::Error;
pub use error::Result;
pub use error::VerificationFailure;
pub use jwks_cache::JwksCache;
pub use jwks_cache::RefreshState;
pub use key_source::HttpKeySource;
pub use key_source::KeySet;
pub use key_source::KeySource;
pub use key_source::StaticKeySource;
pub use key_source::VerificationKey;
pub use roles::RoleMapping;
pub use roles::RoleTranslator;
pub use sink::ErrorSink;
pub use sink::TracingErrorSink;
pub use verifier::bearer_token;
pub use verifier::ParsedToken;
pub use verifier::TokenVerifier;
pub use verifier::ACCEPTED_ALGORITHMS;
