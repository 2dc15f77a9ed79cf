use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use tracing::info;

use crate::config::AuthenticatorConfig;
use crate::discovery::discover;
use crate::error::Error;
use crate::error::Result;
use crate::jwks_cache::JwksCache;
use crate::key_source::HttpKeySource;
use crate::key_source::KeySource;
use crate::key_source::StaticKeySource;
use crate::roles::RoleTranslator;
use crate::sink::ErrorSink;
use crate::sink::TracingErrorSink;
use crate::verifier::TokenVerifier;

/// Identity of an authenticated request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    /// Internal role names, in the order the provider listed them
    pub roles: Vec<String>,
    /// The token subject, when present
    pub subject: Option<String>,
}

/// Entry point for request-handling middleware
#[async_trait]
pub trait Authenticate: Send + Sync {
    /// Authenticate a request from its headers
    async fn authenticate_request(&self, headers: &HeaderMap) -> Result<UserInfo>;
}

/// Authenticates bearer tokens issued by an OpenID Connect provider
///
/// Composes token verification against a [`JwksCache`] with role translation.
pub struct Authenticator {
    verifier: TokenVerifier,
    translator: RoleTranslator,
    audience: String,
}

impl Authenticator {
    /// Discover the provider, load its keys and build the authenticator
    ///
    /// Refresh failures are logged through `tracing`.
    ///
    /// # Errors
    /// Returns `Error::Setup` if the configuration is invalid, or if discovery
    /// or the initial key load fails
    pub async fn new(config: AuthenticatorConfig) -> Result<Self> {
        Self::with_error_sink(config, Arc::new(TracingErrorSink)).await
    }

    /// Like [`Authenticator::new`], reporting refresh failures to `sink`
    pub async fn with_error_sink(
        config: AuthenticatorConfig,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self> {
        config.validate()?;

        let options = config.refresh_options();
        let leeway = config.leeway;

        let AuthenticatorConfig {
            use_http_key_source,
            issuer_url,
            audience,
            jwks_json,
            require_issuer,
            role_mapping,
            http_client,
            ..
        } = config;

        let client = match http_client {
            Some(client) => client,
            None => Client::builder()
                .timeout(options.refresh_timeout)
                .build()
                .map_err(|e| Error::Setup(format!("Could not build HTTP client: {e}")))?,
        };

        let metadata = discover(&client, &issuer_url).await.map_err(|e| {
            Error::Setup(format!(
                "Could not set up OIDC discovery with issuer '{issuer_url}': {e}"
            ))
        })?;

        let source: Arc<dyn KeySource> = if use_http_key_source {
            Arc::new(HttpKeySource::new(metadata.jwks_uri.clone(), client))
        } else {
            let document = jwks_json.ok_or_else(|| {
                Error::Setup(
                    "A static JWKS document is required when the HTTP key source is disabled"
                        .to_string(),
                )
            })?;
            Arc::new(StaticKeySource::new(document))
        };

        let jwks_cache = JwksCache::new(source, options, sink)
            .await
            .map_err(|e| Error::Setup(format!("Could not load signing keys: {e}")))?;

        let token_hint = metadata
            .token_endpoint
            .clone()
            .unwrap_or_else(|| metadata.issuer.clone());

        let mut verifier = TokenVerifier::new(Arc::new(jwks_cache))
            .with_leeway(leeway)
            .with_token_hint(token_hint);
        if require_issuer {
            verifier = verifier.with_issuer(metadata.issuer.clone());
        }

        info!(
            issuer = %metadata.issuer,
            jwks_uri = %metadata.jwks_uri,
            polling = use_http_key_source,
            "Authenticator ready"
        );

        Ok(Self {
            verifier,
            translator: RoleTranslator::new(role_mapping),
            audience,
        })
    }

    /// Compose an authenticator from an already loaded key cache, without discovery
    pub fn from_parts(
        jwks_cache: Arc<JwksCache>,
        audience: impl Into<String>,
        translator: RoleTranslator,
    ) -> Self {
        Self {
            verifier: TokenVerifier::new(jwks_cache),
            translator,
            audience: audience.into(),
        }
    }

    pub fn with_token_hint(mut self, hint: impl Into<String>) -> Self {
        self.verifier = self.verifier.with_token_hint(hint);
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.verifier = self.verifier.with_issuer(issuer);
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.verifier = self.verifier.with_leeway(leeway);
        self
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn translator(&self) -> &RoleTranslator {
        &self.translator
    }

    /// Authenticate a request from its headers; only `Authorization` is read
    pub async fn authenticate_request(&self, headers: &HeaderMap) -> Result<UserInfo> {
        let authorization = match headers.get(AUTHORIZATION) {
            Some(value) => value
                .to_str()
                .map_err(|_| Error::MissingOrMalformedCredential {
                    reason: "Authorization header is not valid text".to_string(),
                    hint: self.verifier.token_hint().to_string(),
                })?,
            None => "",
        };

        self.authenticate(authorization).await
    }

    /// Authenticate a raw `Authorization` header value
    pub async fn authenticate(&self, authorization: &str) -> Result<UserInfo> {
        let token = self.verifier.verify(authorization, &self.audience).await?;

        Ok(UserInfo {
            roles: self.translator.translate(token.realm_roles()),
            subject: token.claims.sub,
        })
    }

    /// Stop background key refresh
    pub async fn shutdown(&self) {
        self.verifier.jwks_cache().shutdown().await;
    }
}

#[async_trait]
impl Authenticate for Authenticator {
    async fn authenticate_request(&self, headers: &HeaderMap) -> Result<UserInfo> {
        Authenticator::authenticate_request(self, headers).await
    }
}
