use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::Deserializer;

use crate::error::Error;
use crate::error::Result;
use crate::roles::RoleMapping;

const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3600;
const DEFAULT_RATE_LIMIT_SECS: u64 = 300;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 10;

/// Timing of JWKS refreshes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOptions {
    /// Period of the scheduled background refresh. Zero disables it.
    pub refresh_interval: Duration,
    /// Minimum time between two refresh attempts
    pub rate_limit: Duration,
    /// Upper bound on a single fetch
    pub refresh_timeout: Duration,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            rate_limit: Duration::from_secs(DEFAULT_RATE_LIMIT_SECS),
            refresh_timeout: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
        }
    }
}

impl RefreshOptions {
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }
}

/// Configuration for the [`Authenticator`](crate::Authenticator)
///
/// Deserializable from any serde format; durations are given in seconds and
/// may be fractional (`0.5` is 500ms).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatorConfig {
    /// Poll the discovered JWKS endpoint instead of using `jwks_json`
    #[serde(default)]
    pub use_http_key_source: bool,
    /// Issuer URL used for OIDC discovery
    pub issuer_url: String,
    /// Audience every token must carry
    pub audience: String,
    /// Static JWKS document, used when `use_http_key_source` is false
    #[serde(default)]
    pub jwks_json: Option<String>,
    /// Period of the scheduled refresh. Zero disables it.
    #[serde(
        rename = "refresh_interval_secs",
        default = "default_refresh_interval",
        deserialize_with = "duration_from_secs"
    )]
    pub refresh_interval: Duration,
    /// Minimum time between two refresh attempts
    #[serde(
        rename = "rate_limit_interval_secs",
        default = "default_rate_limit",
        deserialize_with = "duration_from_secs"
    )]
    pub rate_limit_interval: Duration,
    /// Upper bound on discovery and each JWKS fetch
    #[serde(
        rename = "refresh_timeout_secs",
        default = "default_refresh_timeout",
        deserialize_with = "duration_from_secs"
    )]
    pub refresh_timeout: Duration,
    /// Reject tokens whose `iss` differs from the discovered issuer
    #[serde(default)]
    pub require_issuer: bool,
    /// Clock skew tolerance for `exp`
    #[serde(rename = "leeway_secs", default, deserialize_with = "duration_from_secs")]
    pub leeway: Duration,
    /// Provider role to internal role table
    #[serde(default)]
    pub role_mapping: RoleMapping,
    /// Optional custom HTTP client for discovery and JWKS fetches
    /// If not provided, one with `refresh_timeout` as request timeout is built
    #[serde(skip)]
    pub http_client: Option<Client>,
}

fn default_refresh_interval() -> Duration {
    Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS)
}

fn default_rate_limit() -> Duration {
    Duration::from_secs(DEFAULT_RATE_LIMIT_SECS)
}

fn default_refresh_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS)
}

fn duration_from_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl AuthenticatorConfig {
    /// Create a configuration that polls the issuer's JWKS endpoint
    pub fn new(issuer_url: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            use_http_key_source: true,
            issuer_url: issuer_url.into(),
            audience: audience.into(),
            jwks_json: None,
            refresh_interval: default_refresh_interval(),
            rate_limit_interval: default_rate_limit(),
            refresh_timeout: default_refresh_timeout(),
            require_issuer: false,
            leeway: Duration::ZERO,
            role_mapping: RoleMapping::default(),
            http_client: None,
        }
    }

    /// Use a static JWKS document instead of polling
    pub fn with_static_jwks(mut self, document: impl Into<String>) -> Self {
        self.use_http_key_source = false;
        self.jwks_json = Some(document.into());
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_rate_limit_interval(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn with_required_issuer(mut self) -> Self {
        self.require_issuer = true;
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn with_role_mapping(mut self, mapping: RoleMapping) -> Self {
        self.role_mapping = mapping;
        self
    }

    /// Set a custom HTTP client
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn refresh_options(&self) -> RefreshOptions {
        RefreshOptions {
            refresh_interval: self.refresh_interval,
            rate_limit: self.rate_limit_interval,
            refresh_timeout: self.refresh_timeout,
        }
    }

    /// Check settings the authenticator cannot run with
    ///
    /// # Errors
    /// Returns `Error::Setup` for an empty audience, a zero rate limit or a
    /// zero refresh timeout
    pub fn validate(&self) -> Result<()> {
        if self.audience.is_empty() {
            return Err(Error::Setup(
                "An expected audience must be configured".to_string(),
            ));
        }
        if self.rate_limit_interval.is_zero() {
            return Err(Error::Setup(
                "The JWKS refresh rate limit must be greater than zero".to_string(),
            ));
        }
        if self.refresh_timeout.is_zero() {
            return Err(Error::Setup(
                "The JWKS refresh timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_omitted() {
        let config: AuthenticatorConfig = serde_json::from_str(
            r#"{"issuer_url": "https://idp.example.com/realms/tornjak", "audience": "tornjak"}"#,
        )
        .unwrap();

        assert!(!config.use_http_key_source);
        assert!(!config.require_issuer);
        assert_eq!(config.refresh_options(), RefreshOptions::default());
        assert_eq!(config.role_mapping, RoleMapping::default());
        assert_eq!(config.leeway, Duration::ZERO);
    }

    #[test]
    fn default_refresh_timings() {
        let options = RefreshOptions::default();
        assert_eq!(options.refresh_interval, Duration::from_secs(3600));
        assert_eq!(options.rate_limit, Duration::from_secs(300));
        assert_eq!(options.refresh_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_overrides() {
        let config = AuthenticatorConfig::new("https://idp.example.com", "tornjak")
            .with_rate_limit_interval(Duration::from_secs(60))
            .with_static_jwks(r#"{"keys": []}"#);

        assert!(!config.use_http_key_source);
        assert_eq!(config.refresh_options().rate_limit, Duration::from_secs(60));
        assert!(config.jwks_json.is_some());
    }

    #[test]
    fn sub_second_durations_are_kept() {
        let config = AuthenticatorConfig::new("https://idp.example.com", "tornjak")
            .with_refresh_interval(Duration::from_millis(1500))
            .with_rate_limit_interval(Duration::from_millis(900))
            .with_refresh_timeout(Duration::from_millis(500));

        let options = config.refresh_options();
        assert_eq!(options.refresh_interval, Duration::from_millis(1500));
        assert_eq!(options.rate_limit, Duration::from_millis(900));
        assert_eq!(options.refresh_timeout, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn fractional_seconds_deserialize() {
        let config: AuthenticatorConfig = serde_json::from_str(
            r#"{
                "issuer_url": "https://idp.example.com/realms/tornjak",
                "audience": "tornjak",
                "rate_limit_interval_secs": 0.9,
                "refresh_timeout_secs": 0.5,
                "leeway_secs": 30
            }"#,
        )
        .unwrap();

        assert_eq!(config.refresh_options().rate_limit, Duration::from_millis(900));
        assert_eq!(config.refresh_options().refresh_timeout, Duration::from_millis(500));
        assert_eq!(config.leeway, Duration::from_secs(30));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let result = serde_json::from_str::<AuthenticatorConfig>(
            r#"{"issuer_url": "https://idp.example.com", "audience": "tornjak", "refresh_timeout_secs": -1}"#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let config = AuthenticatorConfig::new("https://idp.example.com", "tornjak")
            .with_rate_limit_interval(Duration::ZERO);

        assert!(matches!(config.validate(), Err(Error::Setup(_))));
    }

    #[test]
    fn zero_refresh_timeout_is_rejected() {
        let config = AuthenticatorConfig::new("https://idp.example.com", "tornjak")
            .with_refresh_timeout(Duration::ZERO);

        assert!(matches!(config.validate(), Err(Error::Setup(_))));
    }

    #[test]
    fn empty_audience_is_rejected() {
        let config = AuthenticatorConfig::new("https://idp.example.com", "");

        assert!(matches!(config.validate(), Err(Error::Setup(_))));
    }
}
