use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::openid_discovery_error;
use crate::error::Error;
use crate::error::Result;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Subset of the OpenID provider metadata this crate consumes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
}

/// Resolve provider metadata from `{issuer}/.well-known/openid-configuration`
pub async fn discover(client: &Client, issuer_url: &str) -> Result<ProviderMetadata> {
    let url = discovery_url(issuer_url);
    debug!(url = %url, "Fetching OIDC discovery document");

    let metadata: ProviderMetadata = client
        .get(&url)
        .send()
        .await
        .map_err(openid_discovery_error)?
        .error_for_status()
        .map_err(openid_discovery_error)?
        .json()
        .await
        .map_err(openid_discovery_error)?;

    if metadata.jwks_uri.is_empty() {
        return Err(Error::Discovery(format!(
            "Provider metadata at {url} has an empty jwks_uri"
        )));
    }

    Ok(metadata)
}

fn discovery_url(issuer_url: &str) -> String {
    if issuer_url.ends_with(WELL_KNOWN_PATH) {
        issuer_url.to_string()
    } else {
        format!("{}{WELL_KNOWN_PATH}", issuer_url.trim_end_matches('/'))
    }
}
