use std::sync::Arc;
use std::time::Duration;

use keyward::Authenticator;
use keyward::AuthenticatorConfig;
use keyward::Error;
use keyward::RoleMapping;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::AUTHORIZATION;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "keyward=debug".into()))
        .init();

    let issuer = std::env::var("OIDC_ISSUER")
        .unwrap_or_else(|_| "http://localhost:8080/realms/tornjak".to_string());
    let token = std::env::var("ACCESS_TOKEN").unwrap_or_default();

    // Example 1: Poll the provider's JWKS with custom refresh timings
    println!("=== Example 1: Polling JWKS ===");
    let config = AuthenticatorConfig::new(&issuer, "tornjak")
        .with_refresh_interval(Duration::from_secs(1800))
        .with_rate_limit_interval(Duration::from_secs(60))
        .with_refresh_timeout(Duration::from_secs(5))
        .with_role_mapping(RoleMapping::new([
            ("tornjak-viewer-realm-role", "viewer"),
            ("tornjak-admin-realm-role", "admin"),
            ("tornjak-auditor-realm-role", "viewer"),
        ]));

    // Report refresh failures somewhere other than the default tracing sink
    let sink = Arc::new(|error: &Error| eprintln!("JWKS refresh failed: {error}"));
    let authenticator = Authenticator::with_error_sink(config, sink).await?;

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);

    match authenticator.authenticate_request(&headers).await {
        Ok(user) => {
            println!("✓ Token verified successfully!");
            println!("  Roles: {:?}", user.roles);
            println!("  Subject: {:?}", user.subject);
        }
        Err(e) if e.is_authentication_failure() => {
            // Reason codes stay in logs; callers just get a 401
            eprintln!("✗ 401 Unauthorized: {e} (reason: {:?})", e.verification_failure());
        }
        Err(e) => {
            eprintln!("✗ Authentication error: {e}");
        }
    }

    authenticator.shutdown().await;

    println!();

    // Example 2: Verify against a static JWKS document
    println!("=== Example 2: Static JWKS ===");
    if let Ok(jwks) = std::env::var("JWKS_JSON") {
        let config = AuthenticatorConfig::new(&issuer, "tornjak").with_static_jwks(jwks);
        let authenticator = Authenticator::new(config).await?;

        match authenticator.authenticate(&format!("Bearer {token}")).await {
            Ok(user) => println!("✓ Roles: {:?}", user.roles),
            Err(e) => eprintln!("✗ {e}"),
        }
    } else {
        println!("Set JWKS_JSON to try a static key set");
    }

    Ok(())
}
