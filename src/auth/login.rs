//! OAuth2 device code login
//!
//! Only the CLI starts this flow. The resulting tokens are handed to the
//! `TokenManager`, which owns them from then on.

use anyhow::{Context, Result};
use oauth2::{
    basic::BasicClient, AuthUrl, ClientId, DeviceAuthorizationUrl, Scope,
    StandardDeviceAuthorizationResponse, TokenResponse, TokenUrl,
};

use super::{AuthTokens, TokenManager};
use crate::clock::Clock;
use crate::config::IdentityProvider;

/// Fallback lifetime when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Build the OAuth2 client from the identity provider settings
fn build_client(provider: &IdentityProvider) -> Result<BasicClient> {
    let auth_url = AuthUrl::new(provider.auth_url.clone()).context("Invalid auth_url")?;
    let token_url = TokenUrl::new(provider.token_url.clone()).context("Invalid token_url")?;
    let device_url =
        DeviceAuthorizationUrl::new(provider.device_url.clone()).context("Invalid device_url")?;

    Ok(BasicClient::new(
        ClientId::new(provider.client_id.clone()),
        None,
        auth_url,
        Some(token_url),
    )
    .set_device_authorization_url(device_url))
}

/// Run the device code flow and store the resulting tokens.
pub async fn login(
    provider: &IdentityProvider,
    manager: &TokenManager,
    clock: &dyn Clock,
    force: bool,
) -> Result<()> {
    if !force {
        if let Some(token) = manager.snapshot() {
            if !token.is_expired(clock.now_ms()) {
                println!("Already logged in (token valid). Use --force to re-authenticate.");
                return Ok(());
            }
            if token.can_refresh() {
                tracing::info!("Token expired, attempting refresh...");
                if manager.refresh_access_token().await.is_some() {
                    println!("Token refreshed successfully.");
                    return Ok(());
                }
                tracing::warn!("Refresh failed, falling back to device code");
            }
        }
    }

    let client = build_client(provider)?;

    tracing::info!("Initiating device code flow...");

    let scopes = provider.scopes.iter().cloned().map(Scope::new);
    let device_auth_response: StandardDeviceAuthorizationResponse = client
        .exchange_device_code()?
        .add_scopes(scopes)
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .context("Failed to request device code")?;

    println!();
    println!(
        "To sign in, visit: {}",
        device_auth_response.verification_uri().as_str()
    );
    println!("Enter code:        {}", device_auth_response.user_code().secret());
    println!();

    tracing::info!("Waiting for authentication...");

    let token_response = client
        .exchange_device_access_token(&device_auth_response)
        .request_async(oauth2::reqwest::async_http_client, tokio::time::sleep, None)
        .await
        .context("Failed to exchange device code for token")?;

    let tokens = AuthTokens::from_expires_in(
        token_response.access_token().secret().to_string(),
        token_response
            .refresh_token()
            .map(|rt| rt.secret().to_string()),
        token_response
            .expires_in()
            .map_or(DEFAULT_EXPIRES_IN_SECS, |d| d.as_secs()),
        clock.now_ms(),
    );
    if !tokens.can_refresh() {
        eprintln!("Warning: provider issued no refresh token; you will need to log in again when it expires.");
    }
    manager.set_tokens(tokens);

    println!("Login successful.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_accepts_defaults() {
        assert!(build_client(&IdentityProvider::default()).is_ok());
    }

    #[test]
    fn test_build_client_rejects_bad_urls() {
        let provider = IdentityProvider {
            token_url: "not a url".to_string(),
            ..IdentityProvider::default()
        };
        assert!(build_client(&provider).is_err());
    }
}
