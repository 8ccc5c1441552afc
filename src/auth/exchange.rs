//! Refresh-token exchange against the identity provider's token endpoint

use async_trait::async_trait;
use serde::Deserialize;

/// Successful token endpoint response.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("expires_in", &self.expires_in)
            .field("rotated_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// Why a refresh attempt did not produce a grant.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("token endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed token response: {0}")]
    Malformed(String),

    #[error("token refresh timed out")]
    Timeout,
}

/// One round trip exchanging a refresh token for a new access token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError>;
}

/// Form-encoded `grant_type=refresh_token` POST.
pub struct HttpTokenExchange {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
}

impl HttpTokenExchange {
    pub fn new(token_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: token_url.into(),
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
        tracing::debug!("POST {} (refresh_token grant)", self.token_url);

        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_grant(&body)
    }
}

/// Parse a token endpoint body, rejecting empty access tokens.
pub fn parse_grant(body: &str) -> Result<TokenGrant, ExchangeError> {
    let grant: TokenGrant =
        serde_json::from_str(body).map_err(|e| ExchangeError::Malformed(e.to_string()))?;
    if grant.access_token.is_empty() {
        return Err(ExchangeError::Malformed("empty access_token".to_string()));
    }
    Ok(grant)
}
