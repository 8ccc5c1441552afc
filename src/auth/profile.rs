//! Signed-in user profile
//!
//! Fetched from the identity provider's userinfo endpoint and kept for a
//! fixed window (24 hours by default) under its own storage key.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::TokenManager;
use crate::clock::Clock;
use crate::storage::{self, KeyValueStore};

/// Storage key of the cached profile.
pub const PROFILE_KEY: &str = "user_profile";

/// Identity-provider profile claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    /// Any other claims the provider returned
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .or(self.sub.as_deref())
            .unwrap_or("(unknown)")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedProfile {
    #[serde(flatten)]
    profile: UserProfile,
    /// Write instant, ms since epoch
    timestamp: i64,
}

/// Decode the claims segment of a JWT without verifying it.
///
/// Used only for display, when the access token is itself an ID-style JWT
/// and userinfo is unreachable.
pub fn decode_jwt_claims(token: &str) -> Result<UserProfile> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        bail!("not a JWT");
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .context("JWT payload is not base64url")?;
    serde_json::from_slice(&bytes).context("JWT payload is not a claims object")
}

/// Profile lookup with a time-windowed local copy.
pub struct ProfileService {
    http: reqwest::Client,
    userinfo_url: String,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ProfileService {
    pub fn new(
        userinfo_url: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            userinfo_url: userinfo_url.into(),
            store,
            clock,
            ttl,
        }
    }

    /// Cached profile if still inside the freshness window.
    pub fn cached(&self) -> Option<UserProfile> {
        let cached = match storage::load_json::<CachedProfile>(self.store.as_ref(), PROFILE_KEY) {
            Ok(cached) => cached?,
            Err(e) => {
                tracing::warn!("Ignoring unreadable profile record: {}", e);
                return None;
            }
        };
        let age = self.clock.now_ms().saturating_sub(cached.timestamp);
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        (age < ttl_ms).then_some(cached.profile)
    }

    /// Cached profile, or a fresh fetch when the cache is empty, stale, or
    /// `force_refresh` is set. `None` when no usable token is available or
    /// the provider could not be reached.
    pub async fn current_user(
        &self,
        tokens: &TokenManager,
        force_refresh: bool,
    ) -> Option<UserProfile> {
        if !force_refresh {
            if let Some(profile) = self.cached() {
                tracing::debug!("Using cached profile");
                return Some(profile);
            }
        }

        let access_token = tokens.get_access_token().await?;
        match self.fetch(&access_token).await {
            Ok(profile) => {
                self.store(&profile);
                Some(profile)
            }
            Err(e) => {
                tracing::warn!("Userinfo fetch failed: {:#}", e);
                decode_jwt_claims(&access_token).ok()
            }
        }
    }

    /// Forget the cached profile.
    pub fn clear(&self) {
        if let Err(e) = self.store.remove(PROFILE_KEY) {
            tracing::warn!("Failed to remove cached profile: {}", e);
        }
    }

    async fn fetch(&self, access_token: &str) -> Result<UserProfile> {
        tracing::debug!("GET {}", self.userinfo_url);

        let resp = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .with_context(|| format!("GET {} failed", self.userinfo_url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("HTTP {} for {}: {}", status.as_u16(), self.userinfo_url, body);
        }

        resp.json().await.context("Failed to parse userinfo response")
    }

    fn store(&self, profile: &UserProfile) {
        let record = CachedProfile {
            profile: profile.clone(),
            timestamp: self.clock.now_ms(),
        };
        if let Err(e) = storage::save_json(self.store.as_ref(), PROFILE_KEY, &record) {
            tracing::warn!("Failed to cache profile: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::exchange::{ExchangeError, TokenExchange, TokenGrant};
    use crate::auth::AuthTokens;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    const NOW: i64 = 1_700_000_000_000;
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    struct NoExchange;

    #[async_trait]
    impl TokenExchange for NoExchange {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, ExchangeError> {
            Err(ExchangeError::Malformed("offline".into()))
        }
    }

    fn setup(userinfo_url: &str) -> (ProfileService, TokenManager, Arc<ManualClock>) {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let tokens = TokenManager::new(
            store.clone(),
            Arc::new(NoExchange),
            clock.clone(),
            Duration::from_secs(1),
        );
        let service = ProfileService::new(
            userinfo_url,
            store,
            clock.clone(),
            Duration::from_millis(DAY_MS as u64),
        );
        (service, tokens, clock)
    }

    #[tokio::test]
    async fn test_fetches_with_bearer_and_caches_for_a_day() {
        let (base, request) = crate::testutil::serve_once(
            200,
            r#"{"sub":"42","name":"Reader","email":"r@example.com","locale":"en"}"#,
        )
        .await;
        let (service, tokens, clock) = setup(&format!("{}/userinfo", base));
        tokens.set_tokens(AuthTokens::new("A1", None, NOW + DAY_MS * 2));

        let profile = service.current_user(&tokens, false).await.unwrap();
        assert_eq!(profile.display_name(), "Reader");
        assert_eq!(profile.extra.get("locale"), Some(&serde_json::json!("en")));

        let request = request.await.unwrap();
        assert_eq!(request.header("authorization"), Some("Bearer A1"));

        // Server is gone; these must come from the cache
        clock.advance(DAY_MS - 1);
        assert_eq!(service.current_user(&tokens, false).await, Some(profile));

        clock.advance(1);
        assert_eq!(service.cached(), None);
    }

    #[tokio::test]
    async fn test_without_token_returns_none() {
        let (service, tokens, _clock) = setup("http://127.0.0.1:9/userinfo");
        assert_eq!(service.current_user(&tokens, false).await, None);
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_jwt_claims() {
        let (base, _request) = crate::testutil::serve_once(500, "{}").await;
        let (service, tokens, _clock) = setup(&base);

        let claims = URL_SAFE_NO_PAD.encode(r#"{"sub":"7","email":"jwt@example.com"}"#);
        let jwt = format!("eyJhbGciOiJub25lIn0.{}.sig", claims);
        tokens.set_tokens(AuthTokens::new(jwt, None, NOW + DAY_MS));

        let profile = service.current_user(&tokens, false).await.unwrap();
        assert_eq!(profile.display_name(), "jwt@example.com");
        assert_eq!(service.cached(), None);
    }

    #[test]
    fn test_decode_jwt_claims_rejects_opaque_tokens() {
        assert!(decode_jwt_claims("ya29.opaque-token").is_err());
        assert!(decode_jwt_claims("a.b.c.d").is_err());
        assert!(decode_jwt_claims("a.!!!.c").is_err());
    }

    #[test]
    fn test_corrupt_cache_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store.set(PROFILE_KEY, "[1,2").unwrap();
        let service = ProfileService::new(
            "http://unused",
            store,
            Arc::new(ManualClock::new(NOW)),
            Duration::from_secs(60),
        );
        assert_eq!(service.cached(), None);
    }

    #[test]
    fn test_extreme_timestamp_is_stale() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                PROFILE_KEY,
                &format!("{{\"sub\":\"1\",\"timestamp\":{}}}", i64::MIN),
            )
            .unwrap();
        let service = ProfileService::new(
            "http://unused",
            store,
            Arc::new(ManualClock::new(NOW)),
            Duration::from_secs(60),
        );
        assert_eq!(service.cached(), None);
    }

    #[test]
    fn test_clear_removes_record() {
        let store = Arc::new(MemoryStore::new());
        let service = ProfileService::new(
            "http://unused",
            store.clone(),
            Arc::new(ManualClock::new(NOW)),
            Duration::from_secs(60),
        );
        service.store(&UserProfile {
            sub: Some("1".into()),
            name: None,
            email: None,
            picture: None,
            extra: Default::default(),
        });
        assert!(service.cached().is_some());
        service.clear();
        assert_eq!(store.get(PROFILE_KEY).unwrap(), None);
    }
}
