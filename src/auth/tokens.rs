//! Token record

use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before `expires_at`.
pub const EXPIRY_SKEW_MS: i64 = 5 * 60 * 1000;

/// Persisted OAuth token record.
///
/// Always replaced as a whole; never mutated field by field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry, ms since epoch
    pub expires_at: i64,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>, expires_at: i64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
        }
    }

    /// Build a record from a provider grant received at `now_ms`.
    pub fn from_expires_in(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: u64,
        now_ms: i64,
    ) -> Self {
        let lifetime = i64::try_from(expires_in_secs)
            .unwrap_or(i64::MAX / 1000)
            .saturating_mul(1000);
        Self::new(access_token, refresh_token, now_ms.saturating_add(lifetime))
    }

    /// Stale once fewer than five minutes remain.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at.saturating_sub(EXPIRY_SKEW_MS)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|rt| !rt.is_empty())
    }
}

// Keep secrets out of logs
impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
