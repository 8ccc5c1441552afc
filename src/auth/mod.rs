//! Authentication against the third-party identity provider
//!
//! `TokenManager` owns the access/refresh token record and refreshes it on
//! demand through a `TokenExchange`. Interactive login (device code flow)
//! and the userinfo profile live alongside it.

pub mod exchange;
pub mod login;
pub mod manager;
pub mod profile;
pub mod tokens;

pub use exchange::{ExchangeError, HttpTokenExchange, TokenExchange, TokenGrant};
pub use login::login;
pub use manager::{Subscription, TokenEvent, TokenManager, TOKEN_KEY};
pub use profile::{ProfileService, UserProfile, PROFILE_KEY};
pub use tokens::{AuthTokens, EXPIRY_SKEW_MS};
