//! Reader client core
//!
//! Token lifecycle, read-through response cache and thumbnail resolution
//! for the manga/blog reader, plus the small local stores (bookmarks,
//! history, profile) the pages use.

pub mod app;
pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod library;
pub mod models;
pub mod storage;
pub mod thumbnail;

#[cfg(test)]
mod testutil;

pub use app::App;
pub use auth::{AuthTokens, TokenEvent, TokenManager};
pub use cache::ReadThroughCache;
pub use thumbnail::{normalize_size, resolve_thumbnail, ThumbnailResolver};
