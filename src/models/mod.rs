//! Data models for blog content

pub mod post;

pub use post::*;
