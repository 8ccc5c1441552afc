//! Thumbnail resolution
//!
//! Picks one image URL for a post, trying cheap and authoritative sources
//! before heuristic ones:
//!
//! 1. the record's explicit thumbnail
//! 2. the first `<img>` in its HTML content
//! 3. a guess derived from its URL (see [`heuristic`])
//! 4. a cached record with the same id or slug that has a thumbnail
//! 5. a cached record with the same slug, using its thumbnail, content
//!    image, or first listed image
//! 6. a fixed placeholder
//!
//! Every hit from steps 1-5 is passed through [`normalize_size`].

pub mod heuristic;
mod size;

pub use heuristic::{DatedUploadPath, UrlHeuristic};
pub use size::{normalize_size, DEFAULT_SIZE};

use regex::Regex;
use std::sync::LazyLock;

use crate::models::post::non_empty;
use crate::models::PostRecord;

pub const DEFAULT_PLACEHOLDER: &str = "https://placehold.co/600x400?text=No+Image";

static IMG_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

/// Which step produced a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailSource {
    Explicit,
    Content,
    UrlHeuristic,
    CachedIdentity,
    CachedSlug,
    Placeholder,
}

/// Source of the first embedded image in an HTML fragment.
pub fn first_image(html: &str) -> Option<String> {
    IMG_SRC
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().replace("&amp;", "&"))
        .filter(|src| !src.is_empty())
}

pub struct ThumbnailResolver {
    size: u32,
    placeholder: String,
    heuristic: Option<Box<dyn UrlHeuristic>>,
}

impl Default for ThumbnailResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE, DEFAULT_PLACEHOLDER)
    }
}

impl ThumbnailResolver {
    pub fn new(size: u32, placeholder: impl Into<String>) -> Self {
        Self {
            size,
            placeholder: placeholder.into(),
            heuristic: Some(Box::new(DatedUploadPath)),
        }
    }

    /// Replace (or with `None`, disable) the URL heuristic step.
    pub fn with_heuristic(mut self, heuristic: Option<Box<dyn UrlHeuristic>>) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn resolve(&self, record: &PostRecord, cached: &[PostRecord]) -> String {
        self.resolve_with_source(record, cached).1
    }

    pub fn resolve_with_source(
        &self,
        record: &PostRecord,
        cached: &[PostRecord],
    ) -> (ThumbnailSource, String) {
        match self.find(record, cached) {
            Some((source, url)) => {
                tracing::debug!("Thumbnail from {:?}: {}", source, url);
                (source, normalize_size(&url, self.size))
            }
            None => (ThumbnailSource::Placeholder, self.placeholder.clone()),
        }
    }

    fn find(&self, record: &PostRecord, cached: &[PostRecord]) -> Option<(ThumbnailSource, String)> {
        if let Some(explicit) = non_empty(record.thumbnail.as_deref()) {
            return Some((ThumbnailSource::Explicit, explicit.to_string()));
        }

        if let Some(img) = record.content.as_deref().and_then(first_image) {
            return Some((ThumbnailSource::Content, img));
        }

        if let Some(guess) = self.guess_from_url(record) {
            return Some((ThumbnailSource::UrlHeuristic, guess));
        }

        let id = non_empty(record.id.as_deref());

        let by_identity = cached.iter().find_map(|c| {
            let same_id = id.is_some() && non_empty(c.id.as_deref()) == id;
            if same_id || record.shares_slug(c) {
                non_empty(c.thumbnail.as_deref()).map(str::to_string)
            } else {
                None
            }
        });
        if let Some(thumb) = by_identity {
            return Some((ThumbnailSource::CachedIdentity, thumb));
        }

        cached
            .iter()
            .filter(|c| record.shares_slug(c))
            .find_map(extract_any)
            .map(|thumb| (ThumbnailSource::CachedSlug, thumb))
    }

    fn guess_from_url(&self, record: &PostRecord) -> Option<String> {
        let heuristic = self.heuristic.as_ref()?;
        let url = non_empty(record.url.as_deref())?;
        let guess = heuristic.guess(url)?;
        tracing::debug!("Heuristic {} guessed {}", heuristic.name(), guess);
        Some(guess)
    }
}

/// Explicit thumbnail, then content image, then first listed image.
fn extract_any(record: &PostRecord) -> Option<String> {
    non_empty(record.thumbnail.as_deref())
        .map(str::to_string)
        .or_else(|| record.content.as_deref().and_then(first_image))
        .or_else(|| {
            record
                .images
                .iter()
                .find_map(|i| non_empty(Some(i.as_str())))
                .map(str::to_string)
        })
}

/// Resolve with the default size, placeholder and heuristic.
pub fn resolve_thumbnail(record: &PostRecord, cached: &[PostRecord]) -> String {
    ThumbnailResolver::default().resolve(record, cached)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPLICIT: &str = "https://1.bp.blogspot.com/-a/B/s1600/explicit.jpg";
    const CONTENT_IMG: &str = "https://2.bp.blogspot.com/-c/D/s72-c/content.jpg";
    const POST_URL: &str = "https://manga.example.com/2024/05/chapter-12.html";

    fn full_record() -> PostRecord {
        PostRecord {
            id: Some("12".into()),
            url: Some(POST_URL.into()),
            thumbnail: Some(EXPLICIT.into()),
            content: Some(format!(
                "<p>Intro</p><IMG class=\"x\" SRC='{}' alt=''><img src=\"https://other/2.jpg\">",
                CONTENT_IMG
            )),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_image() {
        assert_eq!(
            first_image("<div><img alt=\"a\"\n src=\"https://x/a.jpg?a=1&amp;b=2\"/></div>").as_deref(),
            Some("https://x/a.jpg?a=1&b=2")
        );
        assert_eq!(first_image("<p>no images</p><imgx src=\"nope\">"), None);
        assert_eq!(first_image("<img src=\"\">"), None);
    }

    #[test]
    fn test_fallback_order() {
        let resolver = ThumbnailResolver::default();
        let cached = vec![PostRecord {
            id: Some("12".into()),
            thumbnail: Some("https://i.imgur.com/CachedX.jpg".into()),
            ..Default::default()
        }];

        let mut record = full_record();
        assert_eq!(
            resolver.resolve_with_source(&record, &cached),
            (
                ThumbnailSource::Explicit,
                "https://1.bp.blogspot.com/-a/B/s600/explicit.jpg".to_string()
            )
        );

        record.thumbnail = None;
        assert_eq!(
            resolver.resolve_with_source(&record, &cached),
            (
                ThumbnailSource::Content,
                "https://2.bp.blogspot.com/-c/D/s600/content.jpg".to_string()
            )
        );

        record.content = None;
        assert_eq!(
            resolver.resolve_with_source(&record, &cached),
            (
                ThumbnailSource::UrlHeuristic,
                "https://manga.example.com/wp-content/uploads/2024/05/chapter-12.jpg?w=600"
                    .to_string()
            )
        );

        record.url = None;
        assert_eq!(
            resolver.resolve_with_source(&record, &cached),
            (
                ThumbnailSource::CachedIdentity,
                "https://i.imgur.com/CachedXl.jpg".to_string()
            )
        );

        assert_eq!(
            resolver.resolve_with_source(&record, &[]),
            (ThumbnailSource::Placeholder, DEFAULT_PLACEHOLDER.to_string())
        );
    }

    #[test]
    fn test_identity_match_by_url_derived_slug() {
        let resolver = ThumbnailResolver::default().with_heuristic(None);
        let record = PostRecord {
            url: Some(POST_URL.into()),
            ..Default::default()
        };
        let cached = vec![
            PostRecord {
                slug: Some("something-else".into()),
                thumbnail: Some("https://cdn.example.com/wrong.jpg".into()),
                ..Default::default()
            },
            PostRecord {
                slug: Some("chapter-12".into()),
                thumbnail: Some("https://cdn.example.com/right.jpg".into()),
                ..Default::default()
            },
        ];
        assert_eq!(
            resolver.resolve_with_source(&record, &cached),
            (
                ThumbnailSource::CachedIdentity,
                "https://cdn.example.com/right.jpg".to_string()
            )
        );
    }

    #[test]
    fn test_identity_match_when_explicit_and_url_slugs_differ() {
        let resolver = ThumbnailResolver::default().with_heuristic(None);
        let record = PostRecord {
            url: Some(POST_URL.into()),
            ..Default::default()
        };
        let cached = vec![PostRecord {
            slug: Some("ch-12-renamed".into()),
            url: Some("https://manga.example.com/2024/05/chapter-12.html".into()),
            thumbnail: Some("https://cdn.example.com/by-url.jpg".into()),
            ..Default::default()
        }];
        assert_eq!(
            resolver.resolve_with_source(&record, &cached),
            (
                ThumbnailSource::CachedIdentity,
                "https://cdn.example.com/by-url.jpg".to_string()
            )
        );

        let renamed = PostRecord {
            slug: Some("ch-12-renamed".into()),
            ..Default::default()
        };
        assert_eq!(
            resolver.resolve(&renamed, &cached),
            "https://cdn.example.com/by-url.jpg"
        );
    }

    #[test]
    fn test_slug_match_uses_extended_extraction() {
        let resolver = ThumbnailResolver::default();
        let record = PostRecord {
            slug: Some("chapter-12".into()),
            ..Default::default()
        };

        let with_content = vec![PostRecord {
            url: Some(POST_URL.into()),
            content: Some("<img src=\"https://cdn.example.com/from-content.jpg\">".into()),
            images: vec!["https://cdn.example.com/listed.jpg".into()],
            ..Default::default()
        }];
        assert_eq!(
            resolver.resolve_with_source(&record, &with_content),
            (
                ThumbnailSource::CachedSlug,
                "https://cdn.example.com/from-content.jpg".to_string()
            )
        );

        let with_images = vec![PostRecord {
            slug: Some("chapter-12".into()),
            images: vec!["".into(), "https://cdn.example.com/listed.jpg".into()],
            ..Default::default()
        }];
        assert_eq!(
            resolver.resolve(&record, &with_images),
            "https://cdn.example.com/listed.jpg"
        );
    }

    #[test]
    fn test_cached_match_without_any_image_falls_to_placeholder() {
        let resolver = ThumbnailResolver::new(600, "https://static.example/none.png");
        let record = PostRecord {
            id: Some("1".into()),
            slug: Some("a".into()),
            ..Default::default()
        };
        let cached = vec![PostRecord {
            id: Some("1".into()),
            slug: Some("a".into()),
            ..Default::default()
        }];
        assert_eq!(
            resolver.resolve(&record, &cached),
            "https://static.example/none.png"
        );
    }

    #[test]
    fn test_empty_explicit_field_is_ignored() {
        let record = PostRecord {
            thumbnail: Some("   ".into()),
            content: Some("<img src='https://cdn.example.com/c.jpg'>".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_thumbnail(&record, &[]),
            "https://cdn.example.com/c.jpg"
        );
    }

    #[test]
    fn test_custom_heuristic_is_used() {
        struct Fixed;
        impl UrlHeuristic for Fixed {
            fn name(&self) -> &'static str {
                "fixed"
            }
            fn guess(&self, _post_url: &str) -> Option<String> {
                Some("https://cdn.example.com/guess.jpg".into())
            }
        }

        let resolver = ThumbnailResolver::default().with_heuristic(Some(Box::new(Fixed)));
        let record = PostRecord {
            url: Some("https://site.example/p/about.html".into()),
            ..Default::default()
        };
        assert_eq!(
            resolver.resolve(&record, &[]),
            "https://cdn.example.com/guess.jpg"
        );
    }
}
