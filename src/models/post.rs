//! Post records as returned by the blog API

use serde::{Deserialize, Deserializer, Serialize};

/// A content record. Every field is optional; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    /// API identifier; the upstream sends either a number or a string
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "thumbnail_url", alias = "featuredImage")]
    pub thumbnail: Option<String>,
    /// HTML body
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl PostRecord {
    /// Explicit slug, or the one derived from the URL.
    pub fn effective_slug(&self) -> Option<String> {
        non_empty(self.slug.as_deref())
            .map(str::to_string)
            .or_else(|| self.url.as_deref().and_then(slug_from_url))
    }

    /// Every slug this record answers to: the explicit one and the one
    /// derived from its URL, when they differ.
    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = non_empty(self.slug.as_deref())
            .map(str::to_string)
            .into_iter()
            .collect();
        if let Some(derived) = self.url.as_deref().and_then(slug_from_url) {
            if !slugs.contains(&derived) {
                slugs.push(derived);
            }
        }
        slugs
    }

    /// Whether the two records share any slug.
    pub fn shares_slug(&self, other: &PostRecord) -> bool {
        let ours = self.slugs();
        other.slugs().iter().any(|s| ours.contains(s))
    }
}

/// Last meaningful path segment of a post URL, without `.html`.
///
/// `https://blog.example.com/2024/05/one-piece-1100.html` → `one-piece-1100`
pub fn slug_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?;
    let slug = segment
        .strip_suffix(".html")
        .or_else(|| segment.strip_suffix(".htm"))
        .unwrap_or(segment);
    (!slug.is_empty()).then(|| slug.to_string())
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
