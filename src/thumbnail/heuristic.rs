//! URL-derived thumbnail guesses
//!
//! Best effort only: the guessed image may not exist. Kept behind a trait
//! so the resolver can swap or drop it.

use url::Url;

/// Derives a candidate image URL from a post's canonical URL.
pub trait UrlHeuristic: Send + Sync {
    fn name(&self) -> &'static str;
    fn guess(&self, post_url: &str) -> Option<String>;
}

/// Dated permalinks (`/2024/05/[17/]slug[.html]`) map to the upload
/// directory convention `/wp-content/uploads/2024/05/slug.jpg`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatedUploadPath;

impl UrlHeuristic for DatedUploadPath {
    fn name(&self) -> &'static str {
        "dated-upload-path"
    }

    fn guess(&self, post_url: &str) -> Option<String> {
        let url = Url::parse(post_url).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();

        let year_at = segments.windows(2).position(|w| is_year(w[0]) && is_month(w[1]))?;
        let (year, month) = (segments[year_at], segments[year_at + 1]);

        let last = *segments.last()?;
        if segments.len() <= year_at + 2 || is_day(last) {
            return None;
        }
        let slug = last
            .strip_suffix(".html")
            .or_else(|| last.strip_suffix(".htm"))
            .unwrap_or(last);
        if slug.is_empty() {
            return None;
        }

        Some(format!(
            "{}/wp-content/uploads/{}/{}/{}.jpg",
            url.origin().ascii_serialization(),
            year,
            month,
            slug
        ))
    }
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_year(s: &str) -> bool {
    all_digits(s, 4)
}

fn is_month(s: &str) -> bool {
    all_digits(s, 2) && matches!(s.parse::<u8>(), Ok(1..=12))
}

fn is_day(s: &str) -> bool {
    all_digits(s, 2) && matches!(s.parse::<u8>(), Ok(1..=31))
}
