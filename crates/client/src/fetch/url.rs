//! Locator canonicalization.
//!
//! Revalidation tokens are stored per locator, so two spellings of the same
//! address must map to one string.

/// Error type for locator canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LocatorError {
    #[error("empty locator")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid locator: {0}")]
    Invalid(String),
}

/// Canonicalize a locator string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host (the `url` crate does this for http/https)
/// 4. Remove fragment (#...)
/// 5. Keep query string intact; provider APIs are order-sensitive
pub fn canonicalize(input: &str) -> Result<url::Url, LocatorError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(LocatorError::Empty);
    }

    let with_scheme = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&with_scheme).map_err(|e| LocatorError::Invalid(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(LocatorError::UnsupportedScheme(parsed.scheme().to_string()));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(LocatorError::Invalid(format!("missing host in {trimmed}")));
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_anidb_dump() {
        let url = canonicalize("http://anidb.net/api/anime-titles.dat.gz").unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.path(), "/api/anime-titles.dat.gz");
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("api.thetvdb.com/series/80379").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("api.thetvdb.com"));
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_fragment() {
        let a = canonicalize("https://API.TheMovieDB.org/3/movie/1#top").unwrap();
        let b = canonicalize("  https://api.themoviedb.org/3/movie/1 ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.fragment(), None);
    }

    #[test]
    fn test_canonicalize_preserve_query() {
        let url = canonicalize("http://api.anidb.net:9001/httpapi?request=anime&aid=4521").unwrap();
        assert_eq!(url.query(), Some("request=anime&aid=4521"));
        assert_eq!(url.port(), Some(9001));
    }

    #[test]
    fn test_canonicalize_rejects_bad_input() {
        assert!(matches!(canonicalize(""), Err(LocatorError::Empty)));
        assert!(matches!(canonicalize("   "), Err(LocatorError::Empty)));
        assert!(matches!(canonicalize("ftp://example.com/x"), Err(LocatorError::UnsupportedScheme(_))));
    }
}
