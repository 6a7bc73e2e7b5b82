//! Indirect search-result link resolution.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// Path prefix of redirect links served by the search source.
const INDIRECT_PREFIX: &str = "/link?";

/// Captures the percent-encoded destination in `url=<target>`.
static TARGET_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\?|&)url=([^&#]+)").expect("target param regex"));

/// Unwrap an indirect `/link?...&url=<encoded>` link to its destination.
///
/// Any other link, or an indirect one without a decodable `url` parameter,
/// is returned verbatim.
pub fn resolve_link(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with(INDIRECT_PREFIX) {
        if let Some(target) = TARGET_PARAM_RE.captures(raw).and_then(|c| c.get(1)) {
            if let Ok(decoded) = urlencoding::decode(target.as_str()) {
                return decoded.into_owned();
            }
        }
    }
    raw.to_string()
}

/// Whether a resolved link is an absolute http(s) URL.
pub fn is_absolute(link: &str) -> bool {
    Url::parse(link)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_indirect_link() {
        let raw = "/link?foo=1&url=https%3A%2F%2Fexample.com%2Fcourts%3Fid%3D7&bar=2";
        assert_eq!(resolve_link(raw), "https://example.com/courts?id=7");
    }

    #[test]
    fn url_param_first() {
        let raw = "/link?url=http%3A%2F%2Fa.cn%2F";
        assert_eq!(resolve_link(raw), "http://a.cn/");
    }

    #[test]
    fn scheme_qualified_link_unchanged() {
        let raw = "https://www.example.com/a?url=http%3A%2F%2Fother";
        assert_eq!(resolve_link(raw), raw);
    }

    #[test]
    fn indirect_without_target_kept_verbatim() {
        assert_eq!(resolve_link("/link?token=abc"), "/link?token=abc");
        assert!(!is_absolute(&resolve_link("/link?token=abc")));
    }

    #[test]
    fn only_http_urls_are_absolute() {
        assert!(is_absolute("https://example.com/x"));
        assert!(is_absolute("http://example.com"));
        assert!(!is_absolute("/relative/path"));
        assert!(!is_absolute("javascript:void(0)"));
        assert!(!is_absolute("ftp://example.com/file"));
        assert!(!is_absolute(""));
    }
}
