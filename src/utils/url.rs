//! Helpers for turning the configured service root into endpoint URLs.

use reqwest::Url;

/// Strip trailing slashes so endpoints can be appended with a single `/`.
///
/// # Examples
///
/// ```
/// use parley::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:3001/"), "http://localhost:3001");
/// assert_eq!(normalize_base_url("https://rag.example.com/v2///"), "https://rag.example.com/v2");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join the service root and an endpoint path without doubling slashes.
///
/// # Examples
///
/// ```
/// use parley::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:3001/", "/api/chat"),
///     "http://localhost:3001/api/chat"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// Checks that `base_url` is an absolute http(s) URL and returns it normalized.
pub fn validate_base_url(base_url: &str) -> Result<String, String> {
    let trimmed = base_url.trim();
    let parsed =
        Url::parse(trimmed).map_err(|err| format!("invalid base URL {trimmed:?}: {err}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(normalize_base_url(trimmed)),
        other => Err(format!("invalid base URL {trimmed:?}: unsupported scheme {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("http://localhost:3001"),
            "http://localhost:3001"
        );
        assert_eq!(
            normalize_base_url("http://localhost:3001///"),
            "http://localhost:3001"
        );
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("http://localhost:3001", "api/chat"),
            "http://localhost:3001/api/chat"
        );
        assert_eq!(
            construct_api_url("https://rag.example.com/v2/", "/api/chat/regenerate"),
            "https://rag.example.com/v2/api/chat/regenerate"
        );
    }

    #[test]
    fn test_validate_base_url() {
        assert_eq!(
            validate_base_url(" https://rag.example.com/ "),
            Ok("https://rag.example.com".to_string())
        );
        assert!(validate_base_url("localhost:3001")
            .unwrap_err()
            .contains("unsupported scheme"));
        assert!(validate_base_url("ftp://files.example.com").is_err());
        assert!(validate_base_url("not a url").is_err());
    }
}
