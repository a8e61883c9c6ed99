use std::net::IpAddr;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP to a host that is not loopback.
    #[error("HTTPS required (plain HTTP only allowed for localhost)")]
    Insecure,
}

/// Validate the backend project URL.
///
/// HTTPS is required so the anon key and session tokens are never sent in
/// clear text. Plain HTTP is accepted only for loopback hosts (`localhost`,
/// `127.0.0.1`, `::1`), which is what local test servers use.
///
/// # Examples
///
/// ```
/// use redeguara::util::validate_project_url;
///
/// assert!(validate_project_url("https://abc.supabase.co").is_ok());
/// assert!(validate_project_url("http://127.0.0.1:54321").is_ok());
/// assert!(validate_project_url("http://abc.supabase.co").is_err());
/// ```
pub fn validate_project_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback_host(&url) => Ok(url),
        "http" => Err(UrlValidationError::Insecure),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

/// Validate a URL before handing it to the system browser.
///
/// Links come from user content (banner targets, media URLs), so only
/// http(s) is allowed; `javascript:`, `file:` and friends are refused.
pub fn validate_url_for_open(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn is_loopback_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host == "localhost" {
        return true;
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    host_for_parse
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}
