use thiserror::Error;
use url::Url;

/// Why a feed URL was refused at registration time.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host to connect to.
    #[error("URL has no host")]
    MissingHost,
    /// The URL embeds a username or password.
    #[error("Credentials in feed URLs are not supported")]
    EmbeddedCredentials,
}

/// Validate a URL before it is registered as a feed source.
///
/// Accepts absolute `http`/`https` URLs with a host and no userinfo. The
/// returned [`Url`] is normalized (lowercase scheme and host).
///
/// # Examples
///
/// ```
/// use gator::util::validate_feed_url;
///
/// let url = validate_feed_url("https://Example.com/index.xml").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/index.xml");
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlValidationError::MissingHost);
    }

    if !url.username().is_empty() || url.password().is_some() {
        return Err(UrlValidationError::EmbeddedCredentials);
    }

    Ok(url)
}
