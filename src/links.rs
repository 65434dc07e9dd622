use url::Url;

/// Accepts the empty string (slot not filled in yet) or any absolute URL.
pub fn is_valid_url(url: &str) -> bool {
    url.is_empty() || Url::parse(url).is_ok()
}
