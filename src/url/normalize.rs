use crate::UrlError;
use url::Url;

/// Size-template path segments that image URLs carry before resizing
const RESIZE_SEGMENTS: &[&str] = &["/%7Bresize%7D/", "/{resize}/", "/%7bresize%7d/"];

/// Resolves a possibly relative link against a base URL
///
/// Only HTTP and HTTPS results are accepted.
///
/// # Examples
///
/// ```
/// use partition_crawler::url::resolve_link;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/search").unwrap();
/// let url = resolve_link(&base, "/car-details/123?a=1").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/car-details/123?a=1");
/// ```
pub fn resolve_link(base: &Url, href: &str) -> Result<Url, UrlError> {
    let href = href.trim();
    if href.is_empty() {
        return Err(UrlError::Parse("empty link".to_string()));
    }

    let url = base
        .join(href)
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    check_scheme(&url)?;
    Ok(url)
}

/// Normalizes an image URL to its unscaled form
///
/// Image URLs in structured records carry a `{resize}` template segment
/// (usually percent encoded). Dropping the segment yields the original image.
///
/// # Examples
///
/// ```
/// use partition_crawler::url::normalize_image_url;
///
/// let url = normalize_image_url("https://img.example.com/a/%7Bresize%7D/b.jpg").unwrap();
/// assert_eq!(url.as_str(), "https://img.example.com/a/b.jpg");
/// ```
pub fn normalize_image_url(raw: &str) -> Result<Url, UrlError> {
    let mut normalized = raw.trim().to_string();
    for segment in RESIZE_SEGMENTS {
        normalized = normalized.replace(segment, "/");
    }

    let url = Url::parse(&normalized).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;
    check_scheme(&url)?;
    Ok(url)
}

/// Returns the query parameters carried by an item link, in link order
pub fn query_pairs(base: &Url, link: &str) -> Result<Vec<(String, String)>, UrlError> {
    let url = resolve_link(base, link)?;
    Ok(url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

/// Lowercases a value and replaces anything outside `[a-z0-9]` with `-`
///
/// Runs of replaced characters collapse into one dash and dashes never lead
/// or trail. An input with nothing usable becomes `"_"`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "_".to_string()
    } else {
        slug
    }
}

fn check_scheme(url: &Url) -> Result<(), UrlError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            other
        ))),
    }
}
