//! Link helpers.

use url::Url;

use crate::{Error, Result};

/// Parse a target link, requiring an absolute URL with a host.
pub fn parse_link(link: &str) -> Result<Url> {
    let link = link.trim();
    if link.is_empty() {
        return Err(Error::MissingLink);
    }
    let parsed = Url::parse(link).map_err(|e| Error::invalid_link(link, e.to_string()))?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_link(link, "link has no host"));
    }
    Ok(parsed)
}

/// Lower-cased host name of a target link.
///
/// Module resolution is keyed on this value.
pub fn link_host(link: &str) -> Result<String> {
    let parsed = parse_link(link)?;
    // parse_link guarantees a host.
    Ok(parsed.host_str().unwrap_or_default().to_ascii_lowercase())
}

/// Last non-empty path segment of a link, e.g. the channel name in
/// `https://site.tv/some_channel/`.
pub fn last_path_segment(link: &str) -> Option<String> {
    let parsed = Url::parse(link).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}
