use crate::Result;
use crate::content::Content;

/// Serializes `content` in its JSON shape.
///
/// Timestamps are RFC 3339 strings and are left out entirely when unknown.
pub fn to_json(content: &Content, pretty: bool) -> Result<String> {
    let json = if pretty { serde_json::to_string_pretty(content)? } else { serde_json::to_string(content)? };
    Ok(json)
}
