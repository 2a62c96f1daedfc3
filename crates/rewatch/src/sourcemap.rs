//! String and data-URL encodings for source maps.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

/// Prefix of an inline source map URL.
pub const DATA_URL_PREFIX: &str = "data:application/json;charset=utf-8;base64,";

/// Serialize a source map to its JSON text.
pub fn to_string(map: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(map)
}

/// Encode a source map as a base64 `data:` URL.
pub fn to_url(map: &Value) -> Result<String, serde_json::Error> {
    let json = to_string(map)?;
    Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(json)))
}

/// Trailing `sourceMappingURL` comment pointing at `url`.
pub fn comment(url: &str) -> String {
    format!("\n//# sourceMappingURL={url}")
}
