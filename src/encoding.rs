//! Base64 transport of image files.
//!
//! Encoding works on the raw file bytes, not decoded pixels, so the output
//! decodes back to a byte-identical file. Three wrappers are offered: bare text,
//! a JSON object, and an HTML `<img>` tag with a data URI.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base64Error {
    #[error("invalid base64: {0}")]
    InvalidBase64(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Base64Wrapper {
    #[default]
    Txt,
    Json,
    Html,
}

impl Base64Wrapper {
    pub fn extension(self) -> &'static str {
        match self {
            Base64Wrapper::Txt => "txt",
            Base64Wrapper::Json => "json",
            Base64Wrapper::Html => "html",
        }
    }
}

impl std::str::FromStr for Base64Wrapper {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(Base64Wrapper::Txt),
            "json" => Ok(Base64Wrapper::Json),
            "html" => Ok(Base64Wrapper::Html),
            _ => Err(format!("unknown wrapper '{s}' (expected txt, json or html)")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonPayload {
    filename: String,
    mime_type: String,
    base64: String,
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode base64 text, ignoring whitespace and an optional `data:…;base64,` prefix.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, Base64Error> {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| Base64Error::InvalidBase64("data URI without payload".into()))?,
        None => trimmed,
    };
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(Base64Error::InvalidBase64("empty input".into()));
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| Base64Error::InvalidBase64(e.to_string()))
}

/// MIME type of encoded image bytes, falling back to `application/octet-stream`.
pub fn mime_type_of(bytes: &[u8]) -> &'static str {
    image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

/// Encode `bytes` and wrap them for `filename`.
pub fn wrap(bytes: &[u8], filename: &str, wrapper: Base64Wrapper) -> String {
    let encoded = encode_base64(bytes);
    let mime_type = mime_type_of(bytes);
    match wrapper {
        Base64Wrapper::Txt => encoded,
        Base64Wrapper::Json => {
            let payload = JsonPayload {
                filename: filename.to_string(),
                mime_type: mime_type.to_string(),
                base64: encoded,
            };
            // Serializing plain strings cannot fail.
            serde_json::to_string_pretty(&payload).unwrap_or_default()
        }
        Base64Wrapper::Html => format!(
            "<img src=\"data:{mime_type};base64,{encoded}\" alt=\"{}\">",
            escape_attribute(filename)
        ),
    }
}

/// Recover file bytes from any of the three wrappers or a bare data URI.
pub fn unwrap(text: &str) -> Result<Vec<u8>, Base64Error> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        let payload: JsonPayload =
            serde_json::from_str(trimmed).map_err(|e| Base64Error::InvalidBase64(format!("JSON wrapper: {e}")))?;
        return decode_base64(&payload.base64);
    }
    if trimmed.starts_with('<') {
        let start = trimmed
            .find("src=\"")
            .ok_or_else(|| Base64Error::InvalidBase64("HTML wrapper without src".into()))?
            + "src=\"".len();
        let end = trimmed[start..]
            .find('"')
            .ok_or_else(|| Base64Error::InvalidBase64("unterminated src attribute".into()))?;
        return decode_base64(&trimmed[start..start + end]);
    }
    decode_base64(trimmed)
}

fn escape_attribute(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
