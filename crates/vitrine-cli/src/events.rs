//! Upload events read from JSON lines and built from local files.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use vitrine_core::models::UploadEvent;

/// Parse one line of an event stream. Blank lines and `#` comments yield `None`.
pub fn parse_event_line(line: &str, line_number: usize) -> anyhow::Result<Option<UploadEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let event: UploadEvent = serde_json::from_str(line)
        .with_context(|| format!("Invalid upload event on line {}", line_number))?;
    if event.key.trim().is_empty() {
        anyhow::bail!("Upload event on line {} has an empty key", line_number);
    }
    Ok(Some(event))
}

/// Content type for common image and video extensions.
pub fn guess_content_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let content_type = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => return None,
    };
    Some(content_type)
}

/// Parse a `key=value` metadata argument.
pub fn parse_metadata_pair(value: &str) -> Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", value))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("metadata key is empty in '{}'", value));
    }
    Ok((key.to_string(), val.trim().to_string()))
}

pub fn metadata_map(pairs: Vec<(String, String)>) -> HashMap<String, String> {
    pairs.into_iter().collect()
}
