use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Picks the content type recorded for an upload.
///
/// A non-blank hint wins unless it is the generic octet-stream type. Then the
/// name's extension is consulted, and octet-stream is the last resort.
#[must_use]
pub fn resolve(name: &str, hint: Option<&str>) -> String {
    if let Some(hint) = hint.map(str::trim) {
        if !hint.is_empty() && !hint.eq_ignore_ascii_case(OCTET_STREAM) {
            return hint.to_owned();
        }
    }
    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_owned()
}

/// Lowercased extension of `name` without the dot, or an empty string.
#[must_use]
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|x| x.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}
