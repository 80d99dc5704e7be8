use std::path::Path;

use uuid::Uuid;

/// Random 128-bit identifier rendered as 32 lowercase hex characters.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Extension of an uploaded filename including its dot, or "" when there is
/// none. Only the final path component is considered.
pub fn extension_of(original_name: &str) -> String {
    let base = original_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or("");
    Path::new(base)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// `<field>-<id><.ext>` name for a stored upload.
pub fn media_filename(field: &str, original_name: &str) -> String {
    format!("{}-{}{}", field, new_id(), extension_of(original_name))
}

pub fn report_filename() -> String {
    format!("report-{}.json", new_id())
}

pub fn sos_filename() -> String {
    format!("sos-{}.json", new_id())
}
