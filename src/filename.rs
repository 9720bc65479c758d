//! Derives filesystem-safe cache filenames from image references.
//!
//! Three reference shapes are recognized: local `file://` URIs (the final
//! path segment is reused as-is), cloud-object-storage URLs carrying a
//! percent-encoded object path behind an `/o/` marker, and plain HTTP(S)
//! URLs. Malformed references never fail derivation; they fall back to a
//! timestamped synthetic name so the caller can always proceed.

use time::OffsetDateTime;

use crate::source_url::{LOCAL_FILE_SCHEME, storage_object_path};

const MAX_FILENAME_LEN: usize = 100;
const TRUNCATED_BASE_LEN: usize = 90;
// Includes the dot, so ".jpg" is the longest extension kept verbatim.
const MAX_EXTENSION_LEN: usize = 4;
const MIN_FILENAME_LEN: usize = 3;
const DEFAULT_EXTENSION: &str = ".jpg";

fn now_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// Derive a short, filesystem-legal cache filename for an image reference.
///
/// Deterministic for well-formed references. The fallback branches embed a
/// millisecond timestamp, trading cache-key stability for availability on
/// malformed input.
pub fn derive_cache_filename(source_ref: &str) -> String {
    let name = if source_ref.starts_with(LOCAL_FILE_SCHEME) {
        local_file_name(source_ref)
    } else if let Some(object_path) = storage_object_path(source_ref) {
        storage_object_name(object_path)
    } else {
        generic_url_name(source_ref)
    };

    enforce_length(name)
}

fn local_file_name(source_ref: &str) -> String {
    match source_ref.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => format!("local-{}{}", now_millis(), DEFAULT_EXTENSION),
    }
}

fn storage_object_name(object_path: &str) -> String {
    let encoded = object_path
        .split(['?', '#'])
        .next()
        .unwrap_or(object_path);

    let decoded = match urlencoding::decode(encoded) {
        Ok(decoded) => decoded,
        Err(_) => return format!("firebase-{}{}", now_millis(), DEFAULT_EXTENSION),
    };

    match decoded.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_string(),
        _ => format!("firebase-{}{}", now_millis(), DEFAULT_EXTENSION),
    }
}

fn generic_url_name(source_ref: &str) -> String {
    let without_query = source_ref
        .split(['?', '#'])
        .next()
        .unwrap_or(source_ref);

    let segment = without_query.rsplit('/').next().unwrap_or("");
    if segment.chars().count() < MIN_FILENAME_LEN {
        format!("image-{}{}", now_millis(), DEFAULT_EXTENSION)
    } else {
        segment.to_string()
    }
}

/// Truncate names that would exceed filesystem path-length limits: keep the
/// first 90 characters of the base and re-append the extension.
fn enforce_length(name: String) -> String {
    if name.chars().count() <= MAX_FILENAME_LEN {
        return name;
    }

    let (base, extension) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot..]),
        None => (name.as_str(), DEFAULT_EXTENSION),
    };

    let extension = if extension.len() > 1 && extension.len() <= MAX_EXTENSION_LEN {
        extension
    } else {
        DEFAULT_EXTENSION
    };

    let truncated: String = base.chars().take(TRUNCATED_BASE_LEN).collect();
    if truncated.is_empty() {
        return format!("fallback-{}{}", now_millis(), DEFAULT_EXTENSION);
    }

    format!("{}{}", truncated, extension)
}
