//! Download-URL resolution for remote image references.
//!
//! Cloud-object-storage URLs need two adjustments before they are fetched:
//! the media-fetch query parameter must be present, and any access token must
//! be stripped. Tokens rotate, so caching a tokenized URL would later 403;
//! the bare object URL with `alt=media` stays fetchable.

const URL_SCHEME_SEPARATOR: &str = "://";
const STORAGE_OBJECT_MARKER: &str = "/o/";
const MEDIA_PARAM: &str = "alt=media";
const TOKEN_PARAM: &str = "token=";

pub const LOCAL_FILE_SCHEME: &str = "file://";

/// Whether a reference points at a file already on local storage.
pub fn is_local_file(source_ref: &str) -> bool {
    source_ref.starts_with(LOCAL_FILE_SCHEME)
}

/// If `url` has the cloud-object-storage shape, return the percent-encoded
/// object path that follows the `/o/` marker (query string included).
pub(crate) fn storage_object_path(url: &str) -> Option<&str> {
    let host_start = url.find(URL_SCHEME_SEPARATOR)? + URL_SCHEME_SEPARATOR.len();
    let path_start = host_start + url[host_start..].find('/')?;
    let marker = path_start + url[path_start..].find(STORAGE_OBJECT_MARKER)?;
    Some(&url[marker + STORAGE_OBJECT_MARKER.len()..])
}

/// Resolve the URL actually used for the network fetch.
///
/// Non-storage URLs pass through unchanged. For storage URLs: a tokenized
/// URL is reduced to its base plus `alt=media`; otherwise `alt=media` is
/// appended if missing.
pub fn resolve_download_url(source_ref: &str) -> String {
    if is_local_file(source_ref) || storage_object_path(source_ref).is_none() {
        return source_ref.to_string();
    }

    if source_ref.contains(TOKEN_PARAM) {
        let base = source_ref.split('?').next().unwrap_or(source_ref);
        return format!("{}?{}", base, MEDIA_PARAM);
    }

    if !source_ref.contains(MEDIA_PARAM) {
        return if source_ref.contains('?') {
            format!("{}&{}", source_ref, MEDIA_PARAM)
        } else {
            format!("{}?{}", source_ref, MEDIA_PARAM)
        };
    }

    source_ref.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_stripped_and_media_param_kept() {
        let url = "https://storage.example.com/o/avatars%2Fuser1.jpg?foo=1&token=ABC123&alt=media";
        let resolved = resolve_download_url(url);
        assert_eq!(
            resolved,
            "https://storage.example.com/o/avatars%2Fuser1.jpg?alt=media"
        );
        assert!(!resolved.contains("token="));
    }

    #[test]
    fn test_media_param_appended_without_query() {
        let url = "https://storage.example.com/o/photo.jpg";
        assert_eq!(
            resolve_download_url(url),
            "https://storage.example.com/o/photo.jpg?alt=media"
        );
    }

    #[test]
    fn test_media_param_appended_to_existing_query() {
        let url = "https://storage.example.com/o/photo.jpg?generation=5";
        assert_eq!(
            resolve_download_url(url),
            "https://storage.example.com/o/photo.jpg?generation=5&alt=media"
        );
    }

    #[test]
    fn test_storage_url_with_media_param_unchanged() {
        let url = "https://storage.example.com/o/photo.jpg?alt=media";
        assert_eq!(resolve_download_url(url), url);
    }

    #[test]
    fn test_plain_url_passes_through() {
        let url = "https://cdn.example.com/photos/sunset.jpg?width=800";
        assert_eq!(resolve_download_url(url), url);
    }

    #[test]
    fn test_local_file_passes_through() {
        let uri = "file:///data/app/photo.jpg";
        assert_eq!(resolve_download_url(uri), uri);
        assert!(is_local_file(uri));
    }

    #[test]
    fn test_storage_object_path_extraction() {
        assert_eq!(
            storage_object_path("https://storage.example.com/o/a%2Fb.jpg?token=X"),
            Some("a%2Fb.jpg?token=X")
        );
        assert_eq!(
            storage_object_path("https://cdn.example.com/photos/sunset.jpg"),
            None
        );
    }
}
