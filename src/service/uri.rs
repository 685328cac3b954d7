//! Document path to `file://` URI conversion.
//!
//! The service keys diagnostics by the URI the language server assigned,
//! while the editor knows documents by path. Both sides must agree, so
//! paths are percent-encoded the way the service encodes them.

use std::path::{Path, PathBuf};

use url::Url;

/// Convert a document path into the `file://` URI the service reports.
///
/// Already-formed URIs pass through. Relative paths resolve against the
/// current directory. Backslashes become forward slashes.
pub fn file_uri(path: &str) -> String {
    if path.starts_with("file://") {
        return path.to_string();
    }

    let absolute = resolve(path);
    if let Ok(url) = Url::from_file_path(&absolute) {
        return url.into();
    }
    // Drive-letter paths off Windows, or a cwd that could not be read.
    let normalized = absolute.to_string_lossy().replace('\\', "/");
    from_segments(&normalized)
        .unwrap_or_else(|| format!("file:///{}", normalized.trim_start_matches('/')))
}

fn resolve(path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() || has_drive_letter(path) || path.starts_with(['/', '\\']) {
        return candidate.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(candidate))
        .unwrap_or_else(|_| candidate.to_path_buf())
}

/// Build the URI segment by segment; each segment is percent-encoded.
fn from_segments(path: &str) -> Option<String> {
    let mut url = Url::parse("file:///").ok()?;
    url.path_segments_mut()
        .ok()?
        .clear()
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    Some(url.into())
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_unix_path() {
        assert_eq!(file_uri("/home/me/a.py"), "file:///home/me/a.py");
    }

    #[test]
    fn windows_path() {
        assert_eq!(file_uri("C:\\work\\a.py"), "file:///C:/work/a.py");
    }

    #[test]
    fn existing_uri_passes_through() {
        assert_eq!(file_uri("file:///x/y.py"), "file:///x/y.py");
    }

    #[test]
    fn spaces_are_encoded() {
        assert_eq!(file_uri("/my docs/a.py"), "file:///my%20docs/a.py");
    }

    #[test]
    fn non_ascii_is_utf8_percent_encoded() {
        assert_eq!(file_uri("/w/café.py"), "file:///w/caf%C3%A9.py");
    }

    #[test]
    fn hash_and_percent_are_encoded() {
        assert_eq!(file_uri("/w/a#b.py"), "file:///w/a%23b.py");
        assert_eq!(file_uri("/w/100%.py"), "file:///w/100%25.py");
    }

    #[test]
    fn relative_path_resolves_against_cwd() {
        let uri = file_uri("scratch.py");
        assert!(uri.starts_with("file:///"));
        assert!(uri.ends_with("/scratch.py"));
    }
}
