//! MIME inference and file name sanitization.
//!
//! Native viewers and share targets often pick a handler by file
//! extension rather than by MIME type, so a materialized file must carry
//! an extension that matches its content.

/// Fallback MIME type for unknown content.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Name used when sanitization leaves nothing.
const FALLBACK_STEM: &str = "document";

/// Longest file name (in bytes) written to disk.
const MAX_NAME_BYTES: usize = 150;

/// Extension to MIME table. When several extensions share a MIME type the
/// first one listed is the one appended to extension-less names.
const EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
    ("bmp", "image/bmp"),
    ("svg", "image/svg+xml"),
    ("tiff", "image/tiff"),
    ("tif", "image/tiff"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("md", "text/markdown"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("rtf", "application/rtf"),
    ("zip", "application/zip"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    ("odt", "application/vnd.oasis.opendocument.text"),
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
];

/// Lowercased extension of `name`, if it has one.
///
/// A leading dot (".profile") is not an extension.
pub fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Infer a MIME type from the file name extension.
pub fn mime_from_name(name: &str) -> Option<&'static str> {
    let ext = extension_of(name)?;
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
}

/// Preferred extension for a MIME type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(_, m)| *m == essence)
        .map(|(ext, _)| *ext)
}

/// Use `declared` if present, otherwise infer from `name`.
pub fn resolve_mime(name: &str, declared: Option<&str>) -> String {
    match declared.map(str::trim).filter(|m| !m.is_empty()) {
        Some(mime) => mime.to_string(),
        None => mime_from_name(name).unwrap_or(OCTET_STREAM).to_string(),
    }
}

/// Turn a display name into a safe file name for `mime` content.
///
/// Path separators and characters reserved on common filesystems become
/// `_`, control characters are dropped, and leading/trailing dots and
/// whitespace are trimmed. If the result lacks a recognized extension, the
/// extension for `mime` is appended.
pub fn sanitize_file_name(name: &str, mime: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    let mut stem_and_ext = cleaned
        .trim()
        .trim_matches('.')
        .trim()
        .to_string();
    if stem_and_ext.is_empty() {
        stem_and_ext = FALLBACK_STEM.to_string();
    }

    let recognized = mime_from_name(&stem_and_ext).is_some();
    let appended = if recognized {
        None
    } else {
        extension_for_mime(mime)
    };

    let suffix_len = appended.map(|e| e.len() + 1).unwrap_or(0);
    let budget = MAX_NAME_BYTES.saturating_sub(suffix_len);
    let mut result = truncate_keeping_extension(&stem_and_ext, budget, recognized);

    if let Some(ext) = appended {
        result.push('.');
        result.push_str(ext);
    }
    result
}

/// Shorten `name` to at most `budget` bytes on a char boundary, keeping
/// the extension when `keep_ext` is set.
fn truncate_keeping_extension(name: &str, budget: usize, keep_ext: bool) -> String {
    if name.len() <= budget {
        return name.to_string();
    }

    let (stem, ext) = match (keep_ext, name.rsplit_once('.')) {
        (true, Some((stem, ext))) => (stem, Some(ext)),
        _ => (name, None),
    };
    let ext_len = ext.map(|e| e.len() + 1).unwrap_or(0);
    let stem_budget = budget.saturating_sub(ext_len).max(1);

    let mut cut = stem_budget.min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }

    let mut out = stem[..cut].to_string();
    if let Some(ext) = ext {
        out.push('.');
        out.push_str(ext);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_name() {
        assert_eq!(mime_from_name("a.png"), Some("image/png"));
        assert_eq!(mime_from_name("Scan.PDF"), Some("application/pdf"));
        assert_eq!(mime_from_name("photo.jpeg"), Some("image/jpeg"));
        assert_eq!(mime_from_name("README"), None);
        assert_eq!(mime_from_name(".png"), None);
        assert_eq!(mime_from_name("archive.tar.unknown"), None);
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for_mime("text/html; charset=utf-8"), Some("html"));
        assert_eq!(extension_for_mime("application/x-unknown"), None);
    }

    #[test]
    fn test_resolve_mime() {
        assert_eq!(resolve_mime("a.png", Some("image/x-custom")), "image/x-custom");
        assert_eq!(resolve_mime("a.png", None), "image/png");
        assert_eq!(resolve_mime("a.png", Some("  ")), "image/png");
        assert_eq!(resolve_mime("blob", None), OCTET_STREAM);
    }

    #[test]
    fn test_sanitize_strips_separators_and_controls() {
        assert_eq!(
            sanitize_file_name("../etc/pass\u{0}wd.txt", "text/plain"),
            "_etc_passwd.txt"
        );
        assert_eq!(sanitize_file_name("a\\b:c.pdf", "application/pdf"), "a_b_c.pdf");
    }

    #[test]
    fn test_sanitize_appends_extension_from_mime() {
        assert_eq!(sanitize_file_name("scan", "application/pdf"), "scan.pdf");
        assert_eq!(sanitize_file_name("IMG_0001.HEIC", "image/heic"), "IMG_0001.HEIC");
        assert_eq!(sanitize_file_name("notes.v2", "text/plain"), "notes.v2.txt");
        assert_eq!(sanitize_file_name("blob", OCTET_STREAM), "blob");
    }

    #[test]
    fn test_sanitize_empty_name() {
        assert_eq!(sanitize_file_name("", "image/png"), "document.png");
        assert_eq!(sanitize_file_name(" ... ", "image/png"), "document.png");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = format!("{}.pdf", "é".repeat(200));
        let safe = sanitize_file_name(&long, "application/pdf");
        assert!(safe.len() <= MAX_NAME_BYTES);
        assert!(safe.ends_with(".pdf"));
    }
}
