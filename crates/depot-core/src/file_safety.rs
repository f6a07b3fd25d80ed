//! Filename sanitization and relative-path validation.
//!
//! Everything that turns caller-supplied names into filesystem paths goes
//! through here before it touches the storage root.

use std::path::{Component, Path, PathBuf};

use crate::defaults::UNNAMED_FILE;
use crate::error::{Error, Result};

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Sanitize a filename for storage.
///
/// Whitespace runs become a single `_`, anything outside `[A-Za-z0-9_.-]` is
/// dropped, and an empty (or dot-only) result falls back to `unnamed_file`.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized = String::with_capacity(filename.len());
    let mut in_whitespace = false;
    for c in filename.trim().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                sanitized.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if is_allowed_char(c) {
            sanitized.push(c);
        }
    }

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        return UNNAMED_FILE.to_string();
    }
    sanitized
}

/// Split `name` into `(stem, extension)`, the extension keeping its leading dot.
///
/// A leading dot (`.bashrc`) is part of the stem, not an extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => (&name[..idx], &name[idx..]),
    }
}

/// Validate a caller-supplied relative path.
///
/// Rejects absolute paths and any `..` component with `Forbidden`; `.` and
/// empty segments are dropped. Both `/` and `\` are treated as separators.
pub fn safe_relative_path(raw: &str) -> Result<PathBuf> {
    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(Error::Forbidden(format!("absolute path not allowed: {}", raw)));
    }

    let mut out = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Forbidden(format!("path escapes storage root: {}", raw)));
            }
        }
    }
    Ok(out)
}

/// Validate one directory segment derived from item metadata (category or type).
pub fn checked_segment(segment: &str) -> Result<&str> {
    let segment = segment.trim();
    if segment.is_empty() {
        return Err(Error::InvalidInput("empty path segment".to_string()));
    }
    if segment == "." || segment == ".." || segment.contains(['/', '\\', '\0']) {
        return Err(Error::Forbidden(format!("invalid path segment: {}", segment)));
    }
    Ok(segment)
}

/// Render a relative path with `/` separators regardless of platform.
pub fn relative_path_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename_collapses_whitespace() {
        assert_eq!(sanitize_filename("Annual  Report 2024"), "Annual_Report_2024");
        assert_eq!(sanitize_filename("tab\tand\nnewline"), "tab_and_newline");
    }

    #[test]
    fn test_sanitize_filename_strips_disallowed() {
        assert_eq!(sanitize_filename("a<b>c:d|e?.pdf"), "abcde.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "....etcpasswd");
        assert_eq!(sanitize_filename("café.txt"), "caf.txt");
    }

    #[test]
    fn test_sanitize_filename_fallback() {
        assert_eq!(sanitize_filename(""), UNNAMED_FILE);
        assert_eq!(sanitize_filename("   "), UNNAMED_FILE);
        assert_eq!(sanitize_filename("日本語"), UNNAMED_FILE);
        assert_eq!(sanitize_filename(".."), UNNAMED_FILE);
    }

    #[test]
    fn test_sanitize_filename_output_charset() {
        let inputs = [
            "hello world.txt",
            "weird/\\name*?",
            "  spaced  out  ",
            "émoji 🎉 file.png",
            "null\0byte",
            "",
        ];
        for input in inputs {
            let out = sanitize_filename(input);
            assert!(!out.is_empty(), "empty output for {:?}", input);
            assert!(out.chars().all(is_allowed_char), "bad output {:?} for {:?}", out, input);
        }
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("report.pdf"), ("report", ".pdf"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(
            safe_relative_path("docs/pdf/a.pdf").unwrap(),
            PathBuf::from("docs/pdf/a.pdf")
        );
        assert_eq!(
            safe_relative_path("./docs//pdf/").unwrap(),
            PathBuf::from("docs/pdf")
        );
        assert_eq!(safe_relative_path("").unwrap(), PathBuf::new());
        assert!(matches!(
            safe_relative_path("docs/../../etc"),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(safe_relative_path("/etc/passwd"), Err(Error::Forbidden(_))));
        assert!(matches!(safe_relative_path("..\\secret"), Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_checked_segment() {
        assert_eq!(checked_segment(" docs ").unwrap(), "docs");
        assert!(matches!(checked_segment(""), Err(Error::InvalidInput(_))));
        assert!(matches!(checked_segment(".."), Err(Error::Forbidden(_))));
        assert!(matches!(checked_segment("a/b"), Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_relative_path_string_uses_forward_slashes() {
        let path = Path::new("docs").join("pdf").join("a.pdf");
        assert_eq!(relative_path_string(&path), "docs/pdf/a.pdf");
    }
}
