//! Shared key helpers for storage backends.
//!
//! Keys are relative, `/`-separated and never contain `..`. All backends go
//! through these helpers so a key means the same thing everywhere.

use crate::traits::{StorageError, StorageResult};

/// Join key parts with `/`, skipping empty parts and stray slashes.
pub fn join_key<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| p.as_ref().trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reject keys that could escape a storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }

    if key.starts_with('/') || key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }

    if key.split('/').any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(
            "Storage key contains a parent-directory segment".to_string(),
        ));
    }

    Ok(())
}

/// `Content-Disposition` value forcing a download under `filename`.
///
/// Non-ASCII names get an RFC 5987 `filename*` parameter next to an ASCII
/// fallback.
pub fn attachment_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if filename.is_ascii() {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(filename)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_key_skips_empty_parts() {
        assert_eq!(join_key(&["uploads", "", "/docs/", "a.pdf"]), "uploads/docs/a.pdf");
        assert_eq!(join_key::<&str>(&[]), "");
    }

    #[test]
    fn validate_key_rejects_traversal() {
        assert!(validate_key("uploads/a.txt").is_ok());
        assert!(validate_key("uploads/..hidden").is_ok());
        assert!(matches!(validate_key("../etc/passwd"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_key("a/../../b"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_key("/etc/passwd"), Err(StorageError::InvalidKey(_))));
        assert!(matches!(validate_key(""), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn validate_key_allows_backslashes_in_object_keys() {
        assert!(validate_key("uploads/a\\b.txt").is_ok());
        assert!(matches!(validate_key("uploads/a\0b"), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn disposition_quotes_ascii_names() {
        assert_eq!(
            attachment_disposition("invoice.pdf"),
            "attachment; filename=\"invoice.pdf\""
        );
        assert_eq!(
            attachment_disposition("say \"hi\".txt"),
            "attachment; filename=\"say _hi_.txt\""
        );
    }

    #[test]
    fn disposition_encodes_non_ascii_names() {
        let value = attachment_disposition("résumé.pdf");
        assert!(value.starts_with("attachment; filename=\"r_sum_.pdf\""));
        assert!(value.ends_with("filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"));
    }
}
