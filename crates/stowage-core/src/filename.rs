//! Filename and destination-path helpers used when deriving storage keys.

use percent_encoding::percent_decode_str;
use rand::Rng;

use crate::constants::FILENAME_SUFFIX_LEN;

/// URL-safe alphabet for generated suffixes (same shape as nanoid).
const SUFFIX_ALPHABET: &[u8] = b"useandom-26T198340PX75pxJACKVERYMINDBUSHWOLF_GQZbfghjklqvwyzrict";

/// Split a caller-supplied destination path on `/` and neutralise every
/// segment: runs of `/`, `.`, `?` and `#` become a single `_`. Empty
/// segments are dropped so `""`, `"/"` and `"a//b"` behave like a join.
pub fn sanitize_path_segments(path: Option<&str>) -> Vec<String> {
    let Some(path) = path else {
        return Vec::new();
    };

    path.split('/')
        .map(sanitize_segment)
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn sanitize_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut in_run = false;
    for c in segment.chars() {
        if matches!(c, '/' | '.' | '?' | '#') {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

/// Repair filenames whose UTF-8 bytes were decoded as Latin-1 upstream
/// (multipart parsers commonly do this). Names that are not mis-decoded are
/// returned unchanged.
pub fn utf8ify(name: &str) -> String {
    if name.is_ascii() || name.chars().any(|c| c as u32 > 0xFF) {
        return name.to_string();
    }

    let bytes: Vec<u8> = name.chars().map(|c| c as u32 as u8).collect();
    match String::from_utf8(bytes) {
        Ok(repaired) => repaired,
        Err(_) => name.to_string(),
    }
}

/// Split a filename into `(stem, extension)`, where the extension keeps its
/// leading dot. Any directory part is ignored, and dotfiles such as
/// `.bashrc` have no extension.
pub fn split_file_name(name: &str) -> (&str, &str) {
    let base = name.rsplit('/').next().unwrap_or(name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => (&base[..idx], &base[idx..]),
        _ => (base, ""),
    }
}

/// Extension without the leading dot, lowercased, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = split_file_name(name);
    ext.strip_prefix('.')
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
}

/// Random suffix of `len` characters drawn from a URL-safe alphabet.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

/// `<stem>_<suffix><ext>` for an already-normalised original name.
pub fn unique_file_name(original: &str) -> String {
    let (stem, ext) = split_file_name(original);
    format!("{}_{}{}", stem, random_suffix(FILENAME_SUFFIX_LEN), ext)
}

/// Percent-decoded last segment of a URL path (`/a/b%20c.pdf` -> `b c.pdf`).
pub fn basename_from_url_path(url_path: &str) -> String {
    let decoded = percent_decode_str(url_path).decode_utf8_lossy();
    decoded
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
