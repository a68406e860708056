//! Static MIME and icon lookup tables keyed by file extension.
//!
//! Lookups take the extension without its leading dot and are
//! case-insensitive. A miss is never an error.

use crate::filename::extension_of;

/// Content type used when nothing better is known.
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Icon hint for clients, by extension.
pub fn icon_for_extension(ext: &str) -> Option<&'static str> {
    let icon = match ext.to_lowercase().as_str() {
        "pdf" => "mdi-file-pdf-outline",
        "doc" | "docx" | "odt" | "rtf" => "mdi-file-word-outline",
        "xls" | "xlsx" | "ods" | "csv" | "tsv" => "mdi-file-excel-outline",
        "ppt" | "pptx" | "odp" | "key" => "mdi-file-powerpoint-outline",
        "txt" | "md" | "log" => "mdi-file-document-outline",
        "json" | "xml" | "yaml" | "yml" | "html" | "htm" | "js" | "ts" | "css" => {
            "mdi-file-code-outline"
        }
        "zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz" => "mdi-folder-zip-outline",
        "mp3" | "wav" | "ogg" | "flac" | "m4a" | "aac" => "mdi-music-box-outline",
        "mp4" | "mov" | "avi" | "mkv" | "webm" => "mdi-movie-outline",
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp" | "ico" | "tiff" => {
            "mdi-file-image-outline"
        }
        _ => return None,
    };
    Some(icon)
}

/// Icon hint for a filename, using its extension.
pub fn icon_for_file_name(name: &str) -> Option<&'static str> {
    extension_of(name).and_then(|ext| icon_for_extension(&ext))
}

/// Content type by extension.
pub fn mimetype_for_extension(ext: &str) -> Option<&'static str> {
    let mimetype = match ext.to_lowercase().as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        "rar" => "application/vnd.rar",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "flac" => "audio/flac",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "tiff" => "image/tiff",
        _ => return None,
    };
    Some(mimetype)
}

/// Content type for a filename, using its extension.
pub fn mimetype_for_file_name(name: &str) -> Option<&'static str> {
    extension_of(name).and_then(|ext| mimetype_for_extension(&ext))
}

/// Whether clients can render an inline preview for this content type.
pub fn preview_available(mimetype: &str) -> bool {
    ["image", "pdf", "text/plain"]
        .iter()
        .any(|kind| mimetype.contains(kind))
}
