use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;

/// A file already received by the web layer and spooled to local disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUpload {
    pub originalname: String,
    pub mimetype: String,
    pub size: u64,
    pub path: PathBuf,
}

/// A remote resource to fetch and republish.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrlUpload {
    pub url: String,
    #[serde(rename = "fileName", skip_serializing_if = "Option::is_none", default)]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub size: Option<u64>,
}

impl UrlUpload {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// How a batch was sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    File,
    Url,
}

impl Display for UploadMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadMode::File => write!(f, "file"),
            UploadMode::Url => write!(f, "url"),
        }
    }
}
