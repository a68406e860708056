use serde::{Deserialize, Serialize};

/// Where a stored attachment can be retrieved from.
///
/// A backend either hands back a publicly addressable URL, or nothing, in
/// which case the object is only reachable through its storage path and a
/// signed indirection. Modelling this as an enum keeps "exactly one of
/// `url`/`path`" true for every attachment ever built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Url {
        url: String,
        #[serde(rename = "signedUrl")]
        signed_url: String,
    },
    Path {
        path: String,
        #[serde(rename = "signedPath")]
        signed_path: String,
    },
}

/// Metadata for one successfully stored upload.
///
/// Serializes to `{ url?, path?, title, mimetype, size, icon?, signedUrl?, signedPath? }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(flatten)]
    pub location: Location,
    pub title: String,
    pub mimetype: String,
    /// Size in bytes; unknown only for URL uploads whose source sent no
    /// `Content-Length` and whose caller supplied none.
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub icon: Option<String>,
}

impl Attachment {
    pub fn url(&self) -> Option<&str> {
        match &self.location {
            Location::Url { url, .. } => Some(url),
            Location::Path { .. } => None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match &self.location {
            Location::Path { path, .. } => Some(path),
            Location::Url { .. } => None,
        }
    }

    pub fn signed_url(&self) -> Option<&str> {
        match &self.location {
            Location::Url { signed_url, .. } => Some(signed_url),
            Location::Path { .. } => None,
        }
    }

    pub fn signed_path(&self) -> Option<&str> {
        match &self.location {
            Location::Path { signed_path, .. } => Some(signed_path),
            Location::Url { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_backed_attachment_serializes_without_path_fields() {
        let attachment = Attachment {
            location: Location::Url {
                url: "https://bucket.s3.eu-west-1.amazonaws.com/uploads/a_x1y2z.pdf".to_string(),
                signed_url: "https://signed.example/a".to_string(),
            },
            title: "a.pdf".to_string(),
            mimetype: "application/pdf".to_string(),
            size: Some(12),
            icon: Some("mdi-file-pdf-box".to_string()),
        };

        let value = serde_json::to_value(&attachment).unwrap();
        assert_eq!(
            value,
            json!({
                "url": "https://bucket.s3.eu-west-1.amazonaws.com/uploads/a_x1y2z.pdf",
                "signedUrl": "https://signed.example/a",
                "title": "a.pdf",
                "mimetype": "application/pdf",
                "size": 12,
                "icon": "mdi-file-pdf-box"
            })
        );
        assert!(attachment.path().is_none());
        assert!(attachment.signed_path().is_none());
    }

    #[test]
    fn path_backed_attachment_omits_missing_icon() {
        let attachment = Attachment {
            location: Location::Path {
                path: "download/docs/notes_abcde.xyz".to_string(),
                signed_path: "dltemp/token/docs/notes_abcde.xyz".to_string(),
            },
            title: "notes.xyz".to_string(),
            mimetype: "application/octet-stream".to_string(),
            size: Some(3),
            icon: None,
        };

        let value = serde_json::to_value(&attachment).unwrap();
        assert!(value.get("icon").is_none());
        assert!(value.get("url").is_none());
        assert_eq!(value["signedPath"], "dltemp/token/docs/notes_abcde.xyz");

        let back: Attachment = serde_json::from_value(value).unwrap();
        assert_eq!(back, attachment);
    }
}
