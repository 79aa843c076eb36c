//! Wire types for the Shoov REST surface.

use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Remote repository identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId(pub String);

/// Remote build identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildId(pub String);

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The backend emits ids as either JSON strings or numbers.
fn de_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// A single `{id}` record of a filtered listing
#[derive(Debug, Clone, Deserialize)]
pub struct IdRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
}

/// `{count, data:[{id}]}` envelope returned by the listing endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub data: Vec<IdRecord>,
}

impl Listing {
    /// First id of the listing, `None` when the backend reports no match.
    pub fn first_id(&self) -> Option<String> {
        if self.count == 0 {
            return None;
        }
        self.data.first().map(|r| r.id.clone())
    }
}

/// Record returned by `POST /api/screenshots-upload`
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRecord {
    #[serde(deserialize_with = "de_id")]
    pub build: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `{data:[...]}` envelope of the upload endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UploadEnvelope {
    pub data: Vec<UploadRecord>,
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    /// Build the screenshot was attached to (created by the backend if needed)
    pub build: BuildId,
    /// Remaining fields of the record, kept for debug output
    pub record: serde_json::Value,
}

/// Multipart form of a single screenshot upload.
///
/// Artifact fields are paths; implementations stream the file contents.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub label: String,
    pub baseline: PathBuf,
    pub regression: PathBuf,
    pub diff: PathBuf,
    pub baseline_name: String,
    pub git_commit: String,
    pub git_branch: String,
    pub git_subject: String,
    pub directory_prefix: String,
    pub repository: String,
    pub tags: Vec<String>,
    pub screenshot_hash: String,
}

impl UploadForm {
    /// Plain text fields in submission order.
    pub fn text_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("label", self.label.clone()),
            ("baseline_name", self.baseline_name.clone()),
            ("git_commit", self.git_commit.clone()),
            ("git_branch", self.git_branch.clone()),
            ("git_subject", self.git_subject.clone()),
            ("directory_prefix", self.directory_prefix.clone()),
            ("repository", self.repository.clone()),
            ("tags", self.tags.join(",")),
            ("screenshot_hash", self.screenshot_hash.clone()),
        ]
    }

    /// File fields in submission order.
    pub fn file_fields(&self) -> [(&'static str, &PathBuf); 3] {
        [
            ("baseline", &self.baseline),
            ("regression", &self.regression),
            ("diff", &self.diff),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_accepts_numeric_and_string_ids() {
        let listing: Listing =
            serde_json::from_str(r#"{"count": 2, "data": [{"id": 17}, {"id": "18"}]}"#).unwrap();
        assert_eq!(listing.first_id().as_deref(), Some("17"));
        assert_eq!(listing.data[1].id, "18");
    }

    #[test]
    fn test_listing_zero_count_is_none() {
        let listing: Listing = serde_json::from_str(r#"{"count": 0, "data": []}"#).unwrap();
        assert_eq!(listing.first_id(), None);

        // A stale data entry does not override a zero count
        let listing: Listing =
            serde_json::from_str(r#"{"count": 0, "data": [{"id": "9"}]}"#).unwrap();
        assert_eq!(listing.first_id(), None);
    }

    #[test]
    fn test_upload_envelope_keeps_extra_fields() {
        let envelope: UploadEnvelope = serde_json::from_str(
            r#"{"data": [{"build": 42, "id": "7", "label": "home page"}]}"#,
        )
        .unwrap();
        let record = &envelope.data[0];
        assert_eq!(record.build, "42");
        assert_eq!(record.extra.get("label").unwrap(), "home page");
    }

    #[test]
    fn test_tags_joined_with_comma() {
        let form = UploadForm {
            label: "home page".to_string(),
            baseline: PathBuf::from("a"),
            regression: PathBuf::from("b"),
            diff: PathBuf::from("c"),
            baseline_name: "a".to_string(),
            git_commit: String::new(),
            git_branch: String::new(),
            git_subject: String::new(),
            directory_prefix: String::new(),
            repository: "owner/name".to_string(),
            tags: vec!["mobile".to_string(), "header".to_string()],
            screenshot_hash: "ff".to_string(),
        };
        let fields = form.text_fields();
        let tags = fields.iter().find(|(k, _)| *k == "tags").unwrap();
        assert_eq!(tags.1, "mobile,header");
    }
}
