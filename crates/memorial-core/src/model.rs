//! Domain Model
//!
//! Memorials, paid edit sessions and the photo payloads attached to them.
//! Field names match the `memorials` and `memorial_sessions` tables so the
//! same types serialize straight onto the wire.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MemorialError, Result};

/// Length of an edit code
pub const EDIT_CODE_LEN: usize = 6;

/// Largest photo accepted for upload (5 MiB)
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// Longest accepted full name, in characters
pub const MAX_NAME_CHARS: usize = 200;

const CODE_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Short human-enterable token that resumes an anonymous edit session
/// (formatted: six characters of `0-9A-Z`, e.g. `RJXPKV`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditCode(String);

impl EditCode {
    /// Generate a new random edit code
    pub fn generate() -> Self {
        let mut n = Uuid::new_v4().as_u128();
        let code = (0..EDIT_CODE_LEN)
            .map(|_| {
                let c = CODE_ALPHABET[(n % 36) as usize];
                n /= 36;
                char::from(c)
            })
            .collect();
        Self(code)
    }

    /// Normalize user input (trim, uppercase). Returns `None` when the input
    /// cannot possibly be an edit code.
    pub fn parse(input: &str) -> Option<Self> {
        let code = input.trim().to_ascii_uppercase();
        let well_formed = code.len() == EDIT_CODE_LEN
            && code.bytes().all(|b| CODE_ALPHABET.contains(&b));
        well_formed.then_some(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EditCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-issued memorial identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemorialId(String);

impl MemorialId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MemorialId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemorialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Publication status of a memorial
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorialStatus {
    /// Saved but not shown publicly
    #[default]
    Draft,
    /// Finalized and shown on its anniversary
    Approved,
}

impl MemorialStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
        }
    }
}

/// A memorial record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memorial {
    pub id: MemorialId,

    /// Name as it should appear on the memorial
    pub full_name: String,

    /// Date of passing; its month and day drive the public listing
    pub date_of_death: NaiveDate,

    /// `<bucket>/<filename>` in the object store
    #[serde(default)]
    pub photo_path: Option<String>,

    #[serde(default)]
    pub status: MemorialStatus,
}

impl Memorial {
    pub const fn is_approved(&self) -> bool {
        matches!(self.status, MemorialStatus::Approved)
    }
}

/// User-editable memorial columns
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorialFields {
    pub full_name: String,
    pub date_of_death: NaiveDate,
    pub photo_path: Option<String>,
}

/// A paid edit session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Processor-issued checkout session id
    pub session_id: String,

    pub code: EditCode,

    /// Memorial created by the first save, if any
    #[serde(default)]
    pub memorial_id: Option<MemorialId>,

    /// One-way lock set by finalize
    #[serde(default)]
    pub used: bool,
}

impl SessionRecord {
    /// Fresh, unlinked, unlocked session
    pub fn new(session_id: impl Into<String>, code: EditCode) -> Self {
        Self {
            session_id: session_id.into(),
            code,
            memorial_id: None,
            used: false,
        }
    }
}

/// A photo received from the edit form
#[derive(Clone, Debug)]
pub struct PhotoUpload {
    /// Name the browser reported for the file
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    /// Check size and type before anything is written
    pub fn validate(&self) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(MemorialError::Validation("Photo file is empty.".into()));
        }
        if !self.content_type.starts_with("image/") {
            return Err(MemorialError::Validation(
                "Photo must be an image (JPG/PNG).".into(),
            ));
        }
        if self.bytes.len() > MAX_PHOTO_BYTES {
            return Err(MemorialError::Validation("Image file too big. Max 5 MB.".into()));
        }
        Ok(())
    }

    /// Unique object name: `<uuid>-<sanitized original name>`
    pub fn storage_filename(&self) -> String {
        let name: String = self
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = if name.is_empty() { "photo".to_string() } else { name };
        format!("{}-{}", Uuid::new_v4(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_code_generation() {
        let code = EditCode::generate();
        assert_eq!(code.as_str().len(), EDIT_CODE_LEN);
        assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_edit_code_parse_normalizes() {
        let code = EditCode::parse("  rjxpkv ").unwrap();
        assert_eq!(code.as_str(), "RJXPKV");

        assert!(EditCode::parse("ABC").is_none());
        assert!(EditCode::parse("ABC-12").is_none());
        assert!(EditCode::parse("").is_none());
    }

    #[test]
    fn test_memorial_wire_format() {
        let json = r#"{
            "id": "0b6c1f6e-5d1e-4c43-9a8e-3f9f0f1e2a11",
            "full_name": "Ada Lovelace",
            "date_of_death": "1852-11-27",
            "photo_path": "memorial-photos/a.jpg",
            "status": "approved",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let memorial: Memorial = serde_json::from_str(json).unwrap();
        assert!(memorial.is_approved());
        assert_eq!(
            memorial.date_of_death,
            NaiveDate::from_ymd_opt(1852, 11, 27).unwrap()
        );
    }

    #[test]
    fn test_photo_validation() {
        let mut photo = PhotoUpload {
            file_name: "mum.png".into(),
            content_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        assert!(photo.validate().is_ok());

        photo.content_type = "application/pdf".into();
        assert!(matches!(photo.validate(), Err(MemorialError::Validation(_))));

        photo.content_type = "image/jpeg".into();
        photo.bytes = vec![0; MAX_PHOTO_BYTES + 1];
        assert!(matches!(photo.validate(), Err(MemorialError::Validation(_))));
    }

    #[test]
    fn test_storage_filename_is_sanitized() {
        let photo = PhotoUpload {
            file_name: "../holiday photos/Gran (1).jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: vec![1],
        };
        let name = photo.storage_filename();
        assert!(name.ends_with("-Gran__1_.jpg"));
        assert!(!name.contains('/'));
    }
}
