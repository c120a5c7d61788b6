//! Error Types

use thiserror::Error;

/// Result type alias for memorial operations
pub type Result<T> = std::result::Result<T, MemorialError>;

/// Memorial workflow and storage errors
#[derive(Error, Debug)]
pub enum MemorialError {
    /// No session row for the given session id or edit code
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// No memorial row for the given id
    #[error("Memorial not found: {0}")]
    MemorialNotFound(String),

    /// Session has been finalized (or its memorial approved)
    #[error("Memorial is locked: {0}")]
    Locked(String),

    /// Finalize was requested without explicit confirmation
    #[error("Finalize requires confirmation")]
    ConfirmationRequired,

    /// Finalize was requested before any memorial was saved
    #[error("No memorial saved for session {0}")]
    NothingToFinalize(String),

    /// Memorial was approved but the session lock write failed
    #[error("Memorial {memorial_id} approved but session not locked: {reason}")]
    PartiallyFinalized { memorial_id: String, reason: String },

    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unique constraint violated (duplicate session id or edit code)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Photo upload failed
    #[error("Upload error: {0}")]
    Upload(String),

    /// Data store read/write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MemorialError {
    /// Check if error is retryable by the user
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Upload(_) | Self::PartiallyFinalized { .. }
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::SessionNotFound(_) => "Invalid or expired edit link.".into(),
            Self::MemorialNotFound(_) => "Memorial not found.".into(),
            Self::Locked(_) => {
                "This memorial has been submitted. Please contact an administrator for further changes.".into()
            }
            Self::ConfirmationRequired => {
                "After submitting, your memorial will be live and cannot be edited without administrator help. Please confirm to continue.".into()
            }
            Self::NothingToFinalize(_) => "Please save your memorial before submitting it.".into(),
            Self::PartiallyFinalized { .. } => {
                "Your memorial was published but the edit link could not be locked. Please submit again.".into()
            }
            Self::Validation(msg) => msg.clone(),
            Self::Upload(_) => "Photo upload failed. Please try again.".into(),
            Self::Storage(_) | Self::Conflict(_) => "Saving failed. Please try again.".into(),
            Self::Json(_) => "An unexpected error occurred.".into(),
        }
    }
}
