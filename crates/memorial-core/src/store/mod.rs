//! Storage Abstractions
//!
//! The hosted data store and object store sit behind these traits.
//! Implement them for each backend: Supabase, an in-memory map, etc.

mod memory;

pub use memory::{MemoryMemorialStore, MemoryPhotoStore, MemorySessionStore};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{EditCode, Memorial, MemorialFields, MemorialId, PhotoUpload, SessionRecord};

/// Memorial records (`memorials` table)
#[async_trait]
pub trait MemorialStore: Send + Sync {
    /// Insert a new draft memorial and return it with its issued id
    async fn insert(&self, fields: &MemorialFields) -> Result<Memorial>;

    /// Get memorial by id
    async fn get(&self, id: &MemorialId) -> Result<Option<Memorial>>;

    /// Overwrite the editable fields of a draft memorial.
    ///
    /// Fails with `Locked` when the memorial is already approved and
    /// `MemorialNotFound` when it does not exist. Never touches `status`.
    async fn update_fields(&self, id: &MemorialId, fields: &MemorialFields) -> Result<Memorial>;

    /// Set `status = approved`
    async fn approve(&self, id: &MemorialId) -> Result<()>;

    /// All approved memorials, unordered
    async fn list_approved(&self) -> Result<Vec<Memorial>>;
}

/// Paid edit sessions (`memorial_sessions` table)
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session row. Fails with `Conflict` when the session id or
    /// the code already exists.
    async fn insert(&self, record: &SessionRecord) -> Result<()>;

    /// Get session by processor session id
    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Get session by edit code
    async fn find_by_code(&self, code: &EditCode) -> Result<Option<SessionRecord>>;

    /// Point the session at its memorial
    async fn link_memorial(&self, session_id: &str, memorial_id: &MemorialId) -> Result<()>;

    /// Set `used = true` only if it is still false.
    ///
    /// Returns `true` when this call performed the lock, `false` when the
    /// session was already locked.
    async fn lock(&self, session_id: &str) -> Result<bool>;
}

/// Photo objects (storage bucket)
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Upload under a fresh unique name and return its `photo_path`
    async fn upload(&self, photo: &PhotoUpload) -> Result<String>;

    /// Public URL for a stored `photo_path`
    fn public_url(&self, photo_path: &str) -> String;
}

/// Public object URL: `<base>/storage/v1/object/public/<bucket>/<filename>`
pub fn public_object_url(base_url: &str, photo_path: &str) -> String {
    format!(
        "{}/storage/v1/object/public/{}",
        base_url.trim_end_matches('/'),
        photo_path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_object_url() {
        assert_eq!(
            public_object_url("https://abc.supabase.co/", "memorial-photos/x.jpg"),
            "https://abc.supabase.co/storage/v1/object/public/memorial-photos/x.jpg"
        );
    }
}
