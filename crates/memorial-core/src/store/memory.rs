//! In-Memory Stores
//!
//! For development and testing. Mirrors the unique constraints and
//! conditional updates of the hosted tables.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MemorialStore, PhotoStore, SessionStore, public_object_url};
use crate::error::{MemorialError, Result};
use crate::model::{
    EditCode, Memorial, MemorialFields, MemorialId, MemorialStatus, PhotoUpload, SessionRecord,
};

/// In-memory memorial table
#[derive(Default)]
pub struct MemoryMemorialStore {
    memorials: RwLock<HashMap<MemorialId, Memorial>>,
}

impl MemoryMemorialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored memorials, drafts included
    pub async fn len(&self) -> usize {
        self.memorials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memorials.read().await.is_empty()
    }
}

#[async_trait]
impl MemorialStore for MemoryMemorialStore {
    async fn insert(&self, fields: &MemorialFields) -> Result<Memorial> {
        let memorial = Memorial {
            id: MemorialId::new(),
            full_name: fields.full_name.clone(),
            date_of_death: fields.date_of_death,
            photo_path: fields.photo_path.clone(),
            status: MemorialStatus::Draft,
        };
        self.memorials
            .write()
            .await
            .insert(memorial.id.clone(), memorial.clone());
        Ok(memorial)
    }

    async fn get(&self, id: &MemorialId) -> Result<Option<Memorial>> {
        Ok(self.memorials.read().await.get(id).cloned())
    }

    async fn update_fields(&self, id: &MemorialId, fields: &MemorialFields) -> Result<Memorial> {
        let mut memorials = self.memorials.write().await;
        let memorial = memorials
            .get_mut(id)
            .ok_or_else(|| MemorialError::MemorialNotFound(id.to_string()))?;

        if memorial.is_approved() {
            return Err(MemorialError::Locked(id.to_string()));
        }

        memorial.full_name.clone_from(&fields.full_name);
        memorial.date_of_death = fields.date_of_death;
        memorial.photo_path.clone_from(&fields.photo_path);
        Ok(memorial.clone())
    }

    async fn approve(&self, id: &MemorialId) -> Result<()> {
        let mut memorials = self.memorials.write().await;
        let memorial = memorials
            .get_mut(id)
            .ok_or_else(|| MemorialError::MemorialNotFound(id.to_string()))?;
        memorial.status = MemorialStatus::Approved;
        Ok(())
    }

    async fn list_approved(&self) -> Result<Vec<Memorial>> {
        Ok(self
            .memorials
            .read()
            .await
            .values()
            .filter(|m| m.is_approved())
            .cloned()
            .collect())
    }
}

/// In-memory session table
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: &SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&record.session_id) {
            return Err(MemorialError::Conflict(format!(
                "session {} already exists",
                record.session_id
            )));
        }
        if sessions.values().any(|s| s.code == record.code) {
            return Err(MemorialError::Conflict(format!(
                "code {} already exists",
                record.code
            )));
        }

        sessions.insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn find_by_code(&self, code: &EditCode) -> Result<Option<SessionRecord>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| &s.code == code)
            .cloned())
    }

    async fn link_memorial(&self, session_id: &str, memorial_id: &MemorialId) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| MemorialError::SessionNotFound(session_id.to_string()))?;
        session.memorial_id = Some(memorial_id.clone());
        Ok(())
    }

    async fn lock(&self, session_id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| MemorialError::SessionNotFound(session_id.to_string()))?;

        if session.used {
            return Ok(false);
        }
        session.used = true;
        Ok(true)
    }
}

/// In-memory bucket
pub struct MemoryPhotoStore {
    bucket: String,
    base_url: String,
    objects: RwLock<HashMap<String, PhotoUpload>>,
}

impl Default for MemoryPhotoStore {
    fn default() -> Self {
        Self::new("memorial-photos", "http://localhost:3000")
    }
}

impl MemoryPhotoStore {
    pub fn new(bucket: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Photo stored under a `photo_path`
    pub async fn object(&self, photo_path: &str) -> Option<PhotoUpload> {
        self.objects.read().await.get(photo_path).cloned()
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl PhotoStore for MemoryPhotoStore {
    async fn upload(&self, photo: &PhotoUpload) -> Result<String> {
        let photo_path = format!("{}/{}", self.bucket, photo.storage_filename());
        self.objects
            .write()
            .await
            .insert(photo_path.clone(), photo.clone());
        Ok(photo_path)
    }

    fn public_url(&self, photo_path: &str) -> String {
        public_object_url(&self.base_url, photo_path)
    }
}
