//! Edit/Finalize Workflow
//!
//! Resolves a paid session (by processor session id or edit code) to its
//! memorial, applies edits while the session is unlocked, and performs the
//! one-way finalize.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{MemorialError, Result};
use crate::model::{
    EditCode, MAX_NAME_CHARS, Memorial, MemorialFields, MemorialId, PhotoUpload, SessionRecord,
};
use crate::store::{MemorialStore, PhotoStore, SessionStore};

/// How a caller addresses an edit session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionKey {
    /// Processor checkout session id, from the payment redirect
    SessionId(String),
    /// Human-entered edit code
    Code(EditCode),
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionId(id) => write!(f, "session {id}"),
            Self::Code(code) => write!(f, "code {code}"),
        }
    }
}

/// Where a session stands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditState {
    /// Paid, nothing saved yet
    New,
    /// Memorial saved as draft, still editable
    Draft,
    /// Finalized; self-service edits are closed
    Locked,
}

/// A resolved session as shown to the edit form
#[derive(Clone, Debug, Serialize)]
pub struct EditView {
    pub state: EditState,
    pub code: EditCode,
    #[serde(skip)]
    pub session_id: String,
    pub memorial: Option<Memorial>,
}

/// Values submitted by the edit form
#[derive(Clone, Debug, Default)]
pub struct MemorialEdit {
    pub full_name: String,
    /// `YYYY-MM-DD`
    pub date_of_death: String,
    /// New photo; `None` keeps the stored one
    pub photo: Option<PhotoUpload>,
}

impl MemorialEdit {
    fn validate(&self, first_save: bool) -> Result<(String, NaiveDate)> {
        let full_name = self.full_name.trim();
        if full_name.is_empty() {
            return Err(MemorialError::Validation("Full name is required.".into()));
        }
        if full_name.chars().count() > MAX_NAME_CHARS {
            return Err(MemorialError::Validation(format!(
                "Full name must be at most {MAX_NAME_CHARS} characters."
            )));
        }

        let date_of_death = NaiveDate::parse_from_str(self.date_of_death.trim(), "%Y-%m-%d")
            .map_err(|_| MemorialError::Validation("Date of passing must be YYYY-MM-DD.".into()))?;

        match &self.photo {
            Some(photo) => photo.validate()?,
            None if first_save => {
                return Err(MemorialError::Validation("A memorial photo is required.".into()));
            }
            None => {}
        }

        Ok((full_name.to_string(), date_of_death))
    }
}

/// Result of a finalize request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FinalizeOutcome {
    /// This call published the memorial and locked the session
    Finalized { memorial_id: MemorialId },
    /// The session was already locked; nothing changed
    AlreadyLocked,
}

/// Edit/finalize workflow over the three stores
pub struct MemorialWorkflow {
    memorials: Arc<dyn MemorialStore>,
    sessions: Arc<dyn SessionStore>,
    photos: Arc<dyn PhotoStore>,
}

impl MemorialWorkflow {
    pub fn new(
        memorials: Arc<dyn MemorialStore>,
        sessions: Arc<dyn SessionStore>,
        photos: Arc<dyn PhotoStore>,
    ) -> Self {
        Self {
            memorials,
            sessions,
            photos,
        }
    }

    /// Public URL for a stored photo
    pub fn photo_url(&self, photo_path: &str) -> String {
        self.photos.public_url(photo_path)
    }

    async fn find_session(&self, key: &SessionKey) -> Result<SessionRecord> {
        let session = match key {
            SessionKey::SessionId(id) => self.sessions.find_by_session_id(id).await?,
            SessionKey::Code(code) => self.sessions.find_by_code(code).await?,
        };
        session.ok_or_else(|| MemorialError::SessionNotFound(key.to_string()))
    }

    /// Load a session and its memorial. Never writes.
    pub async fn resolve(&self, key: &SessionKey) -> Result<EditView> {
        let session = self.find_session(key).await?;

        let memorial = match &session.memorial_id {
            Some(id) => {
                let memorial = self.memorials.get(id).await?;
                if memorial.is_none() {
                    tracing::warn!(memorial_id = %id, "Session links a missing memorial");
                }
                memorial
            }
            None => None,
        };

        let state = if session.used || memorial.as_ref().is_some_and(Memorial::is_approved) {
            EditState::Locked
        } else if memorial.is_some() {
            EditState::Draft
        } else {
            EditState::New
        };

        Ok(EditView {
            state,
            code: session.code,
            session_id: session.session_id,
            memorial,
        })
    }

    /// Create or update the session's memorial.
    ///
    /// The photo is uploaded before any record is written; an upload that
    /// succeeds followed by a failed write leaves an orphaned object.
    pub async fn save(&self, key: &SessionKey, edit: MemorialEdit) -> Result<Memorial> {
        let view = self.resolve(key).await?;
        if view.state == EditState::Locked {
            return Err(MemorialError::Locked(view.code.to_string()));
        }

        let (full_name, date_of_death) = edit.validate(view.memorial.is_none())?;

        let photo_path = match &edit.photo {
            Some(photo) => Some(self.photos.upload(photo).await.map_err(|e| match e {
                MemorialError::Upload(_) => e,
                other => MemorialError::Upload(other.to_string()),
            })?),
            None => view.memorial.as_ref().and_then(|m| m.photo_path.clone()),
        };

        let fields = MemorialFields {
            full_name,
            date_of_death,
            photo_path,
        };

        match view.memorial {
            Some(existing) => {
                let memorial = self.memorials.update_fields(&existing.id, &fields).await?;
                tracing::info!(
                    memorial_id = %memorial.id,
                    code = %view.code,
                    "Updated draft memorial"
                );
                Ok(memorial)
            }
            None => {
                let memorial = self.memorials.insert(&fields).await?;
                self.sessions
                    .link_memorial(&view.session_id, &memorial.id)
                    .await?;
                tracing::info!(
                    memorial_id = %memorial.id,
                    code = %view.code,
                    "Created draft memorial"
                );
                Ok(memorial)
            }
        }
    }

    /// Publish the memorial and lock the session.
    ///
    /// Writes `status = approved` first, then the conditional lock. Running
    /// finalize again after a failed lock write completes the lock.
    pub async fn finalize(&self, key: &SessionKey, confirmed: bool) -> Result<FinalizeOutcome> {
        let session = self.find_session(key).await?;
        if session.used {
            return Ok(FinalizeOutcome::AlreadyLocked);
        }
        if !confirmed {
            return Err(MemorialError::ConfirmationRequired);
        }
        let memorial_id = session
            .memorial_id
            .clone()
            .ok_or_else(|| MemorialError::NothingToFinalize(session.code.to_string()))?;

        // Re-read right before committing; another tab may have finalized.
        let current = self
            .sessions
            .find_by_session_id(&session.session_id)
            .await?
            .ok_or_else(|| MemorialError::SessionNotFound(key.to_string()))?;
        if current.used {
            return Ok(FinalizeOutcome::AlreadyLocked);
        }

        self.memorials.approve(&memorial_id).await?;

        match self.sessions.lock(&session.session_id).await {
            Ok(true) => {
                tracing::info!(
                    memorial_id = %memorial_id,
                    code = %session.code,
                    "Memorial finalized"
                );
                Ok(FinalizeOutcome::Finalized { memorial_id })
            }
            Ok(false) => {
                tracing::warn!(code = %session.code, "Concurrent finalize lost the lock race");
                Ok(FinalizeOutcome::AlreadyLocked)
            }
            Err(e) => {
                tracing::error!(
                    memorial_id = %memorial_id,
                    error = %e,
                    "Memorial approved but session lock failed"
                );
                Err(MemorialError::PartiallyFinalized {
                    memorial_id: memorial_id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemorialStatus;
    use crate::store::{MemoryMemorialStore, MemoryPhotoStore, MemorySessionStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Fixture {
        workflow: MemorialWorkflow,
        memorials: Arc<MemoryMemorialStore>,
        sessions: Arc<MemorySessionStore>,
        photos: Arc<MemoryPhotoStore>,
        code: EditCode,
    }

    async fn fixture() -> Fixture {
        let memorials = Arc::new(MemoryMemorialStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        let photos = Arc::new(MemoryPhotoStore::default());
        let code = EditCode::parse("RJXPKV").unwrap();
        sessions
            .insert(&SessionRecord::new("cs_test_paid", code.clone()))
            .await
            .unwrap();

        Fixture {
            workflow: MemorialWorkflow::new(memorials.clone(), sessions.clone(), photos.clone()),
            memorials,
            sessions,
            photos,
            code,
        }
    }

    fn photo() -> PhotoUpload {
        PhotoUpload {
            file_name: "portrait.jpg".into(),
            content_type: "image/jpeg".into(),
            bytes: vec![0xFF, 0xD8, 0xFF],
        }
    }

    fn edit(name: &str, photo: Option<PhotoUpload>) -> MemorialEdit {
        MemorialEdit {
            full_name: name.into(),
            date_of_death: "2020-03-15".into(),
            photo,
        }
    }

    fn by_id() -> SessionKey {
        SessionKey::SessionId("cs_test_paid".into())
    }

    #[tokio::test]
    async fn test_first_save_creates_and_links_draft() {
        let f = fixture().await;
        assert_eq!(f.workflow.resolve(&by_id()).await.unwrap().state, EditState::New);

        let memorial = f
            .workflow
            .save(&by_id(), edit("Ada Lovelace", Some(photo())))
            .await
            .unwrap();
        assert_eq!(memorial.status, MemorialStatus::Draft);

        let session = f.sessions.find_by_session_id("cs_test_paid").await.unwrap().unwrap();
        assert_eq!(session.memorial_id, Some(memorial.id.clone()));
        assert!(!session.used);

        let view = f.workflow.resolve(&SessionKey::Code(f.code.clone())).await.unwrap();
        assert_eq!(view.state, EditState::Draft);
        assert_eq!(view.memorial.unwrap().id, memorial.id);
    }

    #[tokio::test]
    async fn test_first_save_requires_photo() {
        let f = fixture().await;
        let result = f.workflow.save(&by_id(), edit("Ada Lovelace", None)).await;
        assert!(matches!(result, Err(MemorialError::Validation(_))));
        assert!(f.memorials.is_empty().await);
    }

    #[tokio::test]
    async fn test_save_without_photo_keeps_photo_path() {
        let f = fixture().await;
        let first = f.workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();

        let key = SessionKey::Code(f.code.clone());
        let second = f.workflow.save(&key, edit("Ada Lovelace", None)).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.full_name, "Ada Lovelace");
        assert_eq!(second.photo_path, first.photo_path);
        assert_eq!(f.photos.len().await, 1);
    }

    #[tokio::test]
    async fn test_save_with_photo_replaces_photo_path() {
        let f = fixture().await;
        let first = f.workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();
        let second = f.workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();

        assert_ne!(second.photo_path, first.photo_path);
        assert_eq!(f.photos.len().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_date_is_rejected() {
        let f = fixture().await;
        let mut bad = edit("Ada", Some(photo()));
        bad.date_of_death = "15/03/2020".into();
        assert!(matches!(
            f.workflow.save(&by_id(), bad).await,
            Err(MemorialError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_finalize_requires_confirmation_and_memorial() {
        let f = fixture().await;
        assert!(matches!(
            f.workflow.finalize(&by_id(), true).await,
            Err(MemorialError::NothingToFinalize(_))
        ));

        f.workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();
        assert!(matches!(
            f.workflow.finalize(&by_id(), false).await,
            Err(MemorialError::ConfirmationRequired)
        ));
        assert!(!f.sessions.find_by_session_id("cs_test_paid").await.unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn test_finalize_locks_and_second_finalize_is_noop() {
        let f = fixture().await;
        let memorial = f.workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();

        let outcome = f.workflow.finalize(&by_id(), true).await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::Finalized { memorial_id: memorial.id.clone() });

        let stored = f.memorials.get(&memorial.id).await.unwrap().unwrap();
        assert!(stored.is_approved());
        assert!(f.sessions.find_by_session_id("cs_test_paid").await.unwrap().unwrap().used);

        let again = f.workflow.finalize(&SessionKey::Code(f.code.clone()), true).await.unwrap();
        assert_eq!(again, FinalizeOutcome::AlreadyLocked);
    }

    #[tokio::test]
    async fn test_locked_session_rejects_edits() {
        let f = fixture().await;
        let memorial = f.workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();
        f.workflow.finalize(&by_id(), true).await.unwrap();

        let result = f.workflow.save(&by_id(), edit("Changed", Some(photo()))).await;
        assert!(matches!(result, Err(MemorialError::Locked(_))));

        let stored = f.memorials.get(&memorial.id).await.unwrap().unwrap();
        assert_eq!(stored.full_name, "Ada");
        assert_eq!(stored.status, MemorialStatus::Approved);
        // Rejected before the upload
        assert_eq!(f.photos.len().await, 1);
    }

    #[tokio::test]
    async fn test_approved_memorial_is_locked_even_if_session_is_not() {
        let f = fixture().await;
        let memorial = f.workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();
        f.memorials.approve(&memorial.id).await.unwrap();

        assert_eq!(f.workflow.resolve(&by_id()).await.unwrap().state, EditState::Locked);
        assert!(matches!(
            f.workflow.save(&by_id(), edit("Ada", None)).await,
            Err(MemorialError::Locked(_))
        ));

        // Finalize completes the half-finished lock
        let outcome = f.workflow.finalize(&by_id(), true).await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::Finalized { memorial_id: memorial.id });
    }

    #[tokio::test]
    async fn test_unknown_code_creates_nothing() {
        let f = fixture().await;
        let key = SessionKey::Code(EditCode::parse("ZZZZZZ").unwrap());

        assert!(matches!(
            f.workflow.resolve(&key).await,
            Err(MemorialError::SessionNotFound(_))
        ));
        assert!(matches!(
            f.workflow.save(&key, edit("Ada", Some(photo()))).await,
            Err(MemorialError::SessionNotFound(_))
        ));
        assert!(f.memorials.is_empty().await);
        assert!(f.photos.is_empty().await);
        assert_eq!(f.sessions.len().await, 1);
    }

    struct FailingPhotoStore;

    #[async_trait]
    impl PhotoStore for FailingPhotoStore {
        async fn upload(&self, _photo: &PhotoUpload) -> Result<String> {
            Err(MemorialError::Storage("bucket unavailable".into()))
        }

        fn public_url(&self, photo_path: &str) -> String {
            photo_path.to_string()
        }
    }

    #[tokio::test]
    async fn test_upload_failure_aborts_before_record_write() {
        let memorials = Arc::new(MemoryMemorialStore::new());
        let sessions = Arc::new(MemorySessionStore::new());
        sessions
            .insert(&SessionRecord::new("cs_test_paid", EditCode::generate()))
            .await
            .unwrap();
        let workflow = MemorialWorkflow::new(
            memorials.clone(),
            sessions.clone(),
            Arc::new(FailingPhotoStore),
        );

        let result = workflow.save(&by_id(), edit("Ada", Some(photo()))).await;
        assert!(matches!(result, Err(MemorialError::Upload(_))));
        assert!(memorials.is_empty().await);
        let session = sessions.find_by_session_id("cs_test_paid").await.unwrap().unwrap();
        assert!(session.memorial_id.is_none());
    }

    /// Session store whose lock write always fails
    struct UnlockableSessions(MemorySessionStore);

    #[async_trait]
    impl SessionStore for UnlockableSessions {
        async fn insert(&self, record: &SessionRecord) -> Result<()> {
            self.0.insert(record).await
        }

        async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
            self.0.find_by_session_id(session_id).await
        }

        async fn find_by_code(&self, code: &EditCode) -> Result<Option<SessionRecord>> {
            self.0.find_by_code(code).await
        }

        async fn link_memorial(&self, session_id: &str, memorial_id: &MemorialId) -> Result<()> {
            self.0.link_memorial(session_id, memorial_id).await
        }

        async fn lock(&self, _session_id: &str) -> Result<bool> {
            Err(MemorialError::Storage("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_lock_failure_surfaces_partial_finalize() {
        let memorials = Arc::new(MemoryMemorialStore::new());
        let sessions = Arc::new(UnlockableSessions(MemorySessionStore::new()));
        sessions
            .insert(&SessionRecord::new("cs_test_paid", EditCode::generate()))
            .await
            .unwrap();
        let workflow = MemorialWorkflow::new(
            memorials.clone(),
            sessions.clone(),
            Arc::new(MemoryPhotoStore::default()),
        );

        let memorial = workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();
        let result = workflow.finalize(&by_id(), true).await;

        assert!(matches!(result, Err(MemorialError::PartiallyFinalized { .. })));
        assert!(memorials.get(&memorial.id).await.unwrap().unwrap().is_approved());
        assert!(!sessions.find_by_session_id("cs_test_paid").await.unwrap().unwrap().used);
    }

    /// Session store where another finalize commits between our first read
    /// and the re-read, once `armed` is set
    #[derive(Default)]
    struct ConcurrentlyLocked {
        inner: MemorySessionStore,
        armed: AtomicBool,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for ConcurrentlyLocked {
        async fn insert(&self, record: &SessionRecord) -> Result<()> {
            self.inner.insert(record).await
        }

        async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
            let found = self.inner.find_by_session_id(session_id).await?;
            if !self.armed.load(Ordering::SeqCst) {
                return Ok(found);
            }
            let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(found.map(|mut record| {
                record.used = reads > 1;
                record
            }))
        }

        async fn find_by_code(&self, code: &EditCode) -> Result<Option<SessionRecord>> {
            self.inner.find_by_code(code).await
        }

        async fn link_memorial(&self, session_id: &str, memorial_id: &MemorialId) -> Result<()> {
            self.inner.link_memorial(session_id, memorial_id).await
        }

        async fn lock(&self, session_id: &str) -> Result<bool> {
            self.inner.lock(session_id).await
        }
    }

    #[tokio::test]
    async fn test_reread_sees_concurrent_finalize() {
        let memorials = Arc::new(MemoryMemorialStore::new());
        let sessions = Arc::new(ConcurrentlyLocked::default());
        sessions
            .insert(&SessionRecord::new("cs_test_paid", EditCode::generate()))
            .await
            .unwrap();
        let workflow = MemorialWorkflow::new(
            memorials.clone(),
            sessions.clone(),
            Arc::new(MemoryPhotoStore::default()),
        );

        let memorial = workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();
        sessions.armed.store(true, Ordering::SeqCst);

        let outcome = workflow.finalize(&by_id(), true).await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::AlreadyLocked);
        assert_eq!(sessions.reads.load(Ordering::SeqCst), 2);

        // Nothing was written
        let stored = memorials.get(&memorial.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MemorialStatus::Draft);
        let session = sessions.inner.find_by_session_id("cs_test_paid").await.unwrap().unwrap();
        assert!(!session.used);
    }

    /// Session store whose conditional lock always finds the row already locked
    struct LostLockRace(MemorySessionStore);

    #[async_trait]
    impl SessionStore for LostLockRace {
        async fn insert(&self, record: &SessionRecord) -> Result<()> {
            self.0.insert(record).await
        }

        async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
            self.0.find_by_session_id(session_id).await
        }

        async fn find_by_code(&self, code: &EditCode) -> Result<Option<SessionRecord>> {
            self.0.find_by_code(code).await
        }

        async fn link_memorial(&self, session_id: &str, memorial_id: &MemorialId) -> Result<()> {
            self.0.link_memorial(session_id, memorial_id).await
        }

        async fn lock(&self, _session_id: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_lost_lock_race_reports_already_locked() {
        let sessions = Arc::new(LostLockRace(MemorySessionStore::new()));
        sessions
            .insert(&SessionRecord::new("cs_test_paid", EditCode::generate()))
            .await
            .unwrap();
        let workflow = MemorialWorkflow::new(
            Arc::new(MemoryMemorialStore::new()),
            sessions,
            Arc::new(MemoryPhotoStore::default()),
        );

        workflow.save(&by_id(), edit("Ada", Some(photo()))).await.unwrap();
        let outcome = workflow.finalize(&by_id(), true).await.unwrap();
        assert_eq!(outcome, FinalizeOutcome::AlreadyLocked);
    }
}
