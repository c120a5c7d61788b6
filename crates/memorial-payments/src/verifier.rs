//! Payment Verification
//!
//! Turns a confirmed payment into an edit session with a fresh edit code.
//! Verification is idempotent: the first paid observation mints the code,
//! every later one returns the stored code.

use std::sync::Arc;

use memorial_core::{EditCode, MemorialError, SessionRecord, SessionStore};
use serde::{Deserialize, Serialize};

use crate::processor::PaymentProcessor;

/// Attempts at finding an unused edit code before giving up
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Verification result, as returned to the payment redirect page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub paid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<EditCode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Verification {
    pub const fn paid(code: EditCode) -> Self {
        Self {
            paid: true,
            code: Some(code),
            error: None,
        }
    }

    pub fn unpaid(error: Option<&str>) -> Self {
        Self {
            paid: false,
            code: None,
            error: error.map(Into::into),
        }
    }
}

/// Payment verifier
pub struct PaymentVerifier {
    processor: Arc<dyn PaymentProcessor>,
    sessions: Arc<dyn SessionStore>,
}

impl PaymentVerifier {
    pub fn new(processor: Arc<dyn PaymentProcessor>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            processor,
            sessions,
        }
    }

    /// Check a checkout session with the processor and hand out its edit
    /// code. Never fails: processor problems report `paid = false`.
    pub async fn verify(&self, session_id: &str) -> Verification {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Verification::unpaid(Some("Missing session_id"));
        }

        match self.processor.payment_status(session_id).await {
            Ok(status) if status.is_paid() => {}
            Ok(status) => {
                tracing::debug!(session_id, status = ?status, "Checkout session not paid");
                return Verification::unpaid(None);
            }
            Err(e) => {
                tracing::warn!(
                    session_id,
                    processor = self.processor.name(),
                    error = %e,
                    "Payment verification failed"
                );
                return Verification::unpaid(Some("Payment verification failed"));
            }
        }

        match self.register_paid(session_id).await {
            Ok(code) => Verification::paid(code),
            Err(e) => {
                tracing::error!(session_id, error = %e, "Could not record paid session");
                Verification {
                    paid: true,
                    code: None,
                    error: Some(e.user_message()),
                }
            }
        }
    }

    /// Record a session already known to be paid and return its edit code.
    ///
    /// A unique violation on insert means either a concurrent verify stored
    /// the row first (return its code) or the generated code collided (try
    /// another one).
    pub async fn register_paid(&self, session_id: &str) -> memorial_core::Result<EditCode> {
        if let Some(existing) = self.sessions.find_by_session_id(session_id).await? {
            return Ok(existing.code);
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let record = SessionRecord::new(session_id, EditCode::generate());

            match self.sessions.insert(&record).await {
                Ok(()) => {
                    tracing::info!(session_id, code = %record.code, "Issued edit code");
                    return Ok(record.code);
                }
                Err(MemorialError::Conflict(reason)) => {
                    if let Some(existing) = self.sessions.find_by_session_id(session_id).await? {
                        return Ok(existing.code);
                    }
                    tracing::warn!(session_id, attempt, reason = %reason, "Edit code collision");
                }
                Err(e) => return Err(e),
            }
        }

        Err(MemorialError::Conflict(format!(
            "no unused edit code after {MAX_CODE_ATTEMPTS} attempts"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::MockProcessor;
    use async_trait::async_trait;
    use memorial_core::{MemorialId, MemorySessionStore};

    async fn setup() -> (PaymentVerifier, Arc<MockProcessor>, Arc<MemorySessionStore>) {
        let processor = Arc::new(MockProcessor::new());
        let sessions = Arc::new(MemorySessionStore::new());
        processor.mark_paid("cs_test_paid").await;
        let verifier = PaymentVerifier::new(processor.clone(), sessions.clone());
        (verifier, processor, sessions)
    }

    #[tokio::test]
    async fn test_verify_is_idempotent() {
        let (verifier, _, sessions) = setup().await;

        let first = verifier.verify("cs_test_paid").await;
        let second = verifier.verify("cs_test_paid").await;

        assert!(first.paid);
        assert!(first.code.is_some());
        assert_eq!(first, second);
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn test_unpaid_session_creates_nothing() {
        let (verifier, processor, sessions) = setup().await;
        let checkout = processor
            .create_checkout(&crate::CheckoutRequest::for_site("http://localhost"))
            .await
            .unwrap();

        let result = verifier.verify(&checkout.id).await;
        assert_eq!(result, Verification::unpaid(None));
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_or_unreachable_reports_unpaid() {
        let (verifier, processor, sessions) = setup().await;

        assert!(!verifier.verify("cs_test_unknown").await.paid);
        assert!(!verifier.verify("").await.paid);

        processor.set_reachable(false).await;
        let result = verifier.verify("cs_test_paid").await;
        assert!(!result.paid);
        assert!(result.error.is_some());
        assert!(sessions.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_paid_returns_existing_code() {
        let (verifier, _, sessions) = setup().await;
        let code = EditCode::parse("ABC123").unwrap();
        sessions
            .insert(&SessionRecord::new("cs_test_paid", code.clone()))
            .await
            .unwrap();

        assert_eq!(verifier.register_paid("cs_test_paid").await.unwrap(), code);
        assert_eq!(verifier.verify("cs_test_paid").await.code, Some(code));
    }

    /// Store where every insert collides on the code
    struct CollidingSessions;

    #[async_trait]
    impl SessionStore for CollidingSessions {
        async fn insert(&self, _record: &SessionRecord) -> memorial_core::Result<()> {
            Err(MemorialError::Conflict("duplicate code".into()))
        }

        async fn find_by_session_id(
            &self,
            _session_id: &str,
        ) -> memorial_core::Result<Option<SessionRecord>> {
            Ok(None)
        }

        async fn find_by_code(
            &self,
            _code: &EditCode,
        ) -> memorial_core::Result<Option<SessionRecord>> {
            Ok(None)
        }

        async fn link_memorial(
            &self,
            _session_id: &str,
            _memorial_id: &MemorialId,
        ) -> memorial_core::Result<()> {
            Ok(())
        }

        async fn lock(&self, _session_id: &str) -> memorial_core::Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_store_failure_reports_paid_with_error() {
        let processor = Arc::new(MockProcessor::new());
        processor.mark_paid("cs_test_paid").await;
        let verifier = PaymentVerifier::new(processor, Arc::new(CollidingSessions));

        let result = verifier.verify("cs_test_paid").await;
        assert!(result.paid);
        assert!(result.code.is_none());
        assert!(result.error.is_some());
    }

    /// Store where a concurrent verify commits the row just before our insert
    struct RacingSessions {
        inner: MemorySessionStore,
        winner: EditCode,
    }

    #[async_trait]
    impl SessionStore for RacingSessions {
        async fn insert(&self, record: &SessionRecord) -> memorial_core::Result<()> {
            self.inner
                .insert(&SessionRecord::new(
                    record.session_id.clone(),
                    self.winner.clone(),
                ))
                .await?;
            Err(MemorialError::Conflict("duplicate session_id".into()))
        }

        async fn find_by_session_id(
            &self,
            session_id: &str,
        ) -> memorial_core::Result<Option<SessionRecord>> {
            self.inner.find_by_session_id(session_id).await
        }

        async fn find_by_code(
            &self,
            code: &EditCode,
        ) -> memorial_core::Result<Option<SessionRecord>> {
            self.inner.find_by_code(code).await
        }

        async fn link_memorial(
            &self,
            session_id: &str,
            memorial_id: &MemorialId,
        ) -> memorial_core::Result<()> {
            self.inner.link_memorial(session_id, memorial_id).await
        }

        async fn lock(&self, session_id: &str) -> memorial_core::Result<bool> {
            self.inner.lock(session_id).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_verify_returns_winning_code() {
        let processor = Arc::new(MockProcessor::new());
        processor.mark_paid("cs_test_paid").await;
        let winner = EditCode::parse("WIN123").unwrap();
        let sessions = Arc::new(RacingSessions {
            inner: MemorySessionStore::new(),
            winner: winner.clone(),
        });
        let verifier = PaymentVerifier::new(processor, sessions.clone());

        let result = verifier.verify("cs_test_paid").await;
        assert_eq!(result, Verification::paid(winner));
        assert_eq!(sessions.inner.len().await, 1);
    }
}
