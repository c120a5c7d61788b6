//! Application State

use std::sync::Arc;

use memorial_core::{MemorialStore, MemorialWorkflow, MemoryPhotoStore, SessionStore};
use memorial_payments::{PaymentProcessor, PaymentVerifier, WebhookHandler};

use crate::config::AppConfig;

/// Payment pieces, present only when the processor is configured
pub struct Payments {
    pub processor: Arc<dyn PaymentProcessor>,
    pub verifier: Arc<PaymentVerifier>,
    pub webhooks: WebhookHandler,
}

impl Payments {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        sessions: Arc<dyn SessionStore>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        let verifier = Arc::new(PaymentVerifier::new(processor.clone(), sessions));
        Self {
            processor,
            webhooks: WebhookHandler::new(verifier.clone(), webhook_secret),
            verifier,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Edit/finalize workflow over the configured stores
    pub workflow: Arc<MemorialWorkflow>,

    /// Memorial store for the public listing
    pub memorials: Arc<dyn MemorialStore>,

    /// Which storage backend is wired in ("supabase" or "memory")
    pub backend: &'static str,

    /// Payments (optional - None if not configured)
    pub payments: Option<Arc<Payments>>,

    /// In-memory bucket, served locally when there is no hosted storage
    pub local_photos: Option<Arc<MemoryPhotoStore>>,
}
