//! Payment Processor Abstraction
//!
//! The hosted payment processor sits behind [`PaymentProcessor`] so the
//! verifier and the HTTP layer can run against [`MockProcessor`] in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{PaymentError, Result};

/// Where the processor redirects the visitor after checkout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Standard redirect pair for a site root. The success URL carries the
    /// processor's session id placeholder.
    pub fn for_site(site_url: &str) -> Self {
        let site = site_url.trim_end_matches('/');
        Self {
            success_url: format!("{site}/create/details?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{site}/create?canceled=1"),
        }
    }
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Processor session ID
    pub id: String,

    /// URL to redirect user to
    pub checkout_url: String,
}

/// Payment status of a checkout session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    /// Only a captured payment unlocks editing
    pub const fn is_paid(self) -> bool {
        matches!(self, Self::Paid)
    }
}

/// Payment processor trait (Strategy pattern)
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Start a hosted checkout for the memorial fee
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Look up the payment status of a checkout session
    async fn payment_status(&self, session_id: &str) -> Result<PaymentStatus>;

    /// Processor name
    fn name(&self) -> &str;
}

/// Mock processor with scripted session states
pub struct MockProcessor {
    sessions: RwLock<HashMap<String, PaymentStatus>>,
    reachable: RwLock<bool>,
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessor {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            reachable: RwLock::new(true),
        }
    }

    /// Mark a session as paid
    pub async fn mark_paid(&self, session_id: &str) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), PaymentStatus::Paid);
    }

    /// Simulate the processor being down
    pub async fn set_reachable(&self, reachable: bool) {
        *self.reachable.write().await = reachable;
    }

    async fn ensure_reachable(&self) -> Result<()> {
        if *self.reachable.read().await {
            Ok(())
        } else {
            Err(PaymentError::Stripe("connection refused".into()))
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        self.ensure_reachable().await?;

        let mut sessions = self.sessions.write().await;
        let id = format!("cs_test_mock_{}", sessions.len() + 1);
        sessions.insert(id.clone(), PaymentStatus::Unpaid);

        Ok(CheckoutSession {
            checkout_url: format!(
                "https://checkout.example.test/pay/{id}?next={}",
                request.success_url
            ),
            id,
        })
    }

    async fn payment_status(&self, session_id: &str) -> Result<PaymentStatus> {
        self.ensure_reachable().await?;
        self.sessions
            .read()
            .await
            .get(session_id)
            .copied()
            .ok_or_else(|| PaymentError::InvalidSession(session_id.to_string()))
    }

    fn name(&self) -> &str {
        "MockProcessor"
    }
}
