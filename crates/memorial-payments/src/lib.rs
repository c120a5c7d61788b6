//! # memorial-payments
//!
//! One-time payment capture for memorial-lane.
//!
//! ## Flow
//!
//! **Stripe Checkout (Hosted):** the visitor leaves for Stripe's hosted page
//! and comes back to the details form with the checkout session id.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────────┐
//! │  /create    │────▶│  Stripe Hosted  │────▶│ /create/details      │
//! │  (pay $10)  │     │  Checkout Page  │     │ ?session_id=cs_...   │
//! └─────────────┘     └─────────────────┘     └──────────────────────┘
//!                              │                         │
//!                              ▼ webhook                 ▼ verify
//!                     ┌──────────────────────────────────────────┐
//!                     │ PaymentVerifier::register_paid           │
//!                     │ (one session row, one edit code)         │
//!                     └──────────────────────────────────────────┘
//! ```
//!
//! Whichever of the webhook and the redirect arrives first mints the edit
//! code; the other sees the stored one.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memorial_payments::{CheckoutRequest, MemorialPricing, PaymentProcessor, StripeClient};
//!
//! let client = StripeClient::new("sk_test_xxx", "whsec_xxx", MemorialPricing::default());
//!
//! let session = client
//!     .create_checkout(&CheckoutRequest::for_site("https://yoursite.com"))
//!     .await?;
//!
//! // Redirect user to: session.checkout_url
//! ```

mod checkout;
mod error;
mod processor;
mod verifier;
mod webhook;

pub use checkout::{MemorialPricing, StripeClient};
pub use error::{PaymentError, Result};
pub use processor::{
    CheckoutRequest, CheckoutSession, MockProcessor, PaymentProcessor, PaymentStatus,
};
pub use verifier::{MAX_CODE_ATTEMPTS, PaymentVerifier, Verification};
pub use webhook::{
    SIGNATURE_TOLERANCE_SECS, WebhookEvent, WebhookHandler, parse_event, verify_signature,
};
