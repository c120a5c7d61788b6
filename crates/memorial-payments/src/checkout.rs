//! Stripe Checkout Integration
//!
//! Implements the "Stripe Checkout (Hosted)" approach for the one-time
//! memorial fee.

use async_trait::async_trait;
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionId, CheckoutSessionMode,
    CheckoutSessionPaymentStatus, Client, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    Currency,
};

use crate::error::{PaymentError, Result};
use crate::processor::{CheckoutRequest, CheckoutSession, PaymentProcessor, PaymentStatus};

/// What the checkout charges
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemorialPricing {
    /// A price configured in the Stripe dashboard
    Price(String),

    /// Inline price data
    Inline {
        name: String,
        description: String,
        cents: i64,
    },
}

impl Default for MemorialPricing {
    fn default() -> Self {
        Self::Inline {
            name: "Memorial Entry Fee".into(),
            description: "A memorial displayed every year on its anniversary".into(),
            cents: 1000, // $10 one-time
        }
    }
}

impl MemorialPricing {
    fn line_item(&self) -> CreateCheckoutSessionLineItems {
        match self {
            Self::Price(price_id) => CreateCheckoutSessionLineItems {
                quantity: Some(1),
                price: Some(price_id.clone()),
                ..Default::default()
            },
            Self::Inline {
                name,
                description,
                cents,
            } => CreateCheckoutSessionLineItems {
                quantity: Some(1),
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: Currency::USD,
                    unit_amount: Some(*cents),
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: name.clone(),
                        description: Some(description.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        }
    }
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
    pricing: MemorialPricing,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str, pricing: MemorialPricing) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
            pricing,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from a variable lookup (`STRIPE_SECRET_KEY`,
    /// `STRIPE_WEBHOOK_SECRET`, optional `STRIPE_PRICE_ID`)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret_key = lookup("STRIPE_SECRET_KEY")
            .ok_or_else(|| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = lookup("STRIPE_WEBHOOK_SECRET")
            .ok_or_else(|| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;
        let pricing = lookup("STRIPE_PRICE_ID")
            .filter(|id| !id.is_empty())
            .map_or_else(MemorialPricing::default, MemorialPricing::Price);

        Ok(Self::new(&secret_key, &webhook_secret, pricing))
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    pub const fn pricing(&self) -> &MemorialPricing {
        &self.pricing
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    /// Returns a URL to redirect the user to Stripe's hosted checkout page.
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.line_items = Some(vec![self.pricing.line_item()]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        tracing::info!(session_id = %session.id, "Created checkout session");

        Ok(CheckoutSession {
            id: session.id.to_string(),
            checkout_url,
        })
    }

    async fn payment_status(&self, session_id: &str) -> Result<PaymentStatus> {
        let id: CheckoutSessionId = session_id
            .parse()
            .map_err(|_| PaymentError::InvalidSession(session_id.to_string()))?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        Ok(match session.payment_status {
            CheckoutSessionPaymentStatus::Paid => PaymentStatus::Paid,
            CheckoutSessionPaymentStatus::NoPaymentRequired => PaymentStatus::NoPaymentRequired,
            _ => PaymentStatus::Unpaid,
        })
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}
