//! memorial-lane HTTP Server
//!
//! Axum-based server for paid memorial submissions: Stripe checkout, edit
//! codes, draft editing, finalization and the daily anniversary listing.

mod app;
mod config;
mod handlers;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memorial_core::{
    MemoryMemorialStore, MemoryPhotoStore, MemorySessionStore, MemorialStore, MemorialWorkflow,
    PhotoStore, SessionStore,
};
use memorial_payments::StripeClient;
use memorial_runtime::{SupabaseClient, SupabaseConfig};

use crate::config::AppConfig;
use crate::state::{AppState, Payments};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Storage backend
    let (memorials, sessions, photos, local_photos, backend): (
        Arc<dyn MemorialStore>,
        Arc<dyn SessionStore>,
        Arc<dyn PhotoStore>,
        Option<Arc<MemoryPhotoStore>>,
        &'static str,
    ) = if let Some(supabase) = SupabaseConfig::from_env() {
        let client = Arc::new(SupabaseClient::from_config(supabase)?);
        tracing::info!("✓ Supabase configured ({})", client.config().url);
        (client.clone(), client.clone(), client, None, "supabase")
    } else {
        tracing::warn!("⚠ Supabase not configured - using in-memory storage");
        tracing::warn!("  Set SUPABASE_URL and SUPABASE_SERVICE_KEY in .env");
        let photos = Arc::new(MemoryPhotoStore::new("memorial-photos", &config.site_url));
        (
            Arc::new(MemoryMemorialStore::new()),
            Arc::new(MemorySessionStore::new()),
            photos.clone(),
            Some(photos),
            "memory",
        )
    };

    // Initialize payments
    let payments = match StripeClient::from_env() {
        Ok(client) => {
            tracing::info!("✓ Stripe configured");
            let secret = client.webhook_secret().to_string();
            Some(Arc::new(Payments::new(
                Arc::new(client),
                sessions.clone(),
                secret,
            )))
        }
        Err(e) => {
            tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
            tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
            None
        }
    };

    // Build application state
    let state = AppState {
        config: Arc::new(config),
        workflow: Arc::new(MemorialWorkflow::new(memorials.clone(), sessions, photos)),
        memorials,
        backend,
        payments,
        local_photos,
    };

    let addr = state.config.bind_addr.clone();
    let app = app::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🕯  memorial-lane server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                                - Health check");
    tracing::info!("  GET  /api/memorials/today                   - Today's anniversaries");
    tracing::info!("  GET  /api/memorials/{{id}}                    - Memorial preview");
    tracing::info!("  POST /api/checkout                          - Create Stripe checkout");
    tracing::info!("  GET  /api/checkout/verify                   - Verify payment, get code");
    tracing::info!("  GET  /api/sessions/{{session_id}}             - Load memorial by session");
    tracing::info!("  POST /api/sessions/{{session_id}}/memorial    - Save draft");
    tracing::info!("  POST /api/sessions/{{session_id}}/finalize    - Submit and lock");
    tracing::info!("  GET  /api/edit/{{code}}                       - Load memorial by edit code");
    tracing::info!("  POST /api/edit/{{code}}/memorial              - Save draft");
    tracing::info!("  POST /api/edit/{{code}}/finalize              - Submit and lock");
    tracing::info!("  POST /webhook/stripe                        - Stripe webhook");
    if backend == "memory" {
        tracing::info!("  GET  /storage/v1/object/public/{{*path}}     - Local photos");
    }
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
