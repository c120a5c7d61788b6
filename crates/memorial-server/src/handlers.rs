//! HTTP Handlers

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use memorial_core::{
    EditCode, EditState, EditView, FinalizeOutcome, Memorial, MemorialEdit, MemorialError,
    MemorialId, PhotoUpload, SessionKey, todays_memorials as anniversary_listing,
};
use memorial_payments::{CheckoutRequest, Verification};

use crate::state::{AppState, Payments};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub stripe_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// A memorial as shown on the site
#[derive(Debug, Serialize)]
pub struct MemorialCard {
    pub id: MemorialId,
    pub full_name: String,
    pub date_of_death: NaiveDate,
    pub photo_url: Option<String>,
    pub approved: bool,
}

impl MemorialCard {
    fn new(state: &AppState, memorial: Memorial) -> Self {
        Self {
            photo_url: memorial
                .photo_path
                .as_deref()
                .map(|path| state.workflow.photo_url(path)),
            approved: memorial.is_approved(),
            id: memorial.id,
            full_name: memorial.full_name,
            date_of_death: memorial.date_of_death,
        }
    }
}

/// Resolved edit session
#[derive(Debug, Serialize)]
pub struct EditResponse {
    pub state: EditState,
    pub code: EditCode,
    pub memorial: Option<MemorialCard>,
}

impl EditResponse {
    fn new(state: &AppState, view: EditView) -> Self {
        Self {
            state: view.state,
            code: view.code,
            memorial: view.memorial.map(|m| MemorialCard::new(state, m)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TodayQuery {
    /// `YYYY-MM-DD`; defaults to today (UTC)
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FinalizeRequest {
    /// Explicit user confirmation
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct FinalizeResponse {
    #[serde(flatten)]
    pub outcome: FinalizeOutcome,
    pub message: &'static str,
}

// ============================================================================
// Error mapping
// ============================================================================

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn workflow_error(err: &MemorialError) -> ApiError {
    let (status, code) = match err {
        MemorialError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
        MemorialError::MemorialNotFound(_) => (StatusCode::NOT_FOUND, "MEMORIAL_NOT_FOUND"),
        MemorialError::Locked(_) => (StatusCode::CONFLICT, "LOCKED"),
        MemorialError::ConfirmationRequired => (StatusCode::BAD_REQUEST, "CONFIRMATION_REQUIRED"),
        MemorialError::NothingToFinalize(_) => (StatusCode::CONFLICT, "NOTHING_TO_FINALIZE"),
        MemorialError::PartiallyFinalized { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "PARTIALLY_FINALIZED")
        }
        MemorialError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
        MemorialError::Upload(_) => (StatusCode::BAD_GATEWAY, "UPLOAD_FAILED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    };

    if status.is_server_error() {
        tracing::error!(error = %err, retryable = err.is_retryable(), "Request failed");
    }

    api_error(status, err.user_message(), code)
}

fn payments(state: &AppState) -> Result<&Payments, ApiError> {
    state.payments.as_deref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })
}

/// Edit codes that are malformed or unknown send the visitor home
fn redirect_home() -> Response {
    Redirect::to("/").into_response()
}

/// Map a workflow result, redirecting home on unknown edit codes
fn respond<T: Serialize>(
    key: &SessionKey,
    result: memorial_core::Result<T>,
) -> Result<Response, ApiError> {
    match result {
        Ok(body) => Ok(Json(body).into_response()),
        Err(MemorialError::SessionNotFound(_)) if matches!(key, SessionKey::Code(_)) => {
            tracing::info!(key = %key, "Unknown edit code");
            Ok(redirect_home())
        }
        Err(e) => Err(workflow_error(&e)),
    }
}

async fn read_edit(mut multipart: Multipart) -> Result<MemorialEdit, ApiError> {
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        api_error(StatusCode::BAD_REQUEST, e.body_text(), "INVALID_FORM")
    };

    let mut edit = MemorialEdit::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "full_name" => edit.full_name = field.text().await.map_err(bad_form)?,
            "date_of_death" => edit.date_of_death = field.text().await.map_err(bad_form)?,
            "photo" => {
                let file_name = field.file_name().unwrap_or("photo").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_form)?;

                // Browsers send an empty part when no file is chosen
                if !bytes.is_empty() {
                    edit.photo = Some(PhotoUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(edit)
}

fn code_key(raw: &str) -> Option<SessionKey> {
    EditCode::parse(raw).map(SessionKey::Code)
}

// ============================================================================
// Shared session/code handlers
// ============================================================================

async fn view(state: &AppState, key: &SessionKey) -> Result<Response, ApiError> {
    let result = state
        .workflow
        .resolve(key)
        .await
        .map(|view| EditResponse::new(state, view));
    respond(key, result)
}

async fn save(
    state: &AppState,
    key: &SessionKey,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let edit = read_edit(multipart).await?;
    let result = state
        .workflow
        .save(key, edit)
        .await
        .map(|memorial| MemorialCard::new(state, memorial));
    respond(key, result)
}

async fn finalize(
    state: &AppState,
    key: &SessionKey,
    request: FinalizeRequest,
) -> Result<Response, ApiError> {
    let result = state
        .workflow
        .finalize(key, request.confirm)
        .await
        .map(|outcome| {
            let message = match outcome {
                FinalizeOutcome::Finalized { .. } => {
                    "Memorial submitted! It will appear on the website on its anniversary."
                }
                FinalizeOutcome::AlreadyLocked => {
                    "This memorial has already been submitted and is locked."
                }
            };
            FinalizeResponse { outcome, message }
        });
    respond(key, result)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend,
        stripe_configured: state.payments.is_some(),
    })
}

/// Approved memorials whose anniversary is today (or `?date=`)
pub async fn todays_memorials(
    State(state): State<AppState>,
    Query(query): Query<TodayQuery>,
) -> Result<Json<Vec<MemorialCard>>, ApiError> {
    let today = match query.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            api_error(StatusCode::BAD_REQUEST, "date must be YYYY-MM-DD", "INVALID_DATE")
        })?,
        None => Utc::now().date_naive(),
    };

    let memorials = anniversary_listing(state.memorials.as_ref(), today)
        .await
        .map_err(|e| workflow_error(&e))?;

    Ok(Json(
        memorials
            .into_iter()
            .map(|m| MemorialCard::new(&state, m))
            .collect(),
    ))
}

/// Single memorial, for the post-save preview
pub async fn get_memorial(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MemorialCard>, ApiError> {
    let id = MemorialId::from_string(id);
    match state.memorials.get(&id).await {
        Ok(Some(memorial)) => Ok(Json(MemorialCard::new(&state, memorial))),
        Ok(None) => Err(workflow_error(&MemorialError::MemorialNotFound(id.to_string()))),
        Err(e) => Err(workflow_error(&e)),
    }
}

/// Start a hosted checkout for the memorial fee
pub async fn create_checkout(
    State(state): State<AppState>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let payments = payments(&state)?;
    let request = CheckoutRequest::for_site(&state.config.site_url);

    let session = payments.processor.create_checkout(&request).await.map_err(|e| {
        tracing::error!(error = %e, retryable = e.is_retryable(), "Checkout error");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            e.user_message(),
            "CHECKOUT_ERROR",
        )
    })?;

    Ok(Json(CheckoutResponse {
        url: session.checkout_url,
        session_id: session.id,
    }))
}

/// Verify a returning checkout session and hand out its edit code
pub async fn verify_checkout(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<Verification>, ApiError> {
    let payments = payments(&state)?;
    let session_id = query.session_id.unwrap_or_default();
    Ok(Json(payments.verifier.verify(&session_id).await))
}

pub async fn session_view(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    view(&state, &SessionKey::SessionId(session_id)).await
}

pub async fn session_save(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    save(&state, &SessionKey::SessionId(session_id), multipart).await
}

pub async fn session_finalize(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Response, ApiError> {
    finalize(&state, &SessionKey::SessionId(session_id), request).await
}

pub async fn code_view(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let Some(key) = code_key(&code) else {
        return Ok(redirect_home());
    };
    view(&state, &key).await
}

pub async fn code_save(
    State(state): State<AppState>,
    Path(code): Path<String>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let Some(key) = code_key(&code) else {
        return Ok(redirect_home());
    };
    save(&state, &key, multipart).await
}

pub async fn code_finalize(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<FinalizeRequest>,
) -> Result<Response, ApiError> {
    let Some(key) = code_key(&code) else {
        return Ok(redirect_home());
    };
    finalize(&state, &key, request).await
}

/// Photo bytes from the in-memory bucket, at the path its public URLs use
pub async fn local_photo(
    State(state): State<AppState>,
    Path(photo_path): Path<String>,
) -> Result<Response, ApiError> {
    let not_found = || api_error(StatusCode::NOT_FOUND, "Photo not found", "PHOTO_NOT_FOUND");

    let photos = state.local_photos.as_ref().ok_or_else(not_found)?;
    let photo = photos.object(&photo_path).await.ok_or_else(not_found)?;

    Ok(([(header::CONTENT_TYPE, photo.content_type)], photo.bytes).into_response())
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let payments = payments(&state)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                "Missing Stripe signature",
                "MISSING_SIGNATURE",
            )
        })?;

    let event = payments
        .webhooks
        .construct_event(&body, signature)
        .map_err(|e| {
            tracing::warn!("Webhook signature failed: {}", e);
            api_error(StatusCode::BAD_REQUEST, "Invalid signature", "INVALID_SIGNATURE")
        })?;

    payments.webhooks.handle(event).await.map_err(|e| {
        tracing::error!("Webhook processing error: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook processing failed",
            "WEBHOOK_ERROR",
        )
    })?;

    Ok(Json(serde_json::json!({ "received": true })))
}
