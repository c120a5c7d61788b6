//! Supabase Backend
//!
//! Implementation of the memorial stores over Supabase's PostgREST and
//! Storage HTTP APIs.
//!
//! Expected tables:
//!
//! ```sql
//! create table memorials (
//!   id uuid primary key default gen_random_uuid(),
//!   full_name text not null,
//!   date_of_death date not null,
//!   photo_path text,
//!   status text not null default 'draft'
//! );
//!
//! create table memorial_sessions (
//!   session_id text primary key,
//!   code text not null unique,
//!   memorial_id uuid references memorials(id),
//!   used boolean not null default false
//! );
//! ```

use std::time::Duration;

use async_trait::async_trait;
use memorial_core::{
    EditCode, Memorial, MemorialError, MemorialFields, MemorialId, MemorialStatus, MemorialStore,
    PhotoStore, PhotoUpload, Result, SessionRecord, SessionStore, store::public_object_url,
};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

const MEMORIALS: &str = "memorials";
const SESSIONS: &str = "memorial_sessions";

/// Supabase connection configuration
#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`
    pub url: String,

    /// Service role key (sent as `apikey` and bearer token)
    pub service_key: String,

    /// Storage bucket for memorial photos
    pub bucket: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".into(),
            service_key: String::new(),
            bucket: "memorial-photos".into(),
            timeout_secs: 30,
        }
    }
}

impl SupabaseConfig {
    /// Read `SUPABASE_URL`, `SUPABASE_SERVICE_KEY` and optional
    /// `SUPABASE_BUCKET`. Returns `None` unless both URL and key are set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let url = lookup("SUPABASE_URL").filter(|v| !v.is_empty())?;
        let service_key = lookup("SUPABASE_SERVICE_KEY").filter(|v| !v.is_empty())?;
        let bucket = lookup("SUPABASE_BUCKET")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "memorial-photos".into());

        Some(Self {
            url: url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
            ..Default::default()
        })
    }
}

/// PostgREST equality filter value
fn eq(value: &str) -> String {
    format!("eq.{value}")
}

/// Map an HTTP response status to our error taxonomy
fn check_status(status: StatusCode, body: String) -> Result<String> {
    if status.is_success() {
        Ok(body)
    } else if status == StatusCode::CONFLICT {
        Err(MemorialError::Conflict(body))
    } else {
        Err(MemorialError::Storage(format!("{status}: {body}")))
    }
}

#[derive(Serialize)]
struct NewMemorial<'a> {
    #[serde(flatten)]
    fields: &'a MemorialFields,
    status: MemorialStatus,
}

/// Supabase REST + Storage client
pub struct SupabaseClient {
    http: reqwest::Client,
    config: SupabaseConfig,
}

impl SupabaseClient {
    /// Create from configuration
    pub fn from_config(config: SupabaseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemorialError::Storage(e.to_string()))?;

        Ok(Self { http, config })
    }

    pub const fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.url)
    }

    fn object_url(&self, filename: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{filename}",
            self.config.url, self.config.bucket
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.config.service_key)
            .bearer_auth(&self.config.service_key)
    }

    /// Table request that echoes affected rows back
    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &self.rest_url(table))
            .header("Prefer", "return=representation")
    }

    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|e| MemorialError::Storage(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MemorialError::Storage(e.to_string()))?;

        check_status(status, body)
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>> {
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn first<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        Ok(self.rows(request).await?.into_iter().next())
    }
}

#[async_trait]
impl MemorialStore for SupabaseClient {
    async fn insert(&self, fields: &MemorialFields) -> Result<Memorial> {
        let request = self.table(Method::POST, MEMORIALS).json(&NewMemorial {
            fields,
            status: MemorialStatus::Draft,
        });

        self.first(request)
            .await?
            .ok_or_else(|| MemorialError::Storage("insert returned no memorial".into()))
    }

    async fn get(&self, id: &MemorialId) -> Result<Option<Memorial>> {
        let request = self
            .table(Method::GET, MEMORIALS)
            .query(&[("id", eq(id.as_str())), ("select", "*".into())]);
        self.first(request).await
    }

    async fn update_fields(&self, id: &MemorialId, fields: &MemorialFields) -> Result<Memorial> {
        let request = self
            .table(Method::PATCH, MEMORIALS)
            .query(&[("id", eq(id.as_str())), ("status", eq(MemorialStatus::Draft.as_str()))])
            .json(fields);

        if let Some(memorial) = self.first(request).await? {
            return Ok(memorial);
        }

        // Nothing matched: either approved or gone
        match self.get(id).await? {
            Some(_) => Err(MemorialError::Locked(id.to_string())),
            None => Err(MemorialError::MemorialNotFound(id.to_string())),
        }
    }

    async fn approve(&self, id: &MemorialId) -> Result<()> {
        let request = self
            .table(Method::PATCH, MEMORIALS)
            .query(&[("id", eq(id.as_str()))])
            .json(&serde_json::json!({ "status": MemorialStatus::Approved }));

        self.first::<Memorial>(request)
            .await?
            .map(|_| ())
            .ok_or_else(|| MemorialError::MemorialNotFound(id.to_string()))
    }

    async fn list_approved(&self) -> Result<Vec<Memorial>> {
        let request = self.table(Method::GET, MEMORIALS).query(&[
            ("status", eq(MemorialStatus::Approved.as_str())),
            ("select", "*".into()),
        ]);
        self.rows(request).await
    }
}

#[async_trait]
impl SessionStore for SupabaseClient {
    async fn insert(&self, record: &SessionRecord) -> Result<()> {
        let request = self
            .request(Method::POST, &self.rest_url(SESSIONS))
            .header("Prefer", "return=minimal")
            .json(record);
        self.send(request).await.map(|_| ())
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let request = self
            .table(Method::GET, SESSIONS)
            .query(&[("session_id", eq(session_id)), ("select", "*".into())]);
        self.first(request).await
    }

    async fn find_by_code(&self, code: &EditCode) -> Result<Option<SessionRecord>> {
        let request = self
            .table(Method::GET, SESSIONS)
            .query(&[("code", eq(code.as_str())), ("select", "*".into())]);
        self.first(request).await
    }

    async fn link_memorial(&self, session_id: &str, memorial_id: &MemorialId) -> Result<()> {
        let request = self
            .table(Method::PATCH, SESSIONS)
            .query(&[("session_id", eq(session_id))])
            .json(&serde_json::json!({ "memorial_id": memorial_id }));

        self.first::<SessionRecord>(request)
            .await?
            .map(|_| ())
            .ok_or_else(|| MemorialError::SessionNotFound(session_id.to_string()))
    }

    async fn lock(&self, session_id: &str) -> Result<bool> {
        let request = self
            .table(Method::PATCH, SESSIONS)
            .query(&[("session_id", eq(session_id)), ("used", "is.false".into())])
            .json(&serde_json::json!({ "used": true }));

        if self.first::<SessionRecord>(request).await?.is_some() {
            return Ok(true);
        }

        match self.find_by_session_id(session_id).await? {
            Some(_) => Ok(false),
            None => Err(MemorialError::SessionNotFound(session_id.to_string())),
        }
    }
}

#[async_trait]
impl PhotoStore for SupabaseClient {
    async fn upload(&self, photo: &PhotoUpload) -> Result<String> {
        let filename = photo.storage_filename();
        let request = self
            .request(Method::POST, &self.object_url(&filename))
            .header("Content-Type", &photo.content_type)
            .header("x-upsert", "false")
            .body(photo.bytes.clone());

        self.send(request)
            .await
            .map_err(|e| MemorialError::Upload(e.to_string()))?;

        let photo_path = format!("{}/{filename}", self.config.bucket);
        tracing::debug!(photo_path = %photo_path, bytes = photo.bytes.len(), "Uploaded photo");
        Ok(photo_path)
    }

    fn public_url(&self, photo_path: &str) -> String {
        public_object_url(&self.config.url, photo_path)
    }
}
