//! # memorial-runtime
//!
//! Hosted backend integrations for memorial-lane.
//!
//! ## Backends
//!
//! - **Supabase** (default): PostgREST tables for memorials and sessions,
//!   Storage bucket for photos
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memorial_runtime::{SupabaseClient, SupabaseConfig};
//!
//! let client = Arc::new(SupabaseClient::from_config(SupabaseConfig::from_env().unwrap())?);
//! let workflow = MemorialWorkflow::new(client.clone(), client.clone(), client);
//! ```

#[cfg(feature = "supabase")]
pub mod supabase;

#[cfg(feature = "supabase")]
pub use supabase::{SupabaseClient, SupabaseConfig};

// Re-export core types for convenience
pub use memorial_core::{
    MemorialError, MemorialStore, MemorialWorkflow, PhotoStore, Result, SessionStore,
};
