//! # memorial-core
//!
//! Memorial records, paid edit sessions and the workflow that links them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      MemorialWorkflow                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ SessionStore │  │ MemorialStore│  │    PhotoStore      │  │
//! │  │ (code, used) │──│ (draft/appr.)│──│ (upload, pub URL)  │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A session moves through three states:
//!
//! ```text
//!   NEW ──first save──▶ DRAFT ──save──▶ DRAFT ──finalize──▶ LOCKED
//! ```
//!
//! The store traits let the hosted backend (Supabase) be swapped for the
//! in-memory stores used in development and tests without touching the
//! workflow.

pub mod error;
pub mod listing;
pub mod model;
pub mod store;
pub mod workflow;

pub use error::{MemorialError, Result};
pub use listing::{is_anniversary, todays_memorials};
pub use model::{
    EDIT_CODE_LEN, EditCode, MAX_NAME_CHARS, MAX_PHOTO_BYTES, Memorial, MemorialFields,
    MemorialId, MemorialStatus, PhotoUpload, SessionRecord,
};
pub use store::{
    MemoryMemorialStore, MemoryPhotoStore, MemorySessionStore, MemorialStore, PhotoStore,
    SessionStore,
};
pub use workflow::{
    EditState, EditView, FinalizeOutcome, MemorialEdit, MemorialWorkflow, SessionKey,
};
