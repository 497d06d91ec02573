//! State store: per-property state documents in SQLite.
//!
//! - `model`: row types returned by the repository.
//! - `repo`: SQL-only functions; documents are (de)serialized here and nowhere
//!   else.
//!
//! Callers can tell the three outcomes of a load apart: `Ok(None)` means no
//! previous state, [`StateError::Corrupt`] means the stored document is
//! unreadable, [`StateError::Store`] means the database itself failed.

use thiserror::Error;

pub mod model;
pub mod repo;

pub use model::StoredState;
pub use repo::*;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("state document for '{property}' is unreadable: {source}")]
    Corrupt {
        property: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("state document for '{property}' could not be encoded: {source}")]
    Encode {
        property: String,
        #[source]
        source: serde_json::Error,
    },
}
