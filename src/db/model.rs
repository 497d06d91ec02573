//! Row types returned by the state repository.

use chrono::NaiveDateTime;

/// Raw stored document, used for inspection without decoding it.
#[derive(Debug, Clone)]
pub struct StoredState {
    pub property: String,
    pub document: String,
    pub updated_at: NaiveDateTime,
}
