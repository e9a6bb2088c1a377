//! Persisted store record.
//!
//! The whole store state is written as one JSON record under
//! [`STORAGE_KEY`]:
//!
//! ```text
//! {"version": 1, "state": {"notes": [...], "activeNoteId": "..." | null}}
//! ```
//!
//! There is a single schema version so far. A record with any other version
//! is not migrated; loading it yields an empty state, and the record is
//! overwritten by the next commit.

use crate::document::Document;
use crate::note::StoreState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed key of the persisted record.
pub const STORAGE_KEY: &str = "collaborative-notes-storage";

/// Current schema version of the persisted record.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Malformed persisted state: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported schema version {found} (expected {expected})")]
    SchemaMismatch { found: u32, expected: u32 },
}

/// Borrowing form used when writing, so commits don't clone the state.
#[derive(Serialize)]
struct PersistedRef<'a, D: Serialize> {
    version: u32,
    state: &'a StoreState<D>,
}

/// Owned form used when reading. The state is kept as raw JSON until the
/// version has been checked, so an old layout fails as a mismatch rather
/// than as a parse error.
#[derive(Deserialize)]
struct PersistedRecord {
    version: u32,
    state: serde_json::Value,
}

/// Serialize state into the persisted record layout.
pub fn encode<D: Document>(state: &StoreState<D>) -> Result<Vec<u8>, PersistError> {
    let record = PersistedRef {
        version: SCHEMA_VERSION,
        state,
    };
    Ok(serde_json::to_vec(&record)?)
}

/// Parse a persisted record, checking its schema version.
pub fn decode<D: Document>(data: &[u8]) -> Result<StoreState<D>, PersistError> {
    let record: PersistedRecord = serde_json::from_slice(data)?;
    if record.version != SCHEMA_VERSION {
        return Err(PersistError::SchemaMismatch {
            found: record.version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(serde_json::from_value(record.state)?)
}
