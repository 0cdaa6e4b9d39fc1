//! Failure modes of the Hashfleet store.

use thiserror::Error;

/// Result type shared by every repository.
pub type Result<T> = std::result::Result<T, DbError>;

/// What a repository call can actually fail with.
///
/// `MissingRow` usually means another sweep deleted the row out from under
/// the caller (a cancelled job, a drained hashlist); the reconciler logs
/// and skips it. `DuplicateName` surfaces to the admin API as a failed
/// precondition.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("no {entity} with id {id}")]
    MissingRow { entity: &'static str, id: String },

    #[error("a preset job named '{0}' already exists")]
    DuplicateName(String),

    /// Wordlist and rule id lists are stored as JSON array columns.
    #[error("bad id-list column: {0}")]
    IdList(#[from] serde_json::Error),
}

impl DbError {
    pub fn missing(entity: &'static str, id: impl Into<String>) -> Self {
        Self::MissingRow {
            entity,
            id: id.into(),
        }
    }
}
