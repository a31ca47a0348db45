use thiserror::Error;

/// Errors raised across the persistence boundary.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    /// A unique key is already taken (e.g. two inserts for the same address).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// A string that does not name any variant of a closed enum.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}
