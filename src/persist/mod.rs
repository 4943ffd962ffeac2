pub mod sqlite;

use crate::{core::store::StoreError, op::StoredOp, types::OpSeq};

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Message(String),
}

pub type PersistResult<T> = Result<T, PersistError>;

/// Durable destination for ops produced by the store.
///
/// A call to [`OpSink::append_ops`] must commit all of `ops` or none of them.
pub trait OpSink: Send {
    /// Commits `ops` and returns the highest sequence now durable.
    fn append_ops(&mut self, ops: &[StoredOp]) -> PersistResult<OpSeq>;
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}
