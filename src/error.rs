use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Another transaction modified the record first; the caller must abort.
    #[error("cannot serialize access due to a concurrent update")]
    Serialization,
    /// The current version of the record was deleted by this transaction.
    #[error("record was deleted by the current transaction")]
    RecordDeleted,
    #[error("index already exists or is being built by another transaction")]
    IndexExists,
    #[error("transaction error: {0}")]
    Transaction(String),
    #[error("durability error: {0}")]
    Durability(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("property values of these types are not comparable")]
    IncomparableValues,
    #[error("not yet implemented: {0}")]
    NotYetImplemented(&'static str),
}
