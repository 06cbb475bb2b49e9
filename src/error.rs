//! Core error type (§7). Distinguishes caller misuse (a distinguished
//! failure the caller can branch on) from I/O/parse failures, which the
//! index instead folds into its sticky error flag.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml error: {0}")]
    Xml(String),

    #[error("invalid storage kind: {0}")]
    InvalidKind(String),

    #[error("invalid id: {0}")]
    InvalidId(i64),

    #[error("invalid attribute: {0}")]
    InvalidAttr(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
