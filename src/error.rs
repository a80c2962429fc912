use std::io;
use thiserror::Error;

/// The failure taxonomy for every operation the tree, the codec, and the
/// block store can raise. Exit codes follow the CLI driver's exit-code
/// style: 0 ok, 1 generic, 2 not-found, 3 invariant violation, 4 store I/O,
/// 5 corruption / signature mismatch.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serde(#[from] bincode::Error),

    #[error("no block at address {0}")]
    NotFound(String),

    #[error("key already present: {0}")]
    DuplicateKey(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    #[error("store I/O failure: {0}")]
    StoreIO(String),

    #[error("load failed: {0}")]
    LoadFailed(String),

    #[error("write-back failed: {0}")]
    StoreFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Maps a failure onto the CLI driver's exit-code taxonomy.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound(_) => 2,
            Error::InvariantViolation(_) => 3,
            Error::DuplicateKey(_) => 3,
            Error::Io(_) | Error::StoreIO(_) | Error::LoadFailed(_) | Error::StoreFailed(_) => 4,
            Error::CorruptBlock(_) | Error::SchemaMismatch(_) => 5,
            Error::Serde(_) => 5,
            Error::Cancelled => 1,
        }
    }
}
