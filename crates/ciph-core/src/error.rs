use thiserror::Error;

pub type CiphResult<T> = Result<T, CiphError>;

#[derive(Debug, Error)]
pub enum CiphError {
    // Encoding: programmer errors, never recovered
    #[error("encoding error: {0}")]
    Encoding(String),

    // Validation
    #[error("data length {0} exceeds the largest block size")]
    Oversize(u64),

    #[error("invalid block size: {0}")]
    InvalidBlockSize(String),

    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("duplicate file name in container: {0}")]
    DuplicateFile(String),

    #[error("insufficient data: wanted {wanted} bytes, {available} queued")]
    InsufficientData { wanted: u64, available: u64 },

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("file not found in container: {0}")]
    FileNotFound(String),

    // Cryptographic / integrity
    #[error("head digest verification failed")]
    HeadDigest,

    #[error("file digest verification failed: {0}")]
    FileDigest(String),

    #[error("block validation failed: {0}")]
    BlockValidation(String),

    #[error("length mismatch: {left} != {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("key or password required")]
    MissingKey,

    // Protocol
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),

    #[error("content type mismatch: link says {expected}, block says {actual}")]
    ContentTypeMismatch { expected: u8, actual: u8 },

    #[error("unsupported: {0}")]
    Unsupported(String),

    // Transport (from BlockStore)
    #[error("block not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    // State
    #[error("container is sealed")]
    Sealed,

    #[error("container is unusable: {0}")]
    Failed(String),

    #[error("container has not been published")]
    NotPublished,

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CiphError {
    /// True for the integrity failures a password-retry loop should treat
    /// as "try another password".
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            CiphError::HeadDigest
                | CiphError::FileDigest(_)
                | CiphError::BlockValidation(_)
                | CiphError::LengthMismatch { .. }
        )
    }
}
