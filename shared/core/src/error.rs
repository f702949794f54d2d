use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid run configuration: {0}")]
    Config(String),

    #[error("process group size mismatch: expected {expected}, transport reported {actual}")]
    WorldSizeMismatch { expected: i32, actual: i32 },
}
