use thiserror::Error;

/// Transport failures are fatal by design (per the coordination protocol's error
/// handling policy): nothing in this crate retries or recovers from one, it is
/// only given a typed shape so callers can log context before `?` unwinds to `main`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to initialize the collective runtime")]
    InitFailed,

    #[error("fatal transport error: {0}")]
    Fatal(String),
}
