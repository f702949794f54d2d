use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("data directory {0:?} has no part files")]
    EmptyDataDir(std::path::PathBuf),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?}: row {row} has {actual} columns, expected {expected}")]
    RaggedRow {
        path: std::path::PathBuf,
        row: usize,
        expected: usize,
        actual: usize,
    },
}
