//! Error type shared by the container, converter and renderer crates.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The data violates the container layout (bad magic, truncated payload, offsets out of range).
    #[error("malformed mesh data: {0}")]
    Format(String),
    /// A GPU resource could not be created or written.
    #[error("device error: {0}")]
    Device(String),
    #[error("unsupported scene: {0}")]
    UnsupportedScene(String),
    #[error("frame slot {index} out of range ({count} slots)")]
    FrameSlot { index: usize, count: usize },
    #[error("visibility array has {actual} entries, expected {expected}")]
    Visibility { expected: usize, actual: usize },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<String> for Error {
    /// RHI calls report failures as strings.
    fn from(message: String) -> Self {
        Self::Device(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
