use std::path::PathBuf;

use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Everything that can go wrong while indexing, loading or downloading.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset root not found: {path}")]
    NotFound { path: PathBuf },

    #[error("subject directory name {name:?} has no parsable identity (expected e.g. \"subject_0042\")")]
    MalformedName { name: String },

    #[error("no samples found under {path}")]
    EmptyDataset { path: PathBuf },

    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "download")]
    #[error("download failed for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[cfg(feature = "download")]
    #[error("invalid archive {path}: {source}")]
    CorruptArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}
