use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::validation::ValidationReport;

/// The main error type for labelforge operations.
#[derive(Debug, Error)]
pub enum LabelforgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path} is not a readable directory")]
    RootNotDirectory { path: PathBuf },

    #[error("Failed while traversing {path}: {message}")]
    Walk { path: PathBuf, message: String },

    #[error("Failed to parse annotations JSON from {path}: {source}")]
    AnnotationsJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write annotations JSON to {path}: {source}")]
    AnnotationsJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write COCO JSON to {path}: {source}")]
    CocoJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse class names from {path}: {message}")]
    ClassNamesParse { path: PathBuf, message: String },

    #[error("Invalid split ratios: {message}")]
    InvalidSplitRatios { message: String },

    #[error("Failed to write {path}: {message}")]
    ExportWrite { path: PathBuf, message: String },

    #[error("Invalid annotation '{image_name}': {message}")]
    InvalidAnnotation { image_name: String, message: String },

    #[error("No annotation named '{image_name}' in {path}")]
    ImageNotFound { path: PathBuf, image_name: String },

    #[error("Validation found {defect_count} defect(s)")]
    ValidationFailed {
        defect_count: usize,
        report: Box<ValidationReport>,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl LabelforgeError {
    /// Wraps a failed filesystem write with the path being written.
    pub(crate) fn write_failed(path: &Path, source: std::io::Error) -> Self {
        LabelforgeError::ExportWrite {
            path: path.to_path_buf(),
            message: source.to_string(),
        }
    }
}
