use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassSourceError>;

#[derive(Debug, Error)]
pub enum ClassSourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {resource} from {source_name}: {source}")]
    Read {
        source_name: String,
        resource: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("class source {source_name} is in an inconsistent state: {detail}")]
    State { source_name: String, detail: String },

    #[error("failed to adapt entry {entry} of {source_name}: {detail}")]
    Adapt {
        source_name: String,
        entry: String,
        detail: String,
    },

    #[error("failed to process class {class_name} from {source_name}")]
    Process {
        source_name: String,
        class_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("class source {0} is already registered")]
    DuplicateSource(String),
}

impl ClassSourceError {
    pub fn state(source_name: &str, detail: impl Into<String>) -> Self {
        Self::State {
            source_name: source_name.to_string(),
            detail: detail.into(),
        }
    }

    pub fn read(source_name: &str, resource: &str, source: std::io::Error) -> Self {
        Self::Read {
            source_name: source_name.to_string(),
            resource: resource.to_string(),
            source,
        }
    }
}
