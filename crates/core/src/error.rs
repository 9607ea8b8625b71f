use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("mapping conflict for {key:?}: already mapped to {existing}, refusing {proposed}")]
    Conflict {
        key: String,
        existing: String,
        proposed: String,
    },
    #[error("invalid placeholder: {0:?}")]
    InvalidPlaceholder(String),
}

pub type Result<T> = std::result::Result<T, MappingError>;
