use rthistory_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Endpoint error: {0}")]
    Endpoint(String),

    #[error("Invalid record content: {0}")]
    Content(String),

    #[error("could not discover treatment records for patient {patient}: {source}")]
    Seeding {
        patient: String,
        #[source]
        source: Box<RetrievalError>,
    },
}

impl RetrievalError {
    /// Whether re-running the same task could plausibly succeed.
    ///
    /// Transport, endpoint and filesystem errors are transient. Anything
    /// derived from the bytes of a record is not: fetching them again yields
    /// the same content.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::Io(_)
            | RetrievalError::Archive(_)
            | RetrievalError::Endpoint(_) => true,
            RetrievalError::Seeding { source, .. } => source.is_transient(),
            RetrievalError::Serialization(_)
            | RetrievalError::Model(_)
            | RetrievalError::Content(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
