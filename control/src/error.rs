use thiserror::Error;

/// Informer and lister errors
#[derive(Error, Debug)]
pub enum InformerError {
    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },

    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("Index with name {0} does not exist")]
    IndexNotFound(String),

    #[error("Indexer conflict: {0}")]
    IndexerConflict(String),

    #[error("Informer has already started")]
    AlreadyStarted,

    #[error("Timed out waiting for caches to sync")]
    CacheSyncTimeout,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = InformerError> = std::result::Result<T, E>;
