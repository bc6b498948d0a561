use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Counter not found: {0}")]
    CounterNotFound(i32),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("gRPC error: {0}")]
    Grpc(String),

    #[error("Plugin rejected request: {0}")]
    Plugin(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        ServiceError::Database(err.to_string())
    }
}

impl From<lapin::Error> for ServiceError {
    fn from(err: lapin::Error) -> Self {
        ServiceError::Broker(err.to_string())
    }
}

impl From<tonic::Status> for ServiceError {
    fn from(err: tonic::Status) -> Self {
        ServiceError::Grpc(format!("{:?}: {}", err.code(), err.message()))
    }
}

impl From<tonic::transport::Error> for ServiceError {
    fn from(err: tonic::transport::Error) -> Self {
        ServiceError::Grpc(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("Serialization failed: {}", err))
    }
}

impl ServiceError {
    /// Transport-level failures that a retry on a later tick may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Database(_) | ServiceError::Broker(_) | ServiceError::Grpc(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
