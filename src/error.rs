//! Error types and HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for platform operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the cluster backend.
///
/// Callers may match on `NotFound` to implement idempotent create.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster resource not found: {0}")]
    NotFound(String),

    #[error("cluster resource conflict: {0}")]
    Conflict(String),

    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    #[error("cluster error: {0}")]
    Other(String),
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound(ae.message),
            kube::Error::Api(ae) if ae.code == 409 => ClusterError::Conflict(ae.message),
            kube::Error::Api(ae) if ae.code == 503 => ClusterError::Unavailable(ae.message),
            kube::Error::Service(e) => ClusterError::Unavailable(e.to_string()),
            other => ClusterError::Other(other.to_string()),
        }
    }
}

/// Platform error taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed body, missing field, or a policy violation.
    #[error("{0}")]
    InvalidRequest(String),

    /// Missing or unparseable tenancy claims.
    #[error("authentication required")]
    Unauthenticated,

    /// Claims present but not permitted for the resource.
    #[error("access denied")]
    Forbidden,

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(Uuid),

    #[error("configuration not found: {0}")]
    ConfigNotFound(Uuid),

    /// The submission would breach an admin concurrency cap.
    #[error("quota exceeded for {scope}: {running} running of {limit} allowed")]
    QuotaExceeded {
        scope: String,
        running: i64,
        limit: i32,
    },

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// The caller's deadline elapsed or the operation was aborted.
    #[error("operation canceled")]
    Canceled,

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for Error {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        Error::Internal(anyhow::anyhow!("connection pool: {err}"))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Canceled
    }
}

/// JSON error body returned by every non-2xx response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::JobNotFound(_) | Error::ScheduleNotFound(_) | Error::ConfigNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Cluster(ClusterError::NotFound(_)) => StatusCode::NOT_FOUND,
            Error::Cluster(ClusterError::Conflict(_)) => StatusCode::CONFLICT,
            Error::Cluster(ClusterError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Cluster(ClusterError::Other(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Canceled => StatusCode::REQUEST_TIMEOUT,
            Error::Database(diesel::result::Error::NotFound) => StatusCode::NOT_FOUND,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        // Auth errors never echo tenancy identifiers back.
        let message = match &self {
            Error::Unauthenticated => "authentication required".to_string(),
            Error::Forbidden => "access denied".to_string(),
            Error::Database(_) | Error::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_exceeded_maps_to_429() {
        let err = Error::QuotaExceeded {
            scope: "lob acme".to_string(),
            running: 10,
            limit: 10,
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn cluster_unavailable_maps_to_503() {
        let err = Error::Cluster(ClusterError::Unavailable("apiserver down".into()));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn not_found_variants_map_to_404() {
        let id = Uuid::new_v4();
        for err in [Error::JobNotFound(id), Error::ScheduleNotFound(id)] {
            assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        }
    }
}
