use axum::{http::StatusCode, response::{IntoResponse, Response}};

use crate::{broker::BrokerError, store::StoreError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no authenticated identity attached to the request")]
    Unauthenticated,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("relationship `{field}` could not be resolved")]
    RelationshipNotFound { field: &'static str },

    #[error("invalid `{field}`: {reason}")]
    ValidationFailed { field: &'static str, reason: String },

    #[error("failed to encode delivery envelope")]
    Encoding(#[source] serde_json::Error),

    #[error("failed to decode delivery envelope")]
    Decoding(#[source] serde_json::Error),

    #[error("message stored but live notification failed")]
    PublishDegraded(#[source] anyhow::Error),

    #[error("failed to subscribe to room topic")]
    SubscriptionFailed(#[source] BrokerError),

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),
}

impl AppError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ValidationFailed { field, reason: reason.into() }
    }

    pub fn status(&self) -> StatusCode {
        use AppError::*;
        match self {
            Unauthenticated => StatusCode::UNAUTHORIZED,
            NotFound(_) | RelationshipNotFound { .. } => StatusCode::NOT_FOUND,
            ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PublishDegraded(_) | SubscriptionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Encoding(_) | Decoding(_) | Storage(_) | Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Translates storage outcomes into domain errors, naming the entity that was looked up.
pub(crate) trait StoreResultExt<T> {
    fn found(self, entity: &'static str) -> AppResult<T>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn found(self, entity: &'static str) -> AppResult<T> {
        self.map_err(|err| match err {
            StoreError::NotFound => AppError::NotFound(entity),
            StoreError::MissingReference(missing) => AppError::NotFound(missing),
            other => AppError::Storage(other.into()),
        })
    }
}
