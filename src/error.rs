use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;

use crate::{
    jobs::JobError,
    lifecycle::LifecycleError,
    materializer::MaterializeError,
    sessions::SessionError,
    store::StoreError,
};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        if status.is_server_error() {
            tracing::error!(%status, error = %self.message, "request failed");
        }
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(_) => AppError::conflict(value.to_string()),
            StoreError::NotFound(_) => AppError::not_found(value.to_string()),
            _ => AppError::internal(value),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::Store(err) => err.into(),
            LifecycleError::ScheduleNotFound(_)
            | LifecycleError::AllocationNotFound(_)
            | LifecycleError::ApplicationNotFound(_)
            | LifecycleError::PrisonerNotFound(_) => AppError::not_found(value.to_string()),
            LifecycleError::AtCapacity(_)
            | LifecycleError::Application(_)
            | LifecycleError::DuplicateApplication { .. } => AppError::conflict(value.to_string()),
            LifecycleError::Transition(_) | LifecycleError::Invalid(_) => {
                AppError::bad_request(value.to_string())
            }
            LifecycleError::Lookup(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, value.to_string())
            }
        }
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        match value {
            SessionError::Store(err) => err.into(),
            SessionError::InstanceNotFound(_) | SessionError::AttendanceNotFound { .. } => {
                AppError::not_found(value.to_string())
            }
            SessionError::Instance(_) | SessionError::Recorded(_) => {
                AppError::conflict(value.to_string())
            }
            SessionError::Invalid(_) => AppError::bad_request(value.to_string()),
        }
    }
}

impl From<MaterializeError> for AppError {
    fn from(value: MaterializeError) -> Self {
        match value {
            MaterializeError::Store(err) => err.into(),
            other => AppError::internal(other),
        }
    }
}

impl From<JobError> for AppError {
    fn from(value: JobError) -> Self {
        match value {
            JobError::Store(err) => err.into(),
            other => AppError::internal(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn uniqueness_violations_are_conflicts() {
        let error: AppError = StoreError::Conflict("duplicate instance".into()).into();
        assert_eq!(error.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn lifecycle_errors_map_to_client_statuses() {
        let missing: AppError = LifecycleError::AllocationNotFound(Uuid::new_v4()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let full: AppError = LifecycleError::AtCapacity(Uuid::new_v4()).into();
        assert_eq!(full.status(), StatusCode::CONFLICT);

        let invalid: AppError = LifecycleError::Invalid("start before schedule".into()).into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    }
}
