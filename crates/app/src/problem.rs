use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use hr_insights_core::AccessError;

use crate::services::ServiceError;

#[derive(Debug, Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    problem_type: &'static str,
    title: &'static str,
    detail: String,
}

pub struct ProblemResponse {
    status: StatusCode,
    body: ProblemDetails,
}

impl ProblemResponse {
    pub fn new<S: Into<String>>(status: StatusCode, problem_type: &'static str, detail: S) -> Self {
        Self {
            status,
            body: ProblemDetails {
                problem_type,
                title: status.canonical_reason().unwrap_or("error"),
                detail: detail.into(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ProblemResponse {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::Validation(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_parameter", err.to_string())
            }
            ServiceError::Access(AccessError::InactiveEmployee(_)) => {
                Self::new(StatusCode::FORBIDDEN, "inactive_employee", err.to_string())
            }
            ServiceError::Access(AccessError::UnknownUser(_)) => {
                Self::new(StatusCode::NOT_FOUND, "user_not_found", err.to_string())
            }
            ServiceError::Access(AccessError::EmployeeNotFound(_)) => {
                Self::new(StatusCode::NOT_FOUND, "employee_not_found", err.to_string())
            }
            ServiceError::Storage(_) => {
                error!(stage = "app", error = %err, "storage failure while serving request");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "failed to load records",
                )
            }
        }
    }
}

impl IntoResponse for ProblemResponse {
    fn into_response(self) -> Response {
        let mut response = Json(self.body).into_response();
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
