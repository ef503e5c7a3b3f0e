use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Wire shape for every non-2xx response. Business-rule failures carry a
/// `details` list (one entry per failed line item or field); infrastructure
/// failures carry only a generic `error` string.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error description
    #[schema(example = "Some items in your order are unavailable")]
    pub error: String,
    /// Per-item or per-field failure messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{message}")]
    ValidationFailed {
        message: String,
        details: Vec<String>,
    },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut details = Vec::new();
        flatten_validation_errors(&err, None, &mut details);
        ServiceError::ValidationFailed {
            message: "Validation failed".to_string(),
            details,
        }
    }
}

/// Walks nested validation errors (structs and lists included) into flat
/// `path: message` strings, so `items[0].quantity` failures reach the client.
fn flatten_validation_errors(
    errors: &validator::ValidationErrors,
    prefix: Option<&str>,
    out: &mut Vec<String>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, field),
            None => (*field).to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    match &error.message {
                        Some(message) => out.push(format!("{}: {}", path, message)),
                        None => out.push(format!("{}: {}", path, error.code)),
                    }
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                flatten_validation_errors(nested, Some(&path), out);
            }
            ValidationErrorsKind::List(entries) => {
                for (index, nested) in entries {
                    let entry_path = format!("{}[{}]", path, index);
                    flatten_validation_errors(nested, Some(&entry_path), out);
                }
            }
        }
    }
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::ValidationError(message.into())
    }

    pub fn validation_failed(message: impl Into<String>, details: Vec<String>) -> Self {
        ServiceError::ValidationFailed {
            message: message.into(),
            details,
        }
    }

    /// Maps each variant to its HTTP status. Handlers never pick status
    /// codes themselves.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::ValidationFailed { .. } | Self::InvalidStatus(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Client-facing message. Database and internal failures collapse to
    /// a fixed string; everything else is already written for the client.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    fn response_details(&self) -> Option<Vec<String>> {
        match self {
            Self::ValidationFailed { details, .. } if !details.is_empty() => {
                Some(details.clone())
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: self.response_message(),
            details: self.response_details(),
        };

        (status, Json(err)).into_response()
    }
}
