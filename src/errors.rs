use crate::api::ApiResponse;
use crate::sm2_scheduler::SchedulingError;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),

    #[error("Resource already exists: {0}")]
    DuplicateResource(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflicting update: {0}")]
    Conflict(String),
}

impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateResource(_) | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(self, context: ErrorContext) -> ErrorResponse {
        let status = self.status_code();
        let message = match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                format!("{} not found", context.resource_type)
            }
            ApiError::ValidationError(_)
            | ApiError::BadRequest(_)
            | ApiError::DuplicateResource(_)
            | ApiError::Conflict(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Rejected request"
                );
                self.to_string()
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                "Database operation failed. Please try again.".to_string()
            }
        };

        (status, Json(ApiResponse::error(message)))
    }
}

/// Helper macro for structured error responses
#[macro_export]
macro_rules! api_error {
    (not_found, $operation:expr, $resource_type:expr, $id:expr) => {
        $crate::errors::ApiError::NotFound(format!("{} with id '{}' not found", $resource_type, $id))
            .to_response_with_context(
                $crate::errors::ErrorContext::new($operation, $resource_type).with_id(&$id.to_string()),
            )
    };

    (validation, $operation:expr, $resource_type:expr, $message:expr) => {
        $crate::errors::ApiError::ValidationError($message.to_string())
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };

    (database, $operation:expr, $resource_type:expr, $error:expr) => {
        $crate::errors::ApiError::DatabaseError($error)
            .to_response_with_context($crate::errors::ErrorContext::new($operation, $resource_type))
    };
}

/// Map a service-layer error onto the matching `ApiError`.
///
/// Scheduling errors are recognised by type; storage errors by message.
pub fn classify_service_error(error: anyhow::Error) -> ApiError {
    if let Some(scheduling_error) = error.downcast_ref::<SchedulingError>() {
        return ApiError::from(scheduling_error.clone());
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("concurrent") {
        ApiError::Conflict(error.to_string())
    } else if error_str.contains("already exists") || error_str.contains("unique constraint") {
        ApiError::DuplicateResource("Item for this content already exists".to_string())
    } else if error_str.contains("not found") || error_str.contains("no rows") {
        ApiError::NotFound("Resource not found".to_string())
    } else if error_str.contains("required")
        || error_str.contains("cannot be empty")
        || error_str.contains("must be")
    {
        ApiError::ValidationError(error.to_string())
    } else {
        ApiError::DatabaseError(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("record_review", "review_item").with_id("123");

        assert_eq!(context.operation, "record_review");
        assert_eq!(context.resource_type, "review_item");
        assert_eq!(context.resource_id, Some("123".to_string()));
    }

    #[test]
    fn test_error_classification() {
        let scheduling = anyhow::Error::from(SchedulingError::InvalidQuality(9));
        assert!(matches!(
            classify_service_error(scheduling),
            ApiError::ValidationError(msg) if msg.contains('9')
        ));

        let duplicate = anyhow::anyhow!("UNIQUE constraint failed: review_items.user_id");
        assert!(matches!(
            classify_service_error(duplicate),
            ApiError::DuplicateResource(_)
        ));

        let not_found = anyhow::anyhow!("No rows returned");
        assert!(matches!(classify_service_error(not_found), ApiError::NotFound(_)));

        let validation = anyhow::anyhow!("content_id cannot be empty");
        assert!(matches!(
            classify_service_error(validation),
            ApiError::ValidationError(_)
        ));

        let conflict = anyhow::anyhow!("Item 42 was modified by a concurrent review");
        assert!(matches!(classify_service_error(conflict), ApiError::Conflict(_)));

        let other = anyhow::anyhow!("disk I/O error");
        assert!(matches!(classify_service_error(other), ApiError::DatabaseError(_)));
    }

    #[test]
    fn test_api_error_responses() {
        let error = ApiError::NotFound("Item not found".to_string());
        let context = ErrorContext::new("get_item", "review_item").with_id("123");
        let (status, _response) = error.to_response_with_context(context);
        assert_eq!(status, StatusCode::NOT_FOUND);

        let cases = [
            (ApiError::from(SchedulingError::InvalidQuality(-1)), StatusCode::BAD_REQUEST),
            (ApiError::DuplicateResource("Already exists".to_string()), StatusCode::CONFLICT),
            (ApiError::Conflict("stale".to_string()), StatusCode::CONFLICT),
            (ApiError::BadRequest("limit".to_string()), StatusCode::BAD_REQUEST),
            (ApiError::DatabaseError(anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            let (status, _) = error.to_response_with_context(ErrorContext::new("review_item", "review_item"));
            assert_eq!(status, expected);
        }
    }
}
