//! NATS message envelopes

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::validation::ValidationErrors;

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub token: Option<String>,  // JWT access token
    pub payload: T,
}

#[cfg(test)]
impl<T> Request<T> {
    pub fn with_token(token: String, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token: Some(token),
            payload,
        }
    }
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    /// HTTP-equivalent status code
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                status: 400,
                details: None,
            },
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.error.status = status;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn unauthorized(request_id: Uuid) -> Self {
        Self::new(request_id, "UNAUTHORIZED", "Authentication required").with_status(401)
    }

    pub fn not_found(request_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(request_id, "NOT_FOUND", message).with_status(404)
    }

    pub fn internal(request_id: Uuid) -> Self {
        Self::new(request_id, "INTERNAL_ERROR", "Erro interno do servidor").with_status(500)
    }

    /// 422 carrying both the rendered messages and the per-field breakdown
    pub fn validation(request_id: Uuid, errors: &ValidationErrors) -> Self {
        Self::new(request_id, "VALIDATION_ERROR", errors.full_messages().join("; "))
            .with_status(422)
            .with_details(serde_json::json!({
                "errors": errors.full_messages(),
                "fields": errors,
            }))
    }
}

/// Payload of requests that carry no parameters (`{}`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

/// Payload addressing a single record by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: Uuid,
}

/// Reply to a successful delete
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

pub(crate) fn default_limit() -> i64 {
    50
}

/// List response with pagination info
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
