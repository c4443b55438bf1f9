use serde::Serialize;
use utoipa::ToSchema;

/// Structured error response — designed for operators and admin tooling.
/// Every error carries enough information to understand what went wrong
/// and how to fix it.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "rollback_conflict")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_ACTION: &str = "invalid_action";
    pub const ROLLBACK_CONFLICT: &str = "rollback_conflict";
    pub const UPSTREAM_UNAVAILABLE: &str = "upstream_unavailable";
    pub const INTERNAL_ERROR: &str = "internal_error";
}
