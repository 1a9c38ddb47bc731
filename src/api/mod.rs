//! Transport-independent handlers for the record service. Every handler returns an
//! [ApiResponse], any HTTP framework can mount them under the paths listed by [index].

pub mod presentation;
pub mod records;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

pub const HEALTH_PATH: &str = "/health";
pub const RECORDS_PATH: &str = "/api/records";
pub const STATS_PATH: &str = "/api/records/stats";

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn created(body: Value) -> Self {
        Self { status: 201, body }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing required fields: pc_name, window_title, event_type, start_time")]
    MissingFields,

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// The cause is logged, callers only get a generic message.
    #[error("Internal server error")]
    Storage(anyhow::Error),
}

impl ApiError {
    pub fn invalid(field: &'static str, reason: impl ToString) -> Self {
        ApiError::InvalidField {
            field,
            reason: reason.to_string(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiError::MissingFields | ApiError::InvalidField { .. } => 400,
            ApiError::Storage(_) => 500,
        }
    }
}

impl From<ApiError> for ApiResponse {
    fn from(value: ApiError) -> Self {
        if let ApiError::Storage(cause) = &value {
            error!("Storage failure {cause:?}");
        }
        ApiResponse {
            status: value.status(),
            body: json!({ "success": false, "error": value.to_string() }),
        }
    }
}

pub fn health() -> ApiResponse {
    ApiResponse::ok(json!({
        "status": "ok",
        "message": "FlowRecord API is running",
    }))
}

pub fn index() -> ApiResponse {
    ApiResponse::ok(json!({
        "message": "FlowRecord API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": HEALTH_PATH,
            "records": RECORDS_PATH,
            "stats": STATS_PATH,
        },
    }))
}
