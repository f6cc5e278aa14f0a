//! REST API request and response types.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{ReportError, ServerError};
use crate::filters::ReportForm;
use crate::report::{ReportDefinition, ReportOutcome};
use crate::sink::ReportDocument;

/// Response of `POST /api/reports`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    /// Unique job identifier
    pub job_id: String,

    /// "ready", or "empty" when no row matched
    pub status: String,

    pub outcome: ReportOutcome,

    /// Render instructions, tagged with the requested format
    pub document: ReportDocument,
}

impl From<(ReportDocument, ReportOutcome)> for ReportResponse {
    fn from((document, outcome): (ReportDocument, ReportOutcome)) -> Self {
        let status = if outcome.report_rows == 0 { "empty" } else { "ready" };
        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            outcome,
            document,
        }
    }
}

/// Body of `POST /api/form`.
#[derive(Debug, Clone, Deserialize)]
pub struct FormRequest {
    pub definition: ReportDefinition,

    /// Lookup tables as CSV text, by model name
    #[serde(default)]
    pub lookups: BTreeMap<String, String>,
}

/// Response of `POST /api/form`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    pub status: String,
    pub form: ReportForm,
}

impl From<ReportForm> for FormResponse {
    fn from(form: ReportForm) -> Self {
        Self {
            status: "ready".to_string(),
            form,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

/// HTTP status of a server error.
pub fn status_of(err: &ServerError) -> StatusCode {
    match err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ServerError::Report(ReportError::Fetch(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Report(_) => StatusCode::BAD_REQUEST,
    }
}
