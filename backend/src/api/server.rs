//! HTTP server for the report API.
//!
//! # API Endpoints
//!
//! | Method | Path           | Description                                 |
//! |--------|----------------|---------------------------------------------|
//! | GET    | `/health`      | Health check                                |
//! | POST   | `/api/reports` | Generate a report (multipart upload)        |
//! | POST   | `/api/form`    | Describe the options form of a definition   |
//! | GET    | `/api/logs`    | SSE stream for real-time logs               |
//!
//! `POST /api/reports` multipart fields:
//!
//! - `definition`: report definition JSON
//! - `data`: CSV of the definition's base table
//! - `lookup:<model>`: CSV of a lookup table
//! - any other text field: a request parameter (`report_format`, filters...)

use axum::{
    extract::Multipart,
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, log_info, LOG_BROADCASTER};
use super::types::{error_response, status_of, FormRequest, FormResponse, ReportResponse};
use crate::error::{ServerError, ServerResult};
use crate::params::RequestParams;
use crate::report::{build_form, render_document, ReportDefinition};
use crate::store::MemoryStore;

type ApiError = (StatusCode, Json<Value>);

/// Build the API router
pub fn router() -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/reports", post(generate))
        .route("/api/form", post(form))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
}

/// Start the HTTP server
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Reportkit server running on http://localhost:{}", port);
    println!("   POST /api/reports - Generate a report");
    println!("   POST /api/form    - Describe the options form");
    println!("   GET  /api/logs    - SSE log stream");
    println!("   GET  /health      - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router()).await?;

    Ok(())
}

fn reply(err: ServerError) -> ApiError {
    log_error(err.to_string());
    (status_of(&err), Json(error_response(&err.to_string())))
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "reportkit",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "reports": "POST /api/reports",
            "form": "POST /api/form",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();
    let backlog = tokio_stream::iter(LOG_BROADCASTER.recent()).map(Ok);

    let stream = backlog
        .chain(BroadcastStream::new(rx))
        .filter_map(|result| {
            let entry = result.ok()?;
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Report upload, parsed from the multipart body
#[derive(Default)]
struct ReportUpload {
    definition: Option<ReportDefinition>,
    store: MemoryStore,
    data: Option<Vec<u8>>,
    params: RequestParams,
}

async fn read_upload(mut multipart: Multipart) -> ServerResult<ReportUpload> {
    let mut upload = ReportUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Read error in '{}': {}", name, e)))?;

        if name == "definition" {
            let text = String::from_utf8_lossy(&bytes);
            upload.definition = Some(
                ReportDefinition::from_json(&text).map_err(crate::error::ReportError::from)?,
            );
        } else if name == "data" {
            upload.data = Some(bytes.to_vec());
        } else if let Some(model) = name.strip_prefix("lookup:") {
            let rows = upload
                .store
                .load_csv_bytes(model, &bytes)
                .map_err(crate::error::ReportError::from)?;
            log_info(format!("Lookup '{}' loaded ({} rows)", model, rows));
        } else if !name.is_empty() {
            upload
                .params
                .insert(name, String::from_utf8_lossy(&bytes).into_owned());
        }
    }

    Ok(upload)
}

/// Report generation endpoint
async fn generate(multipart: Multipart) -> Result<Json<ReportResponse>, ApiError> {
    let mut upload = read_upload(multipart).await.map_err(reply)?;

    let definition = upload
        .definition
        .take()
        .ok_or_else(|| reply(ServerError::BadRequest("No report definition provided".into())))?;
    let data = upload
        .data
        .take()
        .ok_or_else(|| reply(ServerError::BadRequest("No data file provided".into())))?;

    let rows = upload
        .store
        .load_csv_bytes(&definition.model, &data)
        .map_err(|e| reply(crate::error::ReportError::from(e).into()))?;
    log_info(format!("Table '{}' loaded ({} rows)", definition.model, rows));

    let result = render_document(&definition, &upload.params, &upload.store)
        .map_err(|e| reply(e.into()))?;

    Ok(Json(ReportResponse::from(result)))
}

/// Options form endpoint
async fn form(Json(request): Json<FormRequest>) -> Result<Json<FormResponse>, ApiError> {
    let mut store = MemoryStore::new();
    for (model, csv) in &request.lookups {
        store
            .load_csv_bytes(model, csv.as_bytes())
            .map_err(|e| reply(crate::error::ReportError::from(e).into()))?;
    }

    let form = build_form(&request.definition, &store).map_err(|e| reply(e.into()))?;
    Ok(Json(FormResponse::from(form)))
}
