//! HTTP surface
//!
//! `POST /api/XmlValidator` takes the candidate document as the request body
//! (literal XML, or a URL to fetch it from) and the root schema URL in the
//! `x-xsd-schema` header. VALID answers 200; MALFORMED, INVALID and bad
//! input answer 400; loader, resolution and internal failures answer 500.

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::diagnostics::ValidationDiagnostic;
use crate::error::{InputError, ServiceError};
use crate::loader::{DocumentSource, parse_reference};
use crate::outcome::{Classification, ValidationOutcome};
use crate::schema::SchemaReference;
use crate::service::XmlValidationService;
use crate::validator::decode_document;

/// Header carrying the root schema URL
pub const SCHEMA_HEADER: &str = "x-xsd-schema";

/// Header echoing the per-request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    service: Arc<XmlValidationService>,
}

/// Response body for a verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictBody {
    pub request_id: String,
    pub outcome: Classification,
    pub diagnostics: Vec<ValidationDiagnostic>,
    pub checked_at: DateTime<Utc>,
}

/// Response body when no verdict could be produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureBody {
    pub request_id: String,
    pub kind: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
    pub version: String,
}

/// Build the application router
pub fn router(service: Arc<XmlValidationService>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/XmlValidator", post(validate_xml))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "XML validation service listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn validate_xml(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let span = info_span!("validate", request_id = %request_id);

    let mut response = handle(&state, &headers, &body, &request_id)
        .instrument(span)
        .await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// What was asked for, once the request has been checked
enum Request {
    Validate {
        source: DocumentSource,
        schema: SchemaReference,
    },
    /// Body bytes that are not text at all
    Undecodable(ValidationOutcome),
}

fn parse_request(headers: &HeaderMap, body: &[u8]) -> Result<Request, InputError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(InputError::MissingBody);
    }

    let header = headers
        .get(SCHEMA_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| InputError::MissingSchemaHeader {
            header: SCHEMA_HEADER.to_string(),
        })?;
    let schema = SchemaReference::new(parse_reference(header)?);

    match decode_document(body) {
        Ok(text) => Ok(Request::Validate {
            source: DocumentSource::from_body(text)?,
            schema,
        }),
        Err(report) => Ok(Request::Undecodable(report.into_outcome())),
    }
}

async fn handle(state: &AppState, headers: &HeaderMap, body: &[u8], request_id: &str) -> Response {
    let (source, schema) = match parse_request(headers, body) {
        Ok(Request::Validate { source, schema }) => (source, schema),
        Ok(Request::Undecodable(outcome)) => return verdict(request_id, outcome),
        Err(error) => {
            warn!(error = %error, "Rejected request");
            return failure(StatusCode::BAD_REQUEST, request_id, "input", error.to_string());
        }
    };

    info!(
        document = %source.describe(),
        schema = %schema.location,
        "Validation requested"
    );

    match state.service.validate_document(source, schema).await {
        Ok(outcome) => verdict(request_id, outcome),
        Err(error) => {
            warn!(kind = error.kind(), error = %error, "Validation failed");
            failure(status_for(&error), request_id, error.kind(), error.to_string())
        }
    }
}

fn status_for(error: &ServiceError) -> StatusCode {
    match error {
        ServiceError::Load(_)
        | ServiceError::Resolution(_)
        | ServiceError::Timeout { .. }
        | ServiceError::Cancelled(_)
        | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn verdict(request_id: &str, outcome: ValidationOutcome) -> Response {
    let status = match outcome.classification() {
        Classification::Valid => StatusCode::OK,
        Classification::Invalid | Classification::Malformed => StatusCode::BAD_REQUEST,
    };
    if status != StatusCode::OK {
        for diagnostic in outcome.diagnostics() {
            info!(outcome = %outcome.classification(), %diagnostic, "Diagnostic");
        }
    }

    let outcome_kind = outcome.classification();
    let body = VerdictBody {
        request_id: request_id.to_string(),
        outcome: outcome_kind,
        diagnostics: outcome.into_diagnostics(),
        checked_at: Utc::now(),
    };
    (status, Json(body)).into_response()
}

fn failure(status: StatusCode, request_id: &str, kind: &str, error: String) -> Response {
    let body = FailureBody {
        request_id: request_id.to_string(),
        kind: kind.to_string(),
        error,
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::schema::ResolverOptions;
    use crate::service::ServiceOptions;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::loader::ContentLoader;
    use async_trait::async_trait;
    use reqwest::Url;

    struct SchemaOnly;

    #[async_trait]
    impl ContentLoader for SchemaOnly {
        async fn load(&self, location: &Url) -> Result<String, LoadError> {
            if location.as_str() == "http://schemas.test/note.xsd" {
                Ok(r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="note" type="xs:string"/>
</xs:schema>"#
                    .to_string())
            } else {
                Err(LoadError::NotFound {
                    url: location.to_string(),
                })
            }
        }
    }

    fn app() -> Router {
        let loader: Arc<dyn ContentLoader> = Arc::new(SchemaOnly);
        let service = XmlValidationService::new(
            loader.clone(),
            loader,
            ResolverOptions::default(),
            ServiceOptions::default(),
        );
        router(Arc::new(service), 1024)
    }

    fn post(body: impl Into<Body>, schema: Option<&str>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method("POST").uri("/api/XmlValidator");
        if let Some(schema) = schema {
            builder = builder.header(SCHEMA_HEADER, schema);
        }
        builder.body(body.into()).unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_document() {
        let response = app()
            .oneshot(post("<note>hi</note>", Some("http://schemas.test/note.xsd")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let body: VerdictBody = body_json(response).await;
        assert_eq!(body.outcome, Classification::Valid);
        assert!(body.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_document() {
        let response = app()
            .oneshot(post("<memo/>", Some("http://schemas.test/note.xsd")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: VerdictBody = body_json(response).await;
        assert_eq!(body.outcome, Classification::Invalid);
        assert_eq!(body.diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_malformed() {
        let response = app()
            .oneshot(post(
                vec![b'<', b'n', b'>', 0xff, b'<', b'/', b'n', b'>'],
                Some("http://schemas.test/note.xsd"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: VerdictBody = body_json(response).await;
        assert_eq!(body.outcome, Classification::Malformed);
    }

    #[tokio::test]
    async fn test_input_errors() {
        let response = app()
            .oneshot(post("  ", Some("http://schemas.test/note.xsd")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: FailureBody = body_json(response).await;
        assert_eq!(body.kind, "input");
        assert_eq!(body.error, "XML body is empty");

        let response = app().oneshot(post("<note/>", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: FailureBody = body_json(response).await;
        assert_eq!(body.error, "Header [x-xsd-schema] for XSD Schema URL is empty");

        let response = app()
            .oneshot(post("<note/>", Some("not a url")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreachable_schema_is_server_error() {
        let response = app()
            .oneshot(post("<note/>", Some("http://schemas.test/missing.xsd")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: FailureBody = body_json(response).await;
        assert_eq!(body.kind, "resolution");
        assert!(body.error.contains("missing.xsd"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let large = format!("<note>{}</note>", "x".repeat(4096));
        let response = app()
            .oneshot(post(large, Some("http://schemas.test/note.xsd")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: HealthBody = body_json(response).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }
}
