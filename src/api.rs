use axum::{
    extract::{rejection::JsonRejection, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, Instrument};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::browser::ChromeLauncher;
use crate::error::ScrapeError;
use crate::mapping;
use crate::model::{InputError, Product};
use crate::pipeline::Scraper;

pub struct AppState {
    pub scraper: Scraper<ChromeLauncher>,
}

#[derive(OpenApi)]
#[openapi(
    paths(index, health, submit),
    components(schemas(SubmitRequest, SubmitResponse, ErrorResponse, StatusResponse, Product)),
    tags((name = "scraper", description = "Product price scraping"))
)]
pub struct ApiDoc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(index))
        .route("/health", get(health))
        .route("/submit", post(submit))
        .fallback(not_found)
        .with_state(state)
}

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Free-text product category, e.g. `Waschbecken`.
    pub product_type: Option<String>,
    /// One of `50`, `100`.
    pub product_width: Option<String>,
    /// One of `30`, `60`.
    pub product_depth: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResponse {
    pub success: bool,
    pub count: usize,
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    /// Machine-readable error category.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<String>>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub message: String,
    pub status: String,
    pub timestamp: String,
}

pub enum ApiError {
    MissingFields,
    MalformedBody(JsonRejection),
    Scrape(ScrapeError),
    NotFound(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedBody(rejection)
    }
}

impl From<ScrapeError> for ApiError {
    fn from(e: ScrapeError) -> Self {
        ApiError::Scrape(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let owned = |values: Vec<&str>| Some(values.into_iter().map(String::from).collect());
        let mut body = ErrorResponse {
            success: false,
            error: String::new(),
            kind: String::new(),
            required: None,
            valid_values: None,
            timestamp: timestamp(),
        };

        let status = match self {
            ApiError::MissingFields => {
                body.error = "Missing required fields".to_string();
                body.kind = "invalid_input".to_string();
                body.required = owned(vec!["productType", "productWidth", "productDepth"]);
                StatusCode::BAD_REQUEST
            }
            ApiError::MalformedBody(rejection) => {
                body.error = rejection.body_text();
                body.kind = "invalid_input".to_string();
                rejection.status()
            }
            ApiError::NotFound(path) => {
                body.error = format!("Endpoint not found: {path}");
                body.kind = "not_found".to_string();
                StatusCode::NOT_FOUND
            }
            ApiError::Scrape(e) => {
                body.error = e.to_string();
                body.kind = e.kind().to_string();
                match &e {
                    ScrapeError::InvalidInput(input) => {
                        body.valid_values = match input {
                            InputError::UnsupportedWidth(_) => owned(mapping::supported_widths()),
                            InputError::UnsupportedDepth(_) => owned(mapping::supported_depths()),
                            _ => None,
                        };
                        StatusCode::BAD_REQUEST
                    }
                    ScrapeError::PipelineTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
                    ScrapeError::LayoutMismatch { .. } => StatusCode::BAD_GATEWAY,
                    ScrapeError::Session { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Service banner", body = StatusResponse)),
    tag = "scraper"
)]
pub async fn index() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "Price scraper API".to_string(),
        status: "running".to_string(),
        timestamp: timestamp(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = StatusResponse)),
    tag = "scraper"
)]
pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "ok".to_string(),
        status: "healthy".to_string(),
        timestamp: timestamp(),
    })
}

#[utoipa::path(
    post,
    path = "/submit",
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Scrape finished; the list may be empty", body = SubmitResponse),
        (status = 400, description = "Missing or invalid input", body = ErrorResponse),
        (status = 422, description = "Body fields have the wrong type", body = ErrorResponse),
        (status = 408, description = "Scrape exceeded its deadline", body = ErrorResponse),
        (status = 502, description = "Site markup did not match the expected layout", body = ErrorResponse),
        (status = 500, description = "Browser session failure", body = ErrorResponse)
    ),
    tag = "scraper"
)]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(payload) = payload?;
    let present = |field: Option<String>| field.filter(|value| !value.trim().is_empty());
    let (Some(product_type), Some(width), Some(depth)) = (
        present(payload.product_type),
        present(payload.product_width),
        present(payload.product_depth),
    ) else {
        return Err(ApiError::MissingFields);
    };

    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("submit", %request_id);
    async move {
        info!(%product_type, %width, %depth, "processing request");
        let products = state.scraper.scrape(&product_type, &width, &depth).await?;
        Ok::<_, ApiError>(Json(SubmitResponse {
            success: true,
            count: products.len(),
            products,
        }))
    }
    .instrument(span)
    .await
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
