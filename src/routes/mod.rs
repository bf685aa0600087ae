use axum::{
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::department;
use crate::middleware::{auth_layer, TokenVerifier};
use crate::state::AppState;
use crate::store::TransactionalStore;

pub mod health;

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: true,
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn success_msg(message: impl Into<String>) -> Self {
        Self {
            code: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: false,
            message: message.into(),
            data: None,
        }
    }
}

/// Create the main router
pub fn create_router<S: TransactionalStore + 'static>(state: AppState<S>) -> Router {
    let verifier = Arc::new(TokenVerifier::from_config(&state.config.auth));

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Department reads
        .route("/department/query", get(department::get_departments::<S>))
        .route("/department/tree", get(department::get_tree::<S>))
        .route("/department/info", get(department::get_department::<S>))
        .route("/department/by-name", get(department::get_department_by_name::<S>))
        .route("/department/children", get(department::get_children::<S>))
        .route("/department/subtree", get(department::get_subtree::<S>))
        .route("/department/ancestors", get(department::get_ancestors::<S>))
        // Department changes
        .route("/department/add", post(department::add_department::<S>))
        .route("/department/update", post(department::update_department::<S>))
        .route("/department/move", post(department::move_department::<S>))
        .route("/department/delete", post(department::delete_department::<S>))
        .route("/department/rebuild", post(department::rebuild_paths::<S>));

    Router::new()
        .nest("/api", api_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(verifier, auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fallback handler for 404
pub async fn fallback() -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::NOT_FOUND, Json(ApiResponse::error("Not Found")))
}
