//! HTTP surface: JSON API under `/api`, two server-rendered pages and the
//! operational endpoints.

pub mod extract;
pub mod handlers;
pub mod pages;
mod state;

pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{AppError, Result};
use handlers::{complaints, dashboard, health, items, photos, reports, sync, users};

/// Room for multipart framing and metadata around the largest photo
const BODY_OVERHEAD_BYTES: usize = 1024 * 1024;

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(users::create_user).get(users::list_users))
        .route("/users/me", get(users::me).patch(users::update_me))
        .route(
            "/reports",
            get(reports::list_reports).post(reports::create_report),
        )
        .route(
            "/reports/:id",
            get(reports::get_report)
                .patch(reports::update_report)
                .delete(reports::delete_report),
        )
        .route("/reports/:id/validation", get(reports::validate_report))
        .route("/reports/:id/transition", post(reports::transition_report))
        .route("/reports/:id/submit", post(reports::submit_report))
        .route("/reports/:id/signature", post(reports::sign_report))
        .route("/reports/:id/pdf", get(reports::report_pdf))
        .route(
            "/reports/:id/compliance",
            get(reports::get_compliance).put(reports::put_compliance),
        )
        .route("/reports/:id/elements", post(items::add_element))
        .route(
            "/reports/:id/elements/:element_id",
            patch(items::update_element).delete(items::delete_element),
        )
        .route("/reports/:id/defects", post(items::add_defect))
        .route(
            "/reports/:id/defects/:defect_id",
            patch(items::update_defect).delete(items::delete_defect),
        )
        .route(
            "/reports/:id/photos",
            get(photos::list_photos).post(photos::upload_photo),
        )
        .route(
            "/reports/:id/photos/:photo_id",
            patch(photos::update_photo).delete(photos::delete_photo),
        )
        .route("/reports/:id/photos/:photo_id/file", get(photos::photo_file))
        .route("/dashboard", get(dashboard::dashboard))
        .route(
            "/complaints",
            get(complaints::list_complaints).post(complaints::create_complaint),
        )
        .route(
            "/complaints/:id",
            get(complaints::get_complaint).patch(complaints::update_complaint),
        )
        .route("/complaints/:id/submit", post(complaints::submit_complaint))
        .route(
            "/complaints/:id/acknowledge",
            post(complaints::acknowledge_complaint),
        )
        .route("/complaints/:id/close", post(complaints::close_complaint))
        .route("/complaints/:id/withdraw", post(complaints::withdraw_complaint))
        .route("/complaints/:id/pdf", get(complaints::complaint_pdf))
        .route("/sync/upload", post(sync::upload))
        .route("/sync/pull", get(sync::pull))
}

/// Create the HTTP router with every route and layer
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);
    let body_limit = state.config.photos.max_bytes + BODY_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/", get(pages::dashboard_page))
        .route("/reports/:id", get(pages::report_page))
        .nest("/api", api_routes())
        .nest_service("/static", ServeDir::new(&state.config.server.static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// Bind the configured address and serve until the process stops
pub async fn start_server(state: AppState) -> Result<()> {
    let addr = state.config.bind_address();
    let app = create_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Config(format!("cannot bind {}: {}", addr, e)))?;

    info!("HTTP server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
