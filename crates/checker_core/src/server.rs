use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::checker::{Checker, CheckerQuery, UserError};
use crate::render::{SORT_SCRIPT, STYLESHEET, escape_html, render_page};

#[derive(Clone)]
pub struct AppState {
    checker: Arc<Checker>,
}

pub fn build_router(checker: Arc<Checker>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/static/style.css", get(stylesheet))
        .route("/static/sort.js", get(sort_script))
        .route("/health", get(health))
        .with_state(AppState { checker })
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(checker: Arc<Checker>, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("checker listening on http://{bind}");
    axum::serve(listener, build_router(checker))
        .await
        .context("HTTP server stopped")
}

/// GET /?db=<dbname>&title=<Index:...>
async fn index(State(state): State<AppState>, Query(query): Query<CheckerQuery>) -> Response {
    let checker = Arc::clone(&state.checker);
    match tokio::task::spawn_blocking(move || checker.handle(&query)).await {
        Ok(page) => Html(render_page(&page)).into_response(),
        Err(join_error) => {
            error!(error = %join_error, "checker task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!(
                    "<pre>{}</pre>",
                    escape_html(UserError::General.message())
                )),
            )
                .into_response()
        }
    }
}

async fn stylesheet() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLESHEET,
    )
        .into_response()
}

async fn sort_script() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        SORT_SCRIPT,
    )
        .into_response()
}

async fn health() -> &'static str {
    "ok"
}
