use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    coordinator::{SearchCoordinator, SearchState},
    error::SearchError,
    tester::Radio,
    types::{SearchReport, TargetNetwork},
};

pub struct AppState<R> {
    coordinator: Arc<SearchCoordinator<R>>,
    last: Arc<RwLock<Option<LastRun>>>, // outcome of the most recent finished run
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            last: Arc::clone(&self.last),
        }
    }
}

impl<R: Radio> AppState<R> {
    pub fn new(coordinator: Arc<SearchCoordinator<R>>) -> Self {
        Self {
            coordinator,
            last: Arc::new(RwLock::new(None)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum LastRun {
    Report(SearchReport),
    Error { status: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub state: SearchState,
    pub percent: u8,
    pub target: Option<TargetNetwork>,
}

/// Routes of the control API, without binding a socket.
pub fn router<R: Radio>(state: AppState<R>) -> Router {
    let api = Router::new()
        .route("/status", get(get_status::<R>))
        .route("/target", post(post_target::<R>).delete(delete_target::<R>))
        .route("/search", post(post_search::<R>))
        .route("/cancel", post(post_cancel::<R>))
        .route("/result", get(get_result::<R>))
        .with_state(state);

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

pub async fn spawn_server<R: Radio>(bind: &str, coordinator: Arc<SearchCoordinator<R>>) -> Result<()> {
    let app = router(AppState::new(coordinator));
    info!("serving control API on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status<R: Radio>(State(app): State<AppState<R>>) -> impl IntoResponse {
    let c = &app.coordinator;
    let out = Status {
        state: c.state(),
        percent: c.percent(),
        target: c.target(),
    };
    (StatusCode::OK, Json(out))
}

async fn post_target<R: Radio>(
    State(app): State<AppState<R>>,
    Json(target): Json<TargetNetwork>,
) -> impl IntoResponse {
    if target.ssid.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "ssid must not be empty").into_response();
    }
    app.coordinator.select_target(target);
    StatusCode::NO_CONTENT.into_response()
}

async fn delete_target<R: Radio>(State(app): State<AppState<R>>) -> impl IntoResponse {
    app.coordinator.clear_target();
    StatusCode::NO_CONTENT
}

async fn post_search<R: Radio>(State(app): State<AppState<R>>) -> impl IntoResponse {
    let handle = match app.coordinator.start() {
        Ok(handle) => handle,
        Err(e @ SearchError::NoTargetSelected) => {
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
        Err(e) => return (StatusCode::CONFLICT, e.to_string()).into_response(),
    };

    let last = Arc::clone(&app.last);
    tokio::spawn(async move {
        let record = match handle.await {
            Ok(Ok(report)) => LastRun::Report(report),
            Ok(Err(e)) => {
                error!("search error: {e}");
                LastRun::Error {
                    status: "error",
                    message: e.to_string(),
                }
            }
            Err(join) => {
                error!("search task failed: {join}");
                LastRun::Error {
                    status: "error",
                    message: join.to_string(),
                }
            }
        };
        *last.write().await = Some(record);
    });

    (StatusCode::ACCEPTED, "search started").into_response()
}

async fn post_cancel<R: Radio>(State(app): State<AppState<R>>) -> impl IntoResponse {
    app.coordinator.cancel();
    StatusCode::ACCEPTED
}

async fn get_result<R: Radio>(State(app): State<AppState<R>>) -> impl IntoResponse {
    let last = app.last.read().await;
    if let Some(res) = last.as_ref() {
        (StatusCode::OK, Json(res.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}
