use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::{
    controller::UiEvent,
    server_types::{ActionResult, ClickRequest, PromoteRequest},
    settings::SettingsUpdate,
    view::BoardSnapshot,
};

#[derive(Clone)]
struct AppState {
    events: mpsc::UnboundedSender<UiEvent>,
    snapshot: watch::Receiver<BoardSnapshot>,
}

impl AppState {
    fn post(&self, event: UiEvent) -> ActionResult {
        debug!(?event, "ui event");
        match self.events.send(event) {
            Ok(()) => ActionResult::Accepted,
            Err(_) => ActionResult::ControllerGone,
        }
    }
}

/// HTTP front end: `GET /` returns the board, the `POST` routes queue UI events.
pub fn router(
    events: mpsc::UnboundedSender<UiEvent>,
    snapshot: watch::Receiver<BoardSnapshot>,
) -> Router {
    Router::new()
        .route("/", get(get_board))
        .route("/click", post(click))
        .route("/promote", post(promote))
        .route("/settings", post(configure))
        .route("/undo", post(undo))
        .route("/restart", post(restart))
        .route("/swap", post(swap))
        .with_state(AppState { events, snapshot })
}

async fn get_board(State(state): State<AppState>) -> Json<BoardSnapshot> {
    Json(state.snapshot.borrow().clone())
}

async fn click(State(state): State<AppState>, Json(request): Json<ClickRequest>) -> ActionResult {
    state.post(UiEvent::Click(request.square))
}

async fn promote(
    State(state): State<AppState>,
    Json(request): Json<PromoteRequest>,
) -> ActionResult {
    state.post(UiEvent::Promote(request.role))
}

async fn configure(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> ActionResult {
    state.post(UiEvent::Configure(update))
}

async fn undo(State(state): State<AppState>) -> ActionResult {
    state.post(UiEvent::Undo)
}

async fn restart(State(state): State<AppState>) -> ActionResult {
    state.post(UiEvent::Restart)
}

async fn swap(State(state): State<AppState>) -> ActionResult {
    state.post(UiEvent::SwapSides)
}
