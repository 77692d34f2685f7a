#[cfg(feature = "server")]
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use shakmaty::{Role, Square};

/// A click on one square of the board.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickRequest {
    /// The square clicked, like `"e2"`.
    #[serde(with = "crate::chess_serde::square_serde")]
    pub square: Square,
}

/// The answer to an open promotion prompt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromoteRequest {
    /// The piece to promote to, like `"q"`.
    #[serde(with = "crate::chess_serde::role_serde")]
    pub role: Role,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerError {
    pub error_text: String,
}

/// The outcome of posting a UI event.
#[derive(Clone, Debug)]
pub enum ActionResult {
    /// Queued for the controller. Its effect shows up in the next snapshot.
    Accepted,
    /// The controller is no longer running.
    ControllerGone,
}

#[cfg(feature = "server")]
impl IntoResponse for ActionResult {
    fn into_response(self) -> axum::response::Response {
        match self {
            ActionResult::Accepted => StatusCode::ACCEPTED.into_response(),
            ActionResult::ControllerGone => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ServerError {
                    error_text: "game controller is not running".to_string(),
                }),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_parse_from_front_end_json() {
        let click: ClickRequest = serde_json::from_str(r#"{"square":"e2"}"#).unwrap();
        assert_eq!(click.square, Square::E2);
        let promote: PromoteRequest = serde_json::from_str(r#"{"role":"q"}"#).unwrap();
        assert_eq!(promote.role, Role::Queen);
    }

    #[test]
    fn bad_squares_are_rejected() {
        assert!(serde_json::from_str::<ClickRequest>(r#"{"square":"z9"}"#).is_err());
    }
}
