//! The display contract the controller drives, and a snapshot-publishing implementation.

use serde::Serialize;
use shakmaty::{Outcome, Role, Square};
use tokio::sync::watch;

use crate::chess_serde::{role_serde, square_serde};

/// A board display. Calls are fire-and-forget; the view never calls back.
pub trait BoardView: Send {
    /// Show `fen`. Marks are kept.
    fn set_position(&mut self, fen: &str, in_check: bool);

    fn select_square(&mut self, square: Square);

    /// Mark the destinations of the selected piece.
    fn mark_destinations(&mut self, squares: &[Square]);

    /// Clear every mark: selection, destinations, opponent move, hint and any promotion prompt.
    fn unselect_all_squares(&mut self);

    fn mark_opponent_move(&mut self, from: Square, to: Square);

    fn mark_hint(&mut self, square: Square);

    /// Ask which piece a pawn moving `from` → `to` becomes.
    fn prompt_promotion(&mut self, from: Square, to: Square, roles: &[Role]);

    fn show_outcome(&mut self, outcome: Outcome);

    /// Report why play is paused, or clear the report with `None`.
    fn show_error(&mut self, error: Option<&str>);
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PromotionPrompt {
    #[serde(with = "square_serde")]
    pub from: Square,
    #[serde(with = "square_serde")]
    pub to: Square,
    #[serde(serialize_with = "role_serde::seq::serialize")]
    pub roles: Vec<Role>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct OpponentMove {
    #[serde(with = "square_serde")]
    pub from: Square,
    #[serde(with = "square_serde")]
    pub to: Square,
}

/// Everything a front end needs to draw the board.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BoardSnapshot {
    pub fen: String,
    pub in_check: bool,
    #[serde(serialize_with = "square_serde::option::serialize")]
    pub selected: Option<Square>,
    #[serde(serialize_with = "square_serde::seq::serialize")]
    pub destinations: Vec<Square>,
    pub opponent_move: Option<OpponentMove>,
    #[serde(serialize_with = "square_serde::option::serialize")]
    pub hint: Option<Square>,
    pub promotion: Option<PromotionPrompt>,
    /// `1-0`, `0-1` or `1/2-1/2` once the game is over.
    pub outcome: Option<String>,
    /// Set while play is paused by an engine failure.
    pub error: Option<String>,
}

/// A [`BoardView`] that publishes a [`BoardSnapshot`] after every call.
pub struct SnapshotView {
    tx: watch::Sender<BoardSnapshot>,
}

impl SnapshotView {
    pub fn new() -> (Self, watch::Receiver<BoardSnapshot>) {
        let (tx, rx) = watch::channel(BoardSnapshot::default());
        (SnapshotView { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.tx.borrow().clone()
    }

    fn update(&mut self, f: impl FnOnce(&mut BoardSnapshot)) {
        self.tx.send_modify(f);
    }
}

impl BoardView for SnapshotView {
    fn set_position(&mut self, fen: &str, in_check: bool) {
        self.update(|s| {
            s.fen = fen.to_string();
            s.in_check = in_check;
            s.outcome = None;
        });
    }

    fn select_square(&mut self, square: Square) {
        self.update(|s| s.selected = Some(square));
    }

    fn mark_destinations(&mut self, squares: &[Square]) {
        self.update(|s| s.destinations = squares.to_vec());
    }

    fn unselect_all_squares(&mut self) {
        self.update(|s| {
            s.selected = None;
            s.destinations.clear();
            s.opponent_move = None;
            s.hint = None;
            s.promotion = None;
        });
    }

    fn mark_opponent_move(&mut self, from: Square, to: Square) {
        self.update(|s| s.opponent_move = Some(OpponentMove { from, to }));
    }

    fn mark_hint(&mut self, square: Square) {
        self.update(|s| s.hint = Some(square));
    }

    fn prompt_promotion(&mut self, from: Square, to: Square, roles: &[Role]) {
        self.update(|s| {
            s.promotion = Some(PromotionPrompt {
                from,
                to,
                roles: roles.to_vec(),
            })
        });
    }

    fn show_outcome(&mut self, outcome: Outcome) {
        self.update(|s| s.outcome = Some(outcome.to_string()));
    }

    fn show_error(&mut self, error: Option<&str>) {
        self.update(|s| s.error = error.map(str::to_string));
    }
}
