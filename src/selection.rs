//! The point-and-click move selection state machine.
//!
//! The turn driver arms a [`Selection`] when it wants a move from the human and
//! gets a [`HumanMove`] receiver back. Clicks then walk the machine through
//! square selection until a legal move is committed, which resolves the receiver.

use shakmaty::{Role, Square};
use tokio::sync::oneshot;
use tracing::debug;

use crate::oracle::{CandidateMove, GamePosition};
use crate::view::BoardView;

/// Resolves with the move the human committed. Fails if the selection is
/// disarmed or re-armed first.
pub type HumanMove = oneshot::Receiver<CandidateMove>;

type Reply = oneshot::Sender<CandidateMove>;

enum State {
    Unarmed,
    Armed {
        reply: Reply,
    },
    Selected {
        from: Square,
        moves: Vec<CandidateMove>,
        reply: Reply,
    },
    Promoting {
        from: Square,
        to: Square,
        moves: Vec<CandidateMove>,
        reply: Reply,
    },
}

/// The observable part of the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unarmed,
    Armed,
    SquareSelected(Square),
    AwaitingPromotion { from: Square, to: Square },
}

/// What a click or promotion choice did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    /// No state or view change.
    Ignored,
    /// A piece was selected (or reselected) and its destinations marked.
    Selected(Square),
    /// The selected piece was clicked again.
    Deselected,
    /// Several moves reach the square; a promotion piece must be chosen first.
    PromotionRequired { from: Square, to: Square },
    Committed(CandidateMove),
}

pub struct Selection {
    state: State,
}

impl Selection {
    pub fn new() -> Self {
        Selection {
            state: State::Unarmed,
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            State::Unarmed => Phase::Unarmed,
            State::Armed { .. } => Phase::Armed,
            State::Selected { from, .. } => Phase::SquareSelected(*from),
            State::Promoting { from, to, .. } => Phase::AwaitingPromotion {
                from: *from,
                to: *to,
            },
        }
    }

    /// Start waiting for a human move.
    ///
    /// Any earlier wait is dropped (its receiver fails) and its selection cleared.
    pub fn arm(&mut self, view: &mut dyn BoardView) -> HumanMove {
        let (reply, rx) = oneshot::channel();
        let previous = std::mem::replace(&mut self.state, State::Armed { reply });
        if matches!(previous, State::Selected { .. } | State::Promoting { .. }) {
            view.unselect_all_squares();
        }
        rx
    }

    /// Stop waiting. Clicks are ignored until the next [`Selection::arm`].
    pub fn disarm(&mut self) {
        self.state = State::Unarmed;
    }

    pub fn click(
        &mut self,
        square: Square,
        position: &GamePosition,
        view: &mut dyn BoardView,
    ) -> ClickOutcome {
        let (next, outcome) = match std::mem::replace(&mut self.state, State::Unarmed) {
            State::Unarmed => (State::Unarmed, ClickOutcome::Ignored),
            State::Armed { reply } => match highlight(square, position, view) {
                Some(moves) => (
                    State::Selected {
                        from: square,
                        moves,
                        reply,
                    },
                    ClickOutcome::Selected(square),
                ),
                None => (State::Armed { reply }, ClickOutcome::Ignored),
            },
            State::Selected { from, moves, reply } => {
                follow_up(from, moves, reply, square, position, view)
            }
            State::Promoting {
                from,
                to,
                moves,
                reply,
            } => match follow_up(from, moves, reply, square, position, view) {
                // Keep the prompt open for clicks that do nothing.
                (State::Selected { from, moves, reply }, ClickOutcome::Ignored) => (
                    State::Promoting {
                        from,
                        to,
                        moves,
                        reply,
                    },
                    ClickOutcome::Ignored,
                ),
                other => other,
            },
        };
        debug!(%square, ?outcome, "click");
        self.state = next;
        outcome
    }

    /// Answer a promotion prompt. Ignored unless one is open and `role` is among its choices.
    pub fn choose_promotion(&mut self, role: Role, view: &mut dyn BoardView) -> ClickOutcome {
        let (next, outcome) = match std::mem::replace(&mut self.state, State::Unarmed) {
            State::Promoting {
                from,
                to,
                moves,
                reply,
            } => match moves
                .iter()
                .find(|m| m.to == to && m.promotion == Some(role))
                .cloned()
            {
                Some(mv) => {
                    view.unselect_all_squares();
                    commit(reply, mv)
                }
                None => (
                    State::Promoting {
                        from,
                        to,
                        moves,
                        reply,
                    },
                    ClickOutcome::Ignored,
                ),
            },
            other => (other, ClickOutcome::Ignored),
        };
        self.state = next;
        outcome
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::new()
    }
}

/// Select `square` if it has legal moves: clear old marks, mark it and its destinations.
fn highlight(
    square: Square,
    position: &GamePosition,
    view: &mut dyn BoardView,
) -> Option<Vec<CandidateMove>> {
    let moves = position.legal_moves(Some(square));
    if moves.is_empty() {
        return None;
    }
    let destinations: Vec<Square> = moves.iter().map(|m| m.to).collect();
    view.unselect_all_squares();
    view.select_square(square);
    view.mark_destinations(&destinations);
    Some(moves)
}

/// A click while `from` is selected.
fn follow_up(
    from: Square,
    moves: Vec<CandidateMove>,
    reply: Reply,
    square: Square,
    position: &GamePosition,
    view: &mut dyn BoardView,
) -> (State, ClickOutcome) {
    if square == from {
        view.unselect_all_squares();
        return (State::Armed { reply }, ClickOutcome::Deselected);
    }

    let own = position.color_at(from);
    if own.is_some() && position.color_at(square) == own {
        return match highlight(square, position, view) {
            Some(moves) => (
                State::Selected {
                    from: square,
                    moves,
                    reply,
                },
                ClickOutcome::Selected(square),
            ),
            None => (State::Selected { from, moves, reply }, ClickOutcome::Ignored),
        };
    }

    let choices: Vec<CandidateMove> = moves.iter().filter(|m| m.to == square).cloned().collect();
    match choices.as_slice() {
        [] => (State::Selected { from, moves, reply }, ClickOutcome::Ignored),
        [only] => {
            view.unselect_all_squares();
            commit(reply, only.clone())
        }
        several => {
            let roles: Vec<Role> = several.iter().filter_map(|m| m.promotion).collect();
            view.prompt_promotion(from, square, &roles);
            (
                State::Promoting {
                    from,
                    to: square,
                    moves,
                    reply,
                },
                ClickOutcome::PromotionRequired { from, to: square },
            )
        }
    }
}

fn commit(reply: Reply, mv: CandidateMove) -> (State, ClickOutcome) {
    if reply.send(mv.clone()).is_err() {
        debug!(%mv, "nobody is waiting for the human move");
    }
    (State::Unarmed, ClickOutcome::Committed(mv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::SnapshotView;

    fn armed() -> (Selection, HumanMove, SnapshotView) {
        let (mut view, _rx) = SnapshotView::new();
        let mut selection = Selection::new();
        let human = selection.arm(&mut view);
        (selection, human, view)
    }

    #[test]
    fn clicks_are_ignored_until_armed() {
        let (mut view, _rx) = SnapshotView::new();
        let mut selection = Selection::new();
        let before = view.snapshot();
        let outcome = selection.click(Square::E2, &GamePosition::new(), &mut view);
        assert_eq!(outcome, ClickOutcome::Ignored);
        assert_eq!(selection.phase(), Phase::Unarmed);
        assert_eq!(view.snapshot(), before);
    }

    #[test]
    fn squares_without_moves_are_a_no_op() {
        let (mut selection, _human, mut view) = armed();
        let before = view.snapshot();
        // Empty, the opponent's piece, and a blocked own piece.
        for square in [Square::E4, Square::E7, Square::A1] {
            assert_eq!(
                selection.click(square, &GamePosition::new(), &mut view),
                ClickOutcome::Ignored
            );
        }
        assert_eq!(selection.phase(), Phase::Armed);
        assert_eq!(view.snapshot(), before);
    }

    #[test]
    fn select_marks_exactly_the_legal_destinations() {
        let (mut selection, _human, mut view) = armed();
        let position = GamePosition::new();
        let outcome = selection.click(Square::G1, &position, &mut view);
        assert_eq!(outcome, ClickOutcome::Selected(Square::G1));
        let snapshot = view.snapshot();
        assert_eq!(snapshot.selected, Some(Square::G1));
        let mut expected: Vec<Square> = position
            .legal_moves(Some(Square::G1))
            .iter()
            .map(|m| m.to)
            .collect();
        expected.sort_by_key(|sq| u32::from(*sq));
        let mut marked = snapshot.destinations.clone();
        marked.sort_by_key(|sq| u32::from(*sq));
        assert_eq!(marked, expected);
        assert_eq!(marked, vec![Square::F3, Square::H3]);
    }

    #[test]
    fn second_click_on_selection_deselects() {
        let (mut selection, _human, mut view) = armed();
        let position = GamePosition::new();
        selection.click(Square::E2, &position, &mut view);
        for _ in 0..2 {
            assert_eq!(
                selection.click(Square::E2, &position, &mut view),
                ClickOutcome::Deselected
            );
            assert_eq!(selection.phase(), Phase::Armed);
            let snapshot = view.snapshot();
            assert_eq!(snapshot.selected, None);
            assert!(snapshot.destinations.is_empty());
            selection.click(Square::E2, &position, &mut view);
        }
    }

    #[test]
    fn clicking_another_own_piece_reselects() {
        let (mut selection, _human, mut view) = armed();
        let position = GamePosition::new();
        selection.click(Square::E2, &position, &mut view);
        assert_eq!(
            selection.click(Square::D2, &position, &mut view),
            ClickOutcome::Selected(Square::D2)
        );
        assert_eq!(view.snapshot().selected, Some(Square::D2));
        // A blocked own piece keeps the current selection.
        assert_eq!(
            selection.click(Square::A1, &position, &mut view),
            ClickOutcome::Ignored
        );
        assert_eq!(selection.phase(), Phase::SquareSelected(Square::D2));
    }

    #[test]
    fn unreachable_destination_is_ignored() {
        let (mut selection, _human, mut view) = armed();
        let position = GamePosition::new();
        selection.click(Square::E2, &position, &mut view);
        assert_eq!(
            selection.click(Square::E5, &position, &mut view),
            ClickOutcome::Ignored
        );
        assert_eq!(selection.phase(), Phase::SquareSelected(Square::E2));
    }

    #[test]
    fn legal_destination_commits_the_move() {
        let (mut selection, mut human, mut view) = armed();
        let position = GamePosition::new();
        selection.click(Square::E2, &position, &mut view);
        let outcome = selection.click(Square::E4, &position, &mut view);
        let ClickOutcome::Committed(mv) = outcome else {
            panic!("expected a committed move, got {outcome:?}");
        };
        assert_eq!(mv.to_string(), "e2e4");
        assert_eq!(human.try_recv().unwrap(), mv);
        assert_eq!(selection.phase(), Phase::Unarmed);
        assert_eq!(view.snapshot().selected, None);
        // Further clicks wait for the next turn.
        assert_eq!(
            selection.click(Square::D2, &position, &mut view),
            ClickOutcome::Ignored
        );
    }

    #[test]
    fn rearming_clears_the_selection_and_drops_the_old_wait() {
        let (mut selection, mut human, mut view) = armed();
        selection.click(Square::E2, &GamePosition::new(), &mut view);
        let _next = selection.arm(&mut view);
        assert_eq!(selection.phase(), Phase::Armed);
        assert_eq!(view.snapshot().selected, None);
        assert!(human.try_recv().is_err());
    }

    #[test]
    fn promotion_blocks_until_a_piece_is_chosen() {
        let (mut selection, mut human, mut view) = armed();
        let position = GamePosition::from_fen("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        selection.click(Square::A7, &position, &mut view);
        assert_eq!(
            selection.click(Square::A8, &position, &mut view),
            ClickOutcome::PromotionRequired {
                from: Square::A7,
                to: Square::A8
            }
        );
        assert!(human.try_recv().is_err());
        assert_eq!(view.snapshot().promotion.unwrap().roles.len(), 4);

        // Not a legal choice, and a click elsewhere keeps the prompt.
        assert_eq!(
            selection.choose_promotion(Role::King, &mut view),
            ClickOutcome::Ignored
        );
        assert_eq!(
            selection.click(Square::C5, &position, &mut view),
            ClickOutcome::Ignored
        );

        let outcome = selection.choose_promotion(Role::Knight, &mut view);
        let ClickOutcome::Committed(mv) = outcome else {
            panic!("expected a committed move, got {outcome:?}");
        };
        assert_eq!(mv.promotion, Some(Role::Knight));
        assert_eq!(human.try_recv().unwrap().to_string(), "a7a8n");
        assert_eq!(view.snapshot().promotion, None);
    }

    #[test]
    fn clicking_the_pawn_again_abandons_the_prompt() {
        let (mut selection, _human, mut view) = armed();
        let position = GamePosition::from_fen("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        selection.click(Square::A7, &position, &mut view);
        selection.click(Square::A8, &position, &mut view);
        assert_eq!(
            selection.click(Square::A7, &position, &mut view),
            ClickOutcome::Deselected
        );
        assert_eq!(selection.phase(), Phase::Armed);
        assert_eq!(view.snapshot().promotion, None);
    }
}
