//! The move oracle: value-semantics positions and the game record built on [`shakmaty`].
//!
//! Everything the rest of the crate knows about chess rules goes through this module.
//! A [`GamePosition`] is never mutated; applying a move produces a new one, so a
//! position can be retained and later compared with the live one to detect staleness.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use shakmaty::{
    fen::Fen, uci::Uci, CastlingMode, Chess, Color, EnPassantMode, Move, Outcome, Position, Role,
    Square,
};
use thiserror::Error;
use tracing::debug;

use crate::transcript;

/// The FEN of the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Half-moves without capture or pawn move after which the game is drawn.
const FIFTY_MOVE_PLIES: u32 = 100;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    /// The move was never validated against this position.
    /// This is a bug in the caller.
    #[error("move {uci} is not legal in {fen}")]
    IllegalMove { uci: String, fen: String },

    #[error("invalid FEN {fen:?}: {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("invalid movetext at {token:?}: {reason}")]
    InvalidTranscript { token: String, reason: String },
}

/// An immutable snapshot of the game state.
///
/// Two positions are equal when their FEN text is equal, clocks included.
#[derive(Clone, Debug)]
pub struct GamePosition {
    chess: Chess,
    fen: String,
}

impl GamePosition {
    /// The standard starting position.
    pub fn new() -> Self {
        Self::from_chess(Chess::default())
    }

    pub fn from_fen(text: &str) -> Result<Self, GameError> {
        let invalid = |reason: String| GameError::InvalidFen {
            fen: text.to_string(),
            reason,
        };
        let fen = Fen::from_str(text.trim()).map_err(|e| invalid(e.to_string()))?;
        let chess: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Self::from_chess(chess))
    }

    pub(crate) fn from_chess(chess: Chess) -> Self {
        let fen = Fen::from_position(chess.clone(), EnPassantMode::Legal).to_string();
        Self { chess, fen }
    }

    pub(crate) fn chess(&self) -> &Chess {
        &self.chess
    }

    pub fn fen(&self) -> &str {
        &self.fen
    }

    pub fn is_starting_position(&self) -> bool {
        self.fen == STARTING_FEN
    }

    pub fn turn(&self) -> Color {
        self.chess.turn()
    }

    pub fn in_check(&self) -> bool {
        self.chess.is_check()
    }

    /// The colour of the piece on `square`, if any.
    pub fn color_at(&self, square: Square) -> Option<Color> {
        self.chess.board().color_at(square)
    }

    /// Checkmate, stalemate, insufficient material or the fifty-move rule.
    ///
    /// Repetition needs the move history and is handled by [`Game::outcome`].
    pub fn is_game_over(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.chess.outcome().or_else(|| {
            (self.chess.halfmoves() >= FIFTY_MOVE_PLIES).then_some(Outcome::Draw)
        })
    }

    /// Legal moves in this position, restricted to those leaving `from` when given.
    pub fn legal_moves(&self, from: Option<Square>) -> Vec<CandidateMove> {
        self.chess
            .legal_moves()
            .iter()
            .filter(|m| from.map_or(true, |sq| m.from() == Some(sq)))
            .filter_map(|m| CandidateMove::from_move(&self.chess, m))
            .collect()
    }

    /// Play `mv`, returning the resulting position.
    ///
    /// Fails with [`GameError::IllegalMove`] if `mv` is not legal here.
    pub fn apply(&self, mv: &CandidateMove) -> Result<GamePosition, GameError> {
        match self.chess.clone().play(&mv.inner) {
            Ok(next) => Ok(Self::from_chess(next)),
            Err(_) => Err(GameError::IllegalMove {
                uci: mv.to_string(),
                fen: self.fen.clone(),
            }),
        }
    }

    /// Board, side to move, castling rights and en passant square, without clocks.
    fn repetition_key(&self) -> impl Iterator<Item = &str> {
        self.fen.split(' ').take(4)
    }
}

impl Default for GamePosition {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for GamePosition {
    fn eq(&self, other: &Self) -> bool {
        self.fen == other.fen
    }
}

impl Eq for GamePosition {}

impl fmt::Display for GamePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen)
    }
}

/// A legal move as produced by [`GamePosition::legal_moves`].
///
/// Castling is expressed by the king's own endpoints (`e1g1`), which is
/// what both a clicking user and a UCI engine produce.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CandidateMove {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
    pub capture: bool,
    pub check: bool,
    inner: Move,
}

impl CandidateMove {
    fn from_move(chess: &Chess, m: &Move) -> Option<Self> {
        let Uci::Normal {
            from,
            to,
            promotion,
        } = m.to_uci(CastlingMode::Standard)
        else {
            return None;
        };
        let mut after = chess.clone();
        after.play_unchecked(m);
        Some(Self {
            from,
            to,
            promotion,
            capture: m.is_capture(),
            check: after.is_check(),
            inner: m.clone(),
        })
    }

    pub fn uci(&self) -> Uci {
        self.inner.to_uci(CastlingMode::Standard)
    }

    pub(crate) fn as_move(&self) -> &Move {
        &self.inner
    }
}

impl fmt::Display for CandidateMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uci())
    }
}

impl Serialize for CandidateMove {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

/// Something that wants to hear about every change to a [`Game`].
pub trait GameObserver: Send {
    fn game_changed(&mut self, game: &Game);
}

/// The game record: where the game started, what was played, and the live position.
pub struct Game {
    /// `positions[0]` is the start, `positions[i]` the position after `moves[i - 1]`.
    positions: Vec<GamePosition>,
    moves: Vec<CandidateMove>,
    observers: Vec<Box<dyn GameObserver>>,
}

impl Game {
    pub fn new() -> Self {
        Self::from_position(GamePosition::new())
    }

    pub fn from_position(start: GamePosition) -> Self {
        Self {
            positions: vec![start],
            moves: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Rebuild a game from the standard start and a movetext transcript.
    pub fn from_transcript(text: &str) -> Result<Self, GameError> {
        let mut game = Self::new();
        for mv in transcript::read_movetext(&GamePosition::new(), text)? {
            game.push(mv)?;
        }
        Ok(game)
    }

    /// Attach an observer. It is not notified of the current state.
    pub fn attach(&mut self, observer: impl GameObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The live position.
    pub fn position(&self) -> &GamePosition {
        // Never empty: the start position is always kept.
        &self.positions[self.positions.len() - 1]
    }

    pub fn start(&self) -> &GamePosition {
        &self.positions[0]
    }

    pub fn moves(&self) -> &[CandidateMove] {
        &self.moves
    }

    pub fn last_move(&self) -> Option<&CandidateMove> {
        self.moves.last()
    }

    /// Apply `mv` to the live position and notify observers.
    pub fn play(&mut self, mv: &CandidateMove) -> Result<&GamePosition, GameError> {
        self.push(mv.clone())?;
        debug!(%mv, fen = %self.position(), "move applied");
        self.notify();
        Ok(self.position())
    }

    fn push(&mut self, mv: CandidateMove) -> Result<(), GameError> {
        let next = self.position().apply(&mv)?;
        self.positions.push(next);
        self.moves.push(mv);
        Ok(())
    }

    /// Take back up to `plies` moves. Returns how many were taken back.
    pub fn undo(&mut self, plies: usize) -> usize {
        let undone = plies.min(self.moves.len());
        if undone > 0 {
            self.moves.truncate(self.moves.len() - undone);
            self.positions.truncate(self.positions.len() - undone);
            self.notify();
        }
        undone
    }

    /// Go back to the start position, dropping every move.
    pub fn reset(&mut self) {
        self.positions.truncate(1);
        self.moves.clear();
        self.notify();
    }

    /// The result of the game, including draws by threefold repetition.
    pub fn outcome(&self) -> Option<Outcome> {
        self.position().outcome().or_else(|| {
            let live = self.position();
            let seen = self
                .positions
                .iter()
                .filter(|p| p.repetition_key().eq(live.repetition_key()))
                .count();
            (seen >= 3).then_some(Outcome::Draw)
        })
    }

    /// The moves played so far as SAN movetext, e.g. `1. e4 e5 2. Nf3`.
    pub fn transcript(&self) -> String {
        transcript::write_movetext(self.start(), &self.moves)
    }

    fn notify(&mut self) {
        // Observers only get `&Game`, so none can be attached while they run.
        let mut observers = std::mem::take(&mut self.observers);
        for observer in observers.iter_mut() {
            observer.game_changed(self);
        }
        self.observers = observers;
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("position", self.position())
            .field("moves", &self.moves.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn find(position: &GamePosition, uci: &str) -> CandidateMove {
        position
            .legal_moves(None)
            .into_iter()
            .find(|m| m.to_string() == uci)
            .unwrap()
    }

    #[test]
    fn legal_moves_from_square_only_leave_that_square() {
        let position = GamePosition::new();
        let moves = position.legal_moves(Some(Square::E2));
        assert_eq!(moves.len(), 2);
        assert!(moves.iter().all(|m| m.from == Square::E2));
        assert!(moves.iter().any(|m| m.to == Square::E4));
        assert!(position.legal_moves(Some(Square::E4)).is_empty());
        assert!(position.legal_moves(Some(Square::E7)).is_empty());
    }

    #[test]
    fn apply_returns_a_new_position() {
        let start = GamePosition::new();
        let after = start.apply(&find(&start, "e2e4")).unwrap();
        assert!(start.is_starting_position());
        assert_eq!(after.turn(), Color::Black);
        assert_ne!(start, after);
        assert_eq!(after, GamePosition::from_fen(after.fen()).unwrap());
    }

    #[test]
    fn apply_rejects_a_move_from_another_position() {
        let start = GamePosition::new();
        let e4 = find(&start, "e2e4");
        let after = start.apply(&e4).unwrap();
        assert!(matches!(
            after.apply(&e4),
            Err(GameError::IllegalMove { .. })
        ));
    }

    #[test]
    fn castling_uses_king_endpoints() {
        let position =
            GamePosition::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let castles: Vec<_> = position
            .legal_moves(Some(Square::E1))
            .into_iter()
            .filter(|m| m.to == Square::G1 || m.to == Square::C1)
            .collect();
        assert_eq!(castles.len(), 2);
        let after = position.apply(&castles[0]).unwrap();
        assert_eq!(after.turn(), Color::Black);
    }

    #[test]
    fn promotion_choices_are_separate_moves() {
        let position = GamePosition::from_fen("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        let promotions: Vec<_> = position
            .legal_moves(Some(Square::A7))
            .into_iter()
            .filter(|m| m.to == Square::A8)
            .collect();
        assert_eq!(promotions.len(), 4);
        assert!(promotions.iter().any(|m| m.promotion == Some(Role::Queen)));
        assert!(promotions.iter().any(|m| m.promotion == Some(Role::Knight)));
    }

    #[test]
    fn check_flag_and_mate() {
        let mut game = Game::new();
        for uci in ["f2f3", "e7e5", "g2g4"] {
            let mv = find(game.position(), uci);
            game.play(&mv).unwrap();
        }
        let mate = find(game.position(), "d8h4");
        assert!(mate.check);
        game.play(&mate).unwrap();
        assert!(game.position().in_check());
        assert_eq!(
            game.outcome(),
            Some(Outcome::Decisive {
                winner: Color::Black
            })
        );
    }

    #[test]
    fn threefold_repetition_is_a_draw() {
        let mut game = Game::new();
        for _ in 0..2 {
            for uci in ["g1f3", "g8f6", "f3g1", "f6g8"] {
                let mv = find(game.position(), uci);
                game.play(&mv).unwrap();
            }
        }
        assert_eq!(game.outcome(), Some(Outcome::Draw));
    }

    struct Counter(Arc<Mutex<Vec<usize>>>);

    impl GameObserver for Counter {
        fn game_changed(&mut self, game: &Game) {
            self.0.lock().unwrap().push(game.moves().len());
        }
    }

    #[test]
    fn observers_see_play_undo_and_reset() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut game = Game::new();
        game.attach(Counter(seen.clone()));
        for uci in ["e2e4", "e7e5", "g1f3"] {
            let mv = find(game.position(), uci);
            game.play(&mv).unwrap();
        }
        assert_eq!(game.undo(2), 2);
        assert_eq!(game.undo(0), 0);
        game.reset();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 1, 0]);
        assert!(game.position().is_starting_position());
    }
}
