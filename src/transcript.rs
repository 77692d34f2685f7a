//! SAN movetext, the persisted form of a game.

use std::str::FromStr;

use shakmaty::{san::SanPlus, Color, Position};

use crate::oracle::{CandidateMove, GameError, GamePosition};

/// Render `moves` played from `start` as numbered SAN movetext.
pub fn write_movetext(start: &GamePosition, moves: &[CandidateMove]) -> String {
    let mut chess = start.chess().clone();
    let mut tokens = Vec::with_capacity(moves.len() * 3 / 2 + 1);
    for (i, mv) in moves.iter().enumerate() {
        let number = chess.fullmoves();
        match chess.turn() {
            Color::White => tokens.push(format!("{number}.")),
            Color::Black if i == 0 => tokens.push(format!("{number}...")),
            Color::Black => {}
        }
        let san = SanPlus::from_move_and_play_unchecked(&mut chess, mv.as_move());
        tokens.push(san.to_string());
    }
    tokens.join(" ")
}

/// Parse movetext played from `start` back into legal moves.
///
/// Tag pairs, move numbers, comments, NAGs and the result marker are skipped.
pub fn read_movetext(start: &GamePosition, text: &str) -> Result<Vec<CandidateMove>, GameError> {
    let mut position = start.clone();
    let mut moves = Vec::new();
    let mut in_comment = false;

    let body = text
        .lines()
        .filter(|line| !line.trim_start().starts_with('['))
        .collect::<Vec<_>>()
        .join(" ");

    for raw in body.split_whitespace() {
        if in_comment {
            in_comment = !raw.ends_with('}');
            continue;
        }
        if raw.starts_with('{') {
            in_comment = !raw.ends_with('}');
            continue;
        }
        if matches!(raw, "1-0" | "0-1" | "1/2-1/2" | "*") {
            break;
        }
        let token = raw
            .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.')
            .trim_end_matches(['?', '!']);
        if token.is_empty() || token.starts_with('$') {
            continue;
        }

        let invalid = |reason: String| GameError::InvalidTranscript {
            token: raw.to_string(),
            reason,
        };
        let san = SanPlus::from_str(token).map_err(|e| invalid(e.to_string()))?;
        let m = san
            .san
            .to_move(position.chess())
            .map_err(|e| invalid(e.to_string()))?;
        let mv = position
            .legal_moves(m.from())
            .into_iter()
            .find(|c| c.as_move() == &m)
            .ok_or_else(|| invalid("not a legal move".to_string()))?;
        position = position.apply(&mv)?;
        moves.push(mv);
    }

    if in_comment {
        return Err(GameError::InvalidTranscript {
            token: "{".to_string(),
            reason: "unterminated comment".to_string(),
        });
    }
    Ok(moves)
}
