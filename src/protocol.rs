//! The UCI subset spoken with the analysis worker.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use shakmaty::uci::Uci;

/// A request line sent to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Uci,
    IsReady,
    SetOption { name: &'static str, value: String },
    Position { fen: String },
    Go { movetime: Duration },
    Stop,
    Quit,
}

impl EngineCommand {
    pub fn set_option(name: &'static str, value: impl fmt::Display) -> Self {
        EngineCommand::SetOption {
            name,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineCommand::Uci => f.write_str("uci"),
            EngineCommand::IsReady => f.write_str("isready"),
            EngineCommand::SetOption { name, value } => {
                write!(f, "setoption name {name} value {value}")
            }
            EngineCommand::Position { fen } => write!(f, "position fen {fen}"),
            EngineCommand::Go { movetime } => write!(f, "go movetime {}", movetime.as_millis()),
            EngineCommand::Stop => f.write_str("stop"),
            EngineCommand::Quit => f.write_str("quit"),
        }
    }
}

/// A progress report from an `info` line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchInfo {
    pub depth: Option<u32>,
    /// 1-based index of the reported line; engines omit it when `MultiPV` is 1.
    pub multipv: u32,
    pub pv: Vec<Uci>,
}

/// A response line received from the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReply {
    UciOk,
    ReadyOk,
    /// The end of a search. `best` is `None` for `bestmove (none)` or an unreadable move.
    BestMove {
        best: Option<Uci>,
        ponder: Option<Uci>,
    },
    Info(SearchInfo),
    Other,
}

impl EngineReply {
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("uciok") => EngineReply::UciOk,
            Some("readyok") => EngineReply::ReadyOk,
            Some("bestmove") => {
                let best = tokens.next().and_then(parse_move);
                let ponder = match tokens.next() {
                    Some("ponder") => tokens.next().and_then(parse_move),
                    _ => None,
                };
                EngineReply::BestMove { best, ponder }
            }
            Some("info") => EngineReply::Info(parse_info(tokens)),
            _ => EngineReply::Other,
        }
    }
}

/// A board move in `[a-h][1-8][a-h][1-8][qrbnk]?` form.
fn parse_move(token: &str) -> Option<Uci> {
    match Uci::from_str(token) {
        Ok(uci @ Uci::Normal { .. }) => Some(uci),
        _ => None,
    }
}

fn parse_info<'a>(mut tokens: impl Iterator<Item = &'a str>) -> SearchInfo {
    let mut info = SearchInfo {
        multipv: 1,
        ..SearchInfo::default()
    };
    while let Some(token) = tokens.next() {
        match token {
            "depth" => info.depth = tokens.next().and_then(|v| v.parse().ok()),
            "multipv" => {
                if let Some(n) = tokens.next().and_then(|v| v.parse().ok()) {
                    info.multipv = n;
                }
            }
            // `string` swallows the rest of the line
            "string" => break,
            "pv" => {
                info.pv = tokens.by_ref().map_while(parse_move).collect();
                break;
            }
            _ => {}
        }
    }
    info
}
