//! The analysis channel: one long-lived worker link shared by every search.
//!
//! An actor task owns the [`WorkerLink`]. Callers talk to it through
//! [`AnalysisChannel`] and get a [`PendingSearch`] back for each search.
//!
//! UCI carries no request ids, but every `go` ends with exactly one `bestmove`,
//! `stop` included. The actor therefore keeps outstanding searches in a FIFO
//! queue and each `bestmove` settles the oldest one. A reply that arrives late
//! for a cancelled search settles that search (which nobody is waiting on any
//! more) and never the one issued after it.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use shakmaty::uci::Uci;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::oracle::{CandidateMove, GamePosition};
use crate::protocol::{EngineCommand, EngineReply, SearchInfo};
use crate::skill::{EngineOptions, SkillLevel};
use crate::worker::{LineSink, WorkerError, WorkerLink};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("analysis engine is unavailable")]
    EngineUnavailable,

    #[error("analysis engine did not answer within {0:?}")]
    Timeout(Duration),
}

/// Identifies one search, in issue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the chosen move is read from when a search ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    /// The move on the terminating `bestmove` line.
    BestMove,
    /// The first move of the deepest principal variation reported for line 1.
    PrincipalVariation,
}

/// Everything needed to run one search.
#[derive(Clone, Debug)]
pub struct SearchRequest {
    pub position: GamePosition,
    /// The reply is matched against these; the result is always one of them.
    pub legal_moves: Vec<CandidateMove>,
    pub movetime: Duration,
    pub options: EngineOptions,
    pub mode: SearchMode,
}

impl SearchRequest {
    /// A weakened single-line search, as used for the computer's own moves and hints.
    pub fn best_move(position: GamePosition, skill: SkillLevel, movetime: Duration) -> Self {
        let legal_moves = position.legal_moves(None);
        SearchRequest {
            position,
            legal_moves,
            movetime,
            options: EngineOptions::Skill(skill),
            mode: SearchMode::BestMove,
        }
    }

    /// A multi-line search reading its answer from the principal variations.
    pub fn principal_variation(position: GamePosition, lines: u32, movetime: Duration) -> Self {
        let legal_moves = position.legal_moves(None);
        SearchRequest {
            position,
            legal_moves,
            movetime,
            options: EngineOptions::MultiPv { lines },
            mode: SearchMode::PrincipalVariation,
        }
    }
}

enum ChannelCommand {
    Configure(Vec<EngineCommand>),
    Search {
        id: RequestId,
        request: SearchRequest,
        reply: oneshot::Sender<Option<CandidateMove>>,
    },
    Stop,
}

/// Handle to the channel actor. Cloning shares the same worker.
#[derive(Clone)]
pub struct AnalysisChannel {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    next_id: Arc<AtomicU64>,
}

impl AnalysisChannel {
    /// Start the actor on the current runtime. It runs until every handle is
    /// dropped or the worker goes away.
    pub fn spawn(link: WorkerLink) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = ChannelActor {
            commands: rx,
            sink: link.sink,
            lines: link.lines,
            inflight: VecDeque::new(),
        };
        tokio::spawn(actor.run());
        AnalysisChannel {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Send option lines now, outside of any search.
    pub fn configure(&self, options: EngineOptions) -> Result<(), AnalysisError> {
        self.send(ChannelCommand::Configure(options.commands()))
    }

    /// Start a search. The returned future settles with the matching legal move,
    /// or `None` if the engine named no move from `request.legal_moves`.
    pub fn search(&self, request: SearchRequest) -> Result<PendingSearch, AnalysisError> {
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let position = request.position.clone();
        let (reply, rx) = oneshot::channel();
        self.send(ChannelCommand::Search { id, request, reply })?;
        Ok(PendingSearch {
            id,
            position,
            reply: rx,
        })
    }

    /// Ask the worker to stop searching. Best effort: the stopped search still
    /// gets its `bestmove`, which is delivered to its [`PendingSearch`] if that
    /// is still held.
    pub fn cancel(&self) -> Result<(), AnalysisError> {
        self.send(ChannelCommand::Stop)
    }

    fn send(&self, command: ChannelCommand) -> Result<(), AnalysisError> {
        self.commands
            .send(command)
            .map_err(|_| AnalysisError::EngineUnavailable)
    }
}

/// A search in flight, tagged with its id and the position it was issued for.
///
/// Resolves once. Dropping it abandons the search; its reply is then discarded.
#[derive(Debug)]
pub struct PendingSearch {
    id: RequestId,
    position: GamePosition,
    reply: oneshot::Receiver<Option<CandidateMove>>,
}

impl PendingSearch {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The position this search was issued for.
    pub fn position(&self) -> &GamePosition {
        &self.position
    }
}

impl Future for PendingSearch {
    type Output = Result<Option<CandidateMove>, AnalysisError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.reply)
            .poll(cx)
            .map(|r| r.map_err(|_| AnalysisError::EngineUnavailable))
    }
}

/// A search the worker has not finished yet, with its own reply matcher.
struct Inflight {
    id: RequestId,
    legal_moves: Vec<CandidateMove>,
    mode: SearchMode,
    /// Deepest PV seen per `multipv` index.
    lines: BTreeMap<u32, (u32, Vec<Uci>)>,
    reply: oneshot::Sender<Option<CandidateMove>>,
}

impl Inflight {
    fn record(&mut self, info: SearchInfo) {
        if self.mode != SearchMode::PrincipalVariation || info.pv.is_empty() {
            return;
        }
        let depth = info.depth.unwrap_or(0);
        match self.lines.get(&info.multipv) {
            Some((seen, _)) if *seen > depth => {}
            _ => {
                self.lines.insert(info.multipv, (depth, info.pv));
            }
        }
    }

    fn settle(self, best: Option<Uci>) {
        let chosen = match self.mode {
            SearchMode::BestMove => best,
            SearchMode::PrincipalVariation => self
                .lines
                .get(&1)
                .and_then(|(_, pv)| pv.first().cloned()),
        };
        let found = chosen.as_ref().and_then(|uci| match_move(&self.legal_moves, uci));
        if found.is_none() {
            warn!(
                id = %self.id,
                reply = ?chosen.map(|u| u.to_string()),
                "engine reply matches no legal move"
            );
        }
        if self.reply.send(found).is_err() {
            debug!(id = %self.id, "discarding reply for abandoned search");
        }
    }
}

/// The legal move with the same endpoints as `uci`, and the same promotion when it names one.
fn match_move(legal_moves: &[CandidateMove], uci: &Uci) -> Option<CandidateMove> {
    let Uci::Normal {
        from,
        to,
        promotion,
    } = *uci
    else {
        return None;
    };
    legal_moves
        .iter()
        .find(|m| m.from == from && m.to == to && (promotion.is_none() || m.promotion == promotion))
        .cloned()
}

struct ChannelActor {
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    sink: Box<dyn LineSink>,
    lines: mpsc::Receiver<String>,
    inflight: VecDeque<Inflight>,
}

impl ChannelActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.handle(command).await {
                            warn!(error = %e, "analysis worker rejected a command");
                            break;
                        }
                    }
                    None => {
                        let _ = self.post(EngineCommand::Quit).await;
                        break;
                    }
                },
                line = self.lines.recv() => match line {
                    Some(line) => self.on_line(&line),
                    None => {
                        warn!("analysis worker output closed");
                        break;
                    }
                },
            }
        }
        // Dropping the queue wakes every waiting search with `EngineUnavailable`.
        debug!(outstanding = self.inflight.len(), "analysis channel stopped");
    }

    async fn handle(&mut self, command: ChannelCommand) -> Result<(), WorkerError> {
        match command {
            ChannelCommand::Configure(options) => {
                for option in options {
                    self.post(option).await?;
                }
            }
            ChannelCommand::Search { id, request, reply } => {
                debug!(%id, fen = %request.position, "search issued");
                for option in request.options.commands() {
                    self.post(option).await?;
                }
                self.post(EngineCommand::Position {
                    fen: request.position.fen().to_string(),
                })
                .await?;
                self.post(EngineCommand::Go {
                    movetime: request.movetime,
                })
                .await?;
                self.inflight.push_back(Inflight {
                    id,
                    legal_moves: request.legal_moves,
                    mode: request.mode,
                    lines: BTreeMap::new(),
                    reply,
                });
            }
            ChannelCommand::Stop => self.post(EngineCommand::Stop).await?,
        }
        Ok(())
    }

    async fn post(&mut self, command: EngineCommand) -> Result<(), WorkerError> {
        let line = command.to_string();
        debug!(line, "engine <");
        self.sink.post(&line).await
    }

    fn on_line(&mut self, line: &str) {
        match EngineReply::parse(line) {
            EngineReply::Info(info) => {
                if let Some(current) = self.inflight.front_mut() {
                    current.record(info);
                }
            }
            EngineReply::BestMove { best, .. } => {
                debug!(line, "engine >");
                match self.inflight.pop_front() {
                    Some(search) => search.settle(best),
                    None => debug!(line, "bestmove with no search outstanding"),
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use shakmaty::Square;

    use super::*;

    #[test]
    fn match_prefers_named_promotion() {
        let position = GamePosition::from_fen("8/P7/8/8/8/8/8/k6K w - - 0 1").unwrap();
        let legal = position.legal_moves(None);
        let knight = match_move(&legal, &Uci::from_str("a7a8n").unwrap()).unwrap();
        assert_eq!(knight.promotion, Some(shakmaty::Role::Knight));
        let any = match_move(&legal, &Uci::from_str("a7a8").unwrap()).unwrap();
        assert_eq!(any.to, Square::A8);
        assert!(match_move(&legal, &Uci::from_str("a7b8q").unwrap()).is_none());
    }

    #[test]
    fn keeps_deepest_variation_per_line() {
        let (reply, _rx) = oneshot::channel();
        let mut search = Inflight {
            id: RequestId(1),
            legal_moves: Vec::new(),
            mode: SearchMode::PrincipalVariation,
            lines: BTreeMap::new(),
            reply,
        };
        let info = |depth, multipv, pv: &[&str]| SearchInfo {
            depth: Some(depth),
            multipv,
            pv: pv.iter().map(|m| Uci::from_str(m).unwrap()).collect(),
        };
        search.record(info(10, 1, &["e2e4", "e7e5"]));
        search.record(info(8, 1, &["d2d4"]));
        search.record(info(9, 2, &["g1f3"]));
        assert_eq!(search.lines[&1].0, 10);
        assert_eq!(search.lines[&1].1[0].to_string(), "e2e4");
        assert_eq!(search.lines[&2].1[0].to_string(), "g1f3");
    }
}
