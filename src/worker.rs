//! Transports to the analysis worker.
//!
//! A worker is reached only by message passing: lines go in through a [`LineSink`],
//! lines come out on an `mpsc` receiver. [`ProcessWorker`] drives a UCI engine binary;
//! [`message_worker`] gives an in-memory link whose far end is a [`WorkerPeer`].

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::protocol::{EngineCommand, EngineReply};

/// Lines buffered between the worker's output and the channel.
const LINE_BUFFER: usize = 256;

/// How long the engine gets to answer `uci` and `isready` at startup.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("failed to spawn engine {path:?}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("engine i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("engine is gone")]
    Closed,

    #[error("engine did not answer {0}")]
    Handshake(&'static str),
}

/// The input side of a worker.
#[async_trait]
pub trait LineSink: Send {
    /// Deliver one line, without its terminator.
    async fn post(&mut self, line: &str) -> Result<(), WorkerError>;
}

/// Both directions of a connected worker.
pub struct WorkerLink {
    pub sink: Box<dyn LineSink>,
    pub lines: mpsc::Receiver<String>,
}

/// A UCI engine running as a child process.
pub struct ProcessWorker {
    // Killed on drop.
    _child: Child,
    stdin: ChildStdin,
}

impl ProcessWorker {
    /// Spawn the engine at `path` and complete the UCI handshake.
    pub async fn spawn(path: &str) -> Result<WorkerLink, WorkerError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                path: path.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(WorkerError::Closed)?;
        let stdout = child.stdout.take().ok_or(WorkerError::Closed)?;
        let mut output = BufReader::new(stdout).lines();
        let mut worker = ProcessWorker {
            _child: child,
            stdin,
        };

        worker.post(&EngineCommand::Uci.to_string()).await?;
        wait_for(&mut output, EngineReply::UciOk, "uci").await?;
        worker.post(&EngineCommand::IsReady.to_string()).await?;
        wait_for(&mut output, EngineReply::ReadyOk, "isready").await?;
        info!(path, "analysis engine ready");

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        tokio::spawn(async move {
            loop {
                match output.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "engine output failed");
                        break;
                    }
                }
            }
            debug!("engine output closed");
        });

        Ok(WorkerLink {
            sink: Box::new(worker),
            lines: rx,
        })
    }
}

#[async_trait]
impl LineSink for ProcessWorker {
    async fn post(&mut self, line: &str) -> Result<(), WorkerError> {
        self.stdin.write_all(format!("{line}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

async fn wait_for(
    output: &mut Lines<BufReader<ChildStdout>>,
    expected: EngineReply,
    command: &'static str,
) -> Result<(), WorkerError> {
    let handshake = async {
        while let Some(line) = output.next_line().await? {
            debug!(line = line.trim(), "engine >");
            if EngineReply::parse(&line) == expected {
                return Ok::<(), WorkerError>(());
            }
        }
        Err(WorkerError::Handshake(command))
    };
    tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake)
        .await
        .map_err(|_| WorkerError::Handshake(command))?
}

/// The far end of [`message_worker`]: what an embedded worker (or a test) sees.
pub struct WorkerPeer {
    commands: mpsc::UnboundedReceiver<String>,
    replies: mpsc::Sender<String>,
}

impl WorkerPeer {
    /// The next line posted by the channel, or `None` once the link is dropped.
    pub async fn next_command(&mut self) -> Option<String> {
        self.commands.recv().await
    }

    /// A line already posted, if any, without waiting.
    pub fn try_next_command(&mut self) -> Option<String> {
        self.commands.try_recv().ok()
    }

    /// Emit one output line.
    pub async fn reply(&self, line: impl Into<String>) -> Result<(), WorkerError> {
        self.replies
            .send(line.into())
            .await
            .map_err(|_| WorkerError::Closed)
    }
}

struct MessageSink(mpsc::UnboundedSender<String>);

#[async_trait]
impl LineSink for MessageSink {
    async fn post(&mut self, line: &str) -> Result<(), WorkerError> {
        self.0.send(line.to_string()).map_err(|_| WorkerError::Closed)
    }
}

/// An in-memory worker link. Dropping the peer makes the worker unavailable.
pub fn message_worker() -> (WorkerLink, WorkerPeer) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::channel(LINE_BUFFER);
    (
        WorkerLink {
            sink: Box::new(MessageSink(command_tx)),
            lines: reply_rx,
        },
        WorkerPeer {
            commands: command_rx,
            replies: reply_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn message_worker_carries_lines_both_ways() {
        let (mut link, mut peer) = message_worker();
        link.sink.post("isready").await.unwrap();
        assert_eq!(peer.next_command().await.as_deref(), Some("isready"));
        peer.reply("readyok").await.unwrap();
        assert_eq!(link.lines.recv().await.as_deref(), Some("readyok"));
    }

    #[tokio::test]
    async fn dropped_peer_closes_the_link() {
        let (mut link, peer) = message_worker();
        drop(peer);
        assert!(matches!(
            link.sink.post("stop").await,
            Err(WorkerError::Closed)
        ));
        assert_eq!(link.lines.recv().await, None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let result = ProcessWorker::spawn("/nonexistent/engine-binary").await;
        assert!(matches!(result, Err(WorkerError::Spawn { .. })));
    }
}
