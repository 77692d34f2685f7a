pub mod channel;
pub mod chess_serde;
pub mod config;
pub mod controller;
pub mod hint;
pub mod oracle;
pub mod protocol;
pub mod selection;
#[cfg(feature = "server")]
pub mod server;
pub mod server_types;
pub mod settings;
pub mod skill;
pub mod store;
pub mod transcript;
pub mod view;
pub mod worker;

pub use shakmaty;

pub use channel::{AnalysisChannel, AnalysisError, PendingSearch, SearchRequest};
pub use config::{AppConfig, Timing};
pub use controller::{Controller, ControllerError, UiEvent};
pub use oracle::{CandidateMove, Game, GameError, GamePosition};
pub use settings::{Difficulty, Settings, SettingsUpdate};
pub use skill::SkillLevel;
pub use store::{FileStore, GameStore, MemoryStore};
pub use view::{BoardSnapshot, BoardView, SnapshotView};
pub use worker::{message_worker, ProcessWorker, WorkerError, WorkerLink, WorkerPeer};
