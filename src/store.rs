use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use crate::oracle::{Game, GameObserver};
use crate::settings::Settings;

/// Key holding the movetext of the game in progress.
pub const PGN_KEY: &str = "pgn";

/// Key holding the JSON-encoded [`Settings`].
pub const SETTINGS_KEY: &str = "settings";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("stored settings are unreadable: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// A string key-value store.
pub trait GameStore: Send {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// An in-process store. Clones share the same contents.
#[derive(Clone, Default, Debug)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GameStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key inside a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(FileStore { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl GameStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        // Replaced atomically: readers see the old or the new value.
        let tmp = self.path(&format!(".{key}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path(key))?;
        Ok(())
    }
}

/// Rewrites the movetext under a key whenever the game changes.
pub struct PersistOnChange<S> {
    store: S,
    key: &'static str,
}

impl<S: GameStore> PersistOnChange<S> {
    pub fn new(store: S, key: &'static str) -> Self {
        PersistOnChange { store, key }
    }
}

impl<S: GameStore> GameObserver for PersistOnChange<S> {
    fn game_changed(&mut self, game: &Game) {
        let transcript = game.transcript();
        match self.store.save(self.key, &transcript) {
            Ok(()) => debug!(key = self.key, moves = game.moves().len(), "game saved"),
            Err(e) => warn!(key = self.key, error = %e, "failed to save game"),
        }
    }
}

/// Restore the saved game and keep it saved from now on.
///
/// A missing or unreadable transcript starts a fresh game, which replaces it on the first move.
pub fn open_game<S: GameStore + Clone + 'static>(store: &S) -> Result<Game, StoreError> {
    let mut game = match store.load(PGN_KEY)? {
        Some(text) => Game::from_transcript(&text).unwrap_or_else(|e| {
            warn!(error = %e, "saved game is unreadable, starting a new one");
            Game::new()
        }),
        None => Game::new(),
    };
    game.attach(PersistOnChange::new(store.clone(), PGN_KEY));
    Ok(game)
}

pub fn load_settings(store: &dyn GameStore) -> Result<Option<Settings>, StoreError> {
    match store.load(SETTINGS_KEY)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub fn save_settings(store: &mut dyn GameStore, settings: &Settings) -> Result<(), StoreError> {
    let json = serde_json::to_string(settings)?;
    store.save(SETTINGS_KEY, &json)
}
