use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not valid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// How long searches may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timing {
    /// `go movetime` for the computer's moves.
    pub movetime: Duration,
    /// `go movetime` for hints.
    pub hint_movetime: Duration,
    /// Extra wait past `movetime` before the engine counts as unresponsive.
    pub reply_grace: Duration,
    /// Pause before play resumes after an engine failure.
    pub retry_backoff: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            movetime: Duration::from_millis(1000),
            hint_movetime: Duration::from_millis(1000),
            reply_grace: Duration::from_millis(5000),
            retry_backoff: Duration::from_millis(2000),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// UCI engine binary
    pub engine_path: String,
    pub timing: Timing,
    /// Directory for the saved game and settings
    pub save_dir: PathBuf,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    /// Read `ENGINE_PATH`, `ENGINE_MOVETIME_MS`, `HINT_MOVETIME_MS`, `REPLY_GRACE_MS`,
    /// `RETRY_BACKOFF_MS`, `SAVE_DIR` and `BIND_ADDR`, falling back to defaults for
    /// unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Timing::default();
        let millis = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parsed::<u64>(&lookup, name)?.map_or(default, Duration::from_millis))
        };

        Ok(AppConfig {
            engine_path: lookup("ENGINE_PATH").unwrap_or_else(|| "stockfish".to_string()),
            timing: Timing {
                movetime: millis("ENGINE_MOVETIME_MS", defaults.movetime)?,
                hint_movetime: millis("HINT_MOVETIME_MS", defaults.hint_movetime)?,
                reply_grace: millis("REPLY_GRACE_MS", defaults.reply_grace)?,
                retry_backoff: millis("RETRY_BACKOFF_MS", defaults.retry_backoff)?,
            },
            save_dir: lookup("SAVE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".engine-play")),
            bind_addr: parsed(&lookup, "BIND_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080))),
        })
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.engine_path, "stockfish");
        assert_eq!(config.timing, Timing::default());
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("ENGINE_PATH", "/opt/sf/stockfish"),
            ("ENGINE_MOVETIME_MS", "250"),
            ("RETRY_BACKOFF_MS", "500"),
            ("BIND_ADDR", "0.0.0.0:9000"),
        ])
        .unwrap();
        assert_eq!(config.engine_path, "/opt/sf/stockfish");
        assert_eq!(config.timing.movetime, Duration::from_millis(250));
        assert_eq!(config.timing.hint_movetime, Duration::from_millis(1000));
        assert_eq!(config.timing.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn malformed_numbers_are_errors() {
        assert_eq!(
            config(&[("REPLY_GRACE_MS", "soon")]).unwrap_err(),
            ConfigError::Invalid {
                name: "REPLY_GRACE_MS",
                value: "soon".to_string()
            }
        );
    }
}
