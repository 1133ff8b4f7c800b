//! Configuration loading for the `trainsql` binary: a small struct with a
//! `confy`-backed default so the server/REPL runs with zero configuration
//! present, plus an explicit file path override for `-c/--config`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_PROMPT: &str = "trainSQL";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4791";
const DEFAULT_DATA_DIR: &str = "data/trainsql";

/// Which `trainsql::storage::engine::Engine` impl backs a session's `MVCC`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Memory,
    LogCask,
}

impl Default for EngineKind {
    fn default() -> Self {
        EngineKind::Memory
    }
}

impl std::str::FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(EngineKind::Memory),
            "logcask" => Ok(EngineKind::LogCask),
            other => Err(anyhow::anyhow!("unknown engine '{}' (expected memory or logcask)", other)),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP address the line server binds to.
    pub listen_addr: String,

    /// On-disk directory used by the `logcask` engine. Ignored for `memory`.
    pub data_dir: PathBuf,

    /// Which storage engine new sessions are opened against.
    pub engine: EngineKind,

    /// REPL prompt prefix, rendered as `"{prompt}>> "`.
    pub prompt: String,

    /// Print timing/row-count stats after each statement in the REPL.
    pub show_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            engine: EngineKind::default(),
            prompt: DEFAULT_PROMPT.to_string(),
            show_stats: false,
        }
    }
}

impl Config {
    /// Loads from an explicit path if given, otherwise from the platform
    /// config directory under the app name `trainsql` (created with
    /// defaults on first run).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => confy::load_path(p)
                .with_context(|| format!("loading configuration from {}", p.display())),
            None => confy::load("trainsql", "config").context("loading default configuration"),
        }
    }
}
