//! Engine configuration, loadable from JSON.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::ExecutionConfig;
use crate::rule::Direction;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sign selects the canonical clause: positive keeps the highest metric, otherwise the
    /// lowest.
    pub direction: i32,
    /// Which `:`-separated field of a metric annotation is used.
    pub metric_column: usize,
    pub max_passes: Option<usize>,
    pub max_rewrites: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            direction: -1,
            metric_column: 0,
            max_passes: None,
            max_rewrites: None,
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut contents = String::new();
        File::open(path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn direction(&self) -> Direction {
        Direction::from_sign(self.direction)
    }

    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            max_passes: self.max_passes,
            max_rewrites: self.max_rewrites,
        }
    }
}
