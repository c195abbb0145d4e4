//! `lantern.json` - data API, document and session settings.
//!
//! Every field has a default; a missing default-path file is not an error.

use std::path::Path;
use std::time::Duration;

use lantern_data::DataApiConfig;
use lantern_document::{DocumentOptions, RuntimeConfig};
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "lantern.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LanternConfig {
    pub data_api: DataApiConfig,
    pub document: DocumentOptions,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long the cross-fade stays on after a load finishes.
    pub crossfade_ms: u64,
    /// Loads not finished within this raise an error. `0` disables.
    pub load_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { crossfade_ms: 300, load_timeout_ms: 15_000 }
    }
}

impl SessionConfig {
    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_ms > 0).then(|| Duration::from_millis(self.load_timeout_ms))
    }
}

impl LanternConfig {
    /// Load from `path`, or from `lantern.json` in the working directory when
    /// no path is given. Only the implicit default may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false),
        };
        match std::fs::read_to_string(&path) {
            Ok(json) => {
                tracing::info!("[preview] config loaded from {}", path.display());
                Self::parse(&json)
            }
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read { path: path.display().to_string(), source }),
        }
    }

    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Document options with the resolved data API settings folded in.
    pub fn document_options(&self) -> DocumentOptions {
        let api = self.data_api.resolved();
        DocumentOptions {
            runtime: RuntimeConfig {
                api_url: api.url,
                anon_key: api.anon_key,
                service_key: api.service_key,
                poll_interval_ms: api.poll_interval_ms,
                min_quantity: api.min_quantity,
                location_rpc: api.location_rpc,
            },
            ..self.document.clone()
        }
    }
}
