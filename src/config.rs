use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::{fs::read_to_string, path::Path};

/// Runtime knobs for a [`crate::graph::Graph`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Run the symmetry and ordering checks after every remote batch.
    pub verify_invariants: bool,
    /// Default for fields that leave `reset_on_remote_update` unset.
    pub reset_local_on_remote_update: bool,
    /// Suppress change notifications for edges touched while unloading an identifier.
    pub silence_unload_notifications: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            verify_invariants: cfg!(debug_assertions),
            reset_local_on_remote_update: true,
            silence_unload_notifications: false,
        }
    }
}

impl GraphConfig {
    pub fn from_toml_str(content: &str) -> Result<GraphConfig, GraphError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<GraphConfig, GraphError> {
        tracing::debug!("Reading graph config from {:?}", path.as_ref());
        if !path.as_ref().exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(GraphConfig::default());
        }
        let content = read_to_string(path)?;
        GraphConfig::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, GraphError> {
        Ok(toml::to_string(self)?)
    }
}
