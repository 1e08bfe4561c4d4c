//! Normalizer configuration.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use xrayreco_core::{Error, Result};

/// What a dataset build does with events lacking a full neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgePolicy {
    /// Exclude the event from every dataset and record its index.
    #[default]
    Skip,
    /// Fail the whole build on the first such event.
    Abort,
}

/// Configuration for the event normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Policy for sensor-edge events.
    pub edge_policy: EdgePolicy,
}

#[derive(Deserialize)]
struct JsonConfig {
    #[serde(default)]
    normalizer: JsonNormalizer,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct JsonNormalizer {
    edge_policy: EdgePolicy,
}

impl NormalizerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the edge-event policy.
    #[must_use]
    pub fn with_edge_policy(mut self, policy: EdgePolicy) -> Self {
        self.edge_policy = policy;
        self
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::ConfigError(format!("cannot open {}: {e}", path.display())))?;
        let json: JsonConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))?;
        Ok(Self::from_json_config(json))
    }

    /// Loads a configuration from a JSON string.
    ///
    /// Missing fields keep their defaults.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the string is not a valid configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let json: JsonConfig =
            serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))?;
        Ok(Self::from_json_config(json))
    }

    fn from_json_config(config: JsonConfig) -> Self {
        Self {
            edge_policy: config.normalizer.edge_policy,
        }
    }
}
