// Executor Configuration
//
// Layered configuration for the command pipeline. Administrators supply zero
// or more raw YAML sources (channel-level, plugin-level, ...); later sources
// override earlier ones field by field, except `env`, which merges key by
// key. The merged record is built once per invocation and immutable after.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed configuration source: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Merged executor configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Region exported as `AWS_DEFAULT_REGION` when set.
    pub default_region: Option<String>,

    /// Tokens prepended to every authorized command line.
    pub prepend_args: Vec<String>,

    /// Allow-list of command prefixes; empty allows everything.
    pub allowed: Vec<String>,

    /// Explicit environment overrides, highest precedence in the child env.
    pub env: HashMap<String, String>,
}

impl ExecutorConfig {
    /// Merge raw YAML sources in order into a single configuration.
    ///
    /// Empty sources are skipped. Later sources win per field;
    /// `env` entries accumulate key by key instead of replacing the map.
    pub fn from_sources<S>(sources: impl IntoIterator<Item = S>) -> Result<Self, ConfigError>
    where
        S: AsRef<[u8]>,
    {
        let mut merged = Self::default();
        for source in sources {
            let raw = source.as_ref();
            if raw.is_empty() {
                continue;
            }
            let layer: ExecutorConfig = serde_yaml::from_slice(raw)?;
            merged.merge(layer);
        }
        Ok(merged)
    }

    /// Load and merge configuration files in order.
    pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let raw = fs::read(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            sources.push(raw);
        }
        Self::from_sources(sources)
    }

    fn merge(&mut self, layer: ExecutorConfig) {
        if let Some(region) = layer.default_region {
            if !region.is_empty() {
                self.default_region = Some(region);
            }
        }
        if !layer.prepend_args.is_empty() {
            self.prepend_args = layer.prepend_args;
        }
        if !layer.allowed.is_empty() {
            self.allowed = layer.allowed;
        }
        for (key, value) in layer.env {
            self.env.insert(key, value);
        }
    }
}
