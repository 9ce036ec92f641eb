// Child-process environment construction.
//
// Layered lowest to highest precedence: inherited process environment,
// fixed safety defaults, resolved library search path, configured default
// region, administrator overrides. Later inserts win, which is the whole
// mechanism.

use crate::config::ExecutorConfig;
use std::collections::HashMap;

/// Constrained home directory for the child; keeps CLI cache and credential
/// probing out of the host account.
pub const SAFE_HOME: &str = "/tmp";

/// Build the complete environment map for a child process.
pub fn build_env(
    config: &ExecutorConfig,
    library_path: Option<&str>,
) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();

    env.insert("HOME".to_string(), SAFE_HOME.to_string());
    // Empty value disables the interactive pager.
    env.insert("AWS_PAGER".to_string(), String::new());

    if let Some(path) = library_path {
        env.insert("LD_LIBRARY_PATH".to_string(), path.to_string());
    }
    if let Some(region) = &config.default_region {
        if !region.is_empty() {
            env.insert("AWS_DEFAULT_REGION".to_string(), region.clone());
        }
    }
    for (key, value) in &config.env {
        env.insert(key.clone(), value.clone());
    }

    env
}
