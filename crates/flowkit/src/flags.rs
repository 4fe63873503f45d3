//! Global options passed down from the command line.

use std::path::PathBuf;

use crate::config::EMULATOR_NETWORK;

/// Options shared by every command.
///
/// The command line owns parsing; the engine only reads these values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flags {
    /// Network to operate on.
    pub network: String,
    /// Access node host overriding the network's configured host.
    pub host: Option<String>,
    /// Access node public key for a secure connection to `host`.
    pub network_key: Option<String>,
    /// Configuration files to layer; empty means the default paths.
    pub config_paths: Vec<PathBuf>,
    pub skip_version_check: bool,
    /// Approve prompts automatically.
    pub yes: bool,
    pub log_level: String,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            network: EMULATOR_NETWORK.to_string(),
            host: None,
            network_key: None,
            config_paths: Vec::new(),
            skip_version_check: false,
            yes: false,
            log_level: "info".to_string(),
        }
    }
}

impl Flags {
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub fn with_config_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.config_paths = paths;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}
