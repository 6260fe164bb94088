//! Bridge configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Relay bridge configuration.
///
/// Missing fields in a JSON config file fall back to these defaults, so a
/// file only needs to override what differs on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Bind host for every listening socket
    pub host: String,
    /// UDP port the device feedback arrives on
    pub feedback_port: u16,
    /// UDP port the helper-script feedback arrives on
    pub script_feedback_port: u16,
    /// WebSocket server port for surface clients
    pub ws_port: u16,
    /// HTTP port for the preset endpoints
    pub http_port: u16,
    /// UDP destination for the device control port
    pub control_destination: String,
    /// UDP destination for the helper-script port
    pub script_destination: String,
    /// Directory preset files are stored in
    pub presets_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            feedback_port: 9000,
            script_feedback_port: 9001,
            ws_port: 8765,
            http_port: 8766,
            control_destination: "127.0.0.1:8000".to_string(),
            script_destination: "127.0.0.1:8001".to_string(),
            presets_dir: PathBuf::from("presets"),
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_feedback_port(mut self, port: u16) -> Self {
        self.feedback_port = port;
        self
    }

    pub fn with_script_feedback_port(mut self, port: u16) -> Self {
        self.script_feedback_port = port;
        self
    }

    pub fn with_ws_port(mut self, port: u16) -> Self {
        self.ws_port = port;
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_control_destination(mut self, destination: impl Into<String>) -> Self {
        self.control_destination = destination.into();
        self
    }

    pub fn with_script_destination(mut self, destination: impl Into<String>) -> Self {
        self.script_destination = destination.into();
        self
    }

    pub fn with_presets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.presets_dir = dir.into();
        self
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn feedback_addr(&self) -> String {
        format!("{}:{}", self.host, self.feedback_port)
    }

    pub fn script_feedback_addr(&self) -> String {
        format!("{}:{}", self.host, self.script_feedback_port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}
