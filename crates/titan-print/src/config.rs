//! # Print Configuration
//!
//! Configuration shared by the bridge service and the client-side
//! orchestrator.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TITAN_PRINTER_ADDRESS=00:11:22:33:44:55                            │
//! │     TITAN_PRINTER_CHANNEL=1                                            │
//! │     TITAN_BRIDGE_PORT=3001                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/print.toml (Linux)                                   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # print.toml
//! [device]
//! address = "00:11:22:33:44:55"
//! channel = 1
//! node_dir = "/dev"
//! primary_node = 0
//! secondary_node = 1
//!
//! [bridge]
//! bind_addr = "0.0.0.0"
//! port = 3001
//! print_timeout_secs = 20
//! fallback_dir = "/var/lib/titan/receipts"
//!
//! [receipt]
//! line_width = 32
//! currency = "PHP"
//!
//! [client]
//! bridge_url = "http://127.0.0.1:3001"
//! submit_margin_secs = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use titan_core::{DEFAULT_CURRENCY, DEFAULT_LINE_WIDTH};

use crate::error::{PrintError, PrintResult};

/// Highest RFCOMM channel number.
pub const MAX_RFCOMM_CHANNEL: u8 = 30;

// =============================================================================
// Device Settings
// =============================================================================

/// The physical printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Bluetooth address of the printer.
    #[serde(default)]
    pub address: Option<String>,

    /// RFCOMM channel. When unset the primary driver is unavailable and the
    /// secondary driver discovers one.
    #[serde(default)]
    pub channel: Option<u8>,

    /// Directory holding the rfcomm device nodes.
    #[serde(default = "default_node_dir")]
    pub node_dir: PathBuf,

    /// Local device node (`rfcommN`) the primary driver binds. Unrelated to
    /// the remote channel.
    #[serde(default = "default_primary_node")]
    pub primary_node: u8,

    /// Local device node the secondary driver binds.
    #[serde(default = "default_secondary_node")]
    pub secondary_node: u8,
}

fn default_node_dir() -> PathBuf {
    PathBuf::from("/dev")
}

fn default_primary_node() -> u8 {
    0
}

fn default_secondary_node() -> u8 {
    1
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            address: None,
            channel: None,
            node_dir: default_node_dir(),
            primary_node: default_primary_node(),
            secondary_node: default_secondary_node(),
        }
    }
}

// =============================================================================
// Bridge Settings
// =============================================================================

/// The bridge service process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Budget for one print request, driver fallback included (seconds).
    #[serde(default = "default_print_timeout")]
    pub print_timeout_secs: u64,

    /// Where receipts are saved when printing fails. Disabled when unset.
    #[serde(default)]
    pub fallback_dir: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_print_timeout() -> u64 {
    20
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
            print_timeout_secs: default_print_timeout(),
            fallback_dir: None,
        }
    }
}

// =============================================================================
// Receipt Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptSettings {
    /// Printable characters per line.
    #[serde(default = "default_line_width")]
    pub line_width: usize,

    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_line_width() -> usize {
    DEFAULT_LINE_WIDTH
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        ReceiptSettings {
            line_width: default_line_width(),
            currency: default_currency(),
        }
    }
}

// =============================================================================
// Client Settings
// =============================================================================

/// How the POS client reaches the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    /// Added on top of the bridge's own budget so a slow but successful
    /// print is not reported as a timeout.
    #[serde(default = "default_submit_margin")]
    pub submit_margin_secs: u64,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:3001".to_string()
}

fn default_submit_margin() -> u64 {
    5
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            bridge_url: default_bridge_url(),
            submit_margin_secs: default_submit_margin(),
        }
    }
}

// =============================================================================
// Main Print Configuration
// =============================================================================

/// Complete print configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrintConfig {
    #[serde(default)]
    pub device: DeviceSettings,

    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub receipt: ReceiptSettings,

    #[serde(default)]
    pub client: ClientSettings,
}

impl PrintConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (print.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> PrintResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading print config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| PrintError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load print config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> PrintResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| PrintError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PrintError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| PrintError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Print config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> PrintResult<()> {
        if let Some(channel) = self.device.channel {
            if channel == 0 || channel > MAX_RFCOMM_CHANNEL {
                return Err(PrintError::InvalidConfig(format!(
                    "channel must be between 1 and {}, got {}",
                    MAX_RFCOMM_CHANNEL, channel
                )));
            }
        }

        if self.device.primary_node == self.device.secondary_node {
            return Err(PrintError::InvalidConfig(format!(
                "primary and secondary drivers need different device nodes, both are rfcomm{}",
                self.device.primary_node
            )));
        }

        if let Some(ref address) = self.device.address {
            if address.trim().is_empty() {
                return Err(PrintError::InvalidConfig("device address is empty".into()));
            }
        }

        titan_core::validation::validate_line_width(self.receipt.line_width)
            .map_err(|e| PrintError::InvalidConfig(e.to_string()))?;

        if self.bridge.print_timeout_secs == 0 {
            return Err(PrintError::InvalidConfig(
                "print_timeout_secs must be greater than 0".into(),
            ));
        }

        let url = Url::parse(&self.client.bridge_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PrintError::InvalidConfig(format!(
                "bridge URL must be http:// or https://, got: {}",
                self.client.bridge_url
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(address) = std::env::var("TITAN_PRINTER_ADDRESS") {
            debug!(address = %address, "Overriding printer address from environment");
            self.device.address = Some(address);
        }

        if let Ok(channel) = std::env::var("TITAN_PRINTER_CHANNEL") {
            match channel.parse::<u8>() {
                Ok(c) => self.device.channel = Some(c),
                Err(_) => warn!(value = %channel, "Ignoring invalid TITAN_PRINTER_CHANNEL"),
            }
        }

        if let Ok(port) = std::env::var("TITAN_BRIDGE_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.bridge.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid TITAN_BRIDGE_PORT"),
            }
        }

        if let Ok(width) = std::env::var("TITAN_LINE_WIDTH") {
            match width.parse::<usize>() {
                Ok(w) => self.receipt.line_width = w,
                Err(_) => warn!(value = %width, "Ignoring invalid TITAN_LINE_WIDTH"),
            }
        }

        if let Ok(secs) = std::env::var("TITAN_PRINT_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.bridge.print_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid TITAN_PRINT_TIMEOUT_SECS"),
            }
        }

        if let Ok(url) = std::env::var("TITAN_BRIDGE_URL") {
            self.client.bridge_url = url;
        }

        if let Ok(dir) = std::env::var("TITAN_PRINT_FALLBACK_DIR") {
            self.bridge.fallback_dir = Some(PathBuf::from(dir));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "titan", "pos")
            .map(|dirs| dirs.config_dir().join("print.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// `bind_addr:port` for the bridge listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bridge.bind_addr, self.bridge.port)
    }

    pub fn print_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.print_timeout_secs)
    }

    /// Client-side budget: the bridge budget plus the margin.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.print_timeout_secs + self.client.submit_margin_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PrintConfig::default();
        assert_eq!(config.bridge.port, 3001);
        assert_eq!(config.receipt.line_width, 32);
        assert_eq!(config.receipt.currency, "PHP");
        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_submit_timeout_exceeds_bridge_budget() {
        let config = PrintConfig::default();
        assert!(config.submit_timeout() > config.print_timeout());
        assert_eq!(config.submit_timeout(), Duration::from_secs(25));
    }

    #[test]
    fn test_config_validation() {
        let mut config = PrintConfig::default();

        config.device.channel = Some(0);
        assert!(config.validate().is_err());

        config.device.channel = Some(31);
        assert!(config.validate().is_err());

        config.device.channel = Some(1);
        config.device.secondary_node = config.device.primary_node;
        assert!(config.validate().is_err());

        config.device.secondary_node = 2;
        config.receipt.line_width = 8;
        assert!(config.validate().is_err());

        config.receipt.line_width = 48;
        config.client.bridge_url = "bridge".into();
        assert!(config.validate().is_err());

        config.client.bridge_url = "http://10.0.0.5:3001".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PrintConfig = toml::from_str(
            r#"
            [device]
            address = "00:11:22:33:44:55"
            channel = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.device.channel, Some(2));
        assert_eq!(config.device.node_dir, PathBuf::from("/dev"));
        assert_eq!(config.device.primary_node, 0);
        assert_eq!(config.device.secondary_node, 1);
        assert_eq!(config.bridge.print_timeout_secs, 20);
        assert!(config.bridge.fallback_dir.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("print.toml");

        let mut config = PrintConfig::default();
        config.device.address = Some("00:11:22:33:44:55".into());
        config.bridge.fallback_dir = Some(dir.path().join("receipts"));
        config.save(Some(path.clone())).unwrap();

        let loaded: PrintConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.device.address.as_deref(), Some("00:11:22:33:44:55"));
        assert_eq!(loaded.bridge.fallback_dir, Some(dir.path().join("receipts")));
    }
}
