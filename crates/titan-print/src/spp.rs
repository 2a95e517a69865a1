//! # SPP Driver (secondary)
//!
//! Sends the whole receipt as a single buffered write over the Serial Port
//! Profile. Used when the primary driver is missing or failed.
//!
//! ```text
//!   channel configured? ── yes ──────────────────────┐
//!        │ no                                        │
//!        ▼                                           ▼
//!   ChannelResolver::resolve(address)          open(address, channel)
//!     sdptool browse <address>                   write_all(document)   ← one write
//!     "Serial Port" record → Channel: N          close
//! ```
//!
//! The connector binds the driver's own device node to the address and the
//! channel before opening it.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use crate::driver::{AttemptOutcome, PrintDriver};
use crate::error::{PrintError, PrintResult};
use crate::escpos;
use crate::link::LinkConnector;

// =============================================================================
// Channel Discovery
// =============================================================================

/// Finds the serial-port channel a device advertises.
#[async_trait]
pub trait ChannelResolver: Send + Sync {
    /// `Ok(None)` when the device answered but offers no serial port.
    async fn resolve(&self, address: &str) -> PrintResult<Option<u8>>;
}

/// Resolves channels with BlueZ `sdptool browse`.
#[derive(Debug, Clone, Default)]
pub struct SdpToolResolver;

#[async_trait]
impl ChannelResolver for SdpToolResolver {
    async fn resolve(&self, address: &str) -> PrintResult<Option<u8>> {
        let output = Command::new("sdptool")
            .arg("browse")
            .arg(address)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    PrintError::LinkUnavailable("sdptool is not installed".into())
                }
                _ => PrintError::Link(format!("sdptool: {}", e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PrintError::LinkUnavailable(format!(
                "sdptool browse {} failed: {}",
                address,
                stderr.trim()
            )));
        }

        Ok(parse_sdptool_channel(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Picks the RFCOMM channel from `sdptool browse` output, preferring the
/// record advertising "Serial Port" over any other channel seen.
pub fn parse_sdptool_channel(output: &str) -> Option<u8> {
    let mut first = None;
    let mut in_serial_record = false;

    for line in output.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with("Service Name:") {
            in_serial_record = false;
        }
        if line.contains("Serial Port") {
            in_serial_record = true;
        }

        if let Some(rest) = line.strip_prefix("Channel:") {
            if let Ok(channel) = rest.trim().parse::<u8>() {
                if in_serial_record {
                    return Some(channel);
                }
                first.get_or_insert(channel);
            }
        }
    }

    first
}

// =============================================================================
// SPP Driver
// =============================================================================

pub struct SppDriver {
    connector: Arc<dyn LinkConnector>,
    resolver: Arc<dyn ChannelResolver>,
    address: Option<String>,
    channel: Option<u8>,
}

impl SppDriver {
    pub fn new(
        connector: Arc<dyn LinkConnector>,
        resolver: Arc<dyn ChannelResolver>,
        address: Option<String>,
        channel: Option<u8>,
    ) -> Self {
        SppDriver {
            connector,
            resolver,
            address,
            channel,
        }
    }

    async fn channel_for(&self, address: &str) -> Result<u8, AttemptOutcome> {
        if let Some(channel) = self.channel {
            return Ok(channel);
        }

        match self.resolver.resolve(address).await {
            Ok(Some(channel)) => {
                info!(address = %address, channel, "Discovered serial port channel");
                Ok(channel)
            }
            Ok(None) => Err(AttemptOutcome::DriverUnavailable(format!(
                "{} advertises no serial port service",
                address
            ))),
            Err(e) => Err(AttemptOutcome::from_setup_error(&e)),
        }
    }
}

#[async_trait]
impl PrintDriver for SppDriver {
    fn name(&self) -> &str {
        "spp"
    }

    async fn deliver(&self, lines: &[String]) -> AttemptOutcome {
        let Some(address) = self.address.as_deref() else {
            return AttemptOutcome::DriverUnavailable("no device address configured".into());
        };

        let channel = match self.channel_for(address).await {
            Ok(channel) => channel,
            Err(outcome) => return outcome,
        };

        let mut link = match self.connector.open(address, channel).await {
            Ok(link) => link,
            Err(e) => return AttemptOutcome::from_setup_error(&e),
        };

        let payload = escpos::document(lines);
        debug!(address = %address, channel, bytes = payload.len(), "Sending buffered receipt over SPP");

        if let Err(e) = link.write_all(&payload).await {
            return AttemptOutcome::DriverFailed(e.to_string());
        }

        match link.close().await {
            Ok(()) => AttemptOutcome::Success,
            Err(e) => AttemptOutcome::DriverFailed(e.to_string()),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::tests::RecordingBinder;
    use crate::link::RfcommConnector;
    use crate::rfcomm::tests::RecordingConnector;

    const SDPTOOL_OUTPUT: &str = "\
Browsing 00:11:22:33:44:55 ...
Service Name: OBEX Object Push
Service RecHandle: 0x10001
Protocol Descriptor List:
  \"L2CAP\" (0x0100)
  \"RFCOMM\" (0x0003)
    Channel: 9

Service Name: SPP Printer
Service RecHandle: 0x10002
Service Class ID List:
  \"Serial Port\" (0x1101)
Protocol Descriptor List:
  \"L2CAP\" (0x0100)
  \"RFCOMM\" (0x0003)
    Channel: 2
";

    struct FixedResolver(Option<u8>);

    #[async_trait]
    impl ChannelResolver for FixedResolver {
        async fn resolve(&self, _address: &str) -> PrintResult<Option<u8>> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_parse_prefers_serial_port_record() {
        assert_eq!(parse_sdptool_channel(SDPTOOL_OUTPUT), Some(2));
    }

    #[test]
    fn test_parse_falls_back_to_first_channel() {
        let output = "Service Name: Printer\n  \"RFCOMM\" (0x0003)\n    Channel: 4\n";
        assert_eq!(parse_sdptool_channel(output), Some(4));
        assert_eq!(parse_sdptool_channel("Browsing 00:11 ...\n"), None);
    }

    #[tokio::test]
    async fn test_single_buffered_write_on_discovered_channel() {
        let connector = Arc::new(RecordingConnector::default());
        let driver = SppDriver::new(
            connector.clone(),
            Arc::new(FixedResolver(Some(2))),
            Some("00:11:22:33:44:55".into()),
            None,
        );
        let lines = vec!["A".to_string(), "B".to_string()];

        assert_eq!(driver.deliver(&lines).await, AttemptOutcome::Success);

        let writes = connector.writes.lock().unwrap().clone();
        assert_eq!(writes, vec![escpos::document(&lines)]);
        assert_eq!(
            connector.opened.lock().unwrap()[0],
            ("00:11:22:33:44:55".to_string(), 2)
        );
    }

    #[tokio::test]
    async fn test_discovered_channel_is_bound_on_own_node() {
        let dir = tempfile::tempdir().unwrap();
        let binder = Arc::new(RecordingBinder::creating_nodes_in(dir.path()));
        let driver = SppDriver::new(
            Arc::new(RfcommConnector::new(dir.path(), 1, binder.clone())),
            Arc::new(FixedResolver(Some(2))),
            Some("00:11:22:33:44:55".into()),
            None,
        );
        let lines = vec!["A".to_string()];

        assert_eq!(driver.deliver(&lines).await, AttemptOutcome::Success);

        assert_eq!(
            *binder.binds.lock().unwrap(),
            vec![(1, "00:11:22:33:44:55".to_string(), 2)]
        );
        assert_eq!(std::fs::read(dir.path().join("rfcomm1")).unwrap(), escpos::document(&lines));
        assert!(!dir.path().join("rfcomm2").exists());
    }

    #[tokio::test]
    async fn test_configured_channel_skips_discovery() {
        let connector = Arc::new(RecordingConnector::default());
        let driver = SppDriver::new(
            connector.clone(),
            Arc::new(FixedResolver(None)),
            Some("00:11:22:33:44:55".into()),
            Some(5),
        );

        assert!(driver.deliver(&["x".to_string()]).await.is_success());
        assert_eq!(connector.opened.lock().unwrap()[0].1, 5);
    }

    #[tokio::test]
    async fn test_no_serial_service_is_unavailable() {
        let driver = SppDriver::new(
            Arc::new(RecordingConnector::default()),
            Arc::new(FixedResolver(None)),
            Some("00:11:22:33:44:55".into()),
            None,
        );

        assert!(matches!(
            driver.deliver(&["x".to_string()]).await,
            AttemptOutcome::DriverUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_no_address_is_unavailable() {
        let driver = SppDriver::new(
            Arc::new(RecordingConnector::default()),
            Arc::new(FixedResolver(Some(1))),
            None,
            None,
        );

        assert!(matches!(
            driver.deliver(&["x".to_string()]).await,
            AttemptOutcome::DriverUnavailable(_)
        ));
    }
}
