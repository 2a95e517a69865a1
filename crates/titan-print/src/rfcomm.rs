//! # RFCOMM Driver (primary)
//!
//! Streams a receipt line by line over a bound RFCOMM channel.
//!
//! ```text
//!   open(address, channel)
//!     └─► ESC @
//!     └─► line 1 LF, line 2 LF, ... line n LF   (one write per line)
//!     └─► ESC d 4, GS V 66 0
//!     └─► close
//! ```
//!
//! Success means the whole sequence was written and the link closed without
//! an error. A missing address or channel makes the driver unavailable
//! rather than failed, so the chain moves on without blaming it.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::driver::{AttemptOutcome, PrintDriver};
use crate::error::PrintResult;
use crate::escpos;
use crate::link::{LinkConnector, PrintLink};

pub struct RfcommDriver {
    connector: Arc<dyn LinkConnector>,
    address: Option<String>,
    channel: Option<u8>,
}

impl RfcommDriver {
    pub fn new(connector: Arc<dyn LinkConnector>, address: Option<String>, channel: Option<u8>) -> Self {
        RfcommDriver {
            connector,
            address,
            channel,
        }
    }

    async fn stream(link: &mut dyn PrintLink, lines: &[String]) -> PrintResult<()> {
        link.write_all(&escpos::INIT).await?;
        for line in lines {
            link.write_all(&escpos::encode_line(line)).await?;
        }
        link.write_all(&escpos::finish()).await?;
        link.flush().await
    }
}

#[async_trait]
impl PrintDriver for RfcommDriver {
    fn name(&self) -> &str {
        "rfcomm"
    }

    async fn deliver(&self, lines: &[String]) -> AttemptOutcome {
        let (Some(address), Some(channel)) = (self.address.as_deref(), self.channel) else {
            return AttemptOutcome::DriverUnavailable("no device address or channel configured".into());
        };

        let mut link = match self.connector.open(address, channel).await {
            Ok(link) => link,
            Err(e) => return AttemptOutcome::from_setup_error(&e),
        };

        debug!(address = %address, channel, lines = lines.len(), "Streaming receipt over RFCOMM");

        if let Err(e) = Self::stream(link.as_mut(), lines).await {
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
pub(crate) mod tests {
    use super::*;
    use crate::error::PrintError;
    use std::sync::Mutex;

    /// Connector whose links record writes into a shared log.
    #[derive(Default)]
    pub(crate) struct RecordingConnector {
        pub writes: Arc<Mutex<Vec<Vec<u8>>>>,
        pub opened: Mutex<Vec<(String, u8)>>,
        pub fail_open: Option<fn() -> PrintError>,
        pub fail_write_after: Option<usize>,
    }

    struct RecordingLink {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        fail_write_after: Option<usize>,
    }

    #[async_trait]
    impl PrintLink for RecordingLink {
        async fn write_all(&mut self, bytes: &[u8]) -> PrintResult<()> {
            let mut writes = self.writes.lock().unwrap();
            if self.fail_write_after.is_some_and(|n| writes.len() >= n) {
                return Err(PrintError::Link("connection reset by peer".into()));
            }
            writes.push(bytes.to_vec());
            Ok(())
        }

        async fn flush(&mut self) -> PrintResult<()> {
            Ok(())
        }

        async fn close(self: Box<Self>) -> PrintResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl LinkConnector for RecordingConnector {
        async fn open(&self, address: &str, channel: u8) -> PrintResult<Box<dyn PrintLink>> {
            if let Some(fail) = self.fail_open {
                return Err(fail());
            }
            self.opened.lock().unwrap().push((address.to_string(), channel));
            Ok(Box::new(RecordingLink {
                writes: self.writes.clone(),
                fail_write_after: self.fail_write_after,
            }))
        }
    }

    fn lines() -> Vec<String> {
        vec!["Line one".to_string(), "Line two".to_string()]
    }

    #[tokio::test]
    async fn test_streams_one_write_per_line() {
        let connector = Arc::new(RecordingConnector::default());
        let driver = RfcommDriver::new(connector.clone(), Some("AA:BB".into()), Some(1));

        assert_eq!(driver.deliver(&lines()).await, AttemptOutcome::Success);

        let writes = connector.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0], escpos::INIT.to_vec());
        assert_eq!(writes[1], b"Line one\n".to_vec());
        assert_eq!(writes[3], escpos::finish());
        assert_eq!(connector.opened.lock().unwrap()[0], ("AA:BB".to_string(), 1));
    }

    #[tokio::test]
    async fn test_unconfigured_channel_is_unavailable() {
        let connector = Arc::new(RecordingConnector::default());
        let driver = RfcommDriver::new(connector.clone(), Some("AA:BB".into()), None);

        assert!(matches!(
            driver.deliver(&lines()).await,
            AttemptOutcome::DriverUnavailable(_)
        ));
        assert!(connector.opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_node_is_unavailable() {
        let connector = Arc::new(RecordingConnector {
            fail_open: Some(|| PrintError::LinkUnavailable("/dev/rfcomm1 does not exist".into())),
            ..Default::default()
        });
        let driver = RfcommDriver::new(connector, Some("AA:BB".into()), Some(1));

        assert!(matches!(
            driver.deliver(&lines()).await,
            AttemptOutcome::DriverUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_write_error_mid_stream_fails() {
        let connector = Arc::new(RecordingConnector {
            fail_write_after: Some(2),
            ..Default::default()
        });
        let driver = RfcommDriver::new(connector, Some("AA:BB".into()), Some(1));

        match driver.deliver(&lines()).await {
            AttemptOutcome::DriverFailed(reason) => assert!(reason.contains("reset")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
