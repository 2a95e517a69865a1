//! # Printer Links
//!
//! A link is an open byte pipe to the printer. Drivers decide what to write;
//! connectors decide how a pipe is opened.
//!
//! ```text
//!   RfcommDriver ─┐                       ┌─► RfcommConnector (node N)
//!                 ├─► dyn LinkConnector ──┤     release N
//!   SppDriver ────┘     open(addr, ch)    │     bind N addr ch
//!                          │              │     open {node_dir}/rfcommN
//!                          │              └─► test fakes
//!                          ▼
//!                   Box<dyn PrintLink>  write_all / flush / close
//! ```
//!
//! The kernel RFCOMM layer exposes a bound channel as a character device.
//! The node index is local and has nothing to do with the remote channel,
//! so each driver owns its own node and binds it to the address and channel
//! before every print.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{PrintError, PrintResult};

/// An open connection to the printer.
#[async_trait]
pub trait PrintLink: Send {
    async fn write_all(&mut self, bytes: &[u8]) -> PrintResult<()>;

    async fn flush(&mut self) -> PrintResult<()>;

    /// Flushes and releases the connection.
    async fn close(self: Box<Self>) -> PrintResult<()>;
}

/// Opens links to a device address on a channel.
#[async_trait]
pub trait LinkConnector: Send + Sync {
    /// Fails with [`PrintError::LinkUnavailable`] when the link does not
    /// exist at all, and [`PrintError::Link`] when opening it errored.
    async fn open(&self, address: &str, channel: u8) -> PrintResult<Box<dyn PrintLink>>;
}

// =============================================================================
// Node Binding
// =============================================================================

/// Attaches a local rfcomm device node to a remote address and channel.
#[async_trait]
pub trait NodeBinder: Send + Sync {
    async fn bind(&self, node: u8, address: &str, channel: u8) -> PrintResult<()>;

    async fn release(&self, node: u8) -> PrintResult<()>;
}

/// Binds nodes with the BlueZ `rfcomm` tool.
#[derive(Debug, Clone, Default)]
pub struct RfcommTool;

impl RfcommTool {
    pub fn bind_args(node: u8, address: &str, channel: u8) -> Vec<String> {
        vec![
            "bind".to_string(),
            node.to_string(),
            address.to_string(),
            channel.to_string(),
        ]
    }

    async fn run(args: &[String]) -> PrintResult<()> {
        let output = Command::new("rfcomm")
            .args(args)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PrintError::LinkUnavailable("rfcomm is not installed".into()),
                _ => PrintError::Link(format!("rfcomm: {}", e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PrintError::Link(format!(
                "rfcomm {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeBinder for RfcommTool {
    async fn bind(&self, node: u8, address: &str, channel: u8) -> PrintResult<()> {
        Self::run(&Self::bind_args(node, address, channel)).await
    }

    async fn release(&self, node: u8) -> PrintResult<()> {
        Self::run(&["release".to_string(), node.to_string()]).await
    }
}

// =============================================================================
// RFCOMM Connector
// =============================================================================

/// Binds one device node to the requested address and channel, then opens
/// `{node_dir}/rfcomm{node}`.
#[derive(Clone)]
pub struct RfcommConnector {
    node_dir: PathBuf,
    node: u8,
    binder: Arc<dyn NodeBinder>,
}

impl RfcommConnector {
    pub fn new(node_dir: impl Into<PathBuf>, node: u8, binder: Arc<dyn NodeBinder>) -> Self {
        RfcommConnector {
            node_dir: node_dir.into(),
            node,
            binder,
        }
    }

    pub fn node_path(&self) -> PathBuf {
        self.node_dir.join(format!("rfcomm{}", self.node))
    }
}

#[async_trait]
impl LinkConnector for RfcommConnector {
    async fn open(&self, address: &str, channel: u8) -> PrintResult<Box<dyn PrintLink>> {
        // A node left bound from an earlier print may point elsewhere
        if let Err(e) = self.binder.release(self.node).await {
            debug!(node = self.node, error = %e, "Node release failed");
        }
        self.binder.bind(self.node, address, channel).await?;

        let path = self.node_path();
        debug!(address = %address, channel, path = %path.display(), "Opening printer device node");

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| open_error(&path, e))?;

        Ok(Box::new(DeviceNodeLink { file }))
    }
}

fn open_error(path: &Path, err: std::io::Error) -> PrintError {
    match err.kind() {
        ErrorKind::NotFound => {
            PrintError::LinkUnavailable(format!("{} does not exist", path.display()))
        }
        _ => PrintError::Link(format!("{}: {}", path.display(), err)),
    }
}

struct DeviceNodeLink {
    file: File,
}

#[async_trait]
impl PrintLink for DeviceNodeLink {
    async fn write_all(&mut self, bytes: &[u8]) -> PrintResult<()> {
        self.file
            .write_all(bytes)
            .await
            .map_err(|e| PrintError::Link(e.to_string()))
    }

    async fn flush(&mut self) -> PrintResult<()> {
        self.file
            .flush()
            .await
            .map_err(|e| PrintError::Link(e.to_string()))
    }

    async fn close(mut self: Box<Self>) -> PrintResult<()> {
        self.flush().await?;
        self.file
            .sync_all()
            .await
            .or_else(|e| match e.kind() {
                // Character devices commonly refuse fsync
                ErrorKind::InvalidInput | ErrorKind::Unsupported => Ok(()),
                _ => Err(PrintError::Link(e.to_string())),
            })
    }
}
