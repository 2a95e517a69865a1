//! # File Fallback
//!
//! When no driver can print, the bridge can still keep the receipt: the
//! formatted lines are written to `<dir>/<receiptNumber>-<timestamp>.txt`.
//! The caller is told `fileSaved: true`, which is still a failed print.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PrintError, PrintResult};

#[derive(Debug, Clone)]
pub struct FileFallback {
    dir: PathBuf,
}

impl FileFallback {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileFallback { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a receipt saved at `at` would be written to.
    pub fn path_for(&self, receipt_number: &str, at: DateTime<Utc>) -> PathBuf {
        let safe: String = receipt_number
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir
            .join(format!("{}-{}.txt", safe, at.format("%Y%m%d%H%M%S")))
    }

    /// Writes the lines and returns the file path.
    pub async fn save(&self, receipt_number: &str, lines: &[String]) -> PrintResult<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PrintError::Link(format!("fallback dir {}: {}", self.dir.display(), e)))?;

        let path = self.path_for(receipt_number, Utc::now());
        let mut contents = lines.join("\n");
        contents.push('\n');

        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| PrintError::Link(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), receipt_number, "Receipt saved to fallback file");
        Ok(path)
    }
}
