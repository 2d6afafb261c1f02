//! SSH file-copy binding
//!
//! Bulk transfers go through a spawned `scp` process rather than an
//! in-process SSH stack; framing stays with the transport tool.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::device::CopyDirection;
use crate::errors::FleetcheckError;

/// Options for an scp transfer
#[derive(Debug, Clone)]
pub struct ScpOptions {
    pub host: String,
    pub port: u16,
    pub username: String,

    /// Skip strict host key checking
    pub insecure: bool,

    /// Overall transfer timeout
    pub timeout: Duration,
}

impl ScpOptions {
    fn remote(&self, path: &Path) -> String {
        format!("{}@{}:{}", self.username, self.host, path.display())
    }
}

/// Copy files to or from a device
pub async fn transfer(
    options: &ScpOptions,
    sources: &[PathBuf],
    destination: &Path,
    direction: CopyDirection,
) -> Result<(), FleetcheckError> {
    if sources.is_empty() {
        return Err(FleetcheckError::TransferError(
            "no source files given".to_string(),
        ));
    }

    let mut cmd = Command::new("scp");
    cmd.arg("-P")
        .arg(options.port.to_string())
        .arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg(format!(
            "ConnectTimeout={}",
            options.timeout.as_secs().max(5)
        ));
    if options.insecure {
        cmd.arg("-o").arg("StrictHostKeyChecking=no");
    }

    match direction {
        CopyDirection::FromDevice => {
            for source in sources {
                info!(
                    host = %options.host,
                    "Copying '{}' from device to '{}'",
                    source.display(),
                    destination.display()
                );
                cmd.arg(options.remote(source));
            }
            cmd.arg(destination);
        }
        CopyDirection::ToDevice => {
            for source in sources {
                info!(
                    host = %options.host,
                    "Copying '{}' to device at '{}'",
                    source.display(),
                    destination.display()
                );
                cmd.arg(source);
            }
            cmd.arg(options.remote(destination));
        }
    }

    let child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| FleetcheckError::TransferError(e.to_string()))?;

    let result = tokio::time::timeout(options.timeout, child.wait_with_output()).await;

    match result {
        Ok(Ok(output)) if output.status.success() => {
            debug!(host = %options.host, "Transfer complete");
            Ok(())
        }
        Ok(Ok(output)) => Err(FleetcheckError::TransferError(format!(
            "scp exited with code {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr)
        ))),
        Ok(Err(e)) => Err(FleetcheckError::TransferError(e.to_string())),
        Err(_) => Err(FleetcheckError::TransferError(format!(
            "transfer timed out after {:?}",
            options.timeout
        ))),
    }
}
