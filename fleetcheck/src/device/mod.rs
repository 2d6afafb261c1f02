//! Device abstraction
//!
//! A device owns its transport handle outright and exposes only the
//! collect/refresh/copy capabilities. Callers never see the underlying
//! connection, so no session object is ever shared across tasks.

pub mod eapi;
pub mod scp;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::command::CommandEntry;
use crate::errors::FleetcheckError;

/// Tag implicitly present on every device
pub const DEFAULT_TAG: &str = "all";

/// Connection endpoint identity of a device
///
/// Two devices with the same host and port are the same device, whatever
/// their tags or display names. This covers port-forwarded setups where
/// every host is localhost and only ports differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Snapshot of a device's identity and liveness state
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Display name
    pub name: String,

    /// Tags, always including "all"
    pub tags: HashSet<String>,

    /// True when the endpoint accepted a connection at last refresh
    pub is_reachable: bool,

    /// True when reachable and the hardware model is known
    pub is_established: bool,

    /// Hardware model reported by the identity command
    pub hardware_model: Option<String>,
}

impl DeviceInfo {
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }
}

/// Direction of a bulk file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// Pull files from the device to a local destination
    FromDevice,

    /// Push local files to the device
    ToDevice,
}

/// One addressable managed target
///
/// `collect` and `refresh` never return errors: per-command failures are
/// captured on the command entries, liveness failures land in the device
/// snapshot. A device-level outage degrades to every command on that
/// device carrying a failure, never to an aborted run.
#[async_trait]
pub trait Device: Send + Sync {
    /// Snapshot of identity and liveness state
    fn info(&self) -> DeviceInfo;

    /// Connection endpoint identity
    fn endpoint(&self) -> Endpoint;

    /// Execute all given commands concurrently, resolving each entry with
    /// an output or a classified failure.
    async fn collect(&self, entries: &[Arc<CommandEntry>]);

    /// Probe reachability, then the identity command; update the snapshot.
    async fn refresh(&self);

    /// Bulk file transfer. Implementations without a transfer channel
    /// decline by returning `Unsupported`.
    async fn copy(
        &self,
        sources: &[PathBuf],
        destination: &Path,
        direction: CopyDirection,
    ) -> Result<(), FleetcheckError> {
        let _ = (sources, destination, direction);
        Err(FleetcheckError::Unsupported(format!(
            "file copy is not supported by device {}",
            self.info().name
        )))
    }
}

/// Build a tag set that always contains the implicit "all" tag
pub fn tag_set(tags: &[String]) -> HashSet<String> {
    let mut set: HashSet<String> = tags.iter().cloned().collect();
    set.insert(DEFAULT_TAG.to_string());
    set
}
