//! HTTP JSON-RPC device binding
//!
//! Commands are wrapped one at a time in a `runCmds` JSON-RPC envelope.
//! When an enable password is configured, a leading privilege-escalation
//! command is prepended and its result stripped from the response; its
//! presence never surfaces as a user-visible command failure.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::command::{
    CommandEntry, CommandFailure, CommandOutput, CommandSpec, FailureKind, OutputFormat,
};
use crate::device::scp::{self, ScpOptions};
use crate::device::{tag_set, CopyDirection, Device, DeviceInfo, Endpoint};
use crate::errors::FleetcheckError;

/// Identity command issued at refresh time
const IDENTITY_COMMAND: &str = "show version";

/// Key carrying the hardware model in the identity command output
const HW_MODEL_KEY: &str = "modelName";

/// Connection options for an eAPI device
#[derive(Debug, Clone)]
pub struct EapiOptions {
    /// Device FQDN or IP
    pub host: String,

    /// eAPI HTTPS port
    pub port: u16,

    /// Display name; defaults to "host:port"
    pub name: Option<String>,

    /// Tags for inventory filtering
    pub tags: Vec<String>,

    /// eAPI username
    pub username: String,

    /// eAPI password
    pub password: SecretString,

    /// Password for the privilege-escalation command, when required
    pub enable_password: Option<SecretString>,

    /// Per-request timeout
    pub timeout: Duration,

    /// SSH port used for file copy
    pub ssh_port: u16,

    /// Disable strict host key checking for file copy
    pub insecure: bool,
}

impl EapiOptions {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            host: host.into(),
            port: 443,
            name: None,
            tags: Vec::new(),
            username: username.into(),
            password,
            enable_password: None,
            timeout: Duration::from_secs(10),
            ssh_port: 22,
            insecure: false,
        }
    }
}

/// Liveness state refreshed by probing
#[derive(Debug, Clone, Default)]
struct ProbeState {
    is_reachable: bool,
    is_established: bool,
    hardware_model: Option<String>,
}

/// Device binding for HTTP JSON-RPC command execution
pub struct EapiDevice {
    name: String,
    tags: HashSet<String>,
    options: EapiOptions,
    command_url: Url,
    client: Client,
    state: RwLock<ProbeState>,
}

impl EapiDevice {
    pub fn new(options: EapiOptions) -> Result<Self, FleetcheckError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| format!("{}:{}", options.host, options.port));
        let tags = tag_set(&options.tags);
        let command_url =
            Url::parse(&format!("https://{}:{}/command-api", options.host, options.port))
                .map_err(|e| {
                    FleetcheckError::ConfigError(format!(
                        "invalid device endpoint {}:{}: {}",
                        options.host, options.port, e
                    ))
                })?;

        Ok(Self {
            name,
            tags,
            options,
            command_url,
            client,
            state: RwLock::new(ProbeState::default()),
        })
    }

    /// Build the JSON-RPC envelope for one command, with the optional
    /// leading privilege-escalation step.
    fn envelope(&self, spec: &CommandSpec) -> serde_json::Value {
        let mut cmds: Vec<serde_json::Value> = Vec::with_capacity(2);
        if let Some(enable_password) = &self.options.enable_password {
            cmds.push(serde_json::json!({
                "cmd": "enable",
                "input": enable_password.expose_secret(),
            }));
        }
        cmds.push(match spec.revision {
            Some(revision) => serde_json::json!({"cmd": spec.text, "revision": revision}),
            None => serde_json::json!({"cmd": spec.text}),
        });

        serde_json::json!({
            "jsonrpc": "2.0",
            "method": "runCmds",
            "params": {
                "version": spec.version.to_json(),
                "cmds": cmds,
                "format": spec.format.as_str(),
            },
            "id": Uuid::new_v4().to_string(),
        })
    }

    /// Execute one command and return its output or a classified failure.
    /// Never returns an error past this boundary.
    async fn run_command(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandFailure> {
        let response = self
            .client
            .post(self.command_url.clone())
            .basic_auth(
                &self.options.username,
                Some(self.options.password.expose_secret()),
            )
            .json(&self.envelope(spec))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CommandFailure::new(
                FailureKind::Authentication,
                format!("device rejected credentials: {}", status),
            ));
        }
        if !status.is_success() {
            return Err(CommandFailure::new(
                FailureKind::Rpc,
                format!("unexpected HTTP status: {}", status),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(classify_transport_error)?;
        extract_command_output(&body, spec.format, self.options.enable_password.is_some())
    }

    async fn probe_reachability(&self) -> bool {
        let addr = format!("{}:{}", self.options.host, self.options.port);
        matches!(
            tokio::time::timeout(self.options.timeout, TcpStream::connect(&addr)).await,
            Ok(Ok(_))
        )
    }
}

#[async_trait]
impl Device for EapiDevice {
    fn info(&self) -> DeviceInfo {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        DeviceInfo {
            name: self.name.clone(),
            tags: self.tags.clone(),
            is_reachable: state.is_reachable,
            is_established: state.is_established,
            hardware_model: state.hardware_model.clone(),
        }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.options.host.clone(),
            port: self.options.port,
        }
    }

    async fn collect(&self, entries: &[Arc<CommandEntry>]) {
        join_all(entries.iter().map(|entry| async move {
            debug!(device = %self.name, command = %entry.spec().text, "Collecting command");
            match self.run_command(entry.spec()).await {
                Ok(output) => entry.resolve_output(output),
                Err(failure) => {
                    warn!(
                        device = %self.name,
                        command = %entry.spec().text,
                        "Command collection failed: {}",
                        failure
                    );
                    entry.resolve_failure(failure);
                }
            }
        }))
        .await;
    }

    async fn refresh(&self) {
        debug!(device = %self.name, "Refreshing device");
        let is_reachable = self.probe_reachability().await;

        let mut hardware_model = None;
        if is_reachable {
            match self.run_command(&CommandSpec::json(IDENTITY_COMMAND)).await {
                Ok(output) => match output.as_json().and_then(|v| v.get(HW_MODEL_KEY)) {
                    Some(model) => hardware_model = model.as_str().map(str::to_string),
                    None => warn!(
                        device = %self.name,
                        "Cannot read hardware model: '{}' output has no '{}'",
                        IDENTITY_COMMAND,
                        HW_MODEL_KEY
                    ),
                },
                Err(failure) => {
                    warn!(device = %self.name, "Cannot get hardware model: {}", failure);
                }
            }
        } else {
            warn!(device = %self.name, "Device endpoint is not reachable");
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.is_reachable = is_reachable;
        state.is_established = is_reachable && hardware_model.is_some();
        state.hardware_model = hardware_model;
    }

    async fn copy(
        &self,
        sources: &[PathBuf],
        destination: &Path,
        direction: CopyDirection,
    ) -> Result<(), FleetcheckError> {
        let options = ScpOptions {
            host: self.options.host.clone(),
            port: self.options.ssh_port,
            username: self.options.username.clone(),
            insecure: self.options.insecure,
            timeout: self.options.timeout,
        };
        scp::transfer(&options, sources, destination, direction).await
    }
}

/// Classify a transport-level request error
fn classify_transport_error(err: reqwest::Error) -> CommandFailure {
    if err.is_timeout() {
        CommandFailure::new(FailureKind::Timeout, err.to_string())
    } else if err.is_connect() {
        CommandFailure::new(FailureKind::Connection, err.to_string())
    } else {
        CommandFailure::new(FailureKind::Internal, err.to_string())
    }
}

/// Pull this command's result out of a JSON-RPC response body.
///
/// With privilege escalation enabled the first result entry belongs to the
/// leading enable command and is dropped.
fn extract_command_output(
    body: &serde_json::Value,
    format: OutputFormat,
    has_enable: bool,
) -> Result<CommandOutput, CommandFailure> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown RPC error");
        return Err(CommandFailure::new(FailureKind::Rpc, message));
    }

    let results = body
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| {
            CommandFailure::new(FailureKind::Internal, "RPC response carries no result array")
        })?;

    let index = usize::from(has_enable);
    let result = results.get(index).ok_or_else(|| {
        CommandFailure::new(
            FailureKind::Internal,
            format!("RPC response has {} results, expected at least {}", results.len(), index + 1),
        )
    })?;

    match format {
        OutputFormat::Json => Ok(CommandOutput::Json(result.clone())),
        OutputFormat::Text => {
            let text = result
                .get("output")
                .and_then(|o| o.as_str())
                .ok_or_else(|| {
                    CommandFailure::new(FailureKind::Internal, "text result carries no output field")
                })?;
            Ok(CommandOutput::Text(text.to_string()))
        }
    }
}
