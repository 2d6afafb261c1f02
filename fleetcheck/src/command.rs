//! Command model: request identity, rendered entries and templates
//!
//! A `CommandSpec` is the identity of one request sent to a device. A
//! `CommandEntry` wraps a spec with a write-once outcome slot so the same
//! entry can be shared read-only by every check that rendered it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::FleetcheckError;

/// Requested output structure for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Text,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Text => "text",
        }
    }
}

/// Protocol version requested for a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiVersion {
    Latest,
    Version(u8),
}

impl ApiVersion {
    /// JSON value used in the RPC envelope: "latest" or a number
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ApiVersion::Latest => serde_json::Value::from("latest"),
            ApiVersion::Version(v) => serde_json::Value::from(*v),
        }
    }
}

impl Serialize for ApiVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiVersion::Latest => write!(f, "latest"),
            ApiVersion::Version(v) => write!(f, "{}", v),
        }
    }
}

/// Identity of one command request
///
/// Two specs that compare equal are the same request: a device must never
/// issue them twice within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CommandSpec {
    /// Literal command text
    pub text: String,

    /// Requested output format
    pub format: OutputFormat,

    /// Protocol version
    pub version: ApiVersion,

    /// Optional command schema revision
    pub revision: Option<u8>,
}

impl CommandSpec {
    /// A JSON command with default version and no revision
    pub fn json(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: OutputFormat::Json,
            version: ApiVersion::Latest,
            revision: None,
        }
    }

    /// A text command with default version and no revision
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: OutputFormat::Text,
            version: ApiVersion::Latest,
            revision: None,
        }
    }

    pub fn with_version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_revision(mut self, revision: u8) -> Self {
        self.revision = Some(revision);
        self
    }
}

/// Structured output captured from a device
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Json(serde_json::Value),
    Text(String),
}

impl CommandOutput {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            CommandOutput::Json(v) => Some(v),
            CommandOutput::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CommandOutput::Text(s) => Some(s),
            CommandOutput::Json(_) => None,
        }
    }
}

/// Classified cause of a collection failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Connection could not be established
    Connection,

    /// The device rejected the credentials
    Authentication,

    /// The remote command itself returned an error
    Rpc,

    /// The request did not complete within its timeout
    Timeout,

    /// Anything unexpected in the collection path
    Internal,
}

/// A captured per-command collection failure
#[derive(Debug, Clone, Serialize)]
pub struct CommandFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CommandFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Outcome of collecting one command: output or a classified failure
pub type CommandOutcome = Result<CommandOutput, CommandFailure>;

/// One collectible request/response envelope
///
/// The outcome slot is resolved exactly once by the owning device during
/// collection and is immutable afterwards. Checks hold the entry behind an
/// `Arc` and only ever read it.
#[derive(Debug)]
pub struct CommandEntry {
    spec: CommandSpec,
    params: BTreeMap<String, String>,
    outcome: OnceLock<CommandOutcome>,
}

impl CommandEntry {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            params: BTreeMap::new(),
            outcome: OnceLock::new(),
        }
    }

    pub fn with_params(spec: CommandSpec, params: BTreeMap<String, String>) -> Self {
        Self {
            spec,
            params,
            outcome: OnceLock::new(),
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Template parameters this entry was rendered from, if any
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// True once the device has recorded an output or a failure
    pub fn is_collected(&self) -> bool {
        self.outcome.get().is_some()
    }

    pub fn output(&self) -> Option<&CommandOutput> {
        self.outcome.get().and_then(|o| o.as_ref().ok())
    }

    pub fn failure(&self) -> Option<&CommandFailure> {
        self.outcome.get().and_then(|o| o.as_ref().err())
    }

    /// Collected JSON output, if the command succeeded in JSON format
    pub fn json(&self) -> Option<&serde_json::Value> {
        self.output().and_then(CommandOutput::as_json)
    }

    /// Collected text output, if the command succeeded in text format
    pub fn text(&self) -> Option<&str> {
        self.output().and_then(CommandOutput::as_text)
    }

    /// Record a successful output. A second resolution is ignored.
    pub fn resolve_output(&self, output: CommandOutput) {
        if self.outcome.set(Ok(output)).is_err() {
            debug!("Command '{}' already resolved, ignoring output", self.spec.text);
        }
    }

    /// Record a classified failure. A second resolution is ignored.
    pub fn resolve_failure(&self, failure: CommandFailure) {
        if self.outcome.set(Err(failure)).is_err() {
            debug!("Command '{}' already resolved, ignoring failure", self.spec.text);
        }
    }
}

/// A parametrized command pattern
///
/// `{name}` placeholders in the pattern are substituted from a parameter
/// map at render time. Rendering is a pure function: the same template and
/// parameters always produce an identical spec.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    pattern: String,
    format: OutputFormat,
    version: ApiVersion,
    revision: Option<u8>,
}

impl CommandTemplate {
    pub fn json(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            format: OutputFormat::Json,
            version: ApiVersion::Latest,
            revision: None,
        }
    }

    pub fn text(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            format: OutputFormat::Text,
            version: ApiVersion::Latest,
            revision: None,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Render the template against one parameter map
    pub fn render(&self, params: &BTreeMap<String, String>) -> Result<CommandSpec, FleetcheckError> {
        let mut text = String::with_capacity(self.pattern.len());
        let mut chars = self.pattern.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '{' {
                text.push(c);
                continue;
            }
            // "{{" is a literal brace
            if chars.peek() == Some(&'{') {
                chars.next();
                text.push('{');
                continue;
            }
            let mut name = String::new();
            let mut closed = false;
            for inner in chars.by_ref() {
                if inner == '}' {
                    closed = true;
                    break;
                }
                name.push(inner);
            }
            if !closed {
                return Err(FleetcheckError::RenderError(format!(
                    "Unterminated placeholder in template '{}'",
                    self.pattern
                )));
            }
            match params.get(&name) {
                Some(value) => text.push_str(value),
                None => {
                    return Err(FleetcheckError::RenderError(format!(
                        "Missing parameter '{}' for template '{}'",
                        name, self.pattern
                    )));
                }
            }
        }

        Ok(CommandSpec {
            text,
            format: self.format,
            version: self.version,
            revision: self.revision,
        })
    }
}

/// What a check declares it needs collected
#[derive(Debug, Clone)]
pub enum CommandRequest {
    /// A fixed, already-concrete command
    Fixed(CommandSpec),

    /// A template rendered once per parameter map
    Templated {
        template: CommandTemplate,
        params: Vec<BTreeMap<String, String>>,
    },
}

impl CommandRequest {
    /// Render into concrete (spec, params) pairs
    pub fn render(&self) -> Result<Vec<(CommandSpec, BTreeMap<String, String>)>, FleetcheckError> {
        match self {
            CommandRequest::Fixed(spec) => Ok(vec![(spec.clone(), BTreeMap::new())]),
            CommandRequest::Templated { template, params } => params
                .iter()
                .map(|p| template.render(p).map(|spec| (spec, p.clone())))
                .collect(),
        }
    }
}

/// Helper to build a one-entry parameter map
pub fn params_from<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
