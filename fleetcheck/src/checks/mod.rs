//! Check capability and run lifecycle
//!
//! A check declares the commands it needs, an optional gate that can skip
//! it before any collection, and an evaluation step over the collected
//! outputs. `CheckRun` binds one check to one device and drives the
//! gate -> render -> collect -> evaluate lifecycle, converting every kind
//! of breakage into a five-state verdict instead of letting it propagate.

pub mod bgp;
pub mod connectivity;
pub mod hardware;
pub mod interfaces;
pub mod mlag;
pub mod security;
pub mod software;
pub mod system;
pub mod vxlan;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{debug, error};

use crate::cache::CommandCache;
use crate::command::{CommandEntry, CommandRequest};
use crate::device::{Device, DeviceInfo};
use crate::report::{CheckResult, CheckStatus, ResultStore};

/// Static identity of a check
#[derive(Debug, Clone, Copy)]
pub struct CheckMeta {
    pub name: &'static str,
    pub description: &'static str,
    pub categories: &'static [&'static str],
}

impl CheckMeta {
    pub fn categories_vec(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.to_string()).collect()
    }
}

/// One declarative verification over collected device output
///
/// Evaluation must be a pure function of the collected entries and the
/// check's own typed inputs: re-evaluating the same collected set yields
/// the same verdict. A returned `Err` means the evaluation itself broke
/// and is converted to an error verdict at the run boundary.
pub trait Check: Send + Sync {
    fn meta(&self) -> CheckMeta;

    /// Commands and templates this check needs collected
    fn requests(&self) -> Vec<CommandRequest>;

    /// Optional conditional gate, consulted before rendering. Returning
    /// `Some(reason)` short-circuits the run to skipped without issuing
    /// any commands.
    fn gate(&self, device: &DeviceInfo) -> Option<String> {
        let _ = device;
        None
    }

    /// Inspect collected outputs and report the verdict
    fn evaluate(&self, entries: &[Arc<CommandEntry>], result: &mut CheckResult)
        -> anyhow::Result<()>;
}

/// A check wrapped with an extra gate predicate
pub struct Gated<C> {
    predicate: Box<dyn Fn(&DeviceInfo) -> Option<String> + Send + Sync>,
    inner: C,
}

/// Wrap a check with a composable gate predicate.
///
/// The predicate runs before the check's own gate; either can skip.
pub fn with_gate<C, P>(predicate: P, inner: C) -> Gated<C>
where
    C: Check,
    P: Fn(&DeviceInfo) -> Option<String> + Send + Sync + 'static,
{
    Gated {
        predicate: Box::new(predicate),
        inner,
    }
}

impl<C: Check> Check for Gated<C> {
    fn meta(&self) -> CheckMeta {
        self.inner.meta()
    }

    fn requests(&self) -> Vec<CommandRequest> {
        self.inner.requests()
    }

    fn gate(&self, device: &DeviceInfo) -> Option<String> {
        (self.predicate)(device).or_else(|| self.inner.gate(device))
    }

    fn evaluate(
        &self,
        entries: &[Arc<CommandEntry>],
        result: &mut CheckResult,
    ) -> anyhow::Result<()> {
        self.inner.evaluate(entries, result)
    }
}

/// Gate predicate skipping a check on the given hardware models
pub fn skip_on_platforms(
    platforms: &[&str],
) -> impl Fn(&DeviceInfo) -> Option<String> + Send + Sync + 'static {
    let platforms: Vec<String> = platforms.iter().map(|p| p.to_string()).collect();
    move |device: &DeviceInfo| {
        let model = device.hardware_model.as_deref()?;
        if platforms.iter().any(|p| p == model) {
            Some(format!("not supported on platform {}", model))
        } else {
            None
        }
    }
}

/// One check bound to one device for its lifetime
pub struct CheckRun {
    check: Arc<dyn Check>,
    device: Arc<dyn Device>,
    entries: Vec<Arc<CommandEntry>>,
    result: CheckResult,
}

impl CheckRun {
    pub fn new(check: Arc<dyn Check>, device: Arc<dyn Device>) -> Self {
        Self {
            check,
            device,
            entries: Vec::new(),
            result: CheckResult::new(),
        }
    }

    pub fn check_name(&self) -> &'static str {
        self.check.meta().name
    }

    pub fn device_name(&self) -> String {
        self.device.info().name
    }

    pub fn result(&self) -> &CheckResult {
        &self.result
    }

    pub fn entries(&self) -> &[Arc<CommandEntry>] {
        &self.entries
    }

    /// Gate and render. Rendered entries register in the per-device cache
    /// so identical command identities share one collection.
    pub fn prepare(&mut self, cache: &CommandCache) {
        if self.result.status() != CheckStatus::Unset {
            return;
        }

        let info = self.device.info();
        if let Some(reason) = self.check.gate(&info) {
            debug!(check = self.check_name(), device = %info.name, "Gate skipped check: {}", reason);
            self.result.record_skipped(reason);
            return;
        }

        for request in self.check.requests() {
            match request.render() {
                Ok(rendered) => {
                    for (spec, params) in rendered {
                        self.entries.push(cache.entry(spec, params));
                    }
                }
                Err(e) => {
                    error!(check = self.check_name(), device = %info.name, "Render failed: {}", e);
                    self.result.record_error(e.to_string());
                    return;
                }
            }
        }
    }

    /// Entries still awaiting collection
    pub fn pending(&self) -> Vec<Arc<CommandEntry>> {
        self.entries
            .iter()
            .filter(|e| !e.is_collected())
            .cloned()
            .collect()
    }

    /// Evaluate the collected outputs into a final verdict.
    ///
    /// A command that carries a failure, or was never collected at all,
    /// turns the run into an error: the probe broke, the assertion was
    /// never checked. A panicking evaluation is contained here and becomes
    /// an error verdict; sibling runs on the device keep theirs.
    pub fn evaluate(&mut self) {
        if self.result.status() != CheckStatus::Unset {
            return;
        }

        for entry in &self.entries {
            if let Some(failure) = entry.failure() {
                self.result.record_error(format!(
                    "command '{}' failed: {}",
                    entry.spec().text,
                    failure
                ));
            } else if !entry.is_collected() {
                self.result.record_error(format!(
                    "command '{}' was never collected",
                    entry.spec().text
                ));
            }
        }
        if self.result.status() != CheckStatus::Unset {
            return;
        }

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.check.evaluate(&self.entries, &mut self.result)
        }));
        match outcome {
            Ok(Ok(())) => self.result.record_success(),
            Ok(Err(e)) => {
                error!(
                    check = self.check_name(),
                    device = %self.device_name(),
                    "Evaluation failed: {:#}",
                    e
                );
                self.result.record_error(format!("{:#}", e));
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    check = self.check_name(),
                    device = %self.device_name(),
                    "Evaluation panicked: {}",
                    message
                );
                self.result.record_error(format!("evaluation panicked: {}", message));
            }
        }
    }

    /// Append this run's verdict to the store
    pub fn record_into(&self, store: &ResultStore) {
        store.record(
            self.device_name(),
            self.check_name(),
            self.check.meta().categories_vec(),
            &self.result,
        );
    }
}

/// Checks that take no per-deployment inputs, ready to run anywhere
pub fn default_catalog() -> Vec<Arc<dyn Check>> {
    vec![
        Arc::new(bgp::VerifyBgpIpv4UnicastState),
        Arc::new(bgp::VerifyBgpEvpnState),
        Arc::new(hardware::VerifyTemperature::gated()),
        Arc::new(interfaces::VerifyInterfaceErrors),
        Arc::new(mlag::VerifyMlagStatus),
        Arc::new(system::VerifyReloadCause),
        Arc::new(vxlan::VerifyVxlan),
    ]
}

/// Fetch the JSON output of an entry, erroring when the command did not
/// produce JSON.
pub(crate) fn json_output(entry: &CommandEntry) -> anyhow::Result<&serde_json::Value> {
    entry
        .json()
        .ok_or_else(|| anyhow!("command '{}' produced no JSON output", entry.spec().text))
}

/// Fetch the text output of an entry, erroring when the command did not
/// produce text.
pub(crate) fn text_output(entry: &CommandEntry) -> anyhow::Result<&str> {
    entry
        .text()
        .ok_or_else(|| anyhow!("command '{}' produced no text output", entry.spec().text))
}

/// Fetch a required key from a JSON object.
///
/// A missing key is a probe or parse problem and surfaces as an error
/// verdict, never as an assertion failure.
pub(crate) fn require<'a>(
    value: &'a serde_json::Value,
    key: &str,
) -> anyhow::Result<&'a serde_json::Value> {
    value
        .get(key)
        .with_context(|| format!("expected key '{}' missing from command output", key))
}
