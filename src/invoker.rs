//! # Invoker — Uniform Probe Invocation
//!
//! Every probe satisfies one capability: take a resolved configuration map
//! and an output log, return pass/fail or an error. The invoker wraps that
//! capability with the standard contract shared by all checks:
//!
//! 1. Look the probe up in the [`ProbeRegistry`] by `(group, function)`.
//!    An unknown identifier is a configuration error and aborts the task
//!    with [`UnknownCheck`]; it is never converted to data.
//! 2. Write the preamble (`ScoreEngine: <service> Check`, `EXPECTED: ...`,
//!    `OUTPUT:`).
//! 3. Run the probe. A returned [`ProbeError`] becomes `passed = false` plus
//!    an `ERROR: <kind>: <message>` line; it never escapes the invoker. A
//!    panicking probe is treated the same way with an `ERROR: Panic: ...`
//!    line, so one bad probe never takes the rest of a round with it.
//! 4. On success append `Check successful!`.
//!
//! The registry is populated once at process start (see
//! [`crate::checks::register_builtin`]) and shared read-only between
//! workers.

use crate::dispatch::DispatchError;
use crate::task::{CheckConfig, CheckId, CheckTask};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Final line appended to the output log of a passing check.
pub const SUCCESS_LINE: &str = "Check successful!";

// ── Probe errors ────────────────────────────────────────────────

/// Failure raised by a probe while checking a team's service.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("required config key {0:?} is missing")]
    MissingConfig(String),
    #[error("config key {key:?} has invalid value {value:?}")]
    InvalidConfig { key: String, value: String },
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("operation timed out after {0}s")]
    Timeout(u64),
    #[error("{0}")]
    Http(String),
    #[error("{0}")]
    Protocol(String),
    #[error("{0}")]
    Command(String),
    #[error("soft time limit of {0}s exceeded")]
    SoftTimeLimitExceeded(u64),
}

impl ProbeError {
    /// Short error kind written into the output log.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::MissingConfig(_) => "MissingConfig",
            ProbeError::InvalidConfig { .. } => "InvalidConfig",
            ProbeError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => "Timeout",
            ProbeError::Io(_) => "IoError",
            ProbeError::Timeout(_) => "Timeout",
            ProbeError::Http(_) => "HttpError",
            ProbeError::Protocol(_) => "ProtocolError",
            ProbeError::Command(_) => "CommandError",
            ProbeError::SoftTimeLimitExceeded(_) => "SoftTimeLimitExceeded",
        }
    }

    /// The `ERROR: <kind>: <message>` output line for this error.
    pub fn output_line(&self) -> String {
        format!("ERROR: {}: {}", self.kind(), self)
    }
}

/// No probe is registered under the task's `group.function`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown check {group}.{function}")]
pub struct UnknownCheck {
    pub group: String,
    pub function: String,
}

impl From<UnknownCheck> for DispatchError {
    fn from(e: UnknownCheck) -> Self {
        DispatchError::UnknownCheck {
            group: e.group,
            function: e.function,
        }
    }
}

// ── Output log ──────────────────────────────────────────────────

/// Append-only output log handed to probes.
#[derive(Debug, Default)]
pub struct CheckOutput {
    lines: Vec<String>,
}

impl CheckOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_output(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Append raw bytes (e.g. subprocess output), decoding lossily as UTF-8.
    pub fn add_output_bytes(&mut self, bytes: &[u8]) {
        self.lines.push(String::from_utf8_lossy(bytes).into_owned());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

// ── Probe capability ────────────────────────────────────────────

/// A protocol-specific test against one team's service.
pub trait Probe: Send + Sync {
    /// Human-readable expectation shown in the `EXPECTED:` preamble line.
    fn expectation(&self) -> &str;

    /// Run the check. `Ok(false)` and `Err(_)` both mean the check failed.
    fn run(&self, config: &CheckConfig, output: &mut CheckOutput) -> Result<bool, ProbeError>;
}

/// Signature of a plain probe function.
pub type ProbeFn = fn(&CheckConfig, &mut CheckOutput) -> Result<bool, ProbeError>;

/// Adapts a plain function plus its expectation string into a [`Probe`].
pub struct FnProbe {
    expectation: String,
    func: ProbeFn,
}

impl FnProbe {
    pub fn new(expectation: impl Into<String>, func: ProbeFn) -> Self {
        FnProbe {
            expectation: expectation.into(),
            func,
        }
    }
}

impl Probe for FnProbe {
    fn expectation(&self) -> &str {
        &self.expectation
    }

    fn run(&self, config: &CheckConfig, output: &mut CheckOutput) -> Result<bool, ProbeError> {
        (self.func)(config, output)
    }
}

/// Fetch a required key from a probe's configuration.
pub fn require<'a>(config: &'a CheckConfig, key: &str) -> Result<&'a str, ProbeError> {
    config
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ProbeError::MissingConfig(key.to_string()))
}

// ── Registry ────────────────────────────────────────────────────

/// Explicit mapping from `(group, function)` to probe implementations.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    probes: HashMap<CheckId, Arc<dyn Probe>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in probe.
    pub fn with_builtin(config: &crate::config::ChecksConfig) -> Self {
        let mut registry = Self::new();
        crate::checks::register_builtin(&mut registry, config);
        registry
    }

    pub fn register(&mut self, id: CheckId, probe: Arc<dyn Probe>) {
        self.probes.insert(id, probe);
    }

    /// Register a plain probe function under `group.function`.
    pub fn register_fn(&mut self, group: &str, function: &str, expectation: &str, func: ProbeFn) {
        self.register(
            CheckId::new(group, function),
            Arc::new(FnProbe::new(expectation, func)),
        );
    }

    pub fn get(&self, id: &CheckId) -> Result<Arc<dyn Probe>, UnknownCheck> {
        self.probes
            .get(id)
            .cloned()
            .ok_or_else(|| UnknownCheck {
                group: id.group.clone(),
                function: id.function.clone(),
            })
    }

    pub fn contains(&self, id: &CheckId) -> bool {
        self.probes.contains_key(id)
    }

    /// Registered identifiers in sorted order.
    pub fn ids(&self) -> Vec<CheckId> {
        let mut ids: Vec<CheckId> = self.probes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

// ── Invocation ──────────────────────────────────────────────────

/// Run `probe` under the standard contract, filling in `passed` and `output`.
pub fn invoke_probe(probe: &dyn Probe, mut task: CheckTask) -> CheckTask {
    let mut output = CheckOutput::new();
    output.add_output(format!("ScoreEngine: {} Check", task.service_name));
    output.add_output(format!("EXPECTED: {}", probe.expectation()));
    output.add_output("OUTPUT:");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| probe.run(&task.config, &mut output)));
    let passed = match outcome {
        Ok(Ok(passed)) => passed,
        Ok(Err(e)) => {
            output.add_output(e.output_line());
            false
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                check = %task.check,
                team = %task.team_name,
                service = %task.service_name,
                panic = %message,
                "Probe panicked"
            );
            output.add_output(format!("ERROR: Panic: {}", message));
            false
        }
    };
    if passed {
        output.add_output(SUCCESS_LINE);
    }

    task.passed = passed;
    task.output.extend(output.into_lines());
    task
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "probe panicked".to_string()
    }
}

/// Resolve the task's probe and invoke it. Lookup failure aborts the task.
pub fn invoke(registry: &ProbeRegistry, task: CheckTask) -> Result<CheckTask, UnknownCheck> {
    let probe = registry.get(&task.check).inspect_err(|e| {
        tracing::error!(
            check = %task.check,
            team = %task.team_name,
            service = %task.service_name,
            error = %e,
            "Check lookup failed"
        );
    })?;
    Ok(invoke_probe(probe.as_ref(), task))
}
