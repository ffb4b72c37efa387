//! ICMP probe: one echo request answered, via the system `ping` binary.

use crate::config::IcmpCheckConfig;
use crate::invoker::{require, CheckOutput, Probe, ProbeError};
use crate::task::CheckConfig;
use std::process::Command;

pub struct IcmpProbe {
    command: String,
    timeout: u64,
}

impl IcmpProbe {
    pub fn new(config: &IcmpCheckConfig) -> Self {
        IcmpProbe {
            command: config.command.clone(),
            timeout: config.timeout,
        }
    }

    fn args(&self, host: &str) -> Vec<String> {
        vec![
            "-c".into(),
            "1".into(),
            "-W".into(),
            self.timeout.to_string(),
            host.to_string(),
        ]
    }
}

impl Probe for IcmpProbe {
    fn expectation(&self) -> &str {
        "1 packet received"
    }

    fn run(&self, config: &CheckConfig, output: &mut CheckOutput) -> Result<bool, ProbeError> {
        let host = require(config, "HOST")?;
        let result = Command::new(&self.command)
            .args(self.args(host))
            .output()
            .map_err(|e| ProbeError::Command(format!("failed to run {}: {}", self.command, e)))?;

        output.add_output_bytes(&result.stdout);
        Ok(result.status.success())
    }
}
