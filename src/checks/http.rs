//! HTTP probe: the team's website answers `GET /` with status 200.

use crate::config::HttpCheckConfig;
use crate::invoker::{require, CheckOutput, Probe, ProbeError};
use crate::task::CheckConfig;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

pub struct HttpProbe {
    timeout: u64,
}

impl HttpProbe {
    pub fn new(config: &HttpCheckConfig) -> Self {
        HttpProbe {
            timeout: config.timeout,
        }
    }

    fn agent(&self) -> ureq::Agent {
        ureq::Agent::new_with_config(
            ureq::config::Config::builder()
                .timeout_global(Some(Duration::from_secs(self.timeout)))
                .http_status_as_error(false)
                .build(),
        )
    }
}

/// Base URL of the team's web service.
pub fn base_url(config: &CheckConfig) -> Result<String, ProbeError> {
    let host = require(config, "HOST")?;
    let port = require(config, "PORT")?;
    Ok(format!("http://{}:{}", host, port))
}

impl Probe for HttpProbe {
    fn expectation(&self) -> &str {
        "Website is online"
    }

    fn run(&self, config: &CheckConfig, output: &mut CheckOutput) -> Result<bool, ProbeError> {
        let url = base_url(config)?;
        output.add_output(format!("Connecting to {}", url));

        let response = self
            .agent()
            .get(&url)
            .header("Connection", "close")
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|e| match e {
                ureq::Error::Timeout(_) => ProbeError::Timeout(self.timeout),
                other => ProbeError::Http(other.to_string()),
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            output.add_output(format!("ERROR: Page returned status code {}", status));
            return Ok(false);
        }
        Ok(true)
    }
}
