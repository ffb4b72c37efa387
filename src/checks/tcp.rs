//! TCP banner probe: connect to `HOST:PORT` and, when `EXPECTED` is set,
//! require the first line the service sends to contain it.

use crate::config::TcpCheckConfig;
use crate::invoker::{require, CheckOutput, Probe, ProbeError};
use crate::task::CheckConfig;
use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

pub struct BannerProbe {
    timeout: Duration,
}

impl BannerProbe {
    pub fn new(config: &TcpCheckConfig) -> Self {
        BannerProbe {
            timeout: Duration::from_secs(config.timeout),
        }
    }
}

fn resolve_addr(host: &str, port: &str) -> Result<SocketAddr, ProbeError> {
    let port: u16 = port.parse().map_err(|_| ProbeError::InvalidConfig {
        key: "PORT".into(),
        value: port.into(),
    })?;
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| ProbeError::Protocol(format!("{} did not resolve", host)))
}

impl Probe for BannerProbe {
    fn expectation(&self) -> &str {
        "Service banner matches"
    }

    fn run(&self, config: &CheckConfig, output: &mut CheckOutput) -> Result<bool, ProbeError> {
        let host = require(config, "HOST")?;
        let addr = resolve_addr(host, require(config, "PORT")?)?;

        output.add_output(format!("Connecting to {} ...", addr));
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        output.add_output("... connected!");

        let Some(expected) = config.get("EXPECTED") else {
            return Ok(true);
        };

        let mut banner = String::new();
        BufReader::new(stream).read_line(&mut banner)?;
        let banner = banner.trim_end();
        output.add_output(format!("Received banner {:?}", banner));

        if !banner.contains(expected.as_str()) {
            output.add_output(format!("ERROR: expected banner to contain {:?}", expected));
            return Ok(false);
        }
        Ok(true)
    }
}
