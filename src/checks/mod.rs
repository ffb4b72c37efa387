//! # Checks — Built-in Probes
//!
//! Protocol probes shipped with the engine. Each is a small blocking client
//! with its own network timeouts taken from the `[checks.*]` configuration
//! tables; none of them does any internal concurrency.
//!
//! | Identifier | Expectation |
//! |------------|-------------|
//! | `http.check_http` | Website is online |
//! | `icmp.check_icmp` | 1 packet received |
//! | `tcp.check_banner` | Service banner matches |
//!
//! Further probes are added by implementing [`Probe`](crate::invoker::Probe)
//! and registering them on the [`ProbeRegistry`] before the dispatcher is built.

pub mod http;
pub mod icmp;
pub mod tcp;

use crate::config::ChecksConfig;
use crate::invoker::ProbeRegistry;
use crate::task::CheckId;
use std::sync::Arc;

/// Register every built-in probe, configured from `[checks]`.
pub fn register_builtin(registry: &mut ProbeRegistry, config: &ChecksConfig) {
    registry.register(
        CheckId::new("http", "check_http"),
        Arc::new(http::HttpProbe::new(&config.http)),
    );
    registry.register(
        CheckId::new("icmp", "check_icmp"),
        Arc::new(icmp::IcmpProbe::new(&config.icmp)),
    );
    registry.register(
        CheckId::new("tcp", "check_banner"),
        Arc::new(tcp::BannerProbe::new(&config.tcp)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_probes_are_registered() {
        let mut registry = ProbeRegistry::new();
        register_builtin(&mut registry, &ChecksConfig::default());
        let ids: Vec<String> = registry.ids().iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["http.check_http", "icmp.check_icmp", "tcp.check_banner"]);
    }
}
