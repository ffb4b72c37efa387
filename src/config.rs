//! # Config — Score Engine TOML Configuration
//!
//! The whole engine is driven by one TOML file, loaded once at start-up,
//! validated, and then passed around as an immutable `Arc<Config>` to the
//! scheduler, dispatcher, task builder, queue worker and database seeding.
//!
//! ## Sections
//!
//! - `[round]` — official round cadence (`duration ± jitter` seconds)
//! - `[trafficgen]` — unofficial noise cycles (`number` tasks every `sleep` seconds)
//! - `[worker]` — local pool width / worker in-flight limit and soft time limit
//! - `[queue]` — Redis connection for the distributed backend
//! - `[bank]` — optional webhook fired for every passing official check
//! - `[scheduler]` — bookkeeping limits for in-flight cycles
//! - `[teams]` — numbered team range used when seeding (the maximum is the check team)
//! - `[checks.*]` — built-in probe settings
//! - `[[services]]` — scored services with their per-team configuration data

use crate::task::CheckId;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ── TOML Configuration Structs ──────────────────────────────────

/// Top-level score engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub round: RoundConfig,
    #[serde(default)]
    pub trafficgen: TrafficGenConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub bank: BankConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub teams: TeamsConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// The `[round]` section. Sleep between rounds is drawn uniformly from
/// `[duration - jitter, duration + jitter]` seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundConfig {
    pub duration: u64,
    #[serde(default)]
    pub jitter: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        RoundConfig {
            duration: 60,
            jitter: 0,
        }
    }
}

/// The `[trafficgen]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficGenConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of tasks per traffic cycle.
    pub number: usize,
    /// Seconds between traffic cycles.
    pub sleep: u64,
}

impl Default for TrafficGenConfig {
    fn default() -> Self {
        TrafficGenConfig {
            enabled: true,
            number: 5,
            sleep: 10,
        }
    }
}

/// The `[worker]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Local pool width, and the number of tasks a queue worker runs at once.
    pub concurrency: usize,
    /// Seconds a queue worker lets a check run before failing it.
    #[serde(default = "default_soft_time_limit")]
    pub soft_time_limit: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            concurrency: 8,
            soft_time_limit: default_soft_time_limit(),
        }
    }
}

/// The `[queue]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub redis_url: String,
    #[serde(default = "default_queue_name")]
    pub name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            redis_url: "redis://127.0.0.1/".to_string(),
            name: default_queue_name(),
        }
    }
}

/// The `[bank]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
}

/// The `[scheduler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on dispatch cycles tracked at once by the cycle registry.
    pub max_tracked_cycles: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_tracked_cycles: 64,
        }
    }
}

/// The `[teams]` section: teams `minimum..=maximum` are created by `db init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamsConfig {
    pub minimum: u32,
    pub maximum: u32,
}

impl Default for TeamsConfig {
    fn default() -> Self {
        TeamsConfig {
            minimum: 1,
            maximum: 2,
        }
    }
}

/// The `[checks]` table: per-probe settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksConfig {
    #[serde(default)]
    pub http: HttpCheckConfig,
    #[serde(default)]
    pub icmp: IcmpCheckConfig,
    #[serde(default)]
    pub tcp: TcpCheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCheckConfig {
    pub timeout: u64,
}

impl Default for HttpCheckConfig {
    fn default() -> Self {
        HttpCheckConfig { timeout: 15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcmpCheckConfig {
    #[serde(default = "default_ping")]
    pub command: String,
    pub timeout: u64,
}

impl Default for IcmpCheckConfig {
    fn default() -> Self {
        IcmpCheckConfig {
            command: default_ping(),
            timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpCheckConfig {
    pub timeout: u64,
}

impl Default for TcpCheckConfig {
    fn default() -> Self {
        TcpCheckConfig { timeout: 10 }
    }
}

/// One `[[services]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Probe identifier in `group.function` form.
    pub check: String,
    #[serde(default)]
    pub data: Vec<ServiceDatum>,
}

impl ServiceConfig {
    pub fn check_id(&self) -> Option<CheckId> {
        CheckId::parse(&self.check)
    }
}

/// A per-team configuration row template. `{team}` in `value` is replaced
/// with the team number when seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDatum {
    pub key: String,
    pub value: toml::Value,
    #[serde(default = "default_true")]
    pub edit: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl ServiceDatum {
    /// The value rendered for one team.
    pub fn render(&self, team: u32) -> String {
        let raw = match &self.value {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        raw.replace("{team}", &team.to_string())
    }
}

fn default_true() -> bool {
    true
}

fn default_soft_time_limit() -> u64 {
    30
}

fn default_queue_name() -> String {
    "scoreengine:checks".to_string()
}

fn default_ping() -> String {
    "ping".to_string()
}

// ── TOML Parsing ────────────────────────────────────────────────

impl Config {
    /// Parse and validate a configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Config> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    /// Inclusive `(minimum, maximum)` sleep between official rounds, in seconds.
    pub fn sleep_range(&self) -> (u64, u64) {
        (
            self.round.duration - self.round.jitter,
            self.round.duration + self.round.jitter,
        )
    }

    /// Check the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.round.duration == 0 {
            anyhow::bail!("round.duration must be positive");
        }
        if self.round.jitter > self.round.duration {
            anyhow::bail!(
                "round.jitter ({}) cannot exceed round.duration ({})",
                self.round.jitter,
                self.round.duration
            );
        }
        if self.worker.concurrency == 0 {
            anyhow::bail!("worker.concurrency must be at least 1");
        }
        if self.worker.soft_time_limit == 0 {
            anyhow::bail!("worker.soft_time_limit must be positive");
        }
        if self.trafficgen.enabled && self.trafficgen.sleep == 0 {
            anyhow::bail!("trafficgen.sleep must be positive when traffic generation is enabled");
        }
        if self.scheduler.max_tracked_cycles == 0 {
            anyhow::bail!("scheduler.max_tracked_cycles must be at least 1");
        }
        if self.teams.minimum >= self.teams.maximum {
            anyhow::bail!(
                "teams.minimum ({}) must be less than teams.maximum ({})",
                self.teams.minimum,
                self.teams.maximum
            );
        }
        if self.bank.enabled && self.bank.url.is_empty() {
            anyhow::bail!("bank.url is required when bank.enabled = true");
        }

        let mut names = std::collections::HashSet::new();
        for service in &self.services {
            if service.check_id().is_none() {
                anyhow::bail!(
                    "Service '{}' has check '{}'; expected 'group.function'",
                    service.name,
                    service.check
                );
            }
            if !names.insert(service.name.as_str()) {
                anyhow::bail!("Duplicate service name '{}'", service.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[round]
duration = 60
jitter = 10

[trafficgen]
number = 3
sleep = 5

[worker]
concurrency = 4

[teams]
minimum = 1
maximum = 4

[checks.http]
timeout = 5

[[services]]
name = "Web"
check = "http.check_http"
data = [
    { key = "HOST", value = "10.0.{team}.10" },
    { key = "PORT", value = 80 },
    { key = "USERPASS", value = "admin||changeme", hidden = true },
]

[[services]]
name = "SSH"
check = "tcp.check_banner"
"#;

    #[test]
    fn parses_sample_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.sleep_range(), (50, 70));
        assert_eq!(config.trafficgen.number, 3);
        assert!(config.trafficgen.enabled);
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.soft_time_limit, 30);
        assert_eq!(config.checks.http.timeout, 5);
        assert_eq!(config.checks.icmp.command, "ping");
        assert_eq!(config.services.len(), 2);
        assert_eq!(
            config.services[0].check_id(),
            Some(CheckId::new("http", "check_http"))
        );
        assert!(!config.bank.enabled);
    }

    #[test]
    fn datum_renders_team_number() {
        let config = Config::parse(SAMPLE).unwrap();
        let data = &config.services[0].data;
        assert_eq!(data[0].render(3), "10.0.3.10");
        assert_eq!(data[1].render(3), "80");
        assert!(data[0].edit);
        assert!(!data[0].hidden);
        assert!(data[2].hidden);
    }

    #[test]
    fn rejects_jitter_larger_than_duration() {
        let err = Config::parse("[round]\nduration = 5\njitter = 6\n").unwrap_err();
        assert!(err.to_string().contains("jitter"));
    }

    #[test]
    fn rejects_malformed_check_identifier() {
        let toml = "[[services]]\nname = \"Web\"\ncheck = \"check_http\"\n";
        let err = Config::parse(toml).unwrap_err();
        assert!(err.to_string().contains("group.function"));
    }

    #[test]
    fn rejects_duplicate_service_names() {
        let toml = "[[services]]\nname = \"Web\"\ncheck = \"http.check_http\"\n\
                    [[services]]\nname = \"Web\"\ncheck = \"icmp.check_icmp\"\n";
        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn rejects_inverted_team_range() {
        let err = Config::parse("[teams]\nminimum = 5\nmaximum = 5\n").unwrap_err();
        assert!(err.to_string().contains("teams.minimum"));
    }

    #[test]
    fn rejects_bank_without_url() {
        assert!(Config::parse("[bank]\nenabled = true\n").is_err());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.round.duration, 60);
        assert_eq!(config.scheduler.max_tracked_cycles, 64);
        assert!(config.services.is_empty());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scoreengine.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(Config::load(&path).unwrap().services.len(), 2);
        assert!(Config::load(&dir.path().join("missing.toml")).is_err());
    }
}
