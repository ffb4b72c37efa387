//! Bank webhook: one fire-and-forget POST per passing official check.
//!
//! The body is `{"username": USER, "password": PASS, "team": <team name>}`.
//! Requests run on detached tokio tasks; the response is never inspected and
//! failures are only logged, so a slow or dead bank never holds up a round.

use crate::config::BankConfig;
use crate::task::CheckTask;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankPayload {
    pub username: String,
    pub password: String,
    pub team: String,
}

impl BankPayload {
    /// Payload for a passing official task, or `None` if nothing should be sent.
    pub fn for_task(task: &CheckTask) -> Option<Self> {
        if !(task.official && task.passed) {
            return None;
        }
        let get = |key: &str| task.config.get(key).cloned().unwrap_or_default();
        Some(BankPayload {
            username: get("USER"),
            password: get("PASS"),
            team: task.team_name.clone(),
        })
    }
}

#[derive(Clone)]
pub struct BankNotifier {
    client: reqwest::Client,
    url: String,
}

impl BankNotifier {
    /// `None` when the bank is disabled.
    pub fn from_config(config: &BankConfig) -> anyhow::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Some(BankNotifier {
            client,
            url: config.url.clone(),
        }))
    }

    /// Spawn one POST per eligible task and return how many were sent.
    pub fn notify(&self, tasks: &[CheckTask]) -> usize {
        let mut sent = 0;
        for payload in tasks.iter().filter_map(BankPayload::for_task) {
            let client = self.client.clone();
            let url = self.url.clone();
            tokio::spawn(async move {
                match client.post(&url).json(&payload).send().await {
                    Ok(resp) => debug!(team = %payload.team, status = %resp.status(), "Bank notified"),
                    Err(e) => warn!(team = %payload.team, error = %e, "Bank webhook failed"),
                }
            });
            sent += 1;
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{CheckConfig, CheckId, UNOFFICIAL_ROUND};

    fn task(round: i32, passed: bool) -> CheckTask {
        let mut config = CheckConfig::new();
        config.insert("USER".into(), "alice".into());
        config.insert("PASS".into(), "s3cret".into());
        let mut task = CheckTask::new(CheckId::new("ssh", "login"), config, round, (3, "Team 3"), (1, "SSH"));
        task.passed = passed;
        task
    }

    #[test]
    fn payload_only_for_passing_official_checks() {
        assert_eq!(
            BankPayload::for_task(&task(1, true)),
            Some(BankPayload {
                username: "alice".into(),
                password: "s3cret".into(),
                team: "Team 3".into(),
            })
        );
        assert!(BankPayload::for_task(&task(1, false)).is_none());
        assert!(BankPayload::for_task(&task(UNOFFICIAL_ROUND, true)).is_none());
    }

    #[test]
    fn missing_credentials_become_empty_strings() {
        let mut t = task(2, true);
        t.config.clear();
        let payload = BankPayload::for_task(&t).unwrap();
        assert_eq!(payload.username, "");
        assert_eq!(payload.password, "");
    }

    #[test]
    fn disabled_bank_builds_no_notifier() {
        assert!(BankNotifier::from_config(&BankConfig::default()).unwrap().is_none());
    }

    /// Accept one HTTP request, answer 200 and return its JSON body.
    async fn accept_one_post(listener: tokio::net::TcpListener) -> serde_json::Value {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the body arrived");
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            let Some(split) = text.find("\r\n\r\n") else {
                continue;
            };
            let length = text[..split]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            let body = &buf[split + 4..];
            if body.len() >= length {
                let value = serde_json::from_slice(&body[..length]).unwrap();
                stream
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                    .await
                    .unwrap();
                return value;
            }
        }
    }

    #[tokio::test]
    async fn passing_official_check_posts_credentials_and_team() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(accept_one_post(listener));

        let notifier = BankNotifier::from_config(&BankConfig {
            enabled: true,
            url: format!("http://{}/bank", addr),
        })
        .unwrap()
        .unwrap();
        assert_eq!(notifier.notify(&[task(1, false), task(1, true)]), 1);

        let body = tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("bank was never called")
            .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "username": "alice", "password": "s3cret", "team": "Team 3" })
        );
    }

    #[tokio::test]
    async fn unreachable_bank_does_not_fail_notify() {
        let notifier = BankNotifier::from_config(&BankConfig {
            enabled: true,
            url: "http://127.0.0.1:9/bank".into(),
        })
        .unwrap()
        .unwrap();
        assert_eq!(notifier.notify(&[task(1, true), task(1, false)]), 1);
    }
}
