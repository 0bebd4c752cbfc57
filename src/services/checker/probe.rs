//! HTTP probes of mirror content
//!
//! Repos are checked through `repodata/repomd.xml`, ISO trees through
//! their checksum files.

use std::error::Error as StdError;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};

use super::outcome::CheckOutcome;
use super::{CheckResult, CheckTask};
use crate::error::{AppError, Result};

static REPOMD_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<timestamp>(\d+)</timestamp>").expect("valid regex"));

/// Files tried in order for ISO trees
const ISO_CHECKSUM_FILES: [&str; 2] = ["sha256sum.txt", "CHECKSUM"];

/// Runs probes with a shared HTTP client
#[derive(Clone)]
pub struct Prober {
    client: Client,
}

impl Prober {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Probe a task. Always yields a result, failures are classified.
    pub async fn probe(&self, task: &CheckTask) -> CheckResult {
        let (timestamp, outcome) = if task.iso {
            self.iso_timestamp(&task.url).await
        } else {
            self.repository_timestamp(&task.url).await
        };

        CheckResult {
            mirror_id: task.mirror_id,
            repo_id: task.repo_id,
            timestamp,
            outcome,
        }
    }

    /// Any response for a checksum file counts as current
    async fn iso_timestamp(&self, url: &str) -> (i64, CheckOutcome) {
        for file in ISO_CHECKSUM_FILES {
            let target = format!("{}/{}", url, file);
            if self.client.get(&target).send().await.is_ok() {
                return (chrono::Utc::now().timestamp(), CheckOutcome::OK);
            }
        }
        (0, CheckOutcome::Http(404))
    }

    async fn repository_timestamp(&self, url: &str) -> (i64, CheckOutcome) {
        let target = format!("{}/repodata/repomd.xml", url);

        let response = match self.client.get(&target).send().await {
            Ok(response) => response,
            Err(e) => return (0, classify_error(&e)),
        };

        let status = response.status();
        if status != StatusCode::OK {
            return (0, CheckOutcome::Http(status.as_u16()));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return (0, classify_error(&e)),
        };

        match parse_repomd_timestamp(&body) {
            Some(timestamp) => (timestamp, CheckOutcome::OK),
            None => (0, CheckOutcome::ParseFailure),
        }
    }
}

/// First `<timestamp>` value in a repomd.xml document
pub fn parse_repomd_timestamp(body: &str) -> Option<i64> {
    REPOMD_TIMESTAMP
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok())
}

/// Map a transport error to an outcome code
fn classify_error(err: &reqwest::Error) -> CheckOutcome {
    if err.is_timeout() {
        return CheckOutcome::Timeout;
    }

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return CheckOutcome::HostNotFound;
        }
        if message.contains("timed out") {
            return CheckOutcome::Timeout;
        }
        source = cause.source();
    }

    CheckOutcome::ConnectionError
}
