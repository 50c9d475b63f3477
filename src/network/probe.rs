//! Liveness probes against a single PLU.
//!
//! A probe never fails: every way a device can be unreachable is reported
//! as data through [`ProbeOutcome::Unreachable`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status body served by a PLU at its info endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: u32,
    pub role: i64,
    #[serde(rename = "batLel")]
    pub battery_level: i64,
}

impl StatusReport {
    /// Battery level if it lies in `0..=100`.
    pub fn checked_battery(&self) -> Option<u8> {
        u8::try_from(self.battery_level).ok().filter(|b| *b <= 100)
    }

    /// Role id, or `None` for negative values (devices use `-1` for "no role").
    pub fn role_id(&self) -> Option<u32> {
        u32::try_from(self.role).ok()
    }
}

/// Why a probe did not produce a usable report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnreachableReason {
    /// Connect or transport error
    Connection,
    /// No answer within the probe timeout
    Timeout,
    /// Answered with a non-success status code
    Status(u16),
    /// Answered 200 but the body did not decode to a valid report
    MalformedBody,
}

/// Result of one probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable(StatusReport),
    Unreachable(UnreachableReason),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable(_))
    }
}

/// One bounded reachability check against one address.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, address: &str) -> ProbeOutcome;
}

/// Probe that issues `GET http://<address>/<info_path>`.
pub struct HttpProbe {
    client: reqwest::Client,
    info_path: String,
}

impl HttpProbe {
    pub fn new(info_path: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, info_path))
    }

    pub fn with_client(client: reqwest::Client, info_path: &str) -> Self {
        Self {
            client,
            info_path: info_path.trim_start_matches('/').to_string(),
        }
    }

    fn url(&self, address: &str) -> String {
        format!("http://{}/{}", address, self.info_path)
    }
}

/// Decode a status body; anything that isn't a complete, in-range report is rejected.
pub fn decode_status(body: &[u8]) -> Option<StatusReport> {
    let report: StatusReport = serde_json::from_slice(body).ok()?;
    report.checked_battery()?;
    Some(report)
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        let response = match self.client.get(self.url(address)).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                log::debug!("Probe {} timed out", address);
                return ProbeOutcome::Unreachable(UnreachableReason::Timeout);
            }
            Err(e) => {
                log::debug!("Probe {} failed: {}", address, e);
                return ProbeOutcome::Unreachable(UnreachableReason::Connection);
            }
        };

        let status = response.status();
        if !status.is_success() {
            log::debug!("Probe {} answered {}", address, status);
            return ProbeOutcome::Unreachable(UnreachableReason::Status(status.as_u16()));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return ProbeOutcome::Unreachable(UnreachableReason::Timeout);
            }
            Err(e) => {
                log::debug!("Probe {} body read failed: {}", address, e);
                return ProbeOutcome::Unreachable(UnreachableReason::Connection);
            }
        };

        match decode_status(&body) {
            Some(report) => ProbeOutcome::Reachable(report),
            None => {
                log::debug!("Probe {} returned an undecodable status body", address);
                ProbeOutcome::Unreachable(UnreachableReason::MalformedBody)
            }
        }
    }
}
