//! Fire-and-forget state commands to PLUs.
//!
//! Commands are `POST http://<address>/<config_path>` with a small JSON body.
//! A broadcast delivers to every address in its own task; one offline unit
//! never holds up or cancels delivery to the others.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::task::{self, JoinHandle};

/// Production line run state, as understood by the PLU firmware.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineState {
    Stop,
    Start,
    Pause,
    Restart,
}

impl LineState {
    /// Wire code sent in the `state` field.
    pub fn code(self) -> i32 {
        match self {
            LineState::Stop => 0,
            LineState::Start => 1,
            LineState::Pause => 2,
            LineState::Restart => 3,
        }
    }
}

impl FromStr for LineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stop" => Ok(LineState::Stop),
            "start" => Ok(LineState::Start),
            "pause" => Ok(LineState::Pause),
            "restart" => Ok(LineState::Restart),
            other => Err(format!("unknown line state {:?}", other)),
        }
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LineState::Stop => "stop",
            LineState::Start => "start",
            LineState::Pause => "pause",
            LineState::Restart => "restart",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    /// `{state}`
    SetState(LineState),
    /// `{role, state}`: give the unit a role by name
    AssignRole { role: String, state: LineState },
}

impl DeviceCommand {
    pub fn payload(&self) -> serde_json::Value {
        match self {
            DeviceCommand::SetState(state) => json!({ "state": state.code() }),
            DeviceCommand::AssignRole { role, state } => {
                json!({ "role": role, "state": state.code() })
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Request to {0} failed: {1}")]
    Request(String, String),

    #[error("{0} answered {1}")]
    Status(String, u16),
}

#[derive(Clone)]
pub struct CommandDispatcher {
    client: reqwest::Client,
    config_path: String,
}

impl CommandDispatcher {
    pub fn new(config_path: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self::with_client(client, config_path))
    }

    pub fn with_client(client: reqwest::Client, config_path: &str) -> Self {
        Self {
            client,
            config_path: config_path.trim_start_matches('/').to_string(),
        }
    }

    fn url(&self, address: &str) -> String {
        format!("http://{}/{}", address, self.config_path)
    }

    /// Deliver one command and wait for the device to acknowledge it.
    pub async fn send(&self, address: &str, command: &DeviceCommand) -> Result<(), CommandError> {
        let response = self
            .client
            .post(self.url(address))
            .json(&command.payload())
            .send()
            .await
            .map_err(|e| CommandError::Request(address.to_string(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CommandError::Status(address.to_string(), status.as_u16()));
        }
        Ok(())
    }

    /// Send `command` to every address concurrently without waiting.
    ///
    /// Failures are logged and dropped. The returned handle resolves once
    /// every delivery attempt has finished; callers are free to ignore it.
    pub fn broadcast(&self, addresses: Vec<String>, command: DeviceCommand) -> JoinHandle<()> {
        let dispatcher = self.clone();
        task::spawn(async move {
            let deliveries: Vec<JoinHandle<()>> = addresses
                .into_iter()
                .map(|address| {
                    let dispatcher = dispatcher.clone();
                    let command = command.clone();
                    task::spawn(async move {
                        match dispatcher.send(&address, &command).await {
                            Ok(()) => log::debug!("Delivered {:?} to {}", command, address),
                            Err(e) => log::warn!("Failed to deliver command: {}", e),
                        }
                    })
                })
                .collect();

            for delivery in deliveries {
                let _ = delivery.await;
            }
        })
    }
}
