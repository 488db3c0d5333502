//! VPN control seam and the ExpressVPN CLI implementation.

use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::VpnConfig;

/// Public IP echo services, tried in order.
const IP_ENDPOINTS: &[&str] = &[
    "https://api.ipify.org",
    "https://ifconfig.me/ip",
    "https://icanhazip.com",
];

/// Errors from the VPN control tool.
#[derive(Debug, Error)]
pub enum VpnError {
    #[error("VPN tool not found: {0}")]
    NotInstalled(String),

    #[error("VPN command '{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("VPN command '{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Controls the network egress identity.
#[async_trait]
pub trait VpnControl: Send + Sync {
    /// Whether the control tool is installed and responds.
    async fn is_available(&self) -> bool;

    async fn is_connected(&self) -> Result<bool, VpnError>;

    async fn disconnect(&self) -> Result<(), VpnError>;

    /// Connect to `location`, giving up after `limit`.
    async fn connect_to(&self, location: &str, limit: Duration) -> Result<(), VpnError>;

    /// Current public IP, when it can be determined.
    async fn public_ip(&self) -> Option<String> {
        None
    }
}

/// Drives the `expressvpnctl` command line tool.
pub struct ExpressVpnCli {
    tool: String,
    post_connect_delay: Duration,
    http: Option<reqwest::Client>,
}

impl ExpressVpnCli {
    pub fn new(config: &VpnConfig) -> Self {
        let http = if config.verify_ip_change {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| warn!(error = %e, "IP verification disabled"))
                .ok()
        } else {
            None
        };

        Self {
            tool: config.tool.clone(),
            post_connect_delay: Duration::from_secs(config.post_connect_delay_secs),
            http,
        }
    }

    async fn run(&self, args: &[&str], limit: Duration) -> Result<Output, VpnError> {
        let command = format!("{} {}", self.tool, args.join(" "));
        debug!(command = %command, "Running VPN command");

        let child = Command::new(&self.tool)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = match timeout(limit, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VpnError::NotInstalled(self.tool.clone()));
            }
            Ok(Err(e)) => return Err(VpnError::Io(e)),
            Err(_) => {
                return Err(VpnError::Timeout {
                    command,
                    secs: limit.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stderr = if stderr.is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr
            };
            return Err(VpnError::CommandFailed { command, stderr });
        }
        Ok(output)
    }
}

/// Interpret `status` output.
fn parse_connected(stdout: &str) -> bool {
    let lower = stdout.to_ascii_lowercase();
    lower.contains("connected")
        && !lower.contains("not connected")
        && !lower.contains("disconnected")
}

#[async_trait]
impl VpnControl for ExpressVpnCli {
    async fn is_available(&self) -> bool {
        self.run(&["--version"], Duration::from_secs(10)).await.is_ok()
    }

    async fn is_connected(&self) -> Result<bool, VpnError> {
        let output = self.run(&["status"], Duration::from_secs(10)).await?;
        Ok(parse_connected(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn disconnect(&self) -> Result<(), VpnError> {
        self.run(&["disconnect"], Duration::from_secs(30)).await?;
        Ok(())
    }

    async fn connect_to(&self, location: &str, limit: Duration) -> Result<(), VpnError> {
        self.run(&["connect", location], limit).await?;
        if !self.post_connect_delay.is_zero() {
            tokio::time::sleep(self.post_connect_delay).await;
        }
        Ok(())
    }

    async fn public_ip(&self) -> Option<String> {
        let http = self.http.as_ref()?;
        for endpoint in IP_ENDPOINTS {
            match http.get(*endpoint).send().await {
                Ok(resp) if resp.status().is_success() => {
                    if let Ok(body) = resp.text().await {
                        let ip = body.trim();
                        if !ip.is_empty() {
                            return Some(ip.to_string());
                        }
                    }
                }
                Ok(resp) => debug!(endpoint, status = %resp.status(), "IP lookup rejected"),
                Err(e) => debug!(endpoint, error = %e, "IP lookup failed"),
            }
        }
        None
    }
}
