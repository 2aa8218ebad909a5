//! Environment-derived worker settings.
//!
//! Everything is read once at startup; nothing here watches for changes.

use std::path::PathBuf;

use anyhow::{Context, bail};
use uuid::Uuid;

/// Broker endpoint used when `BROKER_URL` is unset.
pub const DEFAULT_BROKER_URL: &str = "redis://127.0.0.1:6379";

/// Queue consumed when `QUEUE` is unset.
pub const DEFAULT_QUEUE: &str = "animation";

/// Attempts per task when `MAX_ATTEMPTS` is unset.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Read-block duration when `BLOCK_MS` is unset (milliseconds).
pub const DEFAULT_BLOCK_MS: u64 = 5_000;

/// Stale-delivery claim threshold when `CLAIM_IDLE_MS` is unset (milliseconds).
pub const DEFAULT_CLAIM_IDLE_MS: u64 = 30_000;

/// Renderer binary when `RENDER_CMD` is unset.
pub const DEFAULT_RENDER_CMD: &str = "render";

/// Staging directory for render inputs when `INPUTS_DIR` is unset.
pub const DEFAULT_INPUTS_DIR: &str = "inputs";

/// Directory the renderer writes artifacts to when `OUTPUTS_DIR` is unset.
pub const DEFAULT_OUTPUTS_DIR: &str = "outputs";

/// Compute device handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl core::fmt::Display for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised for a `DEVICE` value the renderer cannot use.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown device: {0} -- expected 'cpu' or 'cuda'")]
pub struct UnknownDevice(String);

impl core::str::FromStr for Device {
    type Err = UnknownDevice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            other => Err(UnknownDevice(other.to_string())),
        }
    }
}

/// Worker settings, resolved from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Message broker endpoint (`BROKER_URL`)
    pub broker_url: String,
    /// Task store endpoint (`STORE_URL`); falls back to the broker endpoint
    pub store_url: String,
    /// Queue to consume (`QUEUE`)
    pub queue: String,
    /// Consumer name (`WORKER_NAME`); keep it stable across restarts so a
    /// restarted worker reclaims its own pending deliveries
    pub worker_name: String,
    /// Attempts per task (`MAX_ATTEMPTS`)
    pub max_attempts: u32,
    /// Renderer compute device (`DEVICE`)
    pub device: Device,
    /// Queue read-block duration in milliseconds (`BLOCK_MS`)
    pub block_ms: u64,
    /// Stale-delivery claim threshold in milliseconds (`CLAIM_IDLE_MS`)
    pub claim_idle_ms: u64,
    /// Renderer binary (`RENDER_CMD`)
    pub render_cmd: String,
    /// Staging directory for render inputs (`INPUTS_DIR`)
    pub inputs_dir: PathBuf,
    /// Directory the renderer writes artifacts to (`OUTPUTS_DIR`)
    pub outputs_dir: PathBuf,
}

impl Config {
    /// Resolve from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let broker_url = lookup("BROKER_URL").unwrap_or_else(|| {
            tracing::warn!(default = DEFAULT_BROKER_URL, "BROKER_URL unset, using default");
            DEFAULT_BROKER_URL.to_string()
        });
        let store_url = lookup("STORE_URL").unwrap_or_else(|| broker_url.clone());

        let max_attempts: u32 = parse_var(&lookup, "MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            bail!("MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            queue: lookup("QUEUE").unwrap_or_else(|| DEFAULT_QUEUE.to_string()),
            worker_name: lookup("WORKER_NAME")
                .unwrap_or_else(|| format!("worker-{}", Uuid::now_v7())),
            max_attempts,
            device: parse_var(&lookup, "DEVICE", Device::Cpu)?,
            block_ms: parse_var(&lookup, "BLOCK_MS", DEFAULT_BLOCK_MS)?,
            claim_idle_ms: parse_var(&lookup, "CLAIM_IDLE_MS", DEFAULT_CLAIM_IDLE_MS)?,
            render_cmd: lookup("RENDER_CMD").unwrap_or_else(|| DEFAULT_RENDER_CMD.to_string()),
            inputs_dir: PathBuf::from(
                lookup("INPUTS_DIR").unwrap_or_else(|| DEFAULT_INPUTS_DIR.to_string()),
            ),
            outputs_dir: PathBuf::from(
                lookup("OUTPUTS_DIR").unwrap_or_else(|| DEFAULT_OUTPUTS_DIR.to_string()),
            ),
            broker_url,
            store_url,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: core::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("invalid {name}: {raw}")),
        None => Ok(default),
    }
}
