//! Runtime configuration.
//!
//! Defaults can be overridden through `CELLAR_*` environment variables. The
//! same variables carry the configuration into a worker process.

use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ipc::framing::{DEFAULT_MAX_FRAME_LEN, MAX_WIRE_LEN};

pub const ENV_PACKAGES: &str = "CELLAR_PACKAGES";
pub const ENV_EAGER_BOOTSTRAP: &str = "CELLAR_EAGER_BOOTSTRAP";
pub const ENV_CHANNEL_CAPACITY: &str = "CELLAR_CHANNEL_CAPACITY";
pub const ENV_MAX_FRAME_LEN: &str = "CELLAR_MAX_FRAME_LEN";

/// Settings shared by the in-process worker and the worker binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Extension packages loaded during bootstrap, in order.
    pub packages: Vec<String>,
    /// Start bootstrapping as soon as the worker starts.
    pub eager_bootstrap: bool,
    /// Bound of each direction of the in-process channel.
    pub channel_capacity: usize,
    /// Largest accepted frame body, in bytes.
    pub max_frame_len: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            packages: Vec::new(),
            eager_bootstrap: true,
            channel_capacity: 256,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl RuntimeConfig {
    pub fn with_packages(mut self, packages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.packages = packages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_eager_bootstrap(mut self, eager: bool) -> Self {
        self.eager_bootstrap = eager;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_PACKAGES) {
            config.packages = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(raw) = lookup(ENV_EAGER_BOOTSTRAP) {
            config.eager_bootstrap = parse_flag(ENV_EAGER_BOOTSTRAP, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CHANNEL_CAPACITY) {
            config.channel_capacity = parse_positive(ENV_CHANNEL_CAPACITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_FRAME_LEN) {
            let len: usize = parse_positive(ENV_MAX_FRAME_LEN, &raw)?;
            if len > MAX_WIRE_LEN {
                return Err(Error::Config(format!(
                    "{ENV_MAX_FRAME_LEN} must not exceed {MAX_WIRE_LEN}, got {len}"
                )));
            }
            config.max_frame_len = len;
        }

        Ok(config)
    }

    /// Environment variables reproducing this configuration in a child process.
    pub fn to_env(&self) -> Vec<(&'static str, String)> {
        vec![
            (ENV_PACKAGES, self.packages.join(",")),
            (ENV_EAGER_BOOTSTRAP, self.eager_bootstrap.to_string()),
            (ENV_CHANNEL_CAPACITY, self.channel_capacity.to_string()),
            (ENV_MAX_FRAME_LEN, self.max_frame_len.to_string()),
        ]
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr + PartialEq + Default,
{
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(Error::Config(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
    }
}
