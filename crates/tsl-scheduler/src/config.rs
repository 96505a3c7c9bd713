use core::fmt;
use core::str::FromStr;
use std::path::Path;

use context::MIN_STACK_SIZE;
use derive_builder::Builder;
use serde::Deserialize;

use crate::error::{ConfigError, TslError};
use crate::thread::Tid;

pub const DEFAULT_MAX_THREADS: usize = 256;
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;
pub const DEFAULT_MAIN_TID: Tid = 0;
pub const DEFAULT_RANDOM_SEED: u64 = 0x5EED;

pub const ENV_POLICY: &str = "TSL_POLICY";
pub const ENV_MAX_THREADS: &str = "TSL_MAX_THREADS";
pub const ENV_STACK_SIZE: &str = "TSL_STACK_SIZE";
pub const ENV_MAIN_TID: &str = "TSL_MAIN_TID";
pub const ENV_RANDOM_SEED: &str = "TSL_RANDOM_SEED";
pub const ENV_EXIT_CODE: &str = "TSL_EXIT_CODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum SchedulingPolicy {
    /// First come, first served.
    #[default]
    Fcfs,
    RoundRobin,
    Random,
}

impl SchedulingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fcfs => "fcfs",
            Self::RoundRobin => "rr",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fcfs" | "fifo" => Ok(Self::Fcfs),
            "rr" | "round-robin" | "round_robin" | "roundrobin" => Ok(Self::RoundRobin),
            "random" => Ok(Self::Random),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

impl TryFrom<String> for SchedulingPolicy {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Scheduler settings, fixed at `init`.
///
/// Built in code through [`SchedulerConfigBuilder`], loaded from TOML with
/// [`SchedulerConfig::from_file`], or taken from `TSL_*` environment variables
/// with [`SchedulerConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq, Builder, Deserialize)]
#[builder(default, build_fn(validate = "Self::check"))]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub policy: SchedulingPolicy,
    /// Capacity of the thread table, main thread included.
    pub max_threads: usize,
    /// Usable bytes per thread stack. TOML accepts `65536` or `"64KiB"`.
    #[serde(deserialize_with = "deserialize_size")]
    pub stack_size: usize,
    /// Id reserved for the thread that calls `init`.
    pub main_tid: Tid,
    pub random_seed: u64,
    /// Process exit status once the last thread exits.
    pub exit_code: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            policy: SchedulingPolicy::default(),
            max_threads: DEFAULT_MAX_THREADS,
            stack_size: DEFAULT_STACK_SIZE,
            main_tid: DEFAULT_MAIN_TID,
            random_seed: DEFAULT_RANDOM_SEED,
            exit_code: 0,
        }
    }
}

impl SchedulerConfigBuilder {
    fn check(&self) -> Result<(), String> {
        if self.max_threads == Some(0) {
            return Err(ConfigError::ZeroThreads.to_string());
        }
        match self.stack_size {
            Some(size) if size < MIN_STACK_SIZE => Err(ConfigError::StackTooSmall(size).to_string()),
            _ => Ok(()),
        }
    }
}

impl From<SchedulerConfigBuilderError> for ConfigError {
    fn from(e: SchedulerConfigBuilderError) -> Self {
        Self::Builder(e.to_string())
    }
}

impl From<SchedulerConfigBuilderError> for TslError {
    fn from(e: SchedulerConfigBuilderError) -> Self {
        Self::InvalidConfig(e.into())
    }
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ConfigError::StackTooSmall(self.stack_size));
        }
        if self.main_tid.checked_add(self.max_threads).is_none() {
            return Err(ConfigError::TidOverflow);
        }
        Ok(())
    }

    /// Defaults overlaid with whichever `TSL_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values returned by `lookup` for the `TSL_*` keys.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup(ENV_POLICY) {
            self.policy = v.parse()?;
        }
        if let Some(v) = lookup(ENV_MAX_THREADS) {
            self.max_threads = parse_env(ENV_MAX_THREADS, &v)?;
        }
        if let Some(v) = lookup(ENV_STACK_SIZE) {
            self.stack_size = parse_stack_size(&v).map_err(|message| ConfigError::Env {
                var: ENV_STACK_SIZE,
                message,
            })?;
        }
        if let Some(v) = lookup(ENV_MAIN_TID) {
            self.main_tid = parse_env(ENV_MAIN_TID, &v)?;
        }
        if let Some(v) = lookup(ENV_RANDOM_SEED) {
            self.random_seed = parse_seed(&v).map_err(|message| ConfigError::Env {
                var: ENV_RANDOM_SEED,
                message,
            })?;
        }
        if let Some(v) = lookup(ENV_EXIT_CODE) {
            self.exit_code = parse_env(ENV_EXIT_CODE, &v)?;
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

/// Parse `65536`, `64KiB`, `64K` or `1MiB` into bytes. Units are binary.
pub fn parse_stack_size(s: &str) -> Result<usize, String> {
    let bytes = parse_size::Config::new()
        .with_binary()
        .parse_size(s.trim())
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    usize::try_from(bytes).map_err(|_| format!("size '{s}' does not fit in usize"))
}

fn parse_seed(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid seed '{s}': {e}"))
}

fn parse_env<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        message: format!("invalid value '{value}': {e}"),
    })
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(n) => usize::try_from(n).map_err(serde::de::Error::custom),
        Size::Text(s) => parse_stack_size(&s).map_err(serde::de::Error::custom),
    }
}
