//! Configuration management for the FCM miner
//!
//! Supports configuration via command line arguments, environment variables,
//! and configuration files (YAML/JSON) with validation and defaults. Values
//! given on the command line or through the environment take precedence over
//! the configuration file.

use crate::address::Address;
use crate::chain::PollSchedule;
use crate::client::{DEFAULT_CONTRACT_ID, DEFAULT_RPC_URL};
use crate::miner::{MinerConfig, StalePolicy};
use crate::transaction::DEFAULT_BASE_FEE;
use crate::types::MinerMessage;
use crate::{Error, Result};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level: tracing::Level = (*self).into();
        write!(f, "{}", level.as_str().to_lowercase())
    }
}

/// Log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    Plain,
    /// One JSON object per event
    Json,
}

/// Complete configuration for the miner
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "fcm-miner",
    version = env!("CARGO_PKG_VERSION"),
    about = "FCM proof-of-work miner",
    long_about = "Mines blocks of the FCM Soroban contract and prints the assembled transaction for manual signing"
)]
pub struct Config {
    /// Print program info and exit
    #[arg(long)]
    #[serde(skip)]
    pub info: bool,

    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(skip)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Soroban RPC endpoint
    #[arg(long, env = "FCM_RPC_URL", default_value = DEFAULT_RPC_URL)]
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Mining contract id (C... strkey)
    #[arg(long, env = "FCM_CONTRACT_ID", default_value = DEFAULT_CONTRACT_ID)]
    #[serde(default = "default_contract_id")]
    pub contract_id: String,

    /// Miner account (G... strkey), credited for mined blocks
    #[arg(short = 'k', long, env = "FCM_MINER")]
    #[serde(default)]
    pub miner: Option<String>,

    /// Message recorded in the mined block (at most 64 characters)
    #[arg(short = 'm', long, env = "FCM_MESSAGE")]
    #[serde(default)]
    pub message: Option<String>,

    /// Inclusion fee in stroops, before resource fees
    #[arg(long, default_value_t = DEFAULT_BASE_FEE)]
    #[serde(default = "default_base_fee")]
    pub base_fee: u32,

    /// Delay before the first chain state poll (e.g. "1s")
    #[arg(long, default_value = "1s")]
    #[serde(default = "default_poll_delay")]
    pub poll_delay: String,

    /// Interval between chain state polls (e.g. "8s")
    #[arg(long, default_value = "8s")]
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// HTTP timeout in milliseconds
    #[arg(long, default_value = "30000")]
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,

    /// Nonce trials between yields to the runtime
    #[arg(long, default_value = "1")]
    #[serde(default = "default_yield_every")]
    pub yield_every: u64,

    /// Reaction to the chain tip moving during a search
    #[arg(long, value_enum, default_value = "abort")]
    #[serde(default)]
    pub stale_policy: StalePolicy,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain")]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process arguments, environment and the
    /// configuration file if specified
    pub async fn load() -> Result<Self> {
        let matches = Self::command().get_matches();
        Self::from_matches(matches).await
    }

    /// Load configuration from an explicit argument list
    pub async fn load_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command()
            .try_get_matches_from(args)
            .map_err(|e| Error::config(e.to_string()))?;
        Self::from_matches(matches).await
    }

    async fn from_matches(matches: ArgMatches) -> Result<Self> {
        let mut config =
            Self::from_arg_matches(&matches).map_err(|e| Error::config(e.to_string()))?;

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config, &matches);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            // Default to YAML
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config; explicit CLI and env values win
    fn merge_with_file(mut self, file: Self, matches: &ArgMatches) -> Self {
        let explicit = |id: &str| {
            matches!(
                matches.value_source(id),
                Some(ValueSource::CommandLine | ValueSource::EnvVariable)
            )
        };

        if !explicit("rpc_url") {
            self.rpc_url = file.rpc_url;
        }
        if !explicit("contract_id") {
            self.contract_id = file.contract_id;
        }
        if !explicit("miner") && file.miner.is_some() {
            self.miner = file.miner;
        }
        if !explicit("message") && file.message.is_some() {
            self.message = file.message;
        }
        if !explicit("base_fee") {
            self.base_fee = file.base_fee;
        }
        if !explicit("poll_delay") {
            self.poll_delay = file.poll_delay;
        }
        if !explicit("poll_interval") {
            self.poll_interval = file.poll_interval;
        }
        if !explicit("http_timeout") {
            self.http_timeout = file.http_timeout;
        }
        if !explicit("yield_every") {
            self.yield_every = file.yield_every;
        }
        if !explicit("stale_policy") {
            self.stale_policy = file.stale_policy;
        }
        if !explicit("log_level") {
            self.log_level = file.log_level;
        }
        if !explicit("log_format") {
            self.log_format = file.log_format;
        }
        if !explicit("log_file") && file.log_file.is_some() {
            self.log_file = file.log_file;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.rpc_url)
            .map_err(|e| Error::config(format!("Invalid RPC URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "RPC URL must use http or https, got {}",
                url.scheme()
            )));
        }

        self.contract_address()?;

        if self.miner.is_some() {
            self.miner_address()?;
        }
        if self.message.is_some() {
            self.miner_message()?;
        }

        self.poll_schedule()?;

        if self.http_timeout == 0 {
            return Err(Error::config("HTTP timeout must be greater than 0"));
        }

        if self.yield_every == 0 {
            return Err(Error::config("yield-every must be greater than 0"));
        }

        Ok(())
    }

    /// Mining contract address
    pub fn contract_address(&self) -> Result<Address> {
        match Address::parse(&self.contract_id)? {
            address @ Address::Contract(_) => Ok(address),
            Address::Account(_) => Err(Error::config(format!(
                "Contract id must be a contract address: {}",
                self.contract_id
            ))),
        }
    }

    /// Miner account address
    pub fn miner_address(&self) -> Result<Address> {
        let miner = self
            .miner
            .as_deref()
            .ok_or_else(|| Error::config("Miner account is required (--miner or FCM_MINER)"))?;

        let address = Address::parse(miner)?;
        if !address.is_account() {
            return Err(Error::encoding(format!(
                "Miner must be an account address: {}",
                miner
            )));
        }
        Ok(address)
    }

    /// Validated block message
    pub fn miner_message(&self) -> Result<MinerMessage> {
        let message = self
            .message
            .as_deref()
            .ok_or_else(|| Error::config("Message is required (--message or FCM_MESSAGE)"))?;
        MinerMessage::new(message)
    }

    /// Chain state polling cadence
    pub fn poll_schedule(&self) -> Result<PollSchedule> {
        let initial_delay = parse_duration("poll-delay", &self.poll_delay)?;
        let interval = parse_duration("poll-interval", &self.poll_interval)?;
        if interval.is_zero() {
            return Err(Error::config("poll-interval must be greater than 0"));
        }
        Ok(PollSchedule {
            initial_delay,
            interval,
        })
    }

    /// Get HTTP timeout duration
    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.http_timeout)
    }

    /// Get miner tuning
    pub fn miner_config(&self) -> MinerConfig {
        MinerConfig {
            yield_every: self.yield_every,
            stale_policy: self.stale_policy,
        }
    }
}

fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| Error::config(format!("Invalid {} {:?}: {}", name, value, e)))
}

// Default value functions for serde
fn default_rpc_url() -> String { DEFAULT_RPC_URL.to_string() }
fn default_contract_id() -> String { DEFAULT_CONTRACT_ID.to_string() }
fn default_base_fee() -> u32 { DEFAULT_BASE_FEE }
fn default_poll_delay() -> String { "1s".to_string() }
fn default_poll_interval() -> String { "8s".to_string() }
fn default_http_timeout() -> u64 { 30000 }
fn default_yield_every() -> u64 { 1 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_format() -> LogFormat { LogFormat::Plain }

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    const MINER: &str = "GAAACAQDAQCQMBYIBEFAWDANBYHRAEISCMKBKFQXDAMRUGY4DUPB7JZX";

    #[tokio::test]
    async fn test_config_defaults() {
        let config = Config::load_from(["fcm-miner"]).await.unwrap();

        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.contract_id, DEFAULT_CONTRACT_ID);
        assert_eq!(config.base_fee, 10_000_000);
        assert_eq!(config.stale_policy, StalePolicy::Abort);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_format, LogFormat::Plain);
        assert_eq!(config.poll_schedule().unwrap(), PollSchedule::default());
        assert_eq!(config.miner_config(), MinerConfig::default());
        assert_eq!(config.http_timeout_duration(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_cli_arguments() {
        let config = Config::load_from([
            "fcm-miner",
            "-k",
            MINER,
            "-m",
            "hello",
            "--poll-interval",
            "500ms",
            "--stale-policy",
            "ignore",
            "--yield-every",
            "64",
        ])
        .await
        .unwrap();

        assert_eq!(config.miner_address().unwrap().to_string(), MINER);
        assert_eq!(config.miner_message().unwrap().as_str(), "hello");
        assert_eq!(
            config.poll_schedule().unwrap().interval,
            Duration::from_millis(500)
        );
        assert_eq!(config.miner_config().stale_policy, StalePolicy::Ignore);
        assert_eq!(config.miner_config().yield_every, 64);
    }

    #[tokio::test]
    async fn test_config_from_yaml() {
        let yaml_content = format!(
            r#"
miner: "{}"
message: "from file"
poll_interval: "2s"
stale_policy: ignore
log_format: json
"#,
            MINER
        );

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.miner.as_deref(), Some(MINER));
        assert_eq!(config.message.as_deref(), Some("from file"));
        assert_eq!(config.poll_interval, "2s");
        assert_eq!(config.stale_policy, StalePolicy::Ignore);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
    }

    #[tokio::test]
    async fn test_config_from_json() {
        let mut temp_file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            temp_file,
            r#"{{ "rpc_url": "http://localhost:8000/soroban/rpc", "base_fee": 200 }}"#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.rpc_url, "http://localhost:8000/soroban/rpc");
        assert_eq!(config.base_fee, 200);
    }

    #[tokio::test]
    async fn test_explicit_cli_values_win_over_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(
            temp_file,
            "message: \"from file\"\nrpc_url: \"http://localhost:8000\"\nyield_every: 8\n"
        )
        .unwrap();
        let path = temp_file.path().to_string_lossy().into_owned();

        let config = Config::load_from([
            "fcm-miner",
            "--config-file",
            path.as_str(),
            "--message",
            "from cli",
        ])
        .await
        .unwrap();

        assert_eq!(config.message.as_deref(), Some("from cli"));
        assert_eq!(config.rpc_url, "http://localhost:8000");
        assert_eq!(config.yield_every, 8);
    }

    #[tokio::test]
    async fn test_validation_failures() {
        assert_matches!(
            Config::load_from(["fcm-miner", "--rpc-url", "ftp://example.com"]).await,
            Err(Error::Config { .. })
        );
        assert_matches!(
            Config::load_from(["fcm-miner", "--yield-every", "0"]).await,
            Err(Error::Config { .. })
        );
        assert_matches!(
            Config::load_from(["fcm-miner", "--poll-interval", "soon"]).await,
            Err(Error::Config { .. })
        );
        assert_matches!(
            Config::load_from(["fcm-miner", "--contract-id", MINER]).await,
            Err(Error::Config { .. })
        );
        assert_matches!(
            Config::load_from(["fcm-miner", "-k", "GBADADDRESS"]).await,
            Err(Error::Encoding { .. })
        );
        assert_matches!(
            Config::load_from(["fcm-miner", "-m", ""]).await,
            Err(Error::Encoding { .. })
        );
    }

    #[tokio::test]
    async fn test_missing_identity_is_reported() {
        let config = Config::load_from(["fcm-miner"]).await.unwrap();
        assert_matches!(config.miner_address(), Err(Error::Config { .. }));
        assert_matches!(config.miner_message(), Err(Error::Config { .. }));
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Trace.to_string(), "trace");
    }
}
