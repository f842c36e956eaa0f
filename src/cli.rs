use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::config::{
    FileConfig, ForwarderConfig, Protocol, ServerTarget, Verbosity, DEFAULT_GPIO, DEFAULT_LOG_FILE,
};
use crate::error::{ConfigError, Result};

#[derive(Parser, Debug)]
#[command(name = "f007th-send")]
#[command(version, disable_version_flag = true)]
#[command(
    about = "Receive data from Ambient Weather F007TH sensors and send it to a remote server via REST API or InfluxDB"
)]
pub struct Args {
    /// GPIO pin number the receiver listens on (1-53, default 27)
    #[arg(long, short = 'g')]
    pub gpio: Option<u8>,

    /// Server URL
    #[arg(long = "send-to", short = 's')]
    pub send_to: Option<String>,

    /// Server URL; overrides --send-to when both are given
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// Server type: REST (default) or InfluxDB, case-insensitive
    #[arg(long = "server-type", short = 't', value_enum, ignore_case = true)]
    pub server_type: Option<Protocol>,

    /// Send all data. Only changed and valid data is sent by default
    #[arg(long, short = 'A')]
    pub all: bool,

    /// Path to the log file (default f007th-send.log)
    #[arg(long = "log-file", short = 'l')]
    pub log_file: Option<PathBuf>,

    /// Verbose output
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// More verbose output: payloads, wire tracing, undecoded data and server replies
    #[arg(long = "more-verbose", short = 'V', alias = "more_verbose")]
    pub more_verbose: bool,

    /// Print receiver statistics every second
    #[arg(long, short = 'T')]
    pub statistics: bool,

    /// TOML config file; command-line options take precedence
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Request timeout in seconds (default: wait forever)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print version
    #[arg(long, action = ArgAction::Version)]
    pub version: Option<bool>,
}

impl Args {
    /// Merge the command line with the optional config file and validate
    /// the result.
    pub fn into_config(self) -> Result<ForwarderConfig> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let url = self
            .url
            .or(self.send_to)
            .or(file.send_to)
            .ok_or(ConfigError::MissingUrl)?;
        let protocol = match self.server_type {
            Some(protocol) => protocol,
            None => file
                .server_type
                .map(|name| name.parse::<Protocol>())
                .transpose()?
                .unwrap_or_default(),
        };

        let mut config = ForwarderConfig::new(ServerTarget::new(url, protocol)?);
        config.send_all = self.all || file.send_all.unwrap_or(false);
        config.verbosity = Verbosity::from_flags(self.verbose, self.more_verbose, self.statistics);
        config.gpio = self.gpio.or(file.gpio).unwrap_or(DEFAULT_GPIO);
        config.log_file = self
            .log_file
            .or(file.log_file)
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
        config.request_timeout = self
            .timeout
            .or(file.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        if let Some(capacity) = file.payload_capacity {
            config.payload_capacity = capacity;
        }
        if let Some(capacity) = file.response_capacity {
            config.response_capacity = capacity;
        }

        config.validate()?;
        Ok(config)
    }
}
