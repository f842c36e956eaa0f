//! Runtime configuration: destination, wire protocol, verbosity toggles and
//! buffer sizes. Built once before the forwarding loop starts and only read
//! afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONNECTION, CONTENT_TYPE};
use clap::ValueEnum;
use reqwest::Method;
use serde::Deserialize;

use crate::buffer::{PAYLOAD_BUFFER_SIZE, RESPONSE_BUFFER_SIZE};
use crate::encoder;
use crate::error::{ConfigError, Result};

pub const DEFAULT_GPIO: u8 = 27;
pub const DEFAULT_LOG_FILE: &str = "f007th-send.log";
pub const MIN_BUFFER_SIZE: usize = 64;
pub const STATISTICS_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Protocol / target
// ---------------------------------------------------------------------------

/// Wire format of the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Protocol {
    /// JSON document sent with `PUT`, answered with 200.
    #[default]
    #[value(name = "REST")]
    Rest,
    /// Line protocol sent with `POST`, answered with 204.
    #[value(name = "InfluxDB")]
    InfluxDb,
}

impl Protocol {
    pub fn method(self) -> Method {
        match self {
            Protocol::Rest => Method::PUT,
            Protocol::InfluxDb => Method::POST,
        }
    }

    /// The only status code that counts as a delivered reading.
    pub fn expected_status(self) -> u16 {
        match self {
            Protocol::Rest => 200,
            Protocol::InfluxDb => 204,
        }
    }

    /// Request headers for this protocol. InfluxDB gets none at all: the
    /// write endpoint takes a raw line-protocol body without negotiation.
    pub fn headers(self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            Protocol::Rest => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
                headers.insert(
                    HeaderName::from_static("charsets"),
                    HeaderValue::from_static("utf-8"),
                );
                headers.insert(CONNECTION, HeaderValue::from_static("close"));
            }
            Protocol::InfluxDb => {}
        }
        headers
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("rest") {
            Ok(Protocol::Rest)
        } else if s.eq_ignore_ascii_case("influxdb") {
            Ok(Protocol::InfluxDb)
        } else {
            Err(ConfigError::UnknownServerType(s.to_string()))
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Rest => write!(f, "REST"),
            Protocol::InfluxDb => write!(f, "InfluxDB"),
        }
    }
}

/// Where readings go. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    url: String,
    protocol: Protocol,
}

impl ServerTarget {
    /// Validate `url` and pair it with `protocol`.
    ///
    /// # Errors
    /// `UnsupportedUrl` when the scheme is not `http://` or `https://`,
    /// `MalformedUrl` when the rest of the URL does not parse.
    pub fn new(url: impl Into<String>, protocol: Protocol) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::UnsupportedUrl(url));
        }
        if reqwest::Url::parse(&url).is_err() {
            return Err(ConfigError::MalformedUrl(url));
        }
        Ok(Self { url, protocol })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl fmt::Display for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.protocol)
    }
}

// ---------------------------------------------------------------------------
// Verbosity
// ---------------------------------------------------------------------------

/// Independent diagnostic toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verbosity {
    pub info: bool,
    pub echo_payload: bool,
    pub trace_wire: bool,
    pub echo_undecoded: bool,
    pub echo_details: bool,
    pub print_statistics: bool,
}

impl Verbosity {
    /// Combine the `-v`, `-V` and `-T` switches.
    pub fn from_flags(verbose: bool, more_verbose: bool, statistics: bool) -> Self {
        Self {
            info: verbose || more_verbose,
            echo_payload: more_verbose,
            trace_wire: more_verbose,
            echo_undecoded: more_verbose,
            echo_details: more_verbose,
            print_statistics: statistics,
        }
    }

    /// Default `tracing` filter directive for these toggles.
    pub fn filter_directive(&self) -> &'static str {
        if self.trace_wire {
            "info,f007th_send=debug,reqwest=trace,hyper_util=debug"
        } else if self.info || self.print_statistics {
            "info"
        } else {
            "warn"
        }
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// Optional TOML file; every key mirrors a command-line option.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub send_to: Option<String>,
    pub server_type: Option<String>,
    pub gpio: Option<u8>,
    pub send_all: Option<bool>,
    pub log_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub payload_capacity: Option<usize>,
    pub response_capacity: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| ConfigError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// ForwarderConfig
// ---------------------------------------------------------------------------

/// Everything the forwarding loop and the dispatcher need.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub target: ServerTarget,
    /// Send every valid reading (and every REST reading) even when unchanged.
    pub send_all: bool,
    pub verbosity: Verbosity,
    pub gpio: u8,
    pub log_file: PathBuf,
    /// `None` waits on a stalled endpoint forever.
    pub request_timeout: Option<Duration>,
    pub payload_capacity: usize,
    pub response_capacity: usize,
    pub statistics_interval: Duration,
}

impl ForwarderConfig {
    /// Config with defaults for everything but the target.
    pub fn new(target: ServerTarget) -> Self {
        Self {
            target,
            send_all: false,
            verbosity: Verbosity::default(),
            gpio: DEFAULT_GPIO,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            request_timeout: None,
            payload_capacity: PAYLOAD_BUFFER_SIZE,
            response_capacity: RESPONSE_BUFFER_SIZE,
            statistics_interval: STATISTICS_INTERVAL,
        }
    }

    /// Check the values that are not already guaranteed by their types.
    pub fn validate(&self) -> Result<()> {
        if !(1..=53).contains(&self.gpio) {
            return Err(ConfigError::InvalidGpio(self.gpio));
        }
        let payload_min =
            encoder::required_capacity(self.target.protocol(), self.verbosity.echo_payload);
        for (name, min, actual) in [
            ("payload", payload_min, self.payload_capacity),
            ("response", MIN_BUFFER_SIZE, self.response_capacity),
        ] {
            if actual < min {
                return Err(ConfigError::BufferTooSmall { name, min, actual });
            }
        }
        Ok(())
    }
}
