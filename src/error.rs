//! Error types for configuration, dispatch and the message source.

use thiserror::Error;

/// Fatal problems found while assembling the runtime configuration.
///
/// Every variant is reported together with the usage text and ends the
/// process with exit status 1 before the forwarding loop starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid GPIO pin number \"{0}\"")]
    InvalidGpio(u8),

    #[error("Server URL must be specified (options --send-to or -s)")]
    MissingUrl,

    #[error("Server URL must be HTTP or HTTPS: \"{0}\"")]
    UnsupportedUrl(String),

    #[error("Server URL is malformed: \"{0}\"")]
    MalformedUrl(String),

    #[error("Unknown server type \"{0}\"")]
    UnknownServerType(String),

    #[error("Buffer capacity for {name} must be at least {min} bytes, got {actual}")]
    BufferTooSmall {
        name: &'static str,
        min: usize,
        actual: usize,
    },

    #[error("Cannot read config file {path}: {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot open log file {path}: {source}")]
    LogFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single dispatch did not deliver its payload.
///
/// Dispatch never propagates these; they are logged and folded into a
/// `false` result so the forwarding loop keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No payload was generated")]
    EmptyPayload,

    #[error("Failed to get HTTP client handle: {0}")]
    Acquire(String),

    #[error("Sending data to {url} failed: {detail}")]
    Transport { url: String, detail: String },

    #[error("Failed to connect to server {url}")]
    Connect { url: String },

    #[error("Got HTTP status code {status} (expected {expected})")]
    Status { status: u16, expected: u16 },
}

/// Problems reading messages from the bundled line source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Malformed message on line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_status_messages_are_distinct() {
        let connect = DispatchError::Connect {
            url: "http://localhost:9".to_string(),
        }
        .to_string();
        let status = DispatchError::Status {
            status: 500,
            expected: 200,
        }
        .to_string();
        assert!(connect.contains("Failed to connect to server"));
        assert!(!connect.contains("status code"));
        assert!(status.contains("Got HTTP status code 500"));
        assert!(!status.contains("connect"));
    }

    #[test]
    fn transport_error_carries_detail() {
        let err = DispatchError::Transport {
            url: "http://example.com".to_string(),
            detail: "connection reset".to_string(),
        };
        let s = err.to_string();
        assert!(s.contains("http://example.com"), "url in display: {s}");
        assert!(s.contains("connection reset"), "detail in display: {s}");
    }

    #[test]
    fn config_error_is_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&ConfigError::MissingUrl);
        assert_error(&DispatchError::EmptyPayload);
    }

    #[test]
    fn unknown_server_type_quotes_value() {
        let s = ConfigError::UnknownServerType("mqtt".to_string()).to_string();
        assert_eq!(s, "Unknown server type \"mqtt\"");
    }
}
