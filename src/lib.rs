//! Forward Ambient Weather F007TH sensor readings to a remote server.
//!
//! Decoded readings arrive through a [`source::MessageSource`], pass the
//! change filter in [`change`], are encoded into a fixed-capacity buffer by
//! [`encoder`] and are delivered by the [`dispatch::Dispatcher`] as either a
//! REST `PUT` with a JSON body or an InfluxDB line-protocol `POST`.

pub mod buffer;
pub mod change;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod forwarder;
pub mod logging;
pub mod message;
pub mod source;

pub use buffer::{FixedBuffer, Overflow, TransmissionBuffers};
pub use change::{ChangeMask, ChangeTracker, InMemoryChangeTracker};
pub use config::{ForwarderConfig, Protocol, ServerTarget, Verbosity};
pub use dispatch::{Dispatcher, ReqwestTransport, Transport};
pub use error::{ConfigError, DispatchError, SourceError};
pub use forwarder::{Forwarder, ForwarderStats};
pub use message::{ReceivedMessage, SensorReading};
pub use source::{LineSource, MessageSource};

// ---------------------------------------------------------------------------
// Entry point used by the binary
// ---------------------------------------------------------------------------

/// Forward messages read from stdin until end of input or Ctrl-C.
pub async fn run(config: &ForwarderConfig) -> ForwarderStats {
    tracing::info!(
        gpio = config.gpio,
        send_all = config.send_all,
        "Forwarding F007TH readings to {}",
        config.target
    );
    let mut source = LineSource::stdin();
    let mut forwarder = Forwarder::new(
        config,
        Dispatcher::from_config(config),
        InMemoryChangeTracker::new(),
    );
    forwarder.run(&mut source).await
}
