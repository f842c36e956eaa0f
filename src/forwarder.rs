//! The forwarding loop.
//!
//! Waits for messages, sorts each one into empty / undecoded / skipped /
//! sendable, and for sendable readings runs the encoder and the dispatcher.
//! A failed dispatch is reported and forgotten; the loop never retries and
//! never stops because of a send.

use colored::Colorize;
use tracing::{error, info, warn};

use crate::buffer::TransmissionBuffers;
use crate::change::{ChangeMask, ChangeTracker};
use crate::config::{ForwarderConfig, Protocol};
use crate::dispatch::{Dispatcher, Transport};
use crate::encoder;
use crate::logging::READINGS_TARGET;
use crate::message::{MessageKind, ReceivedMessage};
use crate::source::MessageSource;

/// What the send policy decided for a decoded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Send(ChangeMask),
    SkipInvalid,
    SkipUnchanged,
}

/// Apply the send policy.
///
/// `mask` is what the change tracker reported (empty for invalid readings).
/// By default only valid readings with at least one changed field are sent.
/// With `send_all`, an empty mask is replaced by [`ChangeMask::ALL`] for
/// valid readings, and for every reading when the target speaks REST.
pub fn decide(valid: bool, mask: ChangeMask, send_all: bool, protocol: Protocol) -> Decision {
    let mask = if valid { mask } else { ChangeMask::NONE };
    let mask = if mask.is_empty() && send_all && (valid || protocol == Protocol::Rest) {
        ChangeMask::ALL
    } else {
        mask
    };

    if !mask.is_empty() {
        Decision::Send(mask)
    } else if !valid {
        Decision::SkipInvalid
    } else {
        Decision::SkipUnchanged
    }
}

/// How a single message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Empty,
    Undecoded(u16),
    Skipped(Decision),
    /// No document could be produced for the reading.
    NotEncoded(ChangeMask),
    Delivered(ChangeMask),
    Failed(ChangeMask),
}

/// Loop counters, logged at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    pub received: u64,
    pub empty: u64,
    pub undecoded: u64,
    pub skipped_invalid: u64,
    pub skipped_unchanged: u64,
    pub not_encoded: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub failed: u64,
}

pub struct Forwarder<'a, T, C> {
    config: &'a ForwarderConfig,
    dispatcher: Dispatcher<T>,
    tracker: C,
    buffers: TransmissionBuffers,
    stats: ForwarderStats,
}

impl<'a, T: Transport, C: ChangeTracker> Forwarder<'a, T, C> {
    pub fn new(config: &'a ForwarderConfig, dispatcher: Dispatcher<T>, tracker: C) -> Self {
        Self {
            config,
            dispatcher,
            tracker,
            buffers: TransmissionBuffers::new(config.payload_capacity, config.response_capacity),
            stats: ForwarderStats::default(),
        }
    }

    pub fn stats(&self) -> ForwarderStats {
        self.stats
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    pub fn buffers(&self) -> &TransmissionBuffers {
        &self.buffers
    }

    /// Run until the source stops and return the final counters. A stop
    /// request that arrives while a reading is being sent abandons that send.
    pub async fn run<S: MessageSource>(&mut self, source: &mut S) -> ForwarderStats {
        let verbosity = self.config.verbosity;
        if verbosity.print_statistics {
            source.print_statistics_periodically(self.config.statistics_interval);
        }

        info!(server = %self.config.target, "Receiving data...");
        while !source.is_stopped() {
            if let Some(message) = source.wait_for_message().await {
                if source.is_stopped() {
                    break;
                }
                tokio::select! {
                    _ = self.handle_message(&message) => {}
                    _ = source.stop_requested() => {
                        warn!("Stopped while sending data to server");
                        break;
                    }
                }
            }

            if source.check_and_reset_timer_event() {
                source.print_statistics();
            }
        }

        let s = self.stats;
        info!(
            received = s.received,
            delivered = s.delivered,
            failed = s.failed,
            skipped_unchanged = s.skipped_unchanged,
            skipped_invalid = s.skipped_invalid,
            not_encoded = s.not_encoded,
            undecoded = s.undecoded,
            empty = s.empty,
            "Exiting..."
        );
        s
    }

    /// Classify one message and send it when the policy says so.
    pub async fn handle_message(&mut self, message: &ReceivedMessage) -> Handled {
        let verbosity = self.config.verbosity;
        self.stats.received += 1;
        if verbosity.info {
            echo(message);
        }

        let reading = match message.kind() {
            MessageKind::Empty => {
                self.stats.empty += 1;
                error!("Missing data");
                return Handled::Empty;
            }
            MessageKind::Undecoded(status) => {
                self.stats.undecoded += 1;
                if verbosity.info || verbosity.echo_undecoded {
                    info!("Could not decode the received data (error {status:04x})");
                }
                return Handled::Undecoded(status);
            }
            MessageKind::Decoded(reading) => reading,
        };

        let valid = message.is_valid();
        let mask = if valid {
            self.tracker.update(reading)
        } else {
            ChangeMask::NONE
        };
        let protocol = self.config.target.protocol();

        let mask = match decide(valid, mask, self.config.send_all, protocol) {
            Decision::Send(mask) => mask,
            skipped => {
                if skipped == Decision::SkipInvalid {
                    self.stats.skipped_invalid += 1;
                    if verbosity.info {
                        info!("Data is not valid and is not sent to server");
                    }
                } else {
                    self.stats.skipped_unchanged += 1;
                    if verbosity.info {
                        info!("Data is not changed and is not sent to server");
                    }
                }
                return Handled::Skipped(skipped);
            }
        };

        let encoded = encoder::encode(
            message,
            protocol,
            &mut self.buffers.payload,
            mask,
            verbosity.echo_payload,
        );
        if encoded == 0 {
            self.stats.not_encoded += 1;
            warn!(
                capacity = self.buffers.payload.capacity(),
                "No data was sent to server: payload does not fit the buffer"
            );
            return Handled::NotEncoded(mask);
        }
        self.stats.dispatched += 1;
        let delivered = self
            .dispatcher
            .dispatch(&self.buffers.payload, &mut self.buffers.response)
            .await;

        if delivered {
            self.stats.delivered += 1;
            Handled::Delivered(mask)
        } else {
            self.stats.failed += 1;
            if verbosity.info {
                info!("No data was sent to server");
            }
            Handled::Failed(mask)
        }
    }
}

/// Print a received message on stdout and record it in the log file.
fn echo(message: &ReceivedMessage) {
    let line = message.to_string();
    let colored = match message.kind() {
        MessageKind::Decoded(_) if message.is_valid() => line.green(),
        MessageKind::Decoded(_) => line.yellow(),
        MessageKind::Undecoded(_) => line.red(),
        MessageKind::Empty => line.dimmed(),
    };
    println!("{colored}");
    info!(target: READINGS_TARGET, "{line}");
}
