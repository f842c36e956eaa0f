//! Where decoded messages come from.
//!
//! [`MessageSource`] is the contract the forwarding loop consumes.
//! [`LineSource`] implements it over any async line reader carrying one JSON
//! object per line, e.g. the output of an external F007TH decoder piped into
//! stdin:
//!
//! ```text
//! {"channel":1,"rolling_code":77,"temperature_f10":725,"humidity":40,"battery_ok":true}
//! {"undecoded":true,"decoding_status":513}
//! {}
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::SourceError;
use crate::message::{ReceivedMessage, SensorReading};

#[allow(async_fn_in_trait)]
pub trait MessageSource {
    /// Suspend until a message arrives, the statistics timer fires, or the
    /// source stops. Only the first case yields a message.
    async fn wait_for_message(&mut self) -> Option<ReceivedMessage>;

    fn is_stopped(&self) -> bool;

    /// True once per statistics period.
    fn check_and_reset_timer_event(&mut self) -> bool;

    fn print_statistics(&self);

    /// Arm the statistics timer.
    fn print_statistics_periodically(&mut self, interval: Duration);

    /// Resolve once the source is asked to stop, marking it stopped. Raced
    /// against a pending send so a stop request is not held up by a stalled
    /// server.
    async fn stop_requested(&mut self) {
        std::future::pending::<()>().await
    }
}

/// Counters kept by [`LineSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub lines: u64,
    pub decoded: u64,
    pub undecoded: u64,
    pub empty: u64,
    pub rejected: u64,
}

/// One input line. Every key is optional; which ones are present decides
/// the kind of message.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireMessage {
    #[serde(default)]
    undecoded: bool,
    #[serde(default)]
    decoding_status: u16,
    valid: Option<bool>,
    channel: Option<u8>,
    rolling_code: Option<u8>,
    temperature_f10: Option<i16>,
    humidity: Option<u8>,
    battery_ok: Option<bool>,
}

impl From<WireMessage> for ReceivedMessage {
    fn from(wire: WireMessage) -> Self {
        if wire.undecoded {
            return ReceivedMessage::undecoded(wire.decoding_status);
        }
        match (wire.channel, wire.rolling_code, wire.temperature_f10, wire.humidity) {
            (Some(channel), Some(rolling_code), Some(temperature_f10), Some(humidity)) => {
                let reading = SensorReading {
                    channel,
                    rolling_code,
                    temperature_f10,
                    humidity,
                    battery_ok: wire.battery_ok.unwrap_or(true),
                };
                let valid = wire.valid.unwrap_or(true) && reading.is_plausible();
                ReceivedMessage::decoded(reading, valid)
            }
            _ => ReceivedMessage::empty(),
        }
    }
}

/// Parse one input line.
pub fn parse_line(line: &str, line_no: u64) -> Result<ReceivedMessage, SourceError> {
    serde_json::from_str::<WireMessage>(line)
        .map(ReceivedMessage::from)
        .map_err(|source| SourceError::Parse {
            line: line_no,
            source,
        })
}

type Shutdown = Pin<Box<dyn Future<Output = ()>>>;

/// JSON-lines message source. Stops at end of input or when the shutdown
/// future resolves.
pub struct LineSource<R> {
    lines: Lines<R>,
    line_no: u64,
    stopped: bool,
    stats: SourceStats,
    timer: Option<Interval>,
    timer_fired: bool,
    shutdown: Shutdown,
}

impl LineSource<BufReader<Stdin>> {
    /// Read stdin and stop on Ctrl-C.
    pub fn stdin() -> Self {
        LineSource::new(BufReader::new(tokio::io::stdin())).with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
    }
}

impl<R: AsyncBufRead + Unpin> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            stopped: false,
            stats: SourceStats::default(),
            timer: None,
            timer_fired: false,
            shutdown: Box::pin(std::future::pending()),
        }
    }

    /// Stop the source as soon as `signal` resolves.
    pub fn with_shutdown(mut self, signal: impl Future<Output = ()> + 'static) -> Self {
        self.shutdown = Box::pin(signal);
        self
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    fn record(&mut self, message: &ReceivedMessage) {
        if message.is_undecoded() {
            self.stats.undecoded += 1;
        } else if message.is_empty() {
            self.stats.empty += 1;
        } else {
            self.stats.decoded += 1;
        }
    }
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl<R: AsyncBufRead + Unpin> MessageSource for LineSource<R> {
    async fn wait_for_message(&mut self) -> Option<ReceivedMessage> {
        while !self.stopped {
            tokio::select! {
                line = self.lines.next_line() => match line {
                    Ok(Some(line)) => {
                        self.line_no += 1;
                        if line.trim().is_empty() {
                            continue;
                        }
                        self.stats.lines += 1;
                        match parse_line(&line, self.line_no) {
                            Ok(message) => {
                                self.record(&message);
                                return Some(message);
                            }
                            Err(e) => {
                                self.stats.rejected += 1;
                                warn!("{e}");
                            }
                        }
                    }
                    Ok(None) => self.stopped = true,
                    Err(e) => {
                        error!("{}", SourceError::Io(e));
                        self.stopped = true;
                    }
                },
                _ = tick(&mut self.timer) => {
                    self.timer_fired = true;
                    return None;
                }
                _ = &mut self.shutdown => self.stopped = true,
            }
        }
        None
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn check_and_reset_timer_event(&mut self) -> bool {
        std::mem::take(&mut self.timer_fired)
    }

    fn print_statistics(&self) {
        let s = self.stats;
        info!(
            lines = s.lines,
            decoded = s.decoded,
            undecoded = s.undecoded,
            empty = s.empty,
            rejected = s.rejected,
            "receiver statistics"
        );
    }

    async fn stop_requested(&mut self) {
        if !self.stopped {
            (&mut self.shutdown).await;
            self.stopped = true;
        }
    }

    fn print_statistics_periodically(&mut self, interval: Duration) {
        let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.timer = Some(timer);
    }
}
