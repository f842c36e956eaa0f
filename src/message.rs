//! Decoded F007TH transmissions as handed to the forwarding loop.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor family name used in payloads.
pub const SENSOR_TYPE: &str = "F007TH";

/// Identity of one physical sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId {
    /// Channel selected on the sensor, 1–8.
    pub channel: u8,
    /// Random code the sensor picks at power-up.
    pub rolling_code: u8,
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.rolling_code)
    }
}

/// One decoded reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub channel: u8,
    pub rolling_code: u8,
    /// Temperature in tenths of a degree Fahrenheit, as transmitted.
    pub temperature_f10: i16,
    /// Relative humidity, percent.
    pub humidity: u8,
    pub battery_ok: bool,
}

impl SensorReading {
    pub fn id(&self) -> SensorId {
        SensorId {
            channel: self.channel,
            rolling_code: self.rolling_code,
        }
    }

    pub fn temperature_f(&self) -> f64 {
        f64::from(self.temperature_f10) / 10.0
    }

    pub fn temperature_c(&self) -> f64 {
        (self.temperature_f() - 32.0) * 5.0 / 9.0
    }

    /// Range check against what the sensor can physically report.
    pub fn is_plausible(&self) -> bool {
        (1..=8).contains(&self.channel)
            && self.humidity <= 100
            && (-400..=1580).contains(&self.temperature_f10)
    }
}

/// How the loop has to treat a message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageKind<'a> {
    Empty,
    Undecoded(u16),
    Decoded(&'a SensorReading),
}

/// One transmission as produced by the receiver.
///
/// Owned by the forwarding loop for a single iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceivedMessage {
    pub reading: Option<SensorReading>,
    pub valid: bool,
    pub undecoded: bool,
    pub decoding_status: u16,
}

impl ReceivedMessage {
    pub fn decoded(reading: SensorReading, valid: bool) -> Self {
        Self {
            reading: Some(reading),
            valid,
            undecoded: false,
            decoding_status: 0,
        }
    }

    pub fn undecoded(decoding_status: u16) -> Self {
        Self {
            reading: None,
            valid: false,
            undecoded: true,
            decoding_status,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !self.undecoded && self.reading.is_none()
    }

    pub fn is_undecoded(&self) -> bool {
        self.undecoded
    }

    pub fn is_valid(&self) -> bool {
        self.valid && self.reading.is_some()
    }

    pub fn kind(&self) -> MessageKind<'_> {
        match (&self.reading, self.undecoded) {
            (_, true) => MessageKind::Undecoded(self.decoding_status),
            (Some(reading), false) => MessageKind::Decoded(reading),
            (None, false) => MessageKind::Empty,
        }
    }
}

impl fmt::Display for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            MessageKind::Empty => write!(f, "(no data)"),
            MessageKind::Undecoded(status) => write!(f, "undecoded (status {status:04x})"),
            MessageKind::Decoded(r) => {
                write!(
                    f,
                    "channel={} rolling_code={} temperature={:.1}F ({:.1}C) humidity={}% battery={}",
                    r.channel,
                    r.rolling_code,
                    r.temperature_f(),
                    r.temperature_c(),
                    r.humidity,
                    if r.battery_ok { "OK" } else { "LOW" },
                )?;
                if !self.valid {
                    write!(f, " [invalid]")?;
                }
                Ok(())
            }
        }
    }
}
