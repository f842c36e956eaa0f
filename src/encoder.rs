//! Payload encoding into the bounded outbound buffer.
//!
//! Both formats carry the sensor identity plus only the fields selected by
//! the change mask. A document that cannot be produced in full (no reading,
//! empty mask, or not enough room) yields length 0 and an empty, terminated
//! buffer; a truncated document is never handed to the dispatcher.

use std::io::Write;

use serde::Serialize;

use crate::buffer::{FixedBuffer, Overflow, PAYLOAD_BUFFER_SIZE};
use crate::change::ChangeMask;
use crate::config::Protocol;
use crate::message::{ReceivedMessage, SensorReading, SENSOR_TYPE};

/// REST body. Absent fields are omitted, never sent as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReading {
    #[serde(rename = "type")]
    pub sensor_type: &'static str,
    pub channel: u8,
    pub rolling_code: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_ok: Option<bool>,
}

impl JsonReading {
    pub fn new(reading: &SensorReading, mask: ChangeMask) -> Self {
        Self {
            sensor_type: SENSOR_TYPE,
            channel: reading.channel,
            rolling_code: reading.rolling_code,
            temperature: mask
                .contains(ChangeMask::TEMPERATURE)
                .then(|| reading.temperature_f()),
            humidity: mask.contains(ChangeMask::HUMIDITY).then_some(reading.humidity),
            battery_ok: mask.contains(ChangeMask::BATTERY).then_some(reading.battery_ok),
        }
    }
}

/// Encode `message` for `protocol` into `buffer`.
///
/// Returns the number of bytes written, always `< buffer.capacity()`, with a
/// NUL right after them. Returns 0 when nothing should be sent.
pub fn encode(
    message: &ReceivedMessage,
    protocol: Protocol,
    buffer: &mut FixedBuffer,
    mask: ChangeMask,
    pretty: bool,
) -> usize {
    match (protocol, &message.reading) {
        (_, None) => {
            buffer.clear();
            0
        }
        (Protocol::Rest, Some(reading)) => encode_json(reading, buffer, mask, pretty),
        (Protocol::InfluxDb, Some(reading)) => encode_line_protocol(reading, buffer, mask),
    }
}

/// REST JSON document.
pub fn encode_json(
    reading: &SensorReading,
    buffer: &mut FixedBuffer,
    mask: ChangeMask,
    pretty: bool,
) -> usize {
    if mask.is_empty() {
        buffer.clear();
        return 0;
    }
    let doc = JsonReading::new(reading, mask);
    let mut writer = buffer.writer(Overflow::Reject);
    let written = if pretty {
        serde_json::to_writer_pretty(&mut writer, &doc)
    } else {
        serde_json::to_writer(&mut writer, &doc)
    };
    finish(written.is_ok(), buffer)
}

/// InfluxDB line, e.g.
/// `F007TH,channel=1,rolling_code=77 temperature=72.5,humidity=40i,battery_ok=true`.
pub fn encode_line_protocol(
    reading: &SensorReading,
    buffer: &mut FixedBuffer,
    mask: ChangeMask,
) -> usize {
    let mut fields = Vec::with_capacity(3);
    if mask.contains(ChangeMask::TEMPERATURE) {
        fields.push(format!("temperature={:.1}", reading.temperature_f()));
    }
    if mask.contains(ChangeMask::HUMIDITY) {
        fields.push(format!("humidity={}i", reading.humidity));
    }
    if mask.contains(ChangeMask::BATTERY) {
        fields.push(format!("battery_ok={}", reading.battery_ok));
    }
    if fields.is_empty() {
        buffer.clear();
        return 0;
    }

    let mut writer = buffer.writer(Overflow::Reject);
    let written = write!(
        writer,
        "{},channel={},rolling_code={} {}",
        SENSOR_TYPE,
        reading.channel,
        reading.rolling_code,
        fields.join(",")
    );
    finish(written.is_ok(), buffer)
}

/// Smallest buffer capacity, terminator included, that holds a full-mask
/// document for any representable reading.
pub fn required_capacity(protocol: Protocol, pretty: bool) -> usize {
    let widest = SensorReading {
        channel: u8::MAX,
        rolling_code: u8::MAX,
        temperature_f10: i16::MIN,
        humidity: u8::MAX,
        battery_ok: false,
    };
    let message = ReceivedMessage::decoded(widest, false);
    let mut buffer = FixedBuffer::with_capacity(PAYLOAD_BUFFER_SIZE);
    encode(&message, protocol, &mut buffer, ChangeMask::ALL, pretty) + 1
}

fn finish(complete: bool, buffer: &mut FixedBuffer) -> usize {
    if !complete {
        buffer.clear();
    }
    buffer.len()
}
