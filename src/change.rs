//! Per-sensor change tracking.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::message::{SensorId, SensorReading};

/// Which measured fields differ from the previous reading of a sensor.
///
/// An empty mask means either "nothing changed" or "not valid".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeMask(u8);

impl ChangeMask {
    pub const NONE: ChangeMask = ChangeMask(0);
    pub const TEMPERATURE: ChangeMask = ChangeMask(1);
    pub const HUMIDITY: ChangeMask = ChangeMask(1 << 1);
    pub const BATTERY: ChangeMask = ChangeMask(1 << 2);
    pub const ALL: ChangeMask = ChangeMask(0b111);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits_truncate(bits: u8) -> Self {
        ChangeMask(bits & Self::ALL.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ChangeMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ChangeMask {
    type Output = ChangeMask;

    fn bitor(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeMask {
    fn bitor_assign(&mut self, rhs: ChangeMask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ChangeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names = [
            (ChangeMask::TEMPERATURE, "temperature"),
            (ChangeMask::HUMIDITY, "humidity"),
            (ChangeMask::BATTERY, "battery"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Computes the change mask between successive readings of one sensor.
pub trait ChangeTracker {
    /// Record `reading` and report which fields differ from the last one
    /// seen for the same sensor. A sensor seen for the first time reports
    /// every field as changed.
    fn update(&mut self, reading: &SensorReading) -> ChangeMask;
}

/// Keeps the last reading of every sensor in memory.
#[derive(Debug, Default)]
pub struct InMemoryChangeTracker {
    last: HashMap<SensorId, SensorReading>,
}

impl InMemoryChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sensor_count(&self) -> usize {
        self.last.len()
    }
}

impl ChangeTracker for InMemoryChangeTracker {
    fn update(&mut self, reading: &SensorReading) -> ChangeMask {
        let Some(previous) = self.last.insert(reading.id(), reading.clone()) else {
            return ChangeMask::ALL;
        };

        let mut mask = ChangeMask::NONE;
        if previous.temperature_f10 != reading.temperature_f10 {
            mask |= ChangeMask::TEMPERATURE;
        }
        if previous.humidity != reading.humidity {
            mask |= ChangeMask::HUMIDITY;
        }
        if previous.battery_ok != reading.battery_ok {
            mask |= ChangeMask::BATTERY;
        }
        mask
    }
}
