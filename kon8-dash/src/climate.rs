//! Ambient temperature and humidity.
//!
//! The DHT22/AM2302 on the controller board is slow and occasionally returns
//! garbage, reported as NaN. [`ClimateMonitor`] rate-limits reads and keeps
//! the last good reading for display. The board's sensor driver implements
//! [`ClimateSensor`]; the climate page shows [`ClimateMonitor::latest`].

use std::time::Duration;

use tokio::time::Instant;

use crate::tracing::prelude::*;

/// Minimum time between two sensor reads.
pub const READ_INTERVAL: Duration = Duration::from_secs(5);

/// Raw sensor output. Either value may be NaN when the read failed.
#[derive(Debug, Clone, Copy)]
pub struct ClimateSample {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// A validated reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

pub trait ClimateSensor {
    fn read(&mut self) -> ClimateSample;
}

pub struct ClimateMonitor<S> {
    sensor: S,
    last_read: Option<Instant>,
    latest: Option<ClimateReading>,
}

impl<S: ClimateSensor> ClimateMonitor<S> {
    pub fn new(sensor: S) -> Self {
        Self {
            sensor,
            last_read: None,
            latest: None,
        }
    }

    /// Read the sensor if [`READ_INTERVAL`] has passed since the last
    /// attempt. Failed reads keep the previous reading.
    pub fn update(&mut self, now: Instant) -> Option<ClimateReading> {
        if let Some(last) = self.last_read {
            if now.saturating_duration_since(last) < READ_INTERVAL {
                return self.latest;
            }
        }
        self.last_read = Some(now);

        let sample = self.sensor.read();
        if sample.temperature_c.is_nan() || sample.humidity_pct.is_nan() {
            warn!("Climate sensor read failed");
            return self.latest;
        }

        let reading = ClimateReading {
            temperature_c: sample.temperature_c,
            humidity_pct: sample.humidity_pct,
        };
        debug!(
            temperature_c = reading.temperature_c,
            humidity_pct = reading.humidity_pct,
            "Climate reading"
        );
        self.latest = Some(reading);
        self.latest
    }

    /// Last good reading, if any.
    pub fn latest(&self) -> Option<ClimateReading> {
        self.latest
    }
}
