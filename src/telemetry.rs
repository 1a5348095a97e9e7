//! Dump telemetry sinks
//!
//! Two append-only streams leave the engine: a per-block timing log
//! `(address, duration_ms)` and a burst-rate log `(address, rate)`. Both are
//! closed exactly once at the end of a run.

use crate::error::Result;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub trait Telemetry {
    fn block_timing(&mut self, address: u64, duration_ms: f64) -> Result<()>;

    /// `rate` is the instantaneous transfer rate in MiB/s.
    fn burst_rate(&mut self, address: u64, rate: f64) -> Result<()>;

    /// Progress hook for front-ends; `done` out of `total` blocks attempted.
    fn progress(&mut self, _done: u64, _total: u64) {}

    /// Free-form stage notifications for front-ends.
    fn stage(&mut self, _name: &str) {}

    fn close(&mut self) -> Result<()>;
}

impl<T: Telemetry + ?Sized> Telemetry for Box<T> {
    fn block_timing(&mut self, address: u64, duration_ms: f64) -> Result<()> {
        (**self).block_timing(address, duration_ms)
    }

    fn burst_rate(&mut self, address: u64, rate: f64) -> Result<()> {
        (**self).burst_rate(address, rate)
    }

    fn progress(&mut self, done: u64, total: u64) {
        (**self).progress(done, total)
    }

    fn stage(&mut self, name: &str) {
        (**self).stage(name)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn block_timing(&mut self, _address: u64, _duration_ms: f64) -> Result<()> {
        Ok(())
    }

    fn burst_rate(&mut self, _address: u64, _rate: f64) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct TimingRecord {
    address: u64,
    duration_ms: f64,
}

#[derive(Serialize)]
struct RateRecord {
    address: u64,
    rate_mib_s: f64,
}

/// Writes `<stem>.timing.csv` and `<stem>.rate.csv` into a directory.
pub struct CsvTelemetry {
    timing: Option<csv::Writer<File>>,
    rate: Option<csv::Writer<File>>,
    timing_path: PathBuf,
    rate_path: PathBuf,
}

impl CsvTelemetry {
    pub fn create(dir: &Path, stem: &str) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let timing_path = dir.join(format!("{}.timing.csv", stem));
        let rate_path = dir.join(format!("{}.rate.csv", stem));

        let timing = csv::Writer::from_path(&timing_path)?;
        let rate = csv::Writer::from_path(&rate_path)?;
        debug!(
            "Telemetry logs: {:?}, {:?}",
            timing_path, rate_path
        );

        Ok(Self {
            timing: Some(timing),
            rate: Some(rate),
            timing_path,
            rate_path,
        })
    }

    pub fn timing_path(&self) -> &Path {
        &self.timing_path
    }

    pub fn rate_path(&self) -> &Path {
        &self.rate_path
    }
}

impl Telemetry for CsvTelemetry {
    fn block_timing(&mut self, address: u64, duration_ms: f64) -> Result<()> {
        if let Some(writer) = self.timing.as_mut() {
            writer.serialize(TimingRecord {
                address,
                duration_ms,
            })?;
        }
        Ok(())
    }

    fn burst_rate(&mut self, address: u64, rate: f64) -> Result<()> {
        if let Some(writer) = self.rate.as_mut() {
            writer.serialize(RateRecord {
                address,
                rate_mib_s: rate,
            })?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.timing.take() {
            writer.flush()?;
        }
        if let Some(mut writer) = self.rate.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for CsvTelemetry {
    fn drop(&mut self) {
        if self.timing.is_some() || self.rate.is_some() {
            if let Err(e) = self.close() {
                warn!("Telemetry logs not flushed cleanly: {}", e);
            }
        }
    }
}

/// Log and swallow telemetry failures; a broken log must not stop a dump.
pub(crate) fn record(result: Result<()>) {
    if let Err(e) = result {
        warn!("Telemetry write failed: {}", e);
    }
}
