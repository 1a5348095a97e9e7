//! Command Handlers Module
//!
//! This module contains handlers for all CLI subcommands.

pub mod checksum;
pub mod dump;
pub mod resume;

use crate::dump::CancelToken;
use crate::error::Result;
use crate::telemetry::Telemetry;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

/// Cancel `token` on Ctrl-C. The running stage notices at its next burst
/// or block and checkpoints.
pub fn install_cancel_handler(token: &CancelToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing the current read and saving progress");
        token.cancel();
    })
    .map_err(|e| anyhow::anyhow!("Cannot install Ctrl-C handler: {}", e))?;
    Ok(())
}

/// Telemetry wrapper that also drives a progress bar.
pub struct CliTelemetry<T: Telemetry> {
    inner: T,
    bar: Option<ProgressBar>,
}

impl<T: Telemetry> CliTelemetry<T> {
    pub fn new(inner: T, show_progress: bool) -> Self {
        let bar = show_progress.then(|| {
            let bar = ProgressBar::new(0);
            let style = ProgressStyle::default_bar()
                .template(
                    "{prefix:10} [{elapsed_precise}] [{bar:40.green/black}] {pos}/{len} blocks ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");
            bar.set_style(style);
            bar
        });
        Self { inner, bar }
    }
}

impl<T: Telemetry> Telemetry for CliTelemetry<T> {
    fn block_timing(&mut self, address: u64, duration_ms: f64) -> Result<()> {
        self.inner.block_timing(address, duration_ms)
    }

    fn burst_rate(&mut self, address: u64, rate: f64) -> Result<()> {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{:.2} MiB/s", rate));
        }
        self.inner.burst_rate(address, rate)
    }

    fn progress(&mut self, done: u64, total: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(total);
            bar.set_position(done);
        }
        self.inner.progress(done, total);
    }

    fn stage(&mut self, name: &str) {
        if let Some(bar) = &self.bar {
            bar.set_prefix(name.to_string());
            bar.set_position(0);
        }
        self.inner.stage(name);
    }

    fn close(&mut self) -> Result<()> {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recording {
        timings: Vec<(u64, f64)>,
        stages: Vec<String>,
        closed: u32,
    }

    impl Telemetry for Recording {
        fn block_timing(&mut self, address: u64, duration_ms: f64) -> Result<()> {
            self.timings.push((address, duration_ms));
            Ok(())
        }

        fn burst_rate(&mut self, _address: u64, _rate: f64) -> Result<()> {
            Ok(())
        }

        fn stage(&mut self, name: &str) {
            self.stages.push(name.to_string());
        }

        fn close(&mut self) -> Result<()> {
            self.closed += 1;
            Ok(())
        }
    }

    #[test]
    fn wrapper_forwards_to_inner_telemetry() {
        let mut telemetry = CliTelemetry::new(Recording::default(), false);
        telemetry.stage("imaging");
        telemetry.block_timing(7, 1.5).unwrap();
        telemetry.progress(1, 10);
        telemetry.close().unwrap();

        assert_eq!(telemetry.inner.timings, vec![(7, 1.5)]);
        assert_eq!(telemetry.inner.stages, vec!["imaging".to_string()]);
        assert_eq!(telemetry.inner.closed, 1);
    }
}
