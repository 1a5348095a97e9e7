//! rust-dump Library
//!
//! Resumable, fault-tolerant imaging of disks and optical media: a generic
//! engine over the [`device::BlockDevice`] trait with resume files, burst
//! probing, bad-block recovery and checksums, plus a track-aware optical
//! extension and SCSI pass-through devices.

pub mod cli;
pub mod commands;
pub mod config;
pub mod device;
pub mod display;
pub mod dump;
pub mod error;
pub mod logger;
pub mod optical;
pub mod scsi;
pub mod sink;
pub mod telemetry;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export key types for easier use
pub use device::{BlockDevice, DeviceIdentity, ErrorRecoveryPage, FileDevice, ReadOutcome};
pub use dump::{CancelToken, DumpOptions, DumpOutcome, DumpStatus, Dumper, ResumeState, ResumeStore};
pub use error::{Result, RustDumpError};
pub use optical::{OpticalDevice, OpticalOptions};
pub use sink::{FileSink, MemorySink, Sink};
