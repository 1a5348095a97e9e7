//! SCSI pass-through
//!
//! Windows SCSI_PASS_THROUGH_DIRECT transport plus the handful of commands
//! imaging needs: identification, capacity, reads, the error recovery mode
//! page and the CD table of contents. Other platforms get `Unsupported`
//! errors and fall back to [`crate::device::FileDevice`].

pub mod block_device;
pub mod constants;
pub mod ffi;
pub mod types;
mod commands;
mod core;
mod device;
mod sense;

pub use self::core::{CommandResult, ScsiInterface};
pub use block_device::ScsiBlockDevice;
pub use commands::config::{decode_error_recovery, encode_error_recovery};
pub use device::normalize_device_path;
pub use sense::SenseInfo;
pub use types::{Capacity, InquiryData, PeripheralType};
