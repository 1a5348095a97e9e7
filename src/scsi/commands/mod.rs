//! SCSI Commands Module
//!
//! This module contains implementations of various SCSI commands.

pub mod basic;
pub mod config;
pub mod io;
pub mod toc;
