//! Resume-info Command Handler
//!
//! Handles the `resume-info` subcommand: prints what a resume file records.

use crate::display;
use crate::dump::ResumeStore;
use crate::error::{Result, RustDumpError};
use std::path::PathBuf;

pub fn execute(file: PathBuf) -> Result<()> {
    let store = ResumeStore::new(file);
    let state = store.load()?.ok_or_else(|| {
        RustDumpError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Resume file {:?} does not exist", store.path()),
        ))
    })?;
    display::display_resume_info(&state);
    Ok(())
}
