//! Resume state: persisted progress of one dump target
//!
//! A resume document records where the next run continues, which blocks are
//! still bad, and one hardware attempt record per drive/software combination
//! that has worked on the target.

use super::extents::ExtentSet;
use crate::device::DeviceIdentity;
use crate::error::{Result, RustDumpError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which program produced a hardware attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareIdentity {
    pub name: String,
    pub version: String,
    pub operating_system: String,
}

impl SoftwareIdentity {
    /// Identity of this build.
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            operating_system: std::env::consts::OS.to_string(),
        }
    }
}

/// One drive + software combination that has read the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareAttempt {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    pub software: SoftwareIdentity,
    pub extents: ExtentSet,
    pub first_used: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl HardwareAttempt {
    pub fn new(identity: &DeviceIdentity, software: &SoftwareIdentity) -> Self {
        let now = Utc::now();
        Self {
            manufacturer: identity.manufacturer.clone(),
            model: identity.model.clone(),
            serial: identity.serial.clone(),
            firmware: identity.firmware.clone(),
            software: software.clone(),
            extents: ExtentSet::new(),
            first_used: now,
            last_used: now,
        }
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            manufacturer: self.manufacturer.clone(),
            model: self.model.clone(),
            serial: self.serial.clone(),
            firmware: self.firmware.clone(),
        }
    }

    pub fn matches(&self, identity: &DeviceIdentity, software: &SoftwareIdentity) -> bool {
        self.identity().same_drive(identity) && &self.software == software
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeState {
    pub next_block: u64,
    pub last_block: u64,
    pub removable: bool,
    #[serde(default)]
    pub bad_blocks: BTreeSet<u64>,
    #[serde(default)]
    pub tries: Vec<HardwareAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_label: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl ResumeState {
    pub fn new(total_blocks: u64, removable: bool) -> Result<Self> {
        let last_block = total_blocks.checked_sub(1).ok_or_else(|| {
            RustDumpError::parameter_validation("cannot create resume state for an empty target")
        })?;
        let now = Utc::now();
        Ok(Self {
            next_block: 0,
            last_block,
            removable,
            bad_blocks: BTreeSet::new(),
            tries: Vec::new(),
            media_label: None,
            created: now,
            updated: now,
        })
    }

    pub fn total_blocks(&self) -> u64 {
        self.last_block.saturating_add(1)
    }

    /// Check that every recorded address lies on the target and that no
    /// block is both captured and bad.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let total = self
            .last_block
            .checked_add(1)
            .ok_or_else(|| format!("last block {} is out of range", self.last_block))?;
        if self.next_block > total {
            return Err(format!(
                "next block {} is past last block {}",
                self.next_block, self.last_block
            ));
        }
        if let Some(&bad) = self.bad_blocks.iter().next_back() {
            if bad > self.last_block {
                return Err(format!(
                    "bad block {} is past last block {}",
                    bad, self.last_block
                ));
            }
        }
        for (index, attempt) in self.tries.iter().enumerate() {
            if let Some(end) = attempt.extents.end() {
                if end > total {
                    return Err(format!(
                        "attempt {} has extents up to block {}, past last block {}",
                        index + 1,
                        end - 1,
                        self.last_block
                    ));
                }
            }
        }
        let captured = self.captured();
        if let Some(&both) = self.bad_blocks.iter().find(|&&b| captured.contains(b)) {
            return Err(format!("block {} is both captured and bad", both));
        }
        Ok(())
    }

    /// Union of the extents of every attempt.
    pub fn captured(&self) -> ExtentSet {
        let mut all = ExtentSet::new();
        for attempt in &self.tries {
            all.union(&attempt.extents);
        }
        all
    }

    /// Nothing left to read and nothing left to retry.
    pub fn is_complete(&self) -> bool {
        self.next_block > self.last_block && self.bad_blocks.is_empty()
    }
}

/// Result of matching prior state against the device in front of us.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub state: ResumeState,
    /// Index into `state.tries` of the attempt this run records into
    pub active: usize,
    /// Working extent set of the active attempt
    pub extents: ExtentSet,
}

/// Validate prior state against the current target, or create fresh state.
///
/// Fails before any device read when the target cannot be the same one the
/// state was recorded for.
pub fn reconcile(
    existing: Option<ResumeState>,
    is_addressable: bool,
    is_removable: bool,
    total_blocks: u64,
    identity: &DeviceIdentity,
    software: &SoftwareIdentity,
) -> Result<Reconciled> {
    let Some(mut state) = existing else {
        let mut state = ResumeState::new(total_blocks, is_removable)?;
        state.tries.push(HardwareAttempt::new(identity, software));
        debug!(
            "Created resume state for {} blocks (removable: {})",
            total_blocks, is_removable
        );
        return Ok(Reconciled {
            state,
            active: 0,
            extents: ExtentSet::new(),
        });
    };

    if !is_addressable {
        return Err(RustDumpError::resume_mismatch(
            "resuming CHS-only devices is not supported",
        ));
    }

    if state.removable != is_removable {
        return Err(RustDumpError::resume_mismatch(format!(
            "resume file says removable = {}, device says removable = {}",
            state.removable, is_removable
        )));
    }

    let actual_last = total_blocks.checked_sub(1).ok_or_else(|| {
        RustDumpError::parameter_validation("device reports zero blocks")
    })?;
    if state.last_block != actual_last {
        return Err(RustDumpError::SizeMismatch {
            expected: state.last_block,
            actual: actual_last,
        });
    }

    if !is_removable {
        if let Some(other) = state
            .tries
            .iter()
            .find(|attempt| !attempt.identity().same_drive(identity))
        {
            return Err(RustDumpError::resume_mismatch(format!(
                "resume file belongs to {} but this device is {}",
                other.identity(),
                identity
            )));
        }
    }

    if state.next_block > total_blocks {
        warn!(
            "Resume next block {} is past the end, clamping to {}",
            state.next_block, total_blocks
        );
        state.next_block = total_blocks;
    }

    let now = Utc::now();
    let active = match state
        .tries
        .iter()
        .position(|attempt| attempt.matches(identity, software))
    {
        Some(index) => {
            info!(
                "Resuming attempt #{} with {} ({} {})",
                index + 1,
                identity,
                software.name,
                software.version
            );
            state.tries[index].last_used = now;
            index
        }
        None => {
            info!("Starting new hardware attempt with {}", identity);
            state.tries.push(HardwareAttempt::new(identity, software));
            state.tries.len() - 1
        }
    };

    let extents = state.tries[active].extents.clone();
    state.updated = now;

    Ok(Reconciled {
        state,
        active,
        extents,
    })
}

/// Loads and saves resume documents as JSON.
#[derive(Debug, Clone)]
pub struct ResumeStore {
    path: PathBuf,
}

impl ResumeStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Conventional location next to the image: `<image>.resume.json`.
    pub fn for_image(image: &Path) -> Self {
        let mut name = image.as_os_str().to_os_string();
        name.push(".resume.json");
        Self::new(PathBuf::from(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no resume file exists yet.
    pub fn load(&self) -> Result<Option<ResumeState>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No resume file at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let state: ResumeState = serde_json::from_str(&content).map_err(|e| {
            RustDumpError::parse(format!("Invalid resume file {:?}: {}", self.path, e))
        })?;

        state.validate().map_err(|e| {
            RustDumpError::parse(format!("Invalid resume file {:?}: {}", self.path, e))
        })?;

        info!(
            "Loaded resume file {:?}: next block {}, {} bad blocks, {} attempts",
            self.path,
            state.next_block,
            state.bad_blocks.len(),
            state.tries.len()
        );
        Ok(Some(state))
    }

    /// Write through a temporary file and rename, so a crash never leaves a
    /// half-written resume file behind.
    pub fn save(&self, state: &ResumeState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;

        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            "Saved resume file {:?} (next block {}, {} bad blocks)",
            self.path,
            state.next_block,
            state.bad_blocks.len()
        );
        Ok(())
    }
}
