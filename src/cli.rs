use crate::dump::{ChecksumAlgorithm, DumpOptions};
use crate::optical::{ReadMode, SubchannelMode};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rustdump")]
#[command(about = "Resumable, fault-tolerant imaging of disks and optical media")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Specify configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Image a device into a file, resuming earlier runs
    Dump(DumpArgs),

    /// Compute checksums of an existing image
    Checksum {
        /// Image file path
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Algorithms to compute (comma separated)
        #[arg(short, long, value_enum, value_delimiter = ',')]
        algorithms: Vec<ChecksumAlgorithm>,
    },

    /// Show the progress recorded in a resume file
    ResumeInfo {
        /// Resume file path
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct DumpArgs {
    /// Device path (e.g. \\.\PhysicalDrive1, D:, /dev/sdb) or image file
    #[arg(value_name = "DEVICE")]
    pub device: String,

    /// Output image path
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Resume file (defaults to <OUTPUT>.resume.json)
    #[arg(long)]
    pub resume_file: Option<PathBuf>,

    /// Number of retry passes over bad blocks
    #[arg(short = 'r', long)]
    pub retry_passes: Option<u16>,

    /// Put the drive into persistent error recovery mode while retrying
    #[arg(long)]
    pub persistent: bool,

    /// Abort at the first unreadable block
    #[arg(long)]
    pub stop_on_error: bool,

    /// Blocks to pass over after a failed burst
    #[arg(long, value_name = "BLOCKS")]
    pub skip: Option<u32>,

    /// Use this burst size instead of probing
    #[arg(short, long, value_name = "BLOCKS")]
    pub burst: Option<u32>,

    /// Skip the single re-read of every bad block before the retry passes
    #[arg(long)]
    pub no_trim: bool,

    /// Checksum algorithms (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub checksum: Vec<ChecksumAlgorithm>,

    /// Skip the checksum pass
    #[arg(long, conflicts_with = "checksum")]
    pub no_checksum: bool,

    /// Write per-block timing and burst rate CSV logs into this directory
    #[arg(long, value_name = "DIR")]
    pub telemetry_dir: Option<PathBuf>,

    /// Block size for plain files and block nodes
    #[arg(long, default_value = "512")]
    pub file_block_size: u32,

    /// Treat the device as a CD and dump it track by track
    #[arg(long)]
    pub optical: bool,

    /// Sector read mode for optical dumps
    #[arg(long, value_enum)]
    pub read_mode: Option<ReadMode>,

    /// Subchannel data read with every raw sector
    #[arg(long, value_enum)]
    pub subchannel: Option<SubchannelMode>,

    /// Keep subchannel after each sector instead of in <OUTPUT>.sub
    #[arg(long)]
    pub inline_subchannel: bool,

    /// Store raw subchannel in channel order (P..W)
    #[arg(long)]
    pub pack_subchannel: bool,

    /// Do not try to read the lead-in
    #[arg(long)]
    pub no_lead_in: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl DumpArgs {
    /// Command line flags win over configuration file values.
    pub fn apply(&self, options: &mut DumpOptions) {
        if let Some(passes) = self.retry_passes {
            options.retry_passes = passes;
        }
        if self.persistent {
            options.persistent = true;
        }
        if self.stop_on_error {
            options.stop_on_error = true;
        }
        if let Some(skip) = self.skip {
            options.skip_on_error = skip;
        }
        if self.burst.is_some() {
            options.fixed_burst = self.burst;
        }
        if self.no_trim {
            options.trim = false;
        }
        if !self.checksum.is_empty() {
            options.checksum.enabled = true;
            options.checksum.algorithms = self.checksum.clone();
        }
        if self.no_checksum {
            options.checksum.enabled = false;
        }

        if let Some(mode) = self.read_mode {
            options.optical.read_mode = mode;
        }
        if let Some(subchannel) = self.subchannel {
            options.optical.subchannel = subchannel;
        }
        if self.inline_subchannel {
            options.optical.separate_subchannel = false;
        }
        if self.pack_subchannel {
            options.optical.pack_subchannel = true;
        }
        if self.no_lead_in {
            options.optical.lead_in = false;
        }
    }
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
