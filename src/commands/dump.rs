//! Dump Command Handler
//!
//! Handles the `dump` subcommand: opens the device and the output, loads the
//! resume file, runs the engine and always writes the resume file back.

use super::{install_cancel_handler, CliTelemetry};
use crate::cli::DumpArgs;
use crate::config;
use crate::device::FileDevice;
use crate::display;
use crate::dump::{CancelToken, DumpOptions, DumpOutcome, DumpStatus, Dumper, ResumeStore};
use crate::error::{Result, RustDumpError};
use crate::optical::{OpticalSinks, ReadMode, SubchannelMode};
use crate::scsi::ScsiBlockDevice;
use crate::sink::{FileSink, Sink};
use crate::telemetry::{CsvTelemetry, NullTelemetry, Telemetry};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

enum OpenedDevice {
    Scsi(ScsiBlockDevice),
    File(FileDevice),
}

/// Image files (and every path off Windows) are read as plain files;
/// anything else goes through SCSI pass-through.
fn open_device(path: &str, file_block_size: u32) -> Result<OpenedDevice> {
    let as_path = Path::new(path);
    if !cfg!(windows) || as_path.is_file() {
        info!("Opening {} as a file device", path);
        Ok(OpenedDevice::File(FileDevice::open(as_path, file_block_size)?))
    } else {
        Ok(OpenedDevice::Scsi(ScsiBlockDevice::open(path)?))
    }
}

/// `<output><suffix>`, next to the image
pub fn companion_path(output: &Path, suffix: &str) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn needs_subchannel_sink(options: &DumpOptions) -> bool {
    let optical = &options.optical;
    optical.separate_subchannel
        && optical.read_mode == ReadMode::Raw
        && optical.subchannel != SubchannelMode::None
}

fn create_telemetry(args: &DumpArgs) -> Result<CliTelemetry<Box<dyn Telemetry>>> {
    let inner: Box<dyn Telemetry> = match &args.telemetry_dir {
        Some(dir) => {
            let stem = args
                .output
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "dump".to_string());
            let csv = CsvTelemetry::create(dir, &stem)?;
            info!(
                "Telemetry: {:?}, {:?}",
                csv.timing_path(),
                csv.rate_path()
            );
            Box::new(csv)
        }
        None => Box::new(NullTelemetry),
    };
    Ok(CliTelemetry::new(inner, !args.no_progress))
}

pub fn execute(args: DumpArgs, config_path: Option<PathBuf>) -> Result<()> {
    info!("Starting dump: {} -> {:?}", args.device, args.output);

    let mut options = config::load(config_path.as_deref())?;
    args.apply(&mut options);
    options.validate()?;

    let cancel = CancelToken::new();
    install_cancel_handler(&cancel)?;

    let store = match &args.resume_file {
        Some(path) => ResumeStore::new(path.clone()),
        None => ResumeStore::for_image(&args.output),
    };
    let existing = store.load()?;

    let mut device = open_device(&args.device, args.file_block_size)?;
    let mut telemetry = create_telemetry(&args)?;
    let mut sink = FileSink::open(&args.output)?;

    let optical = args.optical;
    let mut subchannel_sink = if optical && needs_subchannel_sink(&options) {
        Some(FileSink::open(&companion_path(&args.output, ".sub"))?)
    } else {
        None
    };
    let mut lead_in_sink = if optical && options.optical.lead_in {
        Some(FileSink::open(&companion_path(&args.output, ".leadin"))?)
    } else {
        None
    };

    let mut dumper = Dumper::new(options, cancel, &mut telemetry)?;
    let result: Result<DumpOutcome> = match (&mut device, optical) {
        (OpenedDevice::Scsi(scsi), true) => {
            let sinks = OpticalSinks {
                payload: &mut sink,
                subchannel: subchannel_sink.as_mut().map(|s| s as &mut dyn Sink),
                lead_in: lead_in_sink.as_mut().map(|s| s as &mut dyn Sink),
            };
            dumper.dump_optical(scsi, sinks, existing).map(|outcome| {
                display::display_tracks(&outcome.tracks);
                outcome.dump
            })
        }
        (OpenedDevice::File(_), true) => Err(RustDumpError::unsupported(
            "optical dumps need a SCSI/MMC drive",
        )),
        (OpenedDevice::Scsi(scsi), false) => dumper.dump(scsi, &mut sink, existing),
        (OpenedDevice::File(file), false) => dumper.dump(file, &mut sink, existing),
    };

    // progress is persisted whatever happened
    match dumper.resume_snapshot() {
        Some(snapshot) => {
            store.save(snapshot)?;
            info!("Resume state saved to {:?}", store.path());
        }
        None => warn!("No resume state to save, {:?} left untouched", store.path()),
    }
    display::display_summary(dumper.summary());

    for companion in [subchannel_sink.as_mut(), lead_in_sink.as_mut()]
        .into_iter()
        .flatten()
    {
        companion.close()?;
    }
    sink.close()?;

    let outcome = result?;
    display::display_recovery(&outcome.recovery);
    if let Some(digest) = &outcome.digest {
        display::display_digest(digest);
    }

    match outcome.status {
        DumpStatus::Completed if outcome.resume.is_complete() => {
            info!("Dump complete: {:?}", args.output)
        }
        DumpStatus::Completed => warn!(
            "Dump finished with {} unreadable blocks, run again to retry them",
            outcome.resume.bad_blocks.len()
        ),
        DumpStatus::Cancelled => info!("Dump cancelled, run the same command to resume"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_files_sit_next_to_the_image() {
        let output = Path::new("/images/disc.bin");
        assert_eq!(
            companion_path(output, ".sub"),
            PathBuf::from("/images/disc.bin.sub")
        );
    }

    #[test]
    fn subchannel_sink_only_for_separate_raw_subchannel() {
        let mut options = DumpOptions::default();
        assert!(needs_subchannel_sink(&options));

        options.optical.separate_subchannel = false;
        assert!(!needs_subchannel_sink(&options));

        options.optical.separate_subchannel = true;
        options.optical.read_mode = ReadMode::Cooked;
        assert!(!needs_subchannel_sink(&options));

        options.optical.read_mode = ReadMode::Raw;
        options.optical.subchannel = SubchannelMode::None;
        assert!(!needs_subchannel_sink(&options));
    }
}
