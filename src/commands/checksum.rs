//! Checksum Command Handler
//!
//! Handles the `checksum` subcommand: digests an image that already exists.

use crate::config;
use crate::display;
use crate::dump::hash::{checksum_bytes, DumpDigest};
use crate::dump::ChecksumAlgorithm;
use crate::error::Result;
use crate::sink::{FileSink, Sink};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Digest the whole file with `algorithms`.
pub fn checksum_image(
    image: &Path,
    algorithms: &[ChecksumAlgorithm],
    batch_bytes: u64,
) -> Result<DumpDigest> {
    let mut sink = FileSink::open_existing(image)?;
    let len = sink.len()?;
    checksum_bytes(&mut sink, len, batch_bytes, algorithms)
}

pub fn execute(
    image: PathBuf,
    algorithms: Vec<ChecksumAlgorithm>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let options = config::load(config_path.as_deref())?;
    let algorithms = if algorithms.is_empty() {
        options.checksum.algorithms.clone()
    } else {
        algorithms
    };

    info!("Computing checksums of {:?}", image);
    let started = Instant::now();
    let digest = checksum_image(&image, &algorithms, options.checksum.batch_bytes as u64)?;
    info!("Checksums computed in {:.1}s", started.elapsed().as_secs_f64());

    display::display_digest(&digest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_whole_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.bin");
        std::fs::write(&path, b"abc").unwrap();

        let digest = checksum_image(&path, &[ChecksumAlgorithm::Md5], 2).unwrap();
        assert_eq!(digest.bytes, 3);
        assert_eq!(
            digest.get(ChecksumAlgorithm::Md5),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
    }

    #[test]
    fn missing_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(checksum_image(&dir.path().join("none.bin"), &[ChecksumAlgorithm::Sha1], 64).is_err());
    }
}
