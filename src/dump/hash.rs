//! Integrity checksum pass
//!
//! Reads the finished sink back from offset 0 in fixed-size batches and
//! folds every batch into each enabled digest. The batch size is picked for
//! throughput only and has nothing to do with the imaging burst size.
//! Supported algorithms: SHA1, MD5, SHA256, BLAKE3, XxHash3, XxHash128.

use crate::error::{Result, RustDumpError};
use crate::sink::Sink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Sha1,
    Md5,
    Sha256,
    Blake3,
    Xxh3,
    Xxh128,
}

impl ChecksumAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
            Self::Xxh3 => "xxh3",
            Self::Xxh128 => "xxh128",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Uppercase hex digests keyed by algorithm name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpDigest {
    pub bytes: u64,
    pub values: BTreeMap<String, String>,
}

impl DumpDigest {
    pub fn get(&self, algorithm: ChecksumAlgorithm) -> Option<&str> {
        self.values.get(algorithm.name()).map(String::as_str)
    }
}

enum Hasher {
    Sha1(sha1::Sha1),
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
    Xxh3(Box<xxhash_rust::xxh3::Xxh3>),
    Xxh128(Box<xxhash_rust::xxh3::Xxh3>),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        use sha1::Digest as _;

        match algorithm {
            ChecksumAlgorithm::Sha1 => Self::Sha1(sha1::Sha1::new()),
            ChecksumAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
            ChecksumAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            ChecksumAlgorithm::Xxh3 => Self::Xxh3(Box::new(xxhash_rust::xxh3::Xxh3::new())),
            ChecksumAlgorithm::Xxh128 => Self::Xxh128(Box::new(xxhash_rust::xxh3::Xxh3::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        use sha1::Digest as _;

        match self {
            Self::Sha1(h) => h.update(data),
            Self::Md5(h) => h.consume(data),
            Self::Sha256(h) => sha2::Digest::update(h, data),
            Self::Blake3(h) => {
                h.update(data);
            }
            Self::Xxh3(h) | Self::Xxh128(h) => h.update(data),
        }
    }

    fn finish(self) -> String {
        use sha1::Digest as _;

        match self {
            Self::Sha1(h) => hex::encode_upper(h.finalize()),
            Self::Md5(h) => hex::encode_upper(h.compute().0),
            Self::Sha256(h) => hex::encode_upper(sha2::Digest::finalize(h)),
            Self::Blake3(h) => hex::encode_upper(h.finalize().as_bytes()),
            Self::Xxh3(h) => format!("{:016X}", h.digest()),
            Self::Xxh128(h) => format!("{:032X}", h.digest128()),
        }
    }
}

/// Blockwise calculator feeding one byte stream into several digests.
pub struct ChecksumCalculator {
    hashers: Vec<(ChecksumAlgorithm, Hasher)>,
    bytes_processed: u64,
}

impl ChecksumCalculator {
    pub fn new(algorithms: &[ChecksumAlgorithm]) -> Self {
        let mut unique = algorithms.to_vec();
        unique.sort();
        unique.dedup();
        Self {
            hashers: unique.into_iter().map(|a| (a, Hasher::new(a))).collect(),
            bytes_processed: 0,
        }
    }

    pub fn propagate(&mut self, data: &[u8]) {
        for (_, hasher) in &mut self.hashers {
            hasher.update(data);
        }
        self.bytes_processed += data.len() as u64;
    }

    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed
    }

    pub fn finish(self) -> DumpDigest {
        DumpDigest {
            bytes: self.bytes_processed,
            values: self
                .hashers
                .into_iter()
                .map(|(algorithm, hasher)| (algorithm.name().to_string(), hasher.finish()))
                .collect(),
        }
    }
}

/// Digest of the first `total_blocks * block_size` bytes of `sink`, read in
/// batches of `batch_blocks` blocks.
pub fn checksum(
    sink: &mut dyn Sink,
    total_blocks: u64,
    block_size: u32,
    batch_blocks: u32,
    algorithms: &[ChecksumAlgorithm],
) -> Result<DumpDigest> {
    if block_size == 0 {
        return Err(RustDumpError::block_size("block size of 0"));
    }
    let batch_bytes = batch_blocks.max(1) as u64 * block_size as u64;
    checksum_bytes(sink, total_blocks * block_size as u64, batch_bytes, algorithms)
}

/// Digest of the first `len` bytes of `sink`.
pub fn checksum_bytes(
    sink: &mut dyn Sink,
    len: u64,
    batch_bytes: u64,
    algorithms: &[ChecksumAlgorithm],
) -> Result<DumpDigest> {
    if algorithms.is_empty() {
        return Err(RustDumpError::parameter_validation(
            "no checksum algorithm selected",
        ));
    }
    let available = sink.len()?;
    if available < len {
        return Err(RustDumpError::SizeMismatch {
            expected: len,
            actual: available,
        });
    }

    info!(
        "Checksumming {} bytes ({})",
        len,
        algorithms
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut calculator = ChecksumCalculator::new(algorithms);
    let mut buffer = vec![0u8; batch_bytes.clamp(1, len.max(1)) as usize];
    let mut offset = 0u64;
    while offset < len {
        let want = (len - offset).min(buffer.len() as u64) as usize;
        sink.read_exact_at(&mut buffer[..want], offset)?;
        calculator.propagate(&buffer[..want]);
        offset += want as u64;
    }

    debug!("Checksum pass folded {} bytes", calculator.bytes_processed());
    Ok(calculator.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn filled_sink(len: usize) -> MemorySink {
        let mut sink = MemorySink::new();
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        sink.write_at_offset(&data, 0).unwrap();
        sink
    }

    #[test]
    fn known_vectors() {
        let mut sink = MemorySink::new();
        sink.write_at_offset(b"abc", 0).unwrap();
        let digest = checksum_bytes(
            &mut sink,
            3,
            2,
            &[ChecksumAlgorithm::Sha1, ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha256],
        )
        .unwrap();

        assert_eq!(
            digest.get(ChecksumAlgorithm::Sha1),
            Some("A9993E364706816ABA3E25717850C26C9CD0D89D")
        );
        assert_eq!(
            digest.get(ChecksumAlgorithm::Md5),
            Some("900150983CD24FB0D6963F7D28E17F72")
        );
        assert_eq!(
            digest.get(ChecksumAlgorithm::Sha256),
            Some("BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD")
        );
        assert_eq!(digest.bytes, 3);
    }

    #[test]
    fn repeated_passes_agree() {
        let mut sink = filled_sink(100 * 512);
        let all = [
            ChecksumAlgorithm::Sha1,
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Sha256,
            ChecksumAlgorithm::Blake3,
            ChecksumAlgorithm::Xxh3,
            ChecksumAlgorithm::Xxh128,
        ];
        let first = checksum(&mut sink, 100, 512, 7, &all).unwrap();
        let second = checksum(&mut sink, 100, 512, 7, &all).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.values.len(), 6);
    }

    #[test]
    fn batch_size_does_not_change_the_digest() {
        let mut sink = filled_sink(64 * 512);
        let algorithms = [ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Xxh3];
        let small = checksum(&mut sink, 64, 512, 1, &algorithms).unwrap();
        let large = checksum(&mut sink, 64, 512, 1000, &algorithms).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn short_sink_is_rejected() {
        let mut sink = filled_sink(10 * 512);
        let err = checksum(&mut sink, 20, 512, 4, &[ChecksumAlgorithm::Md5]).unwrap_err();
        assert!(matches!(err, RustDumpError::SizeMismatch { .. }));
    }

    #[test]
    fn duplicate_algorithms_collapse() {
        let calculator = ChecksumCalculator::new(&[
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Sha1,
        ]);
        assert_eq!(calculator.finish().values.len(), 2);
    }
}
