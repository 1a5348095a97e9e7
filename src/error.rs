use thiserror::Error;

pub type Result<T> = std::result::Result<T, RustDumpError>;

#[derive(Error, Debug)]
pub enum RustDumpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SCSI operation error: {0}")]
    Scsi(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Resume state does not match this target: {0}")]
    ResumeMismatch(String),

    #[error("Resume state size mismatch: resume file expects last block {expected}, device reports last block {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Medium is unreadable: {0}")]
    UnreadableMedium(String),

    #[error("Cannot determine block size: {0}")]
    BlockSize(String),

    #[error("Read failed at block {address}: {reason}")]
    ReadAborted { address: u64, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Telemetry log error: {0}")]
    Telemetry(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Parameter validation error: {0}")]
    ParameterValidation(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl RustDumpError {
    pub fn scsi<T: Into<String>>(msg: T) -> Self {
        Self::Scsi(msg.into())
    }

    pub fn device<T: Into<String>>(msg: T) -> Self {
        Self::Device(msg.into())
    }

    pub fn resume_mismatch<T: Into<String>>(msg: T) -> Self {
        Self::ResumeMismatch(msg.into())
    }

    pub fn unreadable_medium<T: Into<String>>(msg: T) -> Self {
        Self::UnreadableMedium(msg.into())
    }

    pub fn block_size<T: Into<String>>(msg: T) -> Self {
        Self::BlockSize(msg.into())
    }

    pub fn parse<T: Into<String>>(msg: T) -> Self {
        Self::Parse(msg.into())
    }

    pub fn parameter_validation<T: Into<String>>(msg: T) -> Self {
        Self::ParameterValidation(msg.into())
    }

    pub fn unsupported<T: Into<String>>(msg: T) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Errors that abort a dump before or during setup.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(
            self,
            Self::ResumeMismatch(_)
                | Self::SizeMismatch { .. }
                | Self::UnreadableMedium(_)
                | Self::BlockSize(_)
        )
    }
}
