use crate::acquire::AcquisitionError;
use crate::backend::LoadError;
use crate::catalog::CatalogError;
use crate::controller::DegradedReason;
use crate::engines::onnx::EngineError;

/// Errors surfaced by [`crate::VoiceController`].
///
/// Only `Configuration` and `Io` reach the caller in the default mode; the
/// other variants are returned when strict mode is enabled and are otherwise
/// turned into degraded synthesis.
#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] CatalogError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Voice is degraded: {0}")]
    Degraded(DegradedReason),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    /// Whether this is a caller mistake (such as an unknown voice id) rather
    /// than an environment problem.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TtsError::Configuration(_))
    }
}
