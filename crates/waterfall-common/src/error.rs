//! Error types for the tile scheduler and its collaborators.

use thiserror::Error;

/// Result type alias using SchedulerError.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Primary error type for tile generation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    // === Setup Errors ===
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("Failed to spawn thread '{name}': {message}")]
    ThreadSpawn { name: String, message: String },

    // === Per-render Errors ===
    #[error("Source not available: {0}")]
    SourceUnavailable(String),

    #[error("Renderer rejected configuration: {0}")]
    RendererConfiguration(String),

    // === Lifecycle Errors ===
    #[error("Scheduler has been shut down")]
    ShutDown,
}

impl SchedulerError {
    /// Whether the condition may clear up on its own.
    ///
    /// Transient errors abort a single render attempt; the same tile can be
    /// requested again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedulerError::SourceUnavailable(_) | SchedulerError::RendererConfiguration(_)
        )
    }
}
