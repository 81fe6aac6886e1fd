use crate::playback::state::PlaybackState;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Why a command was rejected by the controller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("Player has been dismissed")]
    Dismissed,
    #[error("No item loaded")]
    NoActiveItem,
    #[error("Invalid media URL: {0}")]
    InvalidUrl(String),
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: PlaybackState,
    },
    #[error("Playback rate must be positive, got {0}")]
    InvalidRate(f32),
    #[error("Playback service is not running")]
    ServiceStopped,
}

/// Failures reported to observers through `PlaybackProgress::Error`
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackError {
    /// The item never became ready; the session is finished
    #[error("Failed to load media: {reason}")]
    EngineLoadFailure { reason: String },
    /// The engine could not complete a seek; playback state was rolled back
    #[error("Seek to {target:?} failed")]
    SeekFailure { target: Duration },
}
