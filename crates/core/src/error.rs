//! Failure taxonomy for a session.
//!
//! None of these are fatal: every failure leaves the session ready for the
//! next gesture. An empty transcript is not an error at all and is reported
//! through [`crate::transcript::Reconciled::Empty`].

/// The capture device could not be opened or stopped producing audio.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No input device named '{0}'")]
    NotFound(String),
    #[error("No default input device available")]
    NoDefault,
    #[error("Audio capture denied: {0}")]
    Denied(String),
}

/// The recognition channel failed. Buffered transcript events are still used.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to open recognition channel: {0}")]
    Connect(#[source] anyhow::Error),
    #[error("Recognition channel closed")]
    Closed,
}

/// A turn exchange with the oracle failed. The outbound message stays in history.
#[derive(Debug, thiserror::Error)]
#[error("Turn oracle request failed: {0:#}")]
pub struct OracleError(#[source] pub anyhow::Error);
