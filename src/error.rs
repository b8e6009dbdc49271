use thiserror::Error;

/// Errors surfaced by the finger counting pipeline.
///
/// A frame without a hand is *not* an error; see [`Reading::NoHand`].
///
/// [`Reading::NoHand`]: crate::session::Reading::NoHand
#[derive(Debug, Error)]
pub enum Error {
    /// The camera could not be opened or stopped delivering frames.
    #[error("Unable to access camera: {0:#}")]
    Device(anyhow::Error),

    /// The landmark source failed to initialize or to accept a frame.
    #[error("hand landmark detector failed: {0:#}")]
    Detector(anyhow::Error),

    /// A landmark set did not have the expected shape.
    #[error("invalid landmark set: {0}")]
    InvalidInput(String),

    /// Detector options are out of range.
    #[error("invalid detector options: {0}")]
    InvalidOptions(String),
}

impl Error {
    pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
