/// Result alias that carries the custom [`TerminalError`] type.
pub type Result<T> = std::result::Result<T, TerminalError>;

/// Common error type for the core crate.
///
/// Most of these never leave the crate: the choreography and audio entry
/// points absorb them and fall back to a degraded path. They surface from
/// configuration loading, offline rendering and the platform seams.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Input that violates a documented precondition.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or catalog JSON that failed to parse.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Spectrum computation failure during tone analysis.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
    /// A sound name that is not part of the catalog.
    #[error("unknown sound `{0}`")]
    UnknownSound(String),
    /// A scene identifier that the transition graph does not know about.
    #[error("unknown scene `{0}`")]
    UnknownScene(String),
    /// Platform audio failure: context creation, resume, sample loading or
    /// playback rejected by an autoplay policy.
    #[error("audio: {0}")]
    Audio(String),
}

impl TerminalError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates a platform audio error.
    pub fn audio<T: Into<String>>(msg: T) -> Self {
        Self::Audio(msg.into())
    }
}

impl From<&str> for TerminalError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TerminalError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
