//! Error types for a dubbing run.

use thiserror::Error;

/// Failure of a dubbing request, tagged with the stage that failed.
///
/// Everything except [`DubError::Cloning`] aborts the request. Cloning
/// failures are logged and the speaker falls back to a pool voice.
#[derive(Error, Debug)]
pub enum DubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Translation failed for segment {segment}: {message}")]
    Translation { segment: usize, message: String },

    #[error("Speech synthesis failed for segment {segment}: {message}")]
    Synthesis { segment: usize, message: String },

    #[error("Voice cloning failed for speaker {speaker}: {message}")]
    Cloning { speaker: String, message: String },

    #[error("Background extraction failed: {0}")]
    Separation(String),

    #[error("Merge failed: {0}")]
    Mux(String),

    #[error("Audio processing failed: {0}")]
    Audio(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DubError {
    /// Short tag for the part of the run that failed, as reported to API clients.
    pub fn stage(&self) -> &'static str {
        match self {
            DubError::Config(_) => "configuration",
            DubError::Download(_) => "download",
            DubError::Transcription(_) => "transcription",
            DubError::Translation { .. } => "translation",
            DubError::Synthesis { .. } => "synthesis",
            DubError::Cloning { .. } => "cloning",
            DubError::Separation(_) => "background extraction",
            DubError::Mux(_) => "merge",
            DubError::Audio(_) => "audio",
            DubError::Io(_) => "io",
        }
    }

    /// Render an adapter error with its full context chain.
    pub(crate) fn detail(err: &anyhow::Error) -> String {
        format!("{:#}", err)
    }
}

pub type Result<T> = std::result::Result<T, DubError>;
