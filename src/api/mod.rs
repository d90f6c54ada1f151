//! REST clients for subtitle search and audio transcription.

pub mod opensubtitles;
pub mod whisper;

pub use opensubtitles::{OpenSubtitlesClient, SubtitleFinder};
pub use whisper::WhisperClient;

/// Failures talking to a remote subtitle or transcription service
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API Error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{0} API key missing")]
    MissingKey(&'static str),

    #[error("No subtitles found")]
    NoResults,

    #[error("Failed to get download link from API")]
    MissingLink,

    #[error("Invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
