//! Video error kinds
//!
//! One variant per failure class of the playback engine. End of stream is not an
//! error; readers report it through `ReadOutcome::EndOfStream`.

use std::fmt::Display;

use thiserror::Error;

/// Errors raised while opening, decoding or seeking a video
#[derive(Debug, Clone, Error)]
pub enum VideoError {
    /// The media session could not be started, or was already shut down
    #[error("Media session unavailable: {0}")]
    SessionInit(String),

    /// Path invalid, container unsupported, or the reader could not be created
    #[error("{context} failed: {message}")]
    ReaderOpen { context: String, message: String },

    /// No candidate pixel format was accepted by the stream
    #[error("No output format accepted ({context}): {message}")]
    FormatNegotiation { context: String, message: String },

    /// The stream lacks usable frame dimensions
    #[error("Frame size unavailable: {0}")]
    FrameSizeUnavailable(String),

    /// Pixel buffer or texture could not be allocated
    #[error("Buffer allocation failed: {0}")]
    BufferAllocation(String),

    /// A single frame failed to decode or could not be accessed
    #[error("{context} failed: {message}")]
    SampleRead { context: String, message: String },

    /// The reader rejected a position change
    #[error("Seek to {target:.3}s failed: {message}")]
    Seek { target: f64, message: String },
}

impl VideoError {
    pub fn reader_open(context: impl Into<String>, err: impl Display) -> Self {
        VideoError::ReaderOpen {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn negotiation(context: impl Into<String>, err: impl Display) -> Self {
        VideoError::FormatNegotiation {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn sample_read(context: impl Into<String>, err: impl Display) -> Self {
        VideoError::SampleRead {
            context: context.into(),
            message: err.to_string(),
        }
    }

    pub fn seek(target: f64, err: impl Display) -> Self {
        VideoError::Seek {
            target,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = VideoError::reader_open("format::input", "No such file or directory");
        assert_eq!(err.to_string(), "format::input failed: No such file or directory");

        let err = VideoError::seek(2.5, "Operation not permitted");
        assert_eq!(err.to_string(), "Seek to 2.500s failed: Operation not permitted");
    }
}
