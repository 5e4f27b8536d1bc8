//! # Error types

use std::fmt;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Step of the decode loop that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeStage {
    ReadPacket,
    SendPacket,
    ReceiveFrame,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::ReadPacket => "reading a packet",
            Self::SendPacket => "sending a packet to the decoder",
            Self::ReceiveFrame => "receiving a frame from the decoder",
        };
        f.write_str(stage)
    }
}

/// Errors produced while opening or decoding a video source.
///
/// The type is `Clone`, because an errored reader keeps reporting the same failure on every
/// subsequent read.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The container could not be opened or probed.
    #[error("could not open source {path}: {reason}")]
    Open { path: String, reason: String },
    /// The container has no usable video stream.
    #[error("could not find a video stream in {path}: {reason}")]
    StreamNotFound { path: String, reason: String },
    /// The decoder for the selected stream could not be initialised.
    #[error("failed to open {codec} decoder: {reason}")]
    CodecOpen { codec: String, reason: String },
    /// The decode loop received a negative status mid-stream.
    #[error("error while {stage} ({code}): {message}")]
    Decode {
        stage: DecodeStage,
        code: i32,
        message: String,
    },
    /// The reader has already released its decoder.
    #[error("reader has been closed")]
    Closed,
}

impl Error {
    pub fn decode(stage: DecodeStage, code: i32, message: impl Into<String>) -> Self {
        Self::Decode {
            stage,
            code,
            message: message.into(),
        }
    }

    /// Whether the error happened while constructing the reader.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::Open { .. } | Self::StreamNotFound { .. } | Self::CodecOpen { .. }
        )
    }
}
