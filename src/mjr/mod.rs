//! MJR container codec
//!
//! MJR is a self-describing framed container for raw RTP recordings. A file
//! is a sequence of records, each an 8-byte ASCII tag, a 16-bit big-endian
//! payload length, and the payload:
//!
//! ```text
//! +----------+---------+-------------------+
//! | tag (8)  | len (2) | payload (len)     |
//! +----------+---------+-------------------+
//! ```
//!
//! Two tag families exist. Current-format files open with an `MJR00002`
//! record whose payload is a JSON info header describing the track; every
//! RTP packet follows as a `MEETECHO` record. Legacy files open with a
//! `MEETECHO` record of payload length 5 (`"video"` implies VP8, `"audio"`
//! implies Opus) and carry the same frame records.

pub mod format;
pub mod reader;
pub mod writer;

pub use format::{MjrInfo, FRAME_TAG, INFO_TAG};
pub use reader::{MjrReader, PacketRecord};
pub use writer::MjrWriter;

use thiserror::Error;

/// Error type for MJR encode/decode operations.
#[derive(Debug, Error)]
pub enum MjrError {
    /// The file does not start with a valid record tag.
    #[error("invalid MJR header")]
    InvalidHeader,

    /// The info header is not valid JSON.
    #[error("invalid info header: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A required info-header field is absent or has the wrong type.
    #[error("missing or invalid '{0}' field in info header")]
    MissingField(&'static str),

    /// The recorded codec is not in the preferred-codec table.
    #[error("unsupported codec '{0}'")]
    UnsupportedCodec(String),

    /// A legacy header names a media type other than audio or video.
    #[error("unsupported media type '{0}'")]
    UnsupportedMediaType(char),

    /// The writer has been closed; no further frames are accepted.
    #[error("writer is sealed")]
    Sealed,

    /// A frame exceeds the 16-bit record length.
    #[error("frame of {0} bytes does not fit a record")]
    FrameTooLarge(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
