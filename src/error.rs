//! Plugin error types
//!
//! Every error that can travel back over the control surface carries one of
//! the fixed wire codes (411-499). Internal failures that have no dedicated
//! code fold into `Unknown` (499).

use thiserror::Error;

use crate::mjr::MjrError;
use crate::sdp::SdpError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Error type for control-surface and lifecycle operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No message payload was supplied at all.
    #[error("no message")]
    NoMessage,

    /// The payload was not a JSON object.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The `request` field named an unknown request type.
    #[error("unknown request '{0}'")]
    InvalidRequest(String),

    /// A field was present but had the wrong type or an invalid value.
    #[error("invalid element ({0})")]
    InvalidElement(String),

    /// A mandatory field was missing.
    #[error("missing mandatory element ({0})")]
    MissingElement(String),

    /// The referenced recording does not exist (or has no viewer offer).
    #[error("no such recording")]
    NotFound,

    /// The recording exists but none of its tracks could be indexed.
    #[error("invalid recording: {0}")]
    InvalidRecording(String),

    /// The request is incompatible with the session's role or phase.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The accompanying SDP could not be parsed.
    #[error("invalid SDP: {0}")]
    InvalidSdp(String),

    /// A recording with the requested id already exists.
    #[error("recording {0} already exists")]
    RecordingExists(u64),

    /// Catch-all for invariant violations, including operating on a
    /// destroyed session.
    #[error("{0}")]
    Unknown(String),
}

impl PluginError {
    /// The wire error code reported to the peer.
    pub fn code(&self) -> u16 {
        match self {
            PluginError::NoMessage => 411,
            PluginError::InvalidJson(_) => 412,
            PluginError::InvalidRequest(_) => 413,
            PluginError::InvalidElement(_) => 414,
            PluginError::MissingElement(_) => 415,
            PluginError::NotFound => 416,
            PluginError::InvalidRecording(_) => 417,
            PluginError::InvalidState(_) => 418,
            PluginError::InvalidSdp(_) => 419,
            PluginError::RecordingExists(_) => 420,
            PluginError::Unknown(_) => 499,
        }
    }
}

impl From<SdpError> for PluginError {
    fn from(e: SdpError) -> Self {
        PluginError::InvalidSdp(e.to_string())
    }
}

impl From<MjrError> for PluginError {
    fn from(e: MjrError) -> Self {
        PluginError::InvalidRecording(e.to_string())
    }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        PluginError::Unknown(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PluginError::NoMessage.code(), 411);
        assert_eq!(PluginError::InvalidJson("x".into()).code(), 412);
        assert_eq!(PluginError::InvalidRequest("x".into()).code(), 413);
        assert_eq!(PluginError::InvalidElement("x".into()).code(), 414);
        assert_eq!(PluginError::MissingElement("x".into()).code(), 415);
        assert_eq!(PluginError::NotFound.code(), 416);
        assert_eq!(PluginError::InvalidRecording("x".into()).code(), 417);
        assert_eq!(PluginError::InvalidState("x".into()).code(), 418);
        assert_eq!(PluginError::InvalidSdp("x".into()).code(), 419);
        assert_eq!(PluginError::RecordingExists(42).code(), 420);
        assert_eq!(PluginError::Unknown("x".into()).code(), 499);
    }

    #[test]
    fn test_display_includes_context() {
        let e = PluginError::RecordingExists(42);
        assert_eq!(e.to_string(), "recording 42 already exists");

        let e = PluginError::MissingElement("name".into());
        assert_eq!(e.to_string(), "missing mandatory element (name)");
    }
}
