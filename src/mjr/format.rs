//! MJR record framing and info-header parsing

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::codec::{self, MediaKind};

use super::MjrError;

/// Tag of the info-header record opening a current-format file.
pub const INFO_TAG: &[u8; 8] = b"MJR00002";

/// Tag of every frame record, and of the legacy file header.
pub const FRAME_TAG: &[u8; 8] = b"MEETECHO";

/// Length of a record header (tag + 16-bit length).
pub const RECORD_HEADER_LEN: u64 = 10;

/// Payload length of the legacy file header (`"video"` / `"audio"`).
pub const LEGACY_HEADER_LEN: u16 = 5;

/// Minimum record payload length for it to hold an RTP packet.
pub const MIN_RTP_LEN: u16 = 12;

/// Parsed MJR info header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MjrInfo {
    /// Whether the file holds the audio or the video track.
    pub kind: MediaKind,
    /// Canonical codec name, matched against the preferred-codec table.
    pub codec: &'static str,
    /// Creation time, microseconds since the epoch (0 when unknown).
    pub created: i64,
    /// First-write time, microseconds since the epoch (0 when unknown).
    pub first_write: i64,
}

impl MjrInfo {
    /// Parse the JSON payload of an `MJ` info-header record.
    ///
    /// `t` and `c` are required; `s` and `u` are optional integers.
    pub fn from_json(payload: &[u8]) -> Result<Self, MjrError> {
        let value: Value = serde_json::from_slice(payload)?;

        let tag = value
            .get("t")
            .and_then(Value::as_str)
            .ok_or(MjrError::MissingField("t"))?;
        let kind = MediaKind::from_tag(tag).ok_or_else(|| {
            MjrError::UnsupportedMediaType(tag.chars().next().unwrap_or('?'))
        })?;

        let codec_name = value
            .get("c")
            .and_then(Value::as_str)
            .ok_or(MjrError::MissingField("c"))?;
        let codec = codec::match_preferred(kind, codec_name)
            .ok_or_else(|| MjrError::UnsupportedCodec(codec_name.to_string()))?;

        let created = value.get("s").and_then(Value::as_i64).unwrap_or(0);
        let first_write = value.get("u").and_then(Value::as_i64).unwrap_or(0);

        Ok(Self {
            kind,
            codec,
            created,
            first_write,
        })
    }

    /// Info header for a legacy recording, inferred from its media byte.
    pub fn legacy(media: u8) -> Result<Self, MjrError> {
        let (kind, codec) = match media {
            b'v' => (MediaKind::Video, "vp8"),
            b'a' => (MediaKind::Audio, "opus"),
            other => return Err(MjrError::UnsupportedMediaType(other as char)),
        };
        Ok(Self {
            kind,
            codec,
            created: 0,
            first_write: 0,
        })
    }
}

/// Serialize an info header to its JSON payload.
pub fn info_json(kind: MediaKind, codec: &str, created: i64, first_write: i64) -> Vec<u8> {
    serde_json::json!({
        "t": kind.tag(),
        "c": codec,
        "s": created,
        "u": first_write,
    })
    .to_string()
    .into_bytes()
}

/// Resolve a recording filename to its on-disk path, appending the `.mjr`
/// extension when absent.
pub fn resolve_path(dir: &Path, filename: &str) -> PathBuf {
    if filename.ends_with(".mjr") {
        dir.join(filename)
    } else {
        dir.join(format!("{filename}.mjr"))
    }
}
