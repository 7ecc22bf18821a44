//! Codec tables
//!
//! Preferred-codec matching plus the fixed payload types and RTP clock
//! rates used when replaying recordings to viewers.

use serde::{Deserialize, Serialize};

/// Media kind of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// The single-letter tag used in MJR info headers.
    pub fn tag(&self) -> &'static str {
        match self {
            MediaKind::Audio => "a",
            MediaKind::Video => "v",
        }
    }

    /// Parse the single-letter info-header tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            t if t.eq_ignore_ascii_case("a") => Some(MediaKind::Audio),
            t if t.eq_ignore_ascii_case("v") => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Fixed payload type advertised to viewers for audio, unless the codec has
/// a well-known static one.
pub const AUDIO_PT: u8 = 111;

/// Fixed payload type advertised to viewers for video.
pub const VIDEO_PT: u8 = 100;

/// Audio codecs we can negotiate, in preference order.
pub const AUDIO_PREFERRED: &[&str] = &["opus", "multiopus", "pcmu", "pcma", "g722", "isac16", "isac32"];

/// Video codecs we can negotiate, in preference order.
pub const VIDEO_PREFERRED: &[&str] = &["vp8", "vp9", "h264", "av1", "h265"];

/// Match a codec name against the preferred table for the given media kind.
///
/// Returns the canonical (lowercase, static) name, or `None` for codecs we
/// don't handle.
pub fn match_preferred(kind: MediaKind, name: &str) -> Option<&'static str> {
    let table = match kind {
        MediaKind::Audio => AUDIO_PREFERRED,
        MediaKind::Video => VIDEO_PREFERRED,
    };
    table.iter().find(|c| c.eq_ignore_ascii_case(name)).copied()
}

/// The payload type used when replaying the given audio codec.
///
/// G.711 and G.722 have static payload types we can't reassign.
pub fn audio_payload_type(codec: &str) -> u8 {
    if codec.eq_ignore_ascii_case("pcmu") {
        0
    } else if codec.eq_ignore_ascii_case("pcma") {
        8
    } else if codec.eq_ignore_ascii_case("g722") {
        9
    } else {
        AUDIO_PT
    }
}

/// RTP clock rate in kHz for an audio track, derived from its payload type.
///
/// The static payload types (PCMU/PCMA/G.722) all run an 8 kHz RTP clock;
/// everything else we replay is 48 kHz.
pub fn audio_clock_khz(payload_type: u8) -> u64 {
    match payload_type {
        0 | 8 | 9 => 8,
        _ => 48,
    }
}

/// RTP clock rate in kHz for video tracks.
pub const VIDEO_CLOCK_KHZ: u64 = 90;

/// The `a=rtpmap` encoding string for a canonical codec name.
pub fn rtpmap(codec: &str) -> &'static str {
    match codec {
        "opus" => "opus/48000/2",
        "multiopus" => "multiopus/48000/6",
        "pcmu" => "PCMU/8000",
        "pcma" => "PCMA/8000",
        "g722" => "G722/8000",
        "isac16" => "ISAC/16000",
        "isac32" => "ISAC/32000",
        "vp8" => "VP8/90000",
        "vp9" => "VP9/90000",
        "h264" => "H264/90000",
        "av1" => "AV1/90000",
        "h265" => "H265/90000",
        _ => "unknown/90000",
    }
}

/// Default `a=fmtp` parameters for a canonical codec name, if any.
pub fn default_fmtp(codec: &str) -> Option<&'static str> {
    match codec {
        "h264" => Some("profile-level-id=42e01f;packetization-mode=1"),
        "opus" => Some("useinbandfec=1"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_preferred_case_insensitive() {
        assert_eq!(match_preferred(MediaKind::Audio, "Opus"), Some("opus"));
        assert_eq!(match_preferred(MediaKind::Audio, "PCMU"), Some("pcmu"));
        assert_eq!(match_preferred(MediaKind::Video, "VP8"), Some("vp8"));
        assert_eq!(match_preferred(MediaKind::Video, "h264"), Some("h264"));
    }

    #[test]
    fn test_match_preferred_unknown() {
        assert_eq!(match_preferred(MediaKind::Audio, "mp3"), None);
        assert_eq!(match_preferred(MediaKind::Video, "theora"), None);
        // Wrong kind
        assert_eq!(match_preferred(MediaKind::Audio, "vp8"), None);
        assert_eq!(match_preferred(MediaKind::Video, "opus"), None);
    }

    #[test]
    fn test_audio_payload_types() {
        assert_eq!(audio_payload_type("pcmu"), 0);
        assert_eq!(audio_payload_type("PCMA"), 8);
        assert_eq!(audio_payload_type("g722"), 9);
        assert_eq!(audio_payload_type("opus"), 111);
        assert_eq!(audio_payload_type("isac16"), 111);
    }

    #[test]
    fn test_clock_rates() {
        assert_eq!(audio_clock_khz(0), 8);
        assert_eq!(audio_clock_khz(8), 8);
        assert_eq!(audio_clock_khz(9), 8);
        assert_eq!(audio_clock_khz(111), 48);
        assert_eq!(VIDEO_CLOCK_KHZ, 90);
    }

    #[test]
    fn test_media_kind_tags() {
        assert_eq!(MediaKind::Audio.tag(), "a");
        assert_eq!(MediaKind::Video.tag(), "v");
        assert_eq!(MediaKind::from_tag("a"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_tag("V"), Some(MediaKind::Video));
        assert_eq!(MediaKind::from_tag("x"), None);
    }
}
