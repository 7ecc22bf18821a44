//! SDP offer/answer helper
//!
//! The engine only needs a narrow slice of SDP: enough to find the
//! negotiated codecs and media-line directions in a peer's offer or answer,
//! and to generate the plugin-authored offers/answers for recording peers
//! (`recvonly`) and replay viewers (`sendonly`). Data channels are never
//! offered; unrecognized media sections are ignored.

use std::fmt;

use thiserror::Error;

use crate::codec::{self, MediaKind};

/// Error type for SDP parsing.
#[derive(Debug, Error)]
pub enum SdpError {
    #[error("missing '{0}' line")]
    MissingLine(&'static str),
    #[error("malformed line '{0}'")]
    MalformedLine(String),
}

/// Media-line direction attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    fn attr(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    fn parse(attr: &str) -> Option<Self> {
        match attr {
            "sendrecv" => Some(Direction::SendRecv),
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }
}

/// One `a=rtpmap` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    pub payload_type: u8,
    pub encoding: String,
    pub clock_rate: u32,
    pub channels: Option<u8>,
}

impl RtpMap {
    /// Build the canonical rtpmap for one of our codecs.
    fn from_codec(codec: &str, payload_type: u8) -> Self {
        let spec = codec::rtpmap(codec);
        let mut parts = spec.split('/');
        let encoding = parts.next().unwrap_or(codec).to_string();
        let clock_rate = parts.next().and_then(|c| c.parse().ok()).unwrap_or(90_000);
        let channels = parts.next().and_then(|c| c.parse().ok());
        Self {
            payload_type,
            encoding,
            clock_rate,
            channels,
        }
    }
}

/// One parsed `m=` section.
#[derive(Debug, Clone)]
pub struct MediaSection {
    pub kind: MediaKind,
    pub port: u16,
    pub proto: String,
    pub payload_types: Vec<u8>,
    pub rtpmaps: Vec<RtpMap>,
    pub fmtps: Vec<(u8, String)>,
    pub direction: Direction,
}

impl MediaSection {
    /// Whether the media line was not rejected (port 0).
    pub fn is_active(&self) -> bool {
        self.port != 0
    }

    /// The payload type under which the given canonical codec was offered.
    ///
    /// Falls back to the well-known static payload types for codecs that
    /// may appear without an rtpmap (PCMU/PCMA/G.722).
    pub fn codec_payload_type(&self, codec: &str) -> Option<u8> {
        if let Some(map) = self.rtpmaps.iter().find(|m| codec_matches(codec, m)) {
            return Some(map.payload_type);
        }
        let static_pt = match codec {
            c if c.eq_ignore_ascii_case("pcmu") => 0,
            c if c.eq_ignore_ascii_case("pcma") => 8,
            c if c.eq_ignore_ascii_case("g722") => 9,
            _ => return None,
        };
        self.payload_types.contains(&static_pt).then_some(static_pt)
    }
}

fn codec_matches(codec: &str, map: &RtpMap) -> bool {
    match codec {
        "isac16" => map.encoding.eq_ignore_ascii_case("isac") && map.clock_rate == 16_000,
        "isac32" => map.encoding.eq_ignore_ascii_case("isac") && map.clock_rate == 32_000,
        _ => map.encoding.eq_ignore_ascii_case(codec),
    }
}

/// A parsed (or generated) session description.
#[derive(Debug, Clone)]
pub struct Sdp {
    pub session_name: String,
    pub session_id: i64,
    pub session_version: i64,
    pub media: Vec<MediaSection>,
}

impl Sdp {
    /// Parse the subset of SDP the dispatcher needs.
    pub fn parse(input: &str) -> Result<Self, SdpError> {
        let mut saw_version = false;
        let mut session_name = String::new();
        let mut session_id = 0i64;
        let mut session_version = 0i64;
        let mut media: Vec<MediaSection> = Vec::new();
        // True while inside an m= section we don't handle (e.g. application).
        let mut skipping_section = false;

        for line in input.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| SdpError::MalformedLine(line.to_string()))?;
            match key {
                "v" => saw_version = true,
                "o" => {
                    let mut fields = value.split_whitespace();
                    let _username = fields.next();
                    session_id = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
                    session_version = fields.next().and_then(|f| f.parse().ok()).unwrap_or(0);
                }
                "s" => session_name = value.to_string(),
                "m" => {
                    let mut fields = value.split_whitespace();
                    let kind = match fields.next() {
                        Some("audio") => Some(MediaKind::Audio),
                        Some("video") => Some(MediaKind::Video),
                        _ => None,
                    };
                    let Some(kind) = kind else {
                        skipping_section = true;
                        continue;
                    };
                    skipping_section = false;
                    let port = fields
                        .next()
                        .and_then(|p| p.parse().ok())
                        .ok_or_else(|| SdpError::MalformedLine(line.to_string()))?;
                    let proto = fields.next().unwrap_or("UDP/TLS/RTP/SAVPF").to_string();
                    let payload_types = fields.filter_map(|p| p.parse().ok()).collect();
                    media.push(MediaSection {
                        kind,
                        port,
                        proto,
                        payload_types,
                        rtpmaps: Vec::new(),
                        fmtps: Vec::new(),
                        direction: Direction::SendRecv,
                    });
                }
                "a" => {
                    if skipping_section {
                        continue;
                    }
                    let Some(section) = media.last_mut() else {
                        continue; // session-level attribute
                    };
                    if let Some(rest) = value.strip_prefix("rtpmap:") {
                        if let Some(map) = parse_rtpmap(rest) {
                            section.rtpmaps.push(map);
                        }
                    } else if let Some(rest) = value.strip_prefix("fmtp:") {
                        if let Some((pt, params)) = rest.split_once(' ') {
                            if let Ok(pt) = pt.parse() {
                                section.fmtps.push((pt, params.to_string()));
                            }
                        }
                    } else if let Some(direction) = Direction::parse(value) {
                        section.direction = direction;
                    }
                }
                _ => {}
            }
        }

        if !saw_version {
            return Err(SdpError::MissingLine("v"));
        }
        Ok(Self {
            session_name,
            session_id,
            session_version,
            media,
        })
    }

    /// The first media section of the given kind.
    pub fn media(&self, kind: MediaKind) -> Option<&MediaSection> {
        self.media.iter().find(|m| m.kind == kind)
    }

    /// The best codec we support in the given media section, in
    /// preference-table order. `None` when the section is absent, rejected,
    /// or offers nothing we can handle.
    pub fn find_preferred_codec(&self, kind: MediaKind) -> Option<&'static str> {
        let section = self.media(kind)?;
        if !section.is_active() {
            return None;
        }
        let table = match kind {
            MediaKind::Audio => codec::AUDIO_PREFERRED,
            MediaKind::Video => codec::VIDEO_PREFERRED,
        };
        table
            .iter()
            .find(|c| section.codec_payload_type(c).is_some())
            .copied()
    }
}

fn parse_rtpmap(rest: &str) -> Option<RtpMap> {
    let (pt, spec) = rest.split_once(' ')?;
    let payload_type = pt.parse().ok()?;
    let mut parts = spec.split('/');
    let encoding = parts.next()?.to_string();
    let clock_rate = parts.next()?.parse().ok()?;
    let channels = parts.next().and_then(|c| c.parse().ok());
    Some(RtpMap {
        payload_type,
        encoding,
        clock_rate,
        channels,
    })
}

impl fmt::Display for Sdp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "v=0\r")?;
        writeln!(
            f,
            "o=- {} {} IN IP4 1.1.1.1\r",
            self.session_id, self.session_version
        )?;
        writeln!(f, "s={}\r", self.session_name)?;
        writeln!(f, "t=0 0\r")?;
        for section in &self.media {
            let kind = match section.kind {
                MediaKind::Audio => "audio",
                MediaKind::Video => "video",
            };
            let pts: Vec<String> = section.payload_types.iter().map(|p| p.to_string()).collect();
            writeln!(f, "m={} {} {} {}\r", kind, section.port, section.proto, pts.join(" "))?;
            writeln!(f, "c=IN IP4 1.1.1.1\r")?;
            for map in &section.rtpmaps {
                match map.channels {
                    Some(ch) => writeln!(
                        f,
                        "a=rtpmap:{} {}/{}/{}\r",
                        map.payload_type, map.encoding, map.clock_rate, ch
                    )?,
                    None => writeln!(
                        f,
                        "a=rtpmap:{} {}/{}\r",
                        map.payload_type, map.encoding, map.clock_rate
                    )?,
                }
            }
            for (pt, params) in &section.fmtps {
                writeln!(f, "a=fmtp:{pt} {params}\r")?;
            }
            writeln!(f, "a={}\r", section.direction.attr())?;
        }
        Ok(())
    }
}

/// A track to advertise in a generated description.
#[derive(Debug, Clone, Copy)]
pub struct TrackSpec {
    pub codec: &'static str,
    pub payload_type: u8,
}

/// Parameters for a plugin-authored offer.
#[derive(Debug, Clone)]
pub struct OfferSpec {
    pub name: String,
    pub session_id: i64,
    pub session_version: i64,
    pub direction: Direction,
    pub audio: Option<TrackSpec>,
    pub video: Option<TrackSpec>,
}

/// Generate an offer advertising the given tracks. Data channels are never
/// included.
pub fn generate_offer(spec: &OfferSpec) -> Sdp {
    let mut media = Vec::new();
    if let Some(track) = spec.audio {
        media.push(offer_section(MediaKind::Audio, track, spec.direction));
    }
    if let Some(track) = spec.video {
        media.push(offer_section(MediaKind::Video, track, spec.direction));
    }
    Sdp {
        session_name: spec.name.clone(),
        session_id: spec.session_id,
        session_version: spec.session_version,
        media,
    }
}

fn offer_section(kind: MediaKind, track: TrackSpec, direction: Direction) -> MediaSection {
    let map = RtpMap::from_codec(track.codec, track.payload_type);
    let fmtps = codec::default_fmtp(track.codec)
        .map(|params| vec![(track.payload_type, params.to_string())])
        .unwrap_or_default();
    MediaSection {
        kind,
        port: 9,
        proto: "UDP/TLS/RTP/SAVPF".to_string(),
        payload_types: vec![track.payload_type],
        rtpmaps: vec![map],
        fmtps,
        direction,
    }
}

/// Parameters for answering a peer's offer.
#[derive(Debug, Clone)]
pub struct AnswerSpec {
    pub name: String,
    pub session_id: i64,
    pub session_version: i64,
    pub direction: Direction,
    /// Accepted audio codec, or `None` to reject the audio line.
    pub audio: Option<&'static str>,
    /// Accepted video codec, or `None` to reject the video line.
    pub video: Option<&'static str>,
}

/// Generate the answer to a peer's offer, accepting at most one codec per
/// media line and rejecting everything else.
pub fn generate_answer(offer: &Sdp, spec: &AnswerSpec) -> Sdp {
    let mut media = Vec::new();
    for section in &offer.media {
        let accepted = match section.kind {
            MediaKind::Audio => spec.audio,
            MediaKind::Video => spec.video,
        };
        let answered = accepted
            .filter(|_| section.is_active())
            .and_then(|codec| section.codec_payload_type(codec).map(|pt| (codec, pt)));
        match answered {
            Some((codec, pt)) => {
                let map = section
                    .rtpmaps
                    .iter()
                    .find(|m| m.payload_type == pt)
                    .cloned()
                    .unwrap_or_else(|| RtpMap::from_codec(codec, pt));
                let fmtps = section
                    .fmtps
                    .iter()
                    .filter(|(fpt, _)| *fpt == pt)
                    .cloned()
                    .collect();
                media.push(MediaSection {
                    kind: section.kind,
                    port: 9,
                    proto: section.proto.clone(),
                    payload_types: vec![pt],
                    rtpmaps: vec![map],
                    fmtps,
                    direction: spec.direction,
                });
            }
            None => {
                // Rejected line: keep the m= description, zero the port.
                media.push(MediaSection {
                    kind: section.kind,
                    port: 0,
                    proto: section.proto.clone(),
                    payload_types: section.payload_types.clone(),
                    rtpmaps: Vec::new(),
                    fmtps: Vec::new(),
                    direction: Direction::Inactive,
                });
            }
        }
    }
    Sdp {
        session_name: spec.name.clone(),
        session_id: spec.session_id,
        session_version: spec.session_version,
        media,
    }
}
