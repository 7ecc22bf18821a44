//! Request validation
//!
//! The dispatch table from raw JSON bodies to typed payloads. Field errors
//! distinguish missing elements (415) from wrong-typed or out-of-range ones
//! (414), matching the wire contract.

use serde_json::Value;

use crate::codec::{self, MediaKind};
use crate::error::PluginError;

/// Parameters shared by `record` and `record-process-answer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordParams {
    /// Human-readable recording name.
    pub name: String,
    /// Requested id; `None` or zero means "allocate one".
    pub id: Option<u64>,
    /// User-chosen base filename for the track files.
    pub filename: Option<String>,
    /// Whether the request claims to be an SDP update (ICE restart).
    pub update: bool,
}

/// A validated control request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List,
    Update,
    Configure {
        video_bitrate_max: Option<u32>,
        video_keyframe_interval: Option<u64>,
    },
    Record(RecordParams),
    RecordGenerateOffer {
        audio: bool,
        acodec: &'static str,
        video: bool,
        vcodec: &'static str,
    },
    RecordProcessAnswer(RecordParams),
    Play {
        id: u64,
        restart: bool,
    },
    Start,
    Stop,
}

impl Request {
    /// Validate a JSON body into a typed request.
    pub fn parse(body: &Value) -> Result<Self, PluginError> {
        if !body.is_object() {
            return Err(PluginError::InvalidJson("not an object".into()));
        }
        let request = required_str(body, "request")?;

        if request.eq_ignore_ascii_case("list") {
            Ok(Request::List)
        } else if request.eq_ignore_ascii_case("update") {
            Ok(Request::Update)
        } else if request.eq_ignore_ascii_case("configure") {
            Ok(Request::Configure {
                video_bitrate_max: optional_uint(body, "video-bitrate-max")?.map(|v| v as u32),
                video_keyframe_interval: optional_uint(body, "video-keyframe-interval")?,
            })
        } else if request.eq_ignore_ascii_case("record") {
            Ok(Request::Record(record_params(body)?))
        } else if request.eq_ignore_ascii_case("record-process-answer") {
            Ok(Request::RecordProcessAnswer(record_params(body)?))
        } else if request.eq_ignore_ascii_case("record-generate-offer") {
            let audio = optional_bool(body, "audio")?.unwrap_or(true);
            let video = optional_bool(body, "video")?.unwrap_or(true);
            let acodec = optional_codec(body, "acodec", MediaKind::Audio)?.unwrap_or("opus");
            let vcodec = optional_codec(body, "vcodec", MediaKind::Video)?.unwrap_or("h264");
            Ok(Request::RecordGenerateOffer { audio, acodec, video, vcodec })
        } else if request.eq_ignore_ascii_case("play") {
            let id = required_uint(body, "id")?;
            if id == 0 {
                return Err(PluginError::InvalidElement(
                    "id should be a positive integer".into(),
                ));
            }
            let restart = optional_bool(body, "restart")?.unwrap_or(false);
            Ok(Request::Play { id, restart })
        } else if request.eq_ignore_ascii_case("start") {
            Ok(Request::Start)
        } else if request.eq_ignore_ascii_case("stop") {
            Ok(Request::Stop)
        } else {
            Err(PluginError::InvalidRequest(request))
        }
    }
}

fn record_params(body: &Value) -> Result<RecordParams, PluginError> {
    Ok(RecordParams {
        name: required_str(body, "name")?,
        id: optional_uint(body, "id")?,
        filename: optional_str(body, "filename")?,
        update: optional_bool(body, "update")?.unwrap_or(false),
    })
}

/// A required non-empty string field.
pub fn required_str(body: &Value, key: &str) -> Result<String, PluginError> {
    match body.get(key) {
        None => Err(PluginError::MissingElement(key.to_string())),
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(PluginError::InvalidElement(format!(
            "{key} can't be an empty string"
        ))),
        Some(_) => Err(PluginError::InvalidElement(format!(
            "{key} should be a string"
        ))),
    }
}

fn optional_str(body: &Value, key: &str) -> Result<Option<String>, PluginError> {
    match body.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PluginError::InvalidElement(format!(
            "{key} should be a string"
        ))),
    }
}

fn optional_bool(body: &Value, key: &str) -> Result<Option<bool>, PluginError> {
    match body.get(key) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(PluginError::InvalidElement(format!(
            "{key} should be a boolean"
        ))),
    }
}

/// An optional non-negative integer field.
pub fn optional_uint(body: &Value, key: &str) -> Result<Option<u64>, PluginError> {
    match body.get(key) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            PluginError::InvalidElement(format!("{key} should be a positive integer"))
        }),
    }
}

fn required_uint(body: &Value, key: &str) -> Result<u64, PluginError> {
    optional_uint(body, key)?.ok_or_else(|| PluginError::MissingElement(key.to_string()))
}

fn optional_codec(
    body: &Value,
    key: &str,
    kind: MediaKind,
) -> Result<Option<&'static str>, PluginError> {
    match optional_str(body, key)? {
        None => Ok(None),
        Some(name) => codec::match_preferred(kind, &name)
            .map(Some)
            .ok_or_else(|| PluginError::InvalidElement(format!("unsupported codec '{name}'"))),
    }
}

/// The inbound JSEP envelope accompanying a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jsep {
    /// `"offer"` or `"answer"`.
    pub kind: Option<String>,
    /// The SDP blob.
    pub sdp: Option<String>,
    /// Whether this negotiation is an update (ICE restart).
    pub update: bool,
    /// Base-layer SSRC when the peer negotiated simulcasting.
    pub simulcast_ssrc: Option<u32>,
}

impl Jsep {
    /// Extract the fields we care about; anything malformed reads as absent.
    pub fn parse(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Jsep::default();
        };
        Jsep {
            kind: value.get("type").and_then(Value::as_str).map(str::to_string),
            sdp: value.get("sdp").and_then(Value::as_str).map(str::to_string),
            update: value.get("update").and_then(Value::as_bool).unwrap_or(false),
            simulcast_ssrc: value
                .get("simulcast")
                .and_then(|s| s.get("ssrc-0"))
                .and_then(Value::as_u64)
                .map(|ssrc| ssrc as u32),
        }
    }

    /// The SDP, provided the JSEP type matches.
    pub fn sdp_of_kind(&self, kind: &str) -> Option<&str> {
        match (&self.kind, &self.sdp) {
            (Some(k), Some(sdp)) if k.eq_ignore_ascii_case(kind) => Some(sdp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_request_field() {
        let err = Request::parse(&json!({})).unwrap_err();
        assert!(matches!(err, PluginError::MissingElement(_)));
        assert_eq!(err.code(), 415);
    }

    #[test]
    fn test_wrong_typed_request_field() {
        let err = Request::parse(&json!({"request": 42})).unwrap_err();
        assert!(matches!(err, PluginError::InvalidElement(_)));
        assert_eq!(err.code(), 414);
    }

    #[test]
    fn test_unknown_request() {
        let err = Request::parse(&json!({"request": "rewind"})).unwrap_err();
        assert!(matches!(err, PluginError::InvalidRequest(ref r) if r == "rewind"));
        assert_eq!(err.code(), 413);
    }

    #[test]
    fn test_non_object_body() {
        let err = Request::parse(&json!("record")).unwrap_err();
        assert_eq!(err.code(), 412);
    }

    #[test]
    fn test_record_requires_name() {
        let err = Request::parse(&json!({"request": "record"})).unwrap_err();
        assert!(matches!(err, PluginError::MissingElement(ref k) if k == "name"));

        let err = Request::parse(&json!({"request": "record", "name": ""})).unwrap_err();
        assert_eq!(err.code(), 414);
    }

    #[test]
    fn test_record_full_params() {
        let request = Request::parse(&json!({
            "request": "RECORD",
            "name": "demo",
            "id": 42,
            "filename": "meeting",
            "update": true,
        }))
        .unwrap();

        assert_eq!(
            request,
            Request::Record(RecordParams {
                name: "demo".into(),
                id: Some(42),
                filename: Some("meeting".into()),
                update: true,
            })
        );
    }

    #[test]
    fn test_record_rejects_negative_id() {
        let err = Request::parse(&json!({"request": "record", "name": "x", "id": -1})).unwrap_err();
        assert_eq!(err.code(), 414);
    }

    #[test]
    fn test_play_requires_positive_id() {
        let err = Request::parse(&json!({"request": "play"})).unwrap_err();
        assert!(matches!(err, PluginError::MissingElement(ref k) if k == "id"));

        let err = Request::parse(&json!({"request": "play", "id": 0})).unwrap_err();
        assert_eq!(err.code(), 414);

        let request = Request::parse(&json!({"request": "play", "id": 9})).unwrap();
        assert_eq!(request, Request::Play { id: 9, restart: false });
    }

    #[test]
    fn test_configure_params() {
        let request = Request::parse(&json!({
            "request": "configure",
            "video-bitrate-max": 512000,
            "video-keyframe-interval": 10000,
        }))
        .unwrap();

        assert_eq!(
            request,
            Request::Configure {
                video_bitrate_max: Some(512_000),
                video_keyframe_interval: Some(10_000),
            }
        );

        let err =
            Request::parse(&json!({"request": "configure", "video-bitrate-max": "fast"}))
                .unwrap_err();
        assert_eq!(err.code(), 414);
    }

    #[test]
    fn test_generate_offer_defaults() {
        let request = Request::parse(&json!({"request": "record-generate-offer"})).unwrap();
        assert_eq!(
            request,
            Request::RecordGenerateOffer {
                audio: true,
                acodec: "opus",
                video: true,
                vcodec: "h264",
            }
        );
    }

    #[test]
    fn test_generate_offer_rejects_unknown_codec() {
        let err = Request::parse(&json!({"request": "record-generate-offer", "acodec": "mp3"}))
            .unwrap_err();
        assert_eq!(err.code(), 414);
    }

    #[test]
    fn test_jsep_parse() {
        let jsep = Jsep::parse(Some(&json!({
            "type": "offer",
            "sdp": "v=0",
            "update": true,
            "simulcast": {"ssrc-0": 170u32, "ssrc-1": 171u32},
        })));

        assert_eq!(jsep.sdp_of_kind("offer"), Some("v=0"));
        assert_eq!(jsep.sdp_of_kind("answer"), None);
        assert!(jsep.update);
        assert_eq!(jsep.simulcast_ssrc, Some(170));
    }

    #[test]
    fn test_jsep_absent() {
        let jsep = Jsep::parse(None);
        assert_eq!(jsep, Jsep::default());
        assert!(jsep.sdp_of_kind("offer").is_none());
    }
}
