//! Response and event builders
//!
//! Every response carries a top-level `recordplay` field tagging its family
//! (`ok`, `list`, `configure`, or `event`). Event responses wrap either a
//! `result` payload or an `error_code`/`error` pair.

use serde_json::{json, Map, Value};

use crate::error::PluginError;
use crate::registry::RecordingSummary;

/// `{"recordplay": "ok"}`, the bare acknowledgement.
pub fn ok() -> Value {
    json!({"recordplay": "ok"})
}

/// The `list` response.
pub fn list(recordings: &[RecordingSummary]) -> Value {
    let items: Vec<Value> = recordings.iter().map(summary_json).collect();
    json!({"recordplay": "list", "list": items})
}

fn summary_json(summary: &RecordingSummary) -> Value {
    let mut item = Map::new();
    item.insert("id".into(), json!(summary.id));
    item.insert("name".into(), json!(summary.name));
    item.insert("date".into(), json!(summary.date));
    item.insert("audio".into(), json!(summary.audio));
    if let Some(codec) = summary.audio_codec {
        item.insert("audio_codec".into(), json!(codec));
    }
    item.insert("video".into(), json!(summary.video));
    if let Some(codec) = summary.video_codec {
        item.insert("video_codec".into(), json!(codec));
    }
    Value::Object(item)
}

/// The `configure` response, echoing the settings for crosschecks.
pub fn configure(video_bitrate_max: u32, video_keyframe_interval: u64) -> Value {
    json!({
        "recordplay": "configure",
        "status": "ok",
        "settings": {
            "video-bitrate-max": video_bitrate_max,
            "video-keyframe-interval": video_keyframe_interval,
        },
    })
}

/// An event carrying a `result` payload.
pub fn event(result: Value) -> Value {
    json!({"recordplay": "event", "result": result})
}

/// The bare event pushed when no result applies (e.g. generated offers).
pub fn bare_event() -> Value {
    json!({"recordplay": "event"})
}

/// The terminal event pushed on hangup.
pub fn done_event() -> Value {
    json!({"recordplay": "event", "result": "done"})
}

/// An error event with the fixed wire code.
pub fn error(err: &PluginError) -> Value {
    json!({
        "recordplay": "event",
        "error_code": err.code(),
        "error": err.to_string(),
    })
}

/// An outbound JSEP envelope.
pub fn jsep(kind: &str, sdp: &str, restart: bool) -> Value {
    let mut envelope = Map::new();
    envelope.insert("type".into(), json!(kind));
    envelope.insert("sdp".into(), json!(sdp));
    if restart {
        envelope.insert("restart".into(), json!(true));
    }
    Value::Object(envelope)
}
