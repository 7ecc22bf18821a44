//! Control dispatcher
//!
//! A single worker drains the bounded control queue and runs the
//! asynchronous requests (`record`, `record-generate-offer`,
//! `record-process-answer`, `play`, `start`, `stop`), replying through the
//! gateway's event channel. Requests for the same session are therefore
//! serialized. A sentinel item shuts the worker down.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::codec::{self, MediaKind};
use crate::error::PluginError;
use crate::gateway::HandleId;
use crate::index::FrameIndex;
use crate::mjr::{MjrError, MjrReader, MjrWriter};
use crate::plugin::{self, unix_micros, PluginContext};
use crate::registry::{Recording, Track};
use crate::sdp::{self, AnswerSpec, Direction, OfferSpec, Sdp, TrackSpec};
use crate::session::{Session, SessionRole, TrackWriters};

use super::request::{Jsep, RecordParams, Request};
use super::response;

/// One queued control message.
pub struct ControlMessage {
    pub handle: HandleId,
    pub transaction: Option<String>,
    pub body: Value,
    pub jsep: Option<Value>,
}

/// Queue items consumed by the worker.
pub(crate) enum DispatcherItem {
    Message(ControlMessage),
    Shutdown,
}

/// Worker loop. Runs on a dedicated blocking thread until the shutdown
/// sentinel arrives or the queue closes.
pub(crate) fn run(ctx: Arc<PluginContext>, mut rx: mpsc::Receiver<DispatcherItem>) {
    tracing::debug!("Joining control dispatcher worker");
    while let Some(item) = rx.blocking_recv() {
        match item {
            DispatcherItem::Shutdown => break,
            DispatcherItem::Message(msg) => process(&ctx, msg),
        }
    }
    tracing::debug!("Leaving control dispatcher worker");
}

struct Reply {
    result: Option<Value>,
    jsep: Option<Value>,
}

fn process(ctx: &Arc<PluginContext>, msg: ControlMessage) {
    let Some(session) = ctx.sessions.lookup(msg.handle) else {
        tracing::error!(handle = %msg.handle, "No session associated with this handle");
        return;
    };
    if session.is_destroyed() {
        return;
    }

    let jsep = Jsep::parse(msg.jsep.as_ref());
    match dispatch(ctx, &session, &msg.body, &jsep) {
        Ok(reply) => {
            let event = match reply.result {
                Some(result) => response::event(result),
                None => response::bare_event(),
            };
            if reply.jsep.is_some() {
                // New media is about to be negotiated.
                session.reset_hangup();
            }
            ctx.gateway
                .push_event(msg.handle, msg.transaction.as_deref(), event, reply.jsep);
        }
        Err(e) => {
            tracing::error!(handle = %msg.handle, code = e.code(), error = %e, "Request failed");
            ctx.gateway
                .push_event(msg.handle, msg.transaction.as_deref(), response::error(&e), None);
        }
    }
}

fn dispatch(
    ctx: &Arc<PluginContext>,
    session: &Arc<Session>,
    body: &Value,
    jsep: &Jsep,
) -> Result<Reply, PluginError> {
    let request = Request::parse(body)?;
    match request {
        Request::Record(params) => handle_record(ctx, session, params, jsep, false),
        Request::RecordProcessAnswer(params) => handle_record(ctx, session, params, jsep, true),
        Request::RecordGenerateOffer { audio, acodec, video, vcodec } => {
            handle_generate_offer(audio, acodec, video, vcodec)
        }
        Request::Play { id, restart } => handle_play(ctx, session, id, restart, jsep),
        Request::Start => handle_start(ctx, session, jsep),
        Request::Stop => handle_stop(ctx, session),
        // list/update/configure are answered synchronously and never queued.
        Request::List | Request::Update | Request::Configure { .. } => Err(
            PluginError::InvalidState("request must be sent synchronously".into()),
        ),
    }
}

/// `record` (peer offer) and `record-process-answer` (peer answer to our
/// generated offer) share everything but the expected SDP type and whether
/// the reply carries a JSEP.
fn handle_record(
    ctx: &Arc<PluginContext>,
    session: &Arc<Session>,
    params: RecordParams,
    jsep: &Jsep,
    from_answer: bool,
) -> Result<Reply, PluginError> {
    let expected = if from_answer { "answer" } else { "offer" };
    let sdp_text = jsep
        .sdp_of_kind(expected)
        .ok_or_else(|| PluginError::MissingElement(format!("SDP {expected}")))?;
    let peer_sdp = Sdp::parse(sdp_text)?;

    if params.update && !jsep.update {
        tracing::warn!("Got an 'update' request, but no SDP update, ignoring");
    }

    let (rec, restart) = if jsep.update {
        // Renegotiation (ICE restart): reuse the recording and its writers.
        tracing::debug!(handle = %session.handle, "Updating existing recorder");
        (renegotiating_recorder(session)?, params.update)
    } else {
        (create_recording(ctx, session, &params, &peer_sdp)?, false)
    };

    let (has_audio, has_video) = {
        let writers = session.writers.lock();
        (writers.audio.is_some(), writers.video.is_some())
    };

    // `record` always answers; `record-process-answer` only echoes an
    // answer when renegotiating.
    let jsep_out = if !from_answer || restart {
        let answer = recorder_answer(&peer_sdp, &rec, has_audio, has_video, session);
        Some(response::jsep("answer", &answer, restart))
    } else {
        None
    };

    apply_simulcast(session, jsep);

    if !restart && ctx.notify_enabled() {
        ctx.gateway.notify_event(json!({
            "event": "recording",
            "id": rec.id,
            "audio": has_audio,
            "video": has_video,
        }));
    }

    Ok(Reply {
        result: Some(json!({"status": "recording", "id": rec.id})),
        jsep: jsep_out,
    })
}

fn renegotiating_recorder(session: &Arc<Session>) -> Result<Arc<Recording>, PluginError> {
    if session.role() != SessionRole::Recorder {
        return Err(PluginError::InvalidState(
            "not a recording session, can't update".into(),
        ));
    }
    let rec = session.recording().ok_or_else(|| {
        PluginError::InvalidState("not a recording session, can't update".into())
    })?;
    session.bump_sdp_version();
    Ok(rec)
}

fn create_recording(
    ctx: &Arc<PluginContext>,
    session: &Arc<Session>,
    params: &RecordParams,
    peer_sdp: &Sdp,
) -> Result<Arc<Recording>, PluginError> {
    // A recvonly media line means the peer won't send that track.
    let acodec = negotiated_codec(peer_sdp, MediaKind::Audio);
    let vcodec = negotiated_codec(peer_sdp, MediaKind::Video);
    if let Some(codec) = acodec {
        tracing::info!(codec, "Audio codec");
    }
    if let Some(codec) = vcodec {
        tracing::info!(codec, "Video codec");
    }

    let date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let name = params.name.clone();
    let filename = params.filename.clone();
    let rec = ctx.registry.insert(params.id, move |id| {
        let base = filename.unwrap_or_else(|| format!("rec-{id}"));
        let audio = acodec.map(|codec| Track { file: format!("{base}-audio"), codec });
        let video = vcodec.map(|codec| Track { file: format!("{base}-video"), codec });
        Recording::new(id, name, date, audio, video)
    })?;
    tracing::info!(id = rec.id, name = %rec.name, "Starting new recording");

    // Writers open outside the registry lock; roll the entry back if the
    // files can't be created.
    match open_writers(ctx, &rec) {
        Ok(writers) => *session.writers.lock() = writers,
        Err(e) => {
            ctx.registry.remove(rec.id);
            return Err(PluginError::Unknown(format!(
                "could not open recording files: {e}"
            )));
        }
    }

    session.set_role(SessionRole::Recorder);
    session.set_recording(Arc::clone(&rec));
    session.set_sdp_ids(unix_micros(), 1);
    Ok(rec)
}

fn negotiated_codec(peer_sdp: &Sdp, kind: MediaKind) -> Option<&'static str> {
    let section = peer_sdp.media(kind)?;
    if section.direction == Direction::RecvOnly {
        return None;
    }
    peer_sdp.find_preferred_codec(kind)
}

fn open_writers(ctx: &PluginContext, rec: &Recording) -> Result<TrackWriters, MjrError> {
    let mut writers = TrackWriters::default();
    if let Some(track) = &rec.audio {
        writers.audio = Some(MjrWriter::create(
            ctx.config.path(),
            MediaKind::Audio,
            track.codec,
            &track.file,
        )?);
    }
    if let Some(track) = &rec.video {
        writers.video = Some(MjrWriter::create(
            ctx.config.path(),
            MediaKind::Video,
            track.codec,
            &track.file,
        )?);
    }
    Ok(writers)
}

fn recorder_answer(
    peer_sdp: &Sdp,
    rec: &Recording,
    has_audio: bool,
    has_video: bool,
    session: &Session,
) -> String {
    let spec = AnswerSpec {
        name: format!("Recording {}", rec.id),
        session_id: session.sdp_session_id(),
        session_version: session.sdp_version(),
        direction: Direction::RecvOnly,
        audio: has_audio.then_some(rec.audio.as_ref().map(|t| t.codec)).flatten(),
        video: has_video.then_some(rec.video.as_ref().map(|t| t.codec)).flatten(),
    };
    sdp::generate_answer(peer_sdp, &spec).to_string()
}

fn apply_simulcast(session: &Session, jsep: &Jsep) {
    if let Some(ssrc) = jsep.simulcast_ssrc {
        tracing::warn!(
            ssrc,
            "Peer negotiated simulcasting, falling back to the base substream"
        );
        session.set_simulcast_ssrc(ssrc);
    }
}

fn handle_generate_offer(
    audio: bool,
    acodec: &'static str,
    video: bool,
    vcodec: &'static str,
) -> Result<Reply, PluginError> {
    let id = rand::random::<u32>();
    let spec = OfferSpec {
        name: format!("Recording {id}"),
        session_id: unix_micros(),
        session_version: 1,
        direction: Direction::RecvOnly,
        audio: audio.then_some(TrackSpec {
            codec: acodec,
            payload_type: codec::audio_payload_type(acodec),
        }),
        video: video.then_some(TrackSpec {
            codec: vcodec,
            payload_type: codec::VIDEO_PT,
        }),
    };
    let offer = sdp::generate_offer(&spec).to_string();
    tracing::debug!(%offer, "Generated recording offer");
    Ok(Reply {
        result: None,
        jsep: Some(response::jsep("offer", &offer, false)),
    })
}

fn handle_play(
    ctx: &Arc<PluginContext>,
    session: &Arc<Session>,
    id: u64,
    restart: bool,
    jsep: &Jsep,
) -> Result<Reply, PluginError> {
    if jsep.sdp.is_some() {
        return Err(PluginError::InvalidElement(
            "a play request can't contain an SDP".into(),
        ));
    }

    if jsep.update || restart {
        // ICE restart on an existing playout: re-issue the stored offer
        // with this session's origin fields; the indices stay untouched.
        if session.role() != SessionRole::Player {
            return Err(PluginError::InvalidState(
                "not a playout session, can't restart".into(),
            ));
        }
        let rec = session.recording().ok_or_else(|| {
            PluginError::InvalidState("not a playout session, can't restart".into())
        })?;
        let offer_text = rec.offer().ok_or_else(|| {
            PluginError::InvalidState("not a playout session, can't restart".into())
        })?;
        let version = session.bump_sdp_version();
        let mut offer = Sdp::parse(&offer_text)
            .map_err(|_| PluginError::InvalidState("invalid offer, can't restart".into()))?;
        offer.session_id = session.sdp_session_id();
        offer.session_version = version;
        return Ok(Reply {
            result: Some(json!({"status": "restarting", "id": rec.id})),
            jsep: Some(response::jsep("offer", &offer.to_string(), true)),
        });
    }

    let rec = ctx
        .registry
        .lookup(id)
        .filter(|r| !r.is_destroyed())
        .ok_or(PluginError::NotFound)?;
    let offer = rec.offer().ok_or(PluginError::NotFound)?;

    let mut warning = None;
    let audio_index = rec.audio.as_ref().and_then(|track| {
        match build_index(ctx, &track.file) {
            Some(index) => Some(Arc::new(index)),
            None => {
                tracing::warn!(file = %track.file, "Error opening audio recording, trying to go on anyway");
                warning = Some("Broken audio file, playing video only");
                None
            }
        }
    });
    let video_index = rec.video.as_ref().and_then(|track| {
        match build_index(ctx, &track.file) {
            Some(index) => Some(Arc::new(index)),
            None => {
                tracing::warn!(file = %track.file, "Error opening video recording, trying to go on anyway");
                warning = Some("Broken video file, playing audio only");
                None
            }
        }
    });
    if audio_index.is_none() && video_index.is_none() {
        return Err(PluginError::InvalidRecording(
            "error opening recording files".into(),
        ));
    }

    let has_audio = audio_index.is_some();
    let has_video = video_index.is_some();
    session.set_playout(audio_index, video_index);
    session.set_recording(Arc::clone(&rec));
    session.set_role(SessionRole::Player);
    rec.add_viewer(session);

    let mut result = json!({"status": "preparing", "id": id});
    if let Some(warning) = warning {
        result["warning"] = json!(warning);
    }
    if ctx.notify_enabled() {
        ctx.gateway.notify_event(json!({
            "event": "playout",
            "id": id,
            "audio": has_audio,
            "video": has_video,
        }));
    }

    Ok(Reply {
        result: Some(result),
        jsep: Some(response::jsep("offer", &offer, false)),
    })
}

fn build_index(ctx: &PluginContext, filename: &str) -> Option<FrameIndex> {
    let mut reader = match MjrReader::open(ctx.config.path(), filename) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(filename, error = %e, "Could not open track");
            return None;
        }
    };
    match FrameIndex::build(&mut reader) {
        Ok(index) if !index.is_empty() => Some(index),
        Ok(_) => {
            tracing::warn!(filename, "Track holds no RTP frames");
            None
        }
        Err(e) => {
            tracing::warn!(filename, error = %e, "Could not index track");
            None
        }
    }
}

fn handle_start(
    ctx: &Arc<PluginContext>,
    session: &Arc<Session>,
    jsep: &Jsep,
) -> Result<Reply, PluginError> {
    if !session.has_playout() {
        return Err(PluginError::InvalidState(
            "not a playout session, can't start".into(),
        ));
    }
    // The peer's answer commits the negotiation; playout itself starts when
    // the media path comes up.
    if jsep.sdp.is_none() {
        return Err(PluginError::MissingElement("SDP answer".into()));
    }

    if ctx.notify_enabled() {
        if let Some(rec) = session.recording() {
            ctx.gateway
                .notify_event(json!({"event": "playing", "id": rec.id}));
        }
    }

    Ok(Reply {
        result: Some(json!({"status": "playing"})),
        jsep: None,
    })
}

fn handle_stop(ctx: &Arc<PluginContext>, session: &Arc<Session>) -> Result<Reply, PluginError> {
    let mut result = json!({"status": "stopped"});
    if let Some(rec) = session.recording() {
        result["id"] = json!(rec.id);
        if ctx.notify_enabled() {
            ctx.gateway
                .notify_event(json!({"event": "stopped", "id": rec.id}));
        }
    }

    plugin::hangup_session(ctx, session);

    Ok(Reply {
        result: Some(result),
        jsep: None,
    })
}
