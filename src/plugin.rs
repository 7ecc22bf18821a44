//! Plugin entry points
//!
//! [`RecordPlayPlugin`] packages all process-wide state (registry, session
//! table, control queue, recordings path) into one context constructed at
//! startup, and exposes the surface the host drives: session attach/detach,
//! control messages, media lifecycle callbacks, and inbound RTP/RTCP.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PluginConfig;
use crate::control::dispatcher::{self, ControlMessage, DispatcherItem};
use crate::control::request::{self, Request};
use crate::control::response;
use crate::error::PluginError;
use crate::gateway::{Gateway, HandleId, RtpPacket};
use crate::playout;
use crate::registry::{Recording, RecordingRegistry};
use crate::rtp;
use crate::sdp::{self, Direction, OfferSpec, TrackSpec};
use crate::session::{Session, SessionRole, SessionTable};

/// Requests handled asynchronously through the dispatcher queue.
const ASYNC_REQUESTS: &[&str] = &[
    "record",
    "record-generate-offer",
    "record-process-answer",
    "play",
    "start",
    "stop",
];

/// Outcome of [`RecordPlayPlugin::handle_message`].
#[derive(Debug)]
pub enum MessageResult {
    /// The request was answered inline.
    Synchronous(Value),
    /// The request was queued; the reply arrives via
    /// [`Gateway::push_event`].
    Queued,
}

/// Process-wide state shared by the entry points and the workers.
pub(crate) struct PluginContext {
    pub(crate) config: PluginConfig,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) registry: RecordingRegistry,
    pub(crate) sessions: SessionTable,
    pub(crate) shutting_down: AtomicBool,
}

impl PluginContext {
    pub(crate) fn notify_enabled(&self) -> bool {
        self.config.notify_events && self.gateway.events_is_enabled()
    }
}

/// The record/replay engine.
pub struct RecordPlayPlugin {
    ctx: Arc<PluginContext>,
    queue: mpsc::Sender<DispatcherItem>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RecordPlayPlugin {
    /// Build the engine and spawn the control dispatcher.
    ///
    /// Creates the recordings directory if it does not exist. Must be
    /// called within a tokio runtime.
    pub fn start(config: PluginConfig, gateway: Arc<dyn Gateway>) -> Result<Self, PluginError> {
        std::fs::create_dir_all(config.path())?;

        let (queue, rx) = mpsc::channel(config.queue_capacity);
        let ctx = Arc::new(PluginContext {
            config,
            gateway,
            registry: RecordingRegistry::new(),
            sessions: SessionTable::new(),
            shutting_down: AtomicBool::new(false),
        });
        let worker = tokio::task::spawn_blocking({
            let ctx = Arc::clone(&ctx);
            move || dispatcher::run(ctx, rx)
        });

        tracing::info!(path = %ctx.config.path().display(), "Record&Play engine initialized");
        Ok(Self {
            ctx,
            queue,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Register a session for a newly attached peer handle.
    pub fn create_session(&self, handle: HandleId) -> Result<(), PluginError> {
        if self.ctx.shutting_down.load(Ordering::Acquire) {
            return Err(PluginError::Unknown("shutting down".into()));
        }
        self.ctx
            .sessions
            .create(handle)
            .ok_or_else(|| PluginError::Unknown(format!("session already exists for {handle}")))?;
        tracing::debug!(%handle, "Session created");
        Ok(())
    }

    /// Tear down and remove the session for a detached peer handle.
    pub fn destroy_session(&self, handle: HandleId) -> Result<(), PluginError> {
        let session = self.ctx.sessions.lookup(handle).ok_or_else(|| {
            PluginError::Unknown("no session associated with this handle".into())
        })?;
        tracing::debug!(%handle, "Removing session");
        hangup_session(&self.ctx, &session);
        session.mark_destroyed();
        self.ctx.sessions.remove(handle);
        Ok(())
    }

    /// Handle a control message from the peer.
    ///
    /// `list`, `update` and `configure` are answered inline; the rest queue
    /// to the dispatcher. Errors come back as synchronous error events
    /// carrying the fixed wire codes.
    pub fn handle_message(
        &self,
        handle: HandleId,
        transaction: Option<String>,
        body: Option<Value>,
        jsep: Option<Value>,
    ) -> MessageResult {
        match self.handle_message_inner(handle, transaction, body, jsep) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(%handle, code = e.code(), error = %e, "Message rejected");
                MessageResult::Synchronous(response::error(&e))
            }
        }
    }

    fn handle_message_inner(
        &self,
        handle: HandleId,
        transaction: Option<String>,
        body: Option<Value>,
        jsep: Option<Value>,
    ) -> Result<MessageResult, PluginError> {
        if self.ctx.shutting_down.load(Ordering::Acquire) {
            return Err(PluginError::Unknown("shutting down".into()));
        }
        let session = self.ctx.sessions.lookup(handle).ok_or_else(|| {
            PluginError::Unknown("no session associated with this handle".into())
        })?;
        if session.is_destroyed() {
            return Err(PluginError::Unknown("session has already been destroyed".into()));
        }

        let body = body.ok_or(PluginError::NoMessage)?;
        if !body.is_object() {
            return Err(PluginError::InvalidJson("not an object".into()));
        }
        let request = request::required_str(&body, "request")?;

        if request.eq_ignore_ascii_case("update") {
            // Rescan hook; acknowledged without touching the registry.
            Ok(MessageResult::Synchronous(response::ok()))
        } else if request.eq_ignore_ascii_case("list") {
            tracing::debug!("Request for the list of recordings");
            Ok(MessageResult::Synchronous(response::list(
                &self.ctx.registry.list(),
            )))
        } else if request.eq_ignore_ascii_case("configure") {
            if let Request::Configure {
                video_bitrate_max,
                video_keyframe_interval,
            } = Request::parse(&body)?
            {
                if let Some(bitrate) = video_bitrate_max {
                    session.set_video_bitrate(bitrate);
                    tracing::debug!(%handle, bitrate, "Video bitrate set");
                }
                if let Some(interval) = video_keyframe_interval {
                    session.set_keyframe_interval_ms(interval);
                    tracing::debug!(%handle, interval, "Video keyframe interval set");
                }
            }
            Ok(MessageResult::Synchronous(response::configure(
                session.video_bitrate(),
                session.keyframe_interval_ms(),
            )))
        } else if ASYNC_REQUESTS.iter().any(|r| request.eq_ignore_ascii_case(r)) {
            let msg = ControlMessage {
                handle,
                transaction,
                body,
                jsep,
            };
            self.queue
                .try_send(DispatcherItem::Message(msg))
                .map_err(|_| PluginError::Unknown("control queue unavailable".into()))?;
            Ok(MessageResult::Queued)
        } else {
            Err(PluginError::InvalidRequest(request))
        }
    }

    /// The media path for a handle is up; playout workers launch here.
    pub fn setup_media(&self, handle: HandleId) {
        tracing::info!(%handle, "WebRTC media is now available");
        let Some(session) = self.ctx.sessions.lookup(handle) else {
            tracing::error!(%handle, "No session associated with this handle");
            return;
        };
        if session.is_destroyed() {
            return;
        }
        session.reset_hangup();
        session.set_active(true);
        if session.role() == SessionRole::Player {
            playout::spawn(Arc::clone(&self.ctx), session);
        }
    }

    /// Inbound RTP from a peer.
    ///
    /// Must not block for long: it is called from the transport's threads.
    pub fn incoming_rtp(&self, handle: HandleId, packet: RtpPacket) {
        if self.ctx.shutting_down.load(Ordering::Acquire) {
            return;
        }
        let Some(session) = self.ctx.sessions.lookup(handle) else {
            tracing::error!(%handle, "No session associated with this handle");
            return;
        };
        if session.is_destroyed() || packet.data.len() < rtp::RTP_HEADER_MIN_LEN {
            return;
        }

        if packet.video {
            let base = session.simulcast_ssrc();
            if base != 0 && rtp::ssrc(&packet.data) != Some(base) {
                tracing::trace!(%handle, "Dropping packet (not the base simulcast substream)");
                return;
            }
        }

        if session.role() != SessionRole::Recorder {
            return;
        }

        {
            let mut writers = session.writers.lock();
            let writer = if packet.video {
                writers.video.as_mut()
            } else {
                writers.audio.as_mut()
            };
            if let Some(writer) = writer {
                if let Err(e) = writer.save_frame(&packet.data) {
                    tracing::warn!(%handle, error = %e, "Could not persist RTP frame");
                }
            }
        }

        if packet.video {
            let actions = session.feedback.on_video_packet(
                Instant::now(),
                session.video_bitrate(),
                session.keyframe_interval_ms(),
            );
            if let Some(bitrate) = actions.remb {
                self.ctx.gateway.send_remb(handle, bitrate);
            }
            if actions.pli {
                self.ctx.gateway.send_pli(handle);
            }
        }
    }

    /// Inbound RTCP is not used by this plugin.
    pub fn incoming_rtcp(&self, _handle: HandleId, _video: bool, _data: &[u8]) {}

    /// The transport reported congestion on this handle.
    pub fn slow_link(&self, handle: HandleId, uplink: bool, _video: bool) {
        let Some(session) = self.ctx.sessions.lookup(handle) else {
            return;
        };
        if session.is_destroyed() {
            return;
        }
        // What is uplink for the server is downlink for the peer.
        let peer_uplink = if uplink { 0 } else { 1 };
        let event = json!({
            "recordplay": "event",
            "result": {
                "status": "slow_link",
                "current-bitrate": session.video_bitrate(),
                "uplink": peer_uplink,
            },
        });
        self.ctx.gateway.push_event(handle, None, event, None);
    }

    /// The media path for a handle went away.
    pub fn hangup_media(&self, handle: HandleId) {
        tracing::info!(%handle, "No WebRTC media anymore");
        let Some(session) = self.ctx.sessions.lookup(handle) else {
            tracing::error!(%handle, "No session associated with this handle");
            return;
        };
        hangup_session(&self.ctx, &session);
    }

    /// Introspection hook: describe a live session.
    pub fn query_session(&self, handle: HandleId) -> Option<Value> {
        let session = self.ctx.sessions.lookup(handle)?;
        let mut info = json!({
            "type": session.role().as_str(),
            "hangingup": session.is_hanging_up(),
            "destroyed": session.is_destroyed(),
        });
        if let Some(rec) = session.recording() {
            info["recording_id"] = json!(rec.id);
            info["recording_name"] = json!(rec.name);
        }
        Some(info)
    }

    /// Stop the dispatcher, tear down any remaining sessions, and refuse
    /// further work.
    pub async fn shutdown(&self) {
        self.ctx.shutting_down.store(true, Ordering::Release);
        let _ = self.queue.send(DispatcherItem::Shutdown).await;
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "Dispatcher worker exited abnormally");
            }
        }
        // The dispatcher is drained; hang up whatever is still attached so
        // writers seal and peers get their terminal event.
        for session in self.ctx.sessions.snapshot() {
            tracing::debug!(handle = %session.handle, "Tearing down session at shutdown");
            hangup_session(&self.ctx, &session);
            session.mark_destroyed();
            self.ctx.sessions.remove(session.handle);
        }
        tracing::info!("Record&Play engine destroyed");
    }
}

/// Idempotent session teardown: emits the `done` event, seals the writers,
/// completes or detaches the recording, and drops the playout indices.
pub(crate) fn hangup_session(ctx: &Arc<PluginContext>, session: &Arc<Session>) {
    session.set_active(false);
    if session.is_destroyed() {
        return;
    }
    if !session.begin_hangup() {
        return;
    }
    session.clear_simulcast();

    ctx.gateway
        .push_event(session.handle, None, response::done_event(), None);

    let was_recorder = session.role() == SessionRole::Recorder;
    session.writers.lock().close_all();

    if let Some(rec) = session.take_recording() {
        if was_recorder {
            finish_recording(ctx, &rec);
        } else {
            rec.remove_viewer(session);
        }
    }
    session.clear_playout();
}

/// Seal a recording: mark it completed and publish the viewer offer. The
/// recording stays in the registry so `list` and `play` keep seeing it.
fn finish_recording(ctx: &Arc<PluginContext>, rec: &Arc<Recording>) {
    rec.mark_completed();
    let spec = OfferSpec {
        name: format!("Recording {}", rec.id),
        session_id: unix_micros(),
        session_version: 1,
        direction: Direction::SendOnly,
        audio: rec.audio.as_ref().map(|t| TrackSpec {
            codec: t.codec,
            payload_type: rec.audio_pt,
        }),
        video: rec.video.as_ref().map(|t| TrackSpec {
            codec: t.codec,
            payload_type: rec.video_pt,
        }),
    };
    rec.set_offer(sdp::generate_offer(&spec).to_string());
    if ctx.notify_enabled() {
        ctx.gateway.notify_event(json!({
            "event": "completed",
            "id": rec.id,
        }));
    }
    tracing::info!(id = rec.id, name = %rec.name, "Recording completed and available for replay");
}

pub(crate) fn unix_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}
