//! Peer sessions
//!
//! One [`Session`] exists per attached peer handle. Its role is decided by
//! the first matching control message: a `record` /
//! `record-process-answer` makes it a recorder (writers attached), a
//! `play` makes it a player (frame indices attached). Hangup is idempotent
//! via a compare-and-swap, so the teardown path runs exactly once however
//! many times it is triggered.

pub mod table;

pub use table::SessionTable;

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::feedback::{FeedbackState, DEFAULT_KEYFRAME_INTERVAL_MS, DEFAULT_VIDEO_BITRATE};
use crate::gateway::HandleId;
use crate::index::FrameIndex;
use crate::mjr::MjrWriter;
use crate::registry::Recording;

/// What a session is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    None,
    Recorder,
    Player,
}

impl SessionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::None => "none",
            SessionRole::Recorder => "recorder",
            SessionRole::Player => "player",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionRole::Recorder,
            2 => SessionRole::Player,
            _ => SessionRole::None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionRole::None => 0,
            SessionRole::Recorder => 1,
            SessionRole::Player => 2,
        }
    }
}

/// The per-track writers of a recorder session, guarded by the session's
/// record-mutex.
#[derive(Default)]
pub struct TrackWriters {
    pub audio: Option<MjrWriter>,
    pub video: Option<MjrWriter>,
}

impl TrackWriters {
    /// Close and drop both writers.
    pub fn close_all(&mut self) {
        for writer in [self.audio.take(), self.video.take()].into_iter().flatten() {
            let filename = writer.filename().to_string();
            drop(writer);
            tracing::info!(filename, "Closed recording track");
        }
    }
}

/// The indexed tracks a player session replays.
#[derive(Default, Clone)]
pub struct PlayoutSource {
    pub audio: Option<Arc<FrameIndex>>,
    pub video: Option<Arc<FrameIndex>>,
}

impl PlayoutSource {
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

/// Per-peer state.
pub struct Session {
    /// The transport handle this session belongs to.
    pub handle: HandleId,

    role: AtomicU8,
    active: AtomicBool,
    recording: Mutex<Option<Arc<Recording>>>,
    /// Record-mutex: serializes all writes to this session's track writers.
    pub writers: Mutex<TrackWriters>,
    playout: Mutex<PlayoutSource>,

    sdp_session_id: AtomicI64,
    sdp_version: AtomicI64,

    /// REMB/PLI pacing for recorder sessions.
    pub feedback: FeedbackState,
    video_bitrate: AtomicU32,
    keyframe_interval_ms: AtomicU64,

    simulcast_ssrc: AtomicU32,
    hanging_up: AtomicBool,
    destroyed: AtomicBool,
}

impl Session {
    pub fn new(handle: HandleId) -> Self {
        Self {
            handle,
            role: AtomicU8::new(SessionRole::None.as_u8()),
            active: AtomicBool::new(false),
            recording: Mutex::new(None),
            writers: Mutex::new(TrackWriters::default()),
            playout: Mutex::new(PlayoutSource::default()),
            sdp_session_id: AtomicI64::new(0),
            sdp_version: AtomicI64::new(0),
            feedback: FeedbackState::new(),
            video_bitrate: AtomicU32::new(DEFAULT_VIDEO_BITRATE),
            keyframe_interval_ms: AtomicU64::new(DEFAULT_KEYFRAME_INTERVAL_MS),
            simulcast_ssrc: AtomicU32::new(0),
            hanging_up: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> SessionRole {
        SessionRole::from_u8(self.role.load(Ordering::Acquire))
    }

    pub fn set_role(&self, role: SessionRole) {
        self.role.store(role.as_u8(), Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// The associated recording, if any.
    pub fn recording(&self) -> Option<Arc<Recording>> {
        self.recording.lock().clone()
    }

    pub fn set_recording(&self, rec: Arc<Recording>) {
        *self.recording.lock() = Some(rec);
    }

    /// Release the session's recording reference.
    pub fn take_recording(&self) -> Option<Arc<Recording>> {
        self.recording.lock().take()
    }

    /// Attach the frame indices for playout.
    pub fn set_playout(&self, audio: Option<Arc<FrameIndex>>, video: Option<Arc<FrameIndex>>) {
        *self.playout.lock() = PlayoutSource { audio, video };
    }

    /// Clone of the playout source (the indices themselves are shared).
    pub fn playout_source(&self) -> PlayoutSource {
        self.playout.lock().clone()
    }

    pub fn has_playout(&self) -> bool {
        !self.playout.lock().is_empty()
    }

    /// Drop the frame indices.
    pub fn clear_playout(&self) {
        *self.playout.lock() = PlayoutSource::default();
    }

    /// Stamp fresh SDP origin fields (new negotiation).
    pub fn set_sdp_ids(&self, session_id: i64, version: i64) {
        self.sdp_session_id.store(session_id, Ordering::Release);
        self.sdp_version.store(version, Ordering::Release);
    }

    pub fn sdp_session_id(&self) -> i64 {
        self.sdp_session_id.load(Ordering::Acquire)
    }

    pub fn sdp_version(&self) -> i64 {
        self.sdp_version.load(Ordering::Acquire)
    }

    /// Increment and return the SDP version (renegotiation).
    pub fn bump_sdp_version(&self) -> i64 {
        self.sdp_version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn video_bitrate(&self) -> u32 {
        self.video_bitrate.load(Ordering::Acquire)
    }

    pub fn set_video_bitrate(&self, bitrate: u32) {
        self.video_bitrate.store(bitrate, Ordering::Release);
    }

    pub fn keyframe_interval_ms(&self) -> u64 {
        self.keyframe_interval_ms.load(Ordering::Acquire)
    }

    pub fn set_keyframe_interval_ms(&self, interval: u64) {
        self.keyframe_interval_ms.store(interval, Ordering::Release);
    }

    /// The base simulcast SSRC, or 0 when the peer is not simulcasting.
    pub fn simulcast_ssrc(&self) -> u32 {
        self.simulcast_ssrc.load(Ordering::Acquire)
    }

    pub fn set_simulcast_ssrc(&self, ssrc: u32) {
        self.simulcast_ssrc.store(ssrc, Ordering::Release);
    }

    pub fn clear_simulcast(&self) {
        self.simulcast_ssrc.store(0, Ordering::Release);
    }

    /// Claim the hangup path. Returns `true` exactly once per hangup cycle.
    pub fn begin_hangup(&self) -> bool {
        self.hanging_up
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether a hangup is in progress.
    pub fn is_hanging_up(&self) -> bool {
        self.hanging_up.load(Ordering::Acquire)
    }

    /// Re-arm the hangup flag (new media about to flow).
    pub fn reset_hangup(&self) {
        self.hanging_up.store(false, Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("role", &self.role())
            .field("active", &self.is_active())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let session = Session::new(HandleId(1));

        assert_eq!(session.role(), SessionRole::None);
        assert!(!session.is_active());
        assert!(session.recording().is_none());
        assert!(!session.has_playout());
        assert_eq!(session.video_bitrate(), DEFAULT_VIDEO_BITRATE);
        assert_eq!(session.keyframe_interval_ms(), DEFAULT_KEYFRAME_INTERVAL_MS);
        assert_eq!(session.simulcast_ssrc(), 0);
    }

    #[test]
    fn test_role_round_trip() {
        let session = Session::new(HandleId(1));
        session.set_role(SessionRole::Recorder);
        assert_eq!(session.role(), SessionRole::Recorder);
        session.set_role(SessionRole::Player);
        assert_eq!(session.role(), SessionRole::Player);
        assert_eq!(session.role().as_str(), "player");
    }

    #[test]
    fn test_hangup_claimed_once() {
        let session = Session::new(HandleId(1));

        assert!(session.begin_hangup());
        assert!(!session.begin_hangup());
        assert!(session.is_hanging_up());

        session.reset_hangup();
        assert!(session.begin_hangup());
    }

    #[test]
    fn test_sdp_version_bump() {
        let session = Session::new(HandleId(1));
        session.set_sdp_ids(12345, 1);

        assert_eq!(session.sdp_session_id(), 12345);
        assert_eq!(session.bump_sdp_version(), 2);
        assert_eq!(session.bump_sdp_version(), 3);
        assert_eq!(session.sdp_version(), 3);
    }

    #[test]
    fn test_playout_source() {
        let session = Session::new(HandleId(1));
        session.set_playout(Some(Arc::new(FrameIndex::default())), None);

        assert!(session.has_playout());
        let source = session.playout_source();
        assert!(source.audio.is_some());
        assert!(source.video.is_none());

        session.clear_playout();
        assert!(!session.has_playout());
    }
}
