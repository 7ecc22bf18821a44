//! Recording entry
//!
//! A [`Recording`] is immutable once its recorder session hangs up; after
//! that only the viewer list and lifecycle flags change. Viewers are held
//! weakly so a session can be destroyed without the recording keeping it
//! alive (the Session -> Recording -> viewers -> Session cycle).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::codec::{self, VIDEO_PT};
use crate::session::Session;

/// One persisted track of a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Track filename within the recordings directory (no extension).
    pub file: String,
    /// Canonical negotiated codec.
    pub codec: &'static str,
}

/// A recorded (or in-progress) WebRTC session.
pub struct Recording {
    /// Unique id across the registry.
    pub id: u64,
    /// Human-readable name.
    pub name: String,
    /// Creation time, `YYYY-MM-DD HH:MM:SS` local.
    pub date: String,
    /// Audio track, if one was negotiated.
    pub audio: Option<Track>,
    /// Video track, if one was negotiated.
    pub video: Option<Track>,
    /// Payload type used when replaying audio.
    pub audio_pt: u8,
    /// Payload type used when replaying video.
    pub video_pt: u8,

    /// SDP offer sent to viewers, generated when the recording completes.
    offer: Mutex<Option<String>>,
    /// Sessions currently replaying this recording.
    viewers: Mutex<Vec<Weak<Session>>>,
    completed: AtomicBool,
    destroyed: AtomicBool,
}

impl Recording {
    /// Create a new (in-progress) recording.
    pub fn new(id: u64, name: String, date: String, audio: Option<Track>, video: Option<Track>) -> Self {
        let audio_pt = audio
            .as_ref()
            .map(|t| codec::audio_payload_type(t.codec))
            .unwrap_or(codec::AUDIO_PT);
        Self {
            id,
            name,
            date,
            audio,
            video,
            audio_pt,
            video_pt: VIDEO_PT,
            offer: Mutex::new(None),
            viewers: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    /// The precomputed viewer offer, if the recording has completed.
    pub fn offer(&self) -> Option<String> {
        self.offer.lock().clone()
    }

    /// Store the viewer offer.
    pub fn set_offer(&self, sdp: String) {
        *self.offer.lock() = Some(sdp);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    /// Register a viewer. A session appears at most once.
    pub fn add_viewer(&self, session: &Arc<Session>) {
        let mut viewers = self.viewers.lock();
        let handle = session.handle;
        if viewers
            .iter()
            .filter_map(Weak::upgrade)
            .any(|s| s.handle == handle)
        {
            return;
        }
        viewers.push(Arc::downgrade(session));
    }

    /// Remove a viewer (and prune any dropped ones).
    pub fn remove_viewer(&self, session: &Session) {
        let handle = session.handle;
        self.viewers
            .lock()
            .retain(|w| w.upgrade().is_some_and(|s| s.handle != handle));
    }

    /// Whether the given session is registered as a viewer.
    pub fn has_viewer(&self, session: &Session) -> bool {
        self.viewers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .any(|s| s.handle == session.handle)
    }

    /// Number of live viewers.
    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().iter().filter(|w| w.strong_count() > 0).count()
    }

    /// Snapshot for the `list` response.
    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            id: self.id,
            name: self.name.clone(),
            date: self.date.clone(),
            audio: self.audio.is_some(),
            audio_codec: self.audio.as_ref().map(|t| t.codec),
            video: self.video.is_some(),
            video_codec: self.video.as_ref().map(|t| t.codec),
        }
    }
}

impl std::fmt::Debug for Recording {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recording")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("audio", &self.audio)
            .field("video", &self.video)
            .field("completed", &self.is_completed())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// One element of the `list` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub id: u64,
    pub name: String,
    pub date: String,
    pub audio: bool,
    pub audio_codec: Option<&'static str>,
    pub video: bool,
    pub video_codec: Option<&'static str>,
}
