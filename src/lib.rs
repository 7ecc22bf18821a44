//! WebRTC media recording and replay engine.
//!
//! `recplay` ingests real-time RTP audio/video from a peer, persists it to
//! disk in the self-describing MJR container, indexes persisted files into
//! ordered frame lists that tolerate RTP timestamp resets and
//! sequence-number wraps, and replays indexed recordings back to a peer
//! with the original inter-frame spacing.
//!
//! # Architecture
//!
//! ```text
//!                        RecordPlayPlugin
//!            ┌───────────────────────────────────────┐
//!            │ RecordingRegistry   SessionTable      │
//!            │ control queue ──► dispatcher worker   │
//!            └───────┬──────────────────┬────────────┘
//!     incoming_rtp   │                  │  play/start
//!          │         ▼                  ▼
//!          │    MjrWriter (per track)   FrameIndex ──► playout worker
//!          │         │                       ▲              │
//!          └─────────┤                       │              ▼
//!                    ▼                       │       Gateway::relay_rtp
//!              <name>-audio.mjr ── MjrReader ┘
//!              <name>-video.mjr
//! ```
//!
//! The WebRTC transport, SDP signalling host, and JSON event channel are
//! external collaborators reached through the [`Gateway`] trait. The host
//! constructs a [`RecordPlayPlugin`] at startup and routes peer callbacks
//! into it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use recplay::{PluginConfig, RecordPlayPlugin};
//!
//! # fn demo(gateway: Arc<dyn recplay::Gateway>) -> recplay::Result<()> {
//! let config = PluginConfig::new("/var/recordings").notify_events(true);
//! let plugin = RecordPlayPlugin::start(config, gateway)?;
//!
//! plugin.create_session(recplay::HandleId(1))?;
//! // ... route handle_message / incoming_rtp / hangup_media into it
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod feedback;
pub mod gateway;
pub mod index;
pub mod mjr;
mod playout;
pub mod plugin;
pub mod registry;
pub mod rtp;
pub mod sdp;
pub mod session;

pub use codec::MediaKind;
pub use config::PluginConfig;
pub use error::{PluginError, Result};
pub use gateway::{Gateway, HandleId, RtpPacket};
pub use index::{FrameIndex, FrameRecord};
pub use mjr::{MjrError, MjrReader, MjrWriter};
pub use plugin::{MessageResult, RecordPlayPlugin};
pub use registry::{Recording, RecordingRegistry, RecordingSummary};
pub use session::{Session, SessionRole, SessionTable};
