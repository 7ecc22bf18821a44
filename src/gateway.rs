//! Gateway trait
//!
//! The WebRTC transport, signalling host, and JSON event channel live
//! outside this crate. The engine reaches them through this trait; the host
//! implements it on top of whatever peer-connection stack it runs.

use bytes::Bytes;
use serde_json::Value;

/// Opaque identifier for a peer handle, assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

/// An RTP packet crossing the plugin boundary.
///
/// Cheap to clone: the payload is reference-counted `Bytes`.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    /// Whether this packet belongs to the video track.
    pub video: bool,
    /// The full RTP packet, header included.
    pub data: Bytes,
}

impl RtpPacket {
    /// Create an audio packet.
    pub fn audio(data: Bytes) -> Self {
        Self { video: false, data }
    }

    /// Create a video packet.
    pub fn video(data: Bytes) -> Self {
        Self { video: true, data }
    }
}

/// Callbacks into the host.
///
/// All methods must be non-blocking; they are invoked from the dispatcher
/// task, from transport threads, and from playout workers.
pub trait Gateway: Send + Sync {
    /// Relay an RTP packet to the peer.
    fn relay_rtp(&self, handle: HandleId, packet: RtpPacket);

    /// Send a REMB feedback message with the given bitrate (bits/sec).
    fn send_remb(&self, handle: HandleId, bitrate: u32);

    /// Send a PLI keyframe request.
    fn send_pli(&self, handle: HandleId);

    /// Push an asynchronous event (and optional JSEP) to the peer.
    fn push_event(
        &self,
        handle: HandleId,
        transaction: Option<&str>,
        event: Value,
        jsep: Option<Value>,
    );

    /// Forward an observability event to the host's event handlers.
    fn notify_event(&self, info: Value);

    /// Whether the host has event handlers enabled.
    fn events_is_enabled(&self) -> bool;

    /// Ask the host to tear down the peer connection.
    fn close_pc(&self, handle: HandleId);
}
