//! Playout scheduler
//!
//! One worker per playing session, launched when the media path comes up.
//! The worker owns the session's frame indices and re-times the recorded
//! packets from wall-clock plus RTP-clock arithmetic: the first packet of a
//! track anchors a reference instant, and every later packet is due once
//! the elapsed real time catches up with the RTP timestamp delta (minus a
//! 5 ms tolerance). Audio and video pace independently; when neither track
//! has a due packet the worker sleeps 5 ms.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::codec;
use crate::gateway::{HandleId, RtpPacket};
use crate::index::{FrameIndex, FrameRecord};
use crate::mjr::MjrReader;
use crate::plugin::PluginContext;
use crate::registry::Recording;
use crate::rtp;
use crate::session::{Session, SessionRole};

const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// A packet is sent once the elapsed time is within this many microseconds
/// of its ideal send time.
const SEND_TOLERANCE_US: i64 = 5_000;

/// Launch the playout worker for a playing session.
pub(crate) fn spawn(ctx: Arc<PluginContext>, session: Arc<Session>) {
    tokio::task::spawn_blocking(move || run(ctx, session));
}

struct PlayoutTrack {
    frames: Arc<FrameIndex>,
    reader: MjrReader,
    cursor: usize,
    before: Instant,
    clock_khz: u64,
    payload_type: u8,
    video: bool,
}

impl PlayoutTrack {
    fn open(
        ctx: &PluginContext,
        rec: &Recording,
        frames: Arc<FrameIndex>,
        video: bool,
    ) -> Option<Self> {
        let track = if video { rec.video.as_ref() } else { rec.audio.as_ref() };
        let track = track?;
        let reader = match MjrReader::open(ctx.config.path(), &track.file) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::error!(file = %track.file, error = %e, "Could not open track for playout");
                return None;
            }
        };
        let (clock_khz, payload_type) = if video {
            (codec::VIDEO_CLOCK_KHZ, rec.video_pt)
        } else {
            (codec::audio_clock_khz(rec.audio_pt), rec.audio_pt)
        };
        Some(Self {
            frames,
            reader,
            cursor: 0,
            before: Instant::now(),
            clock_khz,
            payload_type,
            video,
        })
    }

    fn done(&self) -> bool {
        self.cursor >= self.frames.len()
    }

    /// Send the cursor frame if it is due. Returns whether anything was
    /// sent this round.
    fn step(&mut self, ctx: &PluginContext, handle: HandleId, buf: &mut Vec<u8>) -> bool {
        let Some(&frame) = self.frames.get(self.cursor) else {
            return false;
        };

        if self.cursor == 0 {
            // First packet: send immediately and anchor the clock.
            self.send_group(ctx, handle, buf);
            self.before = Instant::now();
            return true;
        }

        let Some(&prev) = self.frames.get(self.cursor - 1) else {
            return false;
        };
        let ts_diff_us = ((frame.ts - prev.ts) * 1000 / self.clock_khz) as i64;
        let passed = self.before.elapsed().as_micros() as i64;
        if passed < ts_diff_us - SEND_TOLERANCE_US {
            return false;
        }

        // Advance the anchor by the nominal delta so pacing doesn't drift.
        self.before += Duration::from_micros(ts_diff_us as u64);
        self.send_group(ctx, handle, buf);
        true
    }

    /// Relay the cursor frame; for video, every trailing frame sharing its
    /// timestamp goes out in the same burst (a frame may span several RTP
    /// packets).
    fn send_group(&mut self, ctx: &PluginContext, handle: HandleId, buf: &mut Vec<u8>) {
        let Some(&head) = self.frames.get(self.cursor) else {
            return;
        };
        if self.video {
            while let Some(&frame) = self.frames.get(self.cursor) {
                if frame.ts != head.ts {
                    break;
                }
                self.relay(ctx, handle, frame, buf);
                self.cursor += 1;
            }
        } else {
            self.relay(ctx, handle, head, buf);
            self.cursor += 1;
        }
    }

    fn relay(&mut self, ctx: &PluginContext, handle: HandleId, frame: FrameRecord, buf: &mut Vec<u8>) {
        if let Err(e) = self.reader.read_payload(frame.offset, frame.len, buf) {
            tracing::warn!(error = %e, "Could not read recorded frame, skipping");
            return;
        }
        rtp::set_payload_type(buf, self.payload_type);
        ctx.gateway.relay_rtp(
            handle,
            RtpPacket {
                video: self.video,
                data: Bytes::copy_from_slice(buf),
            },
        );
    }
}

fn run(ctx: Arc<PluginContext>, session: Arc<Session>) {
    let Some(rec) = session.recording() else {
        tracing::error!(handle = %session.handle, "No recording, can't start playout worker");
        return;
    };
    if session.role() != SessionRole::Player {
        tracing::error!(handle = %session.handle, "Not a player session, can't start playout worker");
        return;
    }
    let source = session.playout_source();
    if source.is_empty() {
        tracing::error!(handle = %session.handle, "No indexed frames, can't start playout worker");
        return;
    }

    tracing::info!(handle = %session.handle, id = rec.id, "Joining playout worker");

    let mut audio = source
        .audio
        .and_then(|frames| PlayoutTrack::open(&ctx, &rec, frames, false));
    let mut video = source
        .video
        .and_then(|frames| PlayoutTrack::open(&ctx, &rec, frames, true));

    let mut buf = Vec::with_capacity(1500);
    let mut audio_sent = false;
    let mut video_sent = false;
    while !session.is_destroyed() && session.is_active() && !rec.is_destroyed() {
        let audio_done = audio.as_ref().map_or(true, PlayoutTrack::done);
        let video_done = video.as_ref().map_or(true, PlayoutTrack::done);
        if audio_done && video_done {
            break;
        }
        if !audio_sent && !video_sent {
            // Nothing was due last round.
            std::thread::sleep(IDLE_SLEEP);
        }
        audio_sent = audio
            .as_mut()
            .is_some_and(|t| t.step(&ctx, session.handle, &mut buf));
        video_sent = video
            .as_mut()
            .is_some_and(|t| t.step(&ctx, session.handle, &mut buf));
    }

    drop(audio);
    drop(video);
    session.clear_playout();
    rec.remove_viewer(&session);

    // Tear down the peer connection; hangup_media does the rest.
    ctx.gateway.close_pc(session.handle);

    tracing::info!(handle = %session.handle, id = rec.id, "Leaving playout worker");
}
