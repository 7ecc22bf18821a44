//! Feedback governor
//!
//! Decides when a recording session owes its peer RTCP feedback: REMB
//! bandwidth estimates (aggressively while ramping up, then every five
//! seconds) and periodic PLI keyframe requests. The decision is pure so the
//! pacing can be tested without a transport; the caller performs the actual
//! sends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Number of initial video packets that each trigger a ramp-up REMB.
pub const REMB_RAMPUP_STEPS: u32 = 4;

/// Steady-state interval between REMB messages.
pub const REMB_INTERVAL: Duration = Duration::from_secs(5);

/// Default target video bitrate (bits/sec).
pub const DEFAULT_VIDEO_BITRATE: u32 = 1024 * 1024;

/// Default keyframe request interval in milliseconds.
pub const DEFAULT_KEYFRAME_INTERVAL_MS: u64 = 15_000;

/// What the caller should send after one inbound video packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackActions {
    /// REMB bitrate to send, if one is due.
    pub remb: Option<u32>,
    /// Whether a PLI is due.
    pub pli: bool,
}

/// Per-session feedback pacing state.
pub struct FeedbackState {
    remb_startup: AtomicU32,
    remb_last: Mutex<Instant>,
    pli_last: Mutex<Option<Instant>>,
}

impl FeedbackState {
    pub fn new() -> Self {
        Self {
            remb_startup: AtomicU32::new(REMB_RAMPUP_STEPS),
            remb_last: Mutex::new(Instant::now()),
            pli_last: Mutex::new(None),
        }
    }

    /// Evaluate the pacing rules for one inbound video packet.
    ///
    /// During ramp-up the REMB bitrate is `target / remaining_steps`, so the
    /// advertised estimate climbs toward the full target over the first
    /// [`REMB_RAMPUP_STEPS`] packets.
    pub fn on_video_packet(
        &self,
        now: Instant,
        target_bitrate: u32,
        keyframe_interval_ms: u64,
    ) -> FeedbackActions {
        let mut actions = FeedbackActions { remb: None, pli: false };

        let startup = self.remb_startup.load(Ordering::Acquire);
        let ramping_up = startup > 0;
        {
            let mut remb_last = self.remb_last.lock();
            if ramping_up || now.duration_since(*remb_last) >= REMB_INTERVAL {
                let bitrate = if ramping_up {
                    self.remb_startup.store(startup - 1, Ordering::Release);
                    target_bitrate / startup
                } else {
                    target_bitrate
                };
                actions.remb = Some(bitrate);
                *remb_last = now;
            }
        }

        let interval = Duration::from_secs(keyframe_interval_ms / 1000);
        {
            let mut pli_last = self.pli_last.lock();
            let due = match *pli_last {
                None => true,
                Some(last) => now.duration_since(last) >= interval,
            };
            if due {
                actions.pli = true;
                *pli_last = Some(now);
            }
        }

        actions
    }
}

impl Default for FeedbackState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remb_rampup_sequence() {
        let state = FeedbackState::new();
        let start = Instant::now();
        let target = 1_000_000;

        // First four packets ramp up: target/4, target/3, target/2, target.
        let bitrates: Vec<u32> = (0..4)
            .map(|i| {
                state
                    .on_video_packet(start + Duration::from_millis(i), target, 15_000)
                    .remb
                    .unwrap()
            })
            .collect();
        assert_eq!(bitrates, vec![250_000, 333_333, 500_000, 1_000_000]);
    }

    #[test]
    fn test_remb_steady_state_pacing() {
        let state = FeedbackState::new();
        let start = Instant::now();

        // Exhaust the ramp-up.
        for i in 0..4 {
            state.on_video_packet(start + Duration::from_millis(i), 800_000, 15_000);
        }

        // Within five seconds: nothing.
        let actions = state.on_video_packet(start + Duration::from_secs(2), 800_000, 15_000);
        assert_eq!(actions.remb, None);

        // Past five seconds: full target.
        let actions = state.on_video_packet(start + Duration::from_secs(6), 800_000, 15_000);
        assert_eq!(actions.remb, Some(800_000));

        // And quiet again right after.
        let actions = state.on_video_packet(start + Duration::from_secs(7), 800_000, 15_000);
        assert_eq!(actions.remb, None);
    }

    #[test]
    fn test_pli_interval() {
        let state = FeedbackState::new();
        let start = Instant::now();

        // First packet always requests a keyframe.
        assert!(state.on_video_packet(start, 0, 15_000).pli);

        // Not again before the interval elapses.
        assert!(!state.on_video_packet(start + Duration::from_secs(10), 0, 15_000).pli);

        // Due again after the interval.
        assert!(state.on_video_packet(start + Duration::from_secs(16), 0, 15_000).pli);
    }

    #[test]
    fn test_pli_respects_configured_interval() {
        let state = FeedbackState::new();
        let start = Instant::now();

        state.on_video_packet(start, 0, 2_000);
        assert!(!state.on_video_packet(start + Duration::from_secs(1), 0, 2_000).pli);
        assert!(state.on_video_packet(start + Duration::from_secs(3), 0, 2_000).pli);
    }
}
