//! Frame indexer
//!
//! Rebuilds the temporal order of a recorded track. RTP timestamps are
//! 32-bit and may reset mid-recording (e.g. after an ICE restart), and
//! sequence numbers wrap at 2^16; a straight file-order replay would jump
//! backwards. The indexer runs two passes over the file: the first detects
//! a timestamp reset, the second lifts every timestamp to 64 bits and
//! insert-sorts the frames so that iteration reproduces the original send
//! order.

use crate::mjr::{MjrError, MjrReader, PacketRecord};

/// Backward timestamp jump (in RTP clock units) treated as a reset rather
/// than an out-of-order packet.
const RESET_THRESHOLD: u32 = 2_000_000_000;

/// Sequence-number distance below which ordering is taken at face value and
/// above which a wrap is assumed.
const SEQ_WRAP_THRESHOLD: i32 = 10_000;

/// One frame of an indexed track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    /// RTP sequence number.
    pub seq: u16,
    /// Extended 64-bit timestamp (raw + 2^32 for post-reset frames).
    pub ts: u64,
    /// Payload length in bytes.
    pub len: u16,
    /// Byte offset of the payload within the file.
    pub offset: u64,
}

/// Ordered frame list for one track.
///
/// Immutable once built; the playout worker walks it by position.
#[derive(Debug, Default)]
pub struct FrameIndex {
    frames: Vec<FrameRecord>,
}

impl FrameIndex {
    /// Index an open track file.
    pub fn build(reader: &mut MjrReader) -> Result<Self, MjrError> {
        let packets = reader.scan()?;

        // Pass 1: look for a timestamp reset.
        let mut first_ts: u32 = 0;
        let mut last_ts: u32 = 0;
        let mut reset: u32 = 0;
        for p in &packets {
            let ts = p.header.timestamp;
            if last_ts == 0 {
                first_ts = ts;
                // Margin so packets that arrived slightly out of order
                // around the start still classify as pre-reset.
                if first_ts > 1_000_000 {
                    first_ts -= 1_000_000;
                }
            } else if ts < last_ts {
                if last_ts - ts > RESET_THRESHOLD {
                    reset = ts;
                    tracing::debug!(reset, "Timestamp reset detected");
                }
            } else if ts < reset {
                tracing::debug!(new = ts, old = reset, "Lowering timestamp reset");
                reset = ts;
            }
            last_ts = ts;
        }

        // Pass 2: extend timestamps and insert in order.
        let mut frames: Vec<FrameRecord> = Vec::with_capacity(packets.len());
        for p in &packets {
            let frame = FrameRecord {
                seq: p.header.sequence,
                ts: extended_ts(p, first_ts, reset),
                len: p.len,
                offset: p.offset,
            };
            let at = insertion_point(&frames, &frame);
            frames.insert(at, frame);
        }

        tracing::debug!(frames = frames.len(), "Built frame index");
        Ok(Self { frames })
    }

    /// Number of indexed frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the track indexed to nothing.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame at the given playout position.
    pub fn get(&self, at: usize) -> Option<&FrameRecord> {
        self.frames.get(at)
    }

    /// Iterate frames in playout order.
    pub fn iter(&self) -> impl Iterator<Item = &FrameRecord> {
        self.frames.iter()
    }
}

fn extended_ts(p: &PacketRecord, first_ts: u32, reset: u32) -> u64 {
    let raw = p.header.timestamp;
    if reset == 0 || raw > first_ts {
        // No reset in the file, or a pre-reset frame.
        raw as u64
    } else {
        // Post-reset: place after every pre-reset frame.
        (1u64 << 32) + raw as u64
    }
}

/// Walk backwards from the tail until a frame that sorts before the new one
/// is found; the new frame lands right after it. Reaching the head without
/// a match prepends.
fn insertion_point(frames: &[FrameRecord], new: &FrameRecord) -> usize {
    for i in (0..frames.len()).rev() {
        let candidate = &frames[i];
        if candidate.ts < new.ts || (candidate.ts == new.ts && seq_after(candidate.seq, new.seq)) {
            return i + 1;
        }
    }
    0
}

/// Wrap-aware sequence ordering: is `new` after `candidate`?
///
/// Equal sequence numbers keep file order.
fn seq_after(candidate: u16, new: u16) -> bool {
    if candidate == new {
        return true;
    }
    let diff = (new as i32) - (candidate as i32);
    (diff > 0 && diff < SEQ_WRAP_THRESHOLD) || (diff < 0 && -diff > SEQ_WRAP_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MediaKind;
    use crate::mjr::MjrWriter;
    use crate::rtp;

    fn index_of(packets: &[(u16, u32)]) -> FrameIndex {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MjrWriter::create(dir.path(), MediaKind::Audio, "opus", "track").unwrap();
        for &(seq, ts) in packets {
            writer
                .save_frame(&rtp::build_packet(111, seq, ts, 0x42, &[0xAB; 8]))
                .unwrap();
        }
        writer.close().unwrap();

        let mut reader = MjrReader::open(dir.path(), "track").unwrap();
        FrameIndex::build(&mut reader).unwrap()
    }

    fn order(index: &FrameIndex) -> Vec<u16> {
        index.iter().map(|f| f.seq).collect()
    }

    #[test]
    fn test_in_order_file() {
        let index = index_of(&[(1, 960), (2, 1920), (3, 2880)]);
        assert_eq!(order(&index), vec![1, 2, 3]);
        assert!(index.iter().zip(index.iter().skip(1)).all(|(a, b)| a.ts < b.ts));
    }

    #[test]
    fn test_out_of_order_small_jump_is_not_reset() {
        // A small backward jump reorders but must not arm a reset.
        let index = index_of(&[(1, 1920), (2, 960), (3, 2880)]);
        assert_eq!(order(&index), vec![2, 1, 3]);
        assert!(index.iter().all(|f| f.ts < (1 << 32)));
    }

    #[test]
    fn test_timestamp_reset_orders_pre_before_post() {
        // Backward jump of 3e9 must index pre-reset frames first.
        let index = index_of(&[
            (100, 4_000_000_000),
            (101, 4_000_000_960),
            (102, 1_000_000_000),
            (103, 1_000_000_960),
        ]);
        assert_eq!(order(&index), vec![100, 101, 102, 103]);
        assert!(index.get(1).unwrap().ts < index.get(2).unwrap().ts);
        assert_eq!(index.get(2).unwrap().ts, (1u64 << 32) + 1_000_000_000);
    }

    #[test]
    fn test_reset_point_lowered_by_later_packet() {
        // A post-reset packet below the detected reset value lowers it.
        let index = index_of(&[
            (100, 4_000_000_000),
            (102, 1_000_000_960),
            (101, 1_000_000_000),
        ]);
        assert_eq!(order(&index), vec![100, 101, 102]);
    }

    #[test]
    fn test_same_timestamp_orders_by_sequence() {
        let index = index_of(&[(6, 3000), (5, 3000), (7, 3000)]);
        assert_eq!(order(&index), vec![5, 6, 7]);
    }

    #[test]
    fn test_sequence_wrap_at_same_timestamp() {
        // 65534, 65535, 0, 1 around the wrap share a timestamp.
        let index = index_of(&[(0, 3000), (65534, 3000), (1, 3000), (65535, 3000)]);
        assert_eq!(order(&index), vec![65534, 65535, 0, 1]);
    }

    #[test]
    fn test_identical_frames_keep_file_order() {
        let index = index_of(&[(5, 3000), (5, 3000)]);
        assert_eq!(index.len(), 2);
        assert_eq!(order(&index), vec![5, 5]);
    }

    #[test]
    fn test_empty_track() {
        let index = index_of(&[]);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_ordering_invariant() {
        let index = index_of(&[
            (10, 5000),
            (12, 5000),
            (11, 5000),
            (13, 6000),
            (9, 4000),
        ]);
        for (a, b) in index.iter().zip(index.iter().skip(1)) {
            assert!(a.ts < b.ts || (a.ts == b.ts && seq_after(a.seq, b.seq)));
        }
    }

    #[test]
    fn test_seq_after_thresholds() {
        assert!(seq_after(1, 2));
        assert!(!seq_after(2, 1));
        assert!(seq_after(5, 5));
        // Wrap: 65535 -> 0 means 0 is after
        assert!(seq_after(65535, 0));
        assert!(!seq_after(0, 65535));
        // Distance right at the threshold is not "after"
        assert!(!seq_after(0, 10_000));
        assert!(seq_after(0, 9_999));
    }
}
