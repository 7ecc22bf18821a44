//! Recording registry
//!
//! Process-wide catalogue of recordings, keyed by 64-bit id. The registry
//! holds the canonical strong reference to each [`Recording`]; sessions and
//! viewers hold their own. Insertion and random-id allocation happen
//! atomically under the registry lock, which is never held across file I/O.

pub mod recording;
pub mod store;

pub use recording::{Recording, RecordingSummary, Track};
pub use store::RecordingRegistry;
