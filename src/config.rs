//! Plugin configuration

use std::path::{Path, PathBuf};

/// Configuration options for the record/replay engine.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Directory where `.mjr` recordings are stored. Created at startup if
    /// it does not exist.
    pub recordings_path: PathBuf,

    /// Whether to forward observability events to the gateway's event
    /// handlers.
    pub notify_events: bool,

    /// Capacity of the control-message queue feeding the dispatcher.
    pub queue_capacity: usize,
}

impl PluginConfig {
    /// Create a new configuration with the given recordings directory.
    pub fn new(recordings_path: impl Into<PathBuf>) -> Self {
        Self {
            recordings_path: recordings_path.into(),
            notify_events: true,
            queue_capacity: 1024,
        }
    }

    /// Enable or disable event notifications.
    pub fn notify_events(mut self, enabled: bool) -> Self {
        self.notify_events = enabled;
        self
    }

    /// Set the control-queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// The recordings directory.
    pub fn path(&self) -> &Path {
        &self.recordings_path
    }
}
