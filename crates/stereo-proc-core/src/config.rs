/// Configuration parameters that are passed to the synchronizer.
///
/// When a stream's queue is full, the oldest pending frame of that
/// stream is evicted to make room, so fresh frames can always match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// The maximum number of pending frames kept for each input stream.
    pub queue_size: usize,
}

impl SyncConfig {
    /// Create a config with the given queue size.
    pub fn new(queue_size: usize) -> Self {
        Self { queue_size }
    }

    /// Queue depth used by the point cloud node.
    pub fn point_cloud() -> Self {
        Self::new(5)
    }

    /// Queue depth used by the full stereo processing node.
    pub fn stereo() -> Self {
        Self::new(3)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::point_cloud()
    }
}
