use futures::{
    Stream,
    stream::{self, TryStreamExt},
};
use indexmap::IndexMap;
use std::time::Duration;
use stereo_proc_core::{
    CameraInfo, DisparityImage, Header, Image, SyncConfig, WithTimestamp, sync,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMessage {
    pub timestamp: Duration,
    pub data: String,
}

impl TestMessage {
    pub fn new(timestamp_ms: u64, data: &str) -> Self {
        Self {
            timestamp: Duration::from_millis(timestamp_ms),
            data: data.to_string(),
        }
    }
}

impl WithTimestamp for TestMessage {
    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

pub fn create_message(timestamp_ms: u64) -> TestMessage {
    TestMessage::new(timestamp_ms, &format!("msg_{}", timestamp_ms))
}

/// Builds an input stream in exactly the order messages are added.
pub struct StreamBuilder<K> {
    messages: Vec<(K, TestMessage)>,
}

impl<K> Default for StreamBuilder<K>
where
    K: Clone,
{
    fn default() -> Self {
        Self {
            messages: Vec::new(),
        }
    }
}

impl<K> StreamBuilder<K>
where
    K: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn add_message(mut self, key: K, timestamp_ms: u64) -> Self {
        self.messages.push((key, create_message(timestamp_ms)));
        self
    }

    #[allow(dead_code)]
    pub fn add_messages(mut self, key: K, timestamps_ms: &[u64]) -> Self {
        for &ts in timestamps_ms {
            self.messages.push((key.clone(), create_message(ts)));
        }
        self
    }

    pub fn build(self) -> impl Stream<Item = eyre::Result<(K, TestMessage)>> {
        stream::iter(self.messages.into_iter().map(Ok))
    }
}

/// Helper function to run synchronizer and collect all groups
pub async fn run_sync<K>(
    input_stream: impl Stream<Item = eyre::Result<(K, TestMessage)>> + Unpin + Send,
    keys: impl IntoIterator<Item = K>,
    config: SyncConfig,
) -> eyre::Result<Vec<IndexMap<K, TestMessage>>>
where
    K: Clone + PartialEq + Eq + std::hash::Hash + Sync + Send,
{
    let output_stream = sync(input_stream, keys, config)?;
    let groups: Vec<IndexMap<K, TestMessage>> = output_stream.try_collect().await?;
    Ok(groups)
}

/// Assert that every message of a group carries the same timestamp.
#[allow(dead_code)]
pub fn assert_exact_groups(groups: &[IndexMap<&str, TestMessage>]) {
    for group in groups {
        assert!(!group.is_empty(), "Group should not be empty");

        let first = group[0].timestamp();
        for (key, msg) in group {
            assert_eq!(
                msg.timestamp(),
                first,
                "Message of {key} is not stamped like the rest of the group"
            );
        }
    }
}

/// Assert that groups are in strictly increasing timestamp order
#[allow(dead_code)]
pub fn assert_timestamp_ordering(groups: &[IndexMap<&str, TestMessage>]) {
    let mut prev: Option<Duration> = None;

    for group in groups {
        let ts = group[0].timestamp();

        if let Some(prev) = prev {
            assert!(
                ts > prev,
                "Groups not in timestamp order: prev={:?}, current={:?}",
                prev,
                ts
            );
        }

        prev = Some(ts);
    }
}

#[allow(dead_code)]
pub fn group_timestamps(groups: &[IndexMap<&str, TestMessage>]) -> Vec<u64> {
    groups
        .iter()
        .map(|group| group[0].timestamp().as_millis() as u64)
        .collect()
}

/// A 640x480 calibrated pair with f = 500 px, principal point
/// (320, 240) and a 0.1 m baseline.
#[allow(dead_code)]
pub fn camera_pair(stamp: Duration) -> (CameraInfo, CameraInfo) {
    let info = |tx: f64, frame_id: &str| CameraInfo {
        header: Header::new(stamp, frame_id),
        width: 640,
        height: 480,
        k: [500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0],
        p: [
            500.0, 0.0, 320.0, tx, 0.0, 500.0, 240.0, 0.0, 0.0, 0.0, 1.0, 0.0,
        ],
        ..Default::default()
    };
    (info(0.0, "left_optical"), info(-50.0, "right_optical"))
}

#[allow(dead_code)]
pub fn disparity_image(stamp: Duration, width: u32, height: u32, values: &[f32]) -> DisparityImage {
    let header = Header::new(stamp, "left_optical");
    DisparityImage {
        header: header.clone(),
        image: Image::from_f32(header, width, height, values).unwrap(),
        f: 500.0,
        t: 0.1,
        min_disparity: 0.0,
        max_disparity: 64.0,
        delta_d: 0.0625,
    }
}

#[allow(dead_code)]
pub fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
}

#[allow(dead_code)]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
}
