use crate::{
    buffer::{Buffer, Pushed},
    config::SyncConfig,
    types::{Key, SyncedGroup, WithTimestamp},
};
use eyre::{Result, ensure};
use indexmap::IndexMap;
use std::time::Duration;
use tracing::debug;

/// The exact-time matching state shared by
/// [Synchronizer](crate::Synchronizer) and [sync](crate::sync()).
///
/// Each key owns a bounded buffer of pending messages. A group is
/// emitted as soon as one timestamp is pending on every buffer.
#[derive(Debug)]
pub struct SyncState<K, T>
where
    K: Key,
    T: WithTimestamp,
{
    /// A list of buffers indexed by key K.
    pub buffers: IndexMap<K, Buffer<T>>,

    /// The timestamp of the last emitted group. Messages at or before
    /// it can never be matched and are rejected.
    pub commit_ts: Option<Duration>,

    stats: SyncStats,
}

/// Statistics about the synchronization state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Number of synchronized groups emitted.
    pub groups_emitted: u64,

    /// Number of messages rejected for arriving at or before the
    /// commit timestamp or for an unknown key.
    pub rejected: u64,

    /// Number of pending messages discarded by overflow, replacement
    /// or because a newer group was emitted.
    pub dropped: u64,
}

impl<K, T> SyncState<K, T>
where
    K: Key,
    T: WithTimestamp,
{
    /// Initialize buffers for respective keys.
    pub fn new<I>(keys: I, config: &SyncConfig) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
    {
        let SyncConfig { queue_size } = *config;

        // Sanity check
        ensure!(queue_size >= 1, "queue_size must be at least 1");

        let buffers: IndexMap<_, _> = keys
            .into_iter()
            .map(|key| (key, Buffer::with_capacity(queue_size)))
            .collect();
        ensure!(!buffers.is_empty(), "at least one input key is required");

        Ok(Self {
            buffers,
            commit_ts: None,
            stats: SyncStats::default(),
        })
    }

    /// Number of input streams joined by this state.
    pub fn arity(&self) -> usize {
        self.buffers.len()
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Insert a message to the queue identified by the key, then try
    /// to form a group at the message's timestamp.
    ///
    /// Returns `Err(item)` if the key is unknown or the message is not
    /// newer than the last emitted group. A full buffer never rejects:
    /// its oldest pending message is evicted instead.
    pub fn push(&mut self, key: K, item: T) -> Result<Option<SyncedGroup<K, T>>, T> {
        let timestamp = item.timestamp();

        match self.commit_ts {
            Some(commit_ts) if commit_ts >= timestamp => {
                self.stats.rejected += 1;
                debug!(?timestamp, ?commit_ts, "Rejected late message");
                return Err(item);
            }
            _ => {}
        }

        let Some(buffer) = self.buffers.get_mut(&key) else {
            self.stats.rejected += 1;
            debug!(?timestamp, "Unknown key, rejecting message");
            return Err(item);
        };

        match buffer.push(item) {
            Pushed::Inserted => {}
            Pushed::Replaced(_) => {
                self.stats.dropped += 1;
                debug!(?timestamp, "Replaced pending message with the same timestamp");
            }
            Pushed::Evicted(evicted) => {
                self.stats.dropped += 1;
                debug!(
                    evicted_ts = ?evicted.timestamp(),
                    "Dropped oldest message due to buffer overflow"
                );
            }
        }

        Ok(self.try_match(timestamp))
    }

    /// Checks if a message with this timestamp is pending on every
    /// buffer.
    pub fn is_complete(&self, ts: Duration) -> bool {
        self.buffers.values().all(|buffer| buffer.contains(ts))
    }

    /// Try to group up the messages stamped with `ts`.
    ///
    /// On success every pending message older than `ts` is discarded,
    /// since no group can be formed at or before the new commit
    /// timestamp anymore.
    pub fn try_match(&mut self, ts: Duration) -> Option<SyncedGroup<K, T>> {
        if !self.is_complete(ts) {
            return None;
        }

        let group: IndexMap<_, _> = self
            .buffers
            .iter_mut()
            .filter_map(|(key, buffer)| Some((key.clone(), buffer.take(ts)?)))
            .collect();

        let stale: usize = self
            .buffers
            .values_mut()
            .map(|buffer| buffer.drop_before(ts))
            .sum();

        self.commit_ts = Some(ts);
        self.stats.groups_emitted += 1;
        self.stats.dropped += stale as u64;

        debug!(
            group_num = self.stats.groups_emitted,
            timestamp = ?ts,
            stale,
            "Emitting synchronized group"
        );

        Some(group)
    }

    /// Checks if there are buffers which are empty.
    pub fn is_empty(&self) -> bool {
        self.buffers.values().any(|buffer| buffer.is_empty())
    }

    /// Total number of pending messages across all buffers.
    pub fn pending(&self) -> usize {
        self.buffers.values().map(|buffer| buffer.len()).sum()
    }

    /// Discard every pending message and forget the commit timestamp.
    pub fn clear(&mut self) {
        let pending = self.pending();
        self.buffers.values_mut().for_each(|buffer| {
            while buffer.pop_front().is_some() {}
        });
        self.commit_ts = None;
        self.stats.dropped += pending as u64;
    }
}
