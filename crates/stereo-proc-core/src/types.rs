use eyre::Result;
use futures::stream::BoxStream;
use indexmap::IndexMap;
use std::{hash::Hash, time::Duration};

/// Creates a timestamp from the message passed to the synchronizer.
pub trait WithTimestamp: Send {
    fn timestamp(&self) -> Duration;
}

/// The key that identifies the queue in the synchronizer.
pub trait Key: Clone + PartialEq + Eq + Hash + Sync + Send {}

impl<K> Key for K where K: Clone + PartialEq + Eq + Hash + Sync + Send {}

/// A group of messages sharing one exact timestamp, one per key, in
/// the order the keys were registered.
pub type SyncedGroup<K, T> = IndexMap<K, T>;

/// The stream is returned by [sync](crate::sync()), emitting groups of
/// messages with identical timestamps.
pub type OutputStream<'a, K, T> = BoxStream<'a, Result<SyncedGroup<K, T>>>;
