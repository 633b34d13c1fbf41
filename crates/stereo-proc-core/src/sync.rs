use crate::{
    config::SyncConfig,
    state::{SyncState, SyncStats},
    types::{Key, OutputStream, SyncedGroup, WithTimestamp},
};
use eyre::Result;
use futures::{
    StreamExt,
    stream::{self, Stream},
};
use std::{
    pin::Pin,
    task::{Context, Poll, Poll::*},
};
use tracing::debug;

type Callback<'a, K, T> = Box<dyn FnMut(&SyncedGroup<K, T>) + Send + 'a>;

/// Callback-driven exact-time synchronizer.
///
/// Messages are fed one at a time with [add](Synchronizer::add). When
/// every stream holds a message with the same timestamp, the
/// registered callbacks are invoked with a borrowed group. The group
/// is dropped once the callbacks return.
pub struct Synchronizer<'a, K, T>
where
    K: Key,
    T: WithTimestamp,
{
    state: SyncState<K, T>,
    callbacks: Vec<Callback<'a, K, T>>,
}

impl<'a, K, T> Synchronizer<'a, K, T>
where
    K: Key,
    T: WithTimestamp,
{
    pub fn new<I>(keys: I, config: &SyncConfig) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
    {
        Ok(Self {
            state: SyncState::new(keys, config)?,
            callbacks: Vec::new(),
        })
    }

    /// Register a callback invoked for every synchronized group.
    pub fn register_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&SyncedGroup<K, T>) + Send + 'a,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Feed a message into the stream identified by `key`. Returns true
    /// if the message completed a group.
    pub fn add(&mut self, key: K, item: T) -> bool {
        self.add_with(key, item, |_| ()).is_some()
    }

    /// Feed a message like [add](Self::add). A completed group is
    /// passed to the registered callbacks and then to `handler`, whose
    /// result is returned.
    pub fn add_with<R, F>(&mut self, key: K, item: T, handler: F) -> Option<R>
    where
        F: FnOnce(&SyncedGroup<K, T>) -> R,
    {
        let group = match self.state.push(key, item) {
            Ok(Some(group)) => group,
            Ok(None) => return None,
            Err(rejected) => {
                debug!(
                    timestamp = ?rejected.timestamp(),
                    commit_ts = ?self.state.commit_ts,
                    "drop a late message"
                );
                return None;
            }
        };

        for callback in &mut self.callbacks {
            callback(&group);
        }
        Some(handler(&group))
    }

    /// Discard all pending messages, e.g. after the inputs were
    /// unsubscribed.
    pub fn clear(&mut self) {
        self.state.clear();
    }

    pub fn stats(&self) -> &SyncStats {
        self.state.stats()
    }

    pub fn state(&self) -> &SyncState<K, T> {
        &self.state
    }
}

/// Consume a stream of messages, each identified by a key, and group
/// up messages with identical timestamps across all keys.
///
/// The output stream ends when the input stream is depleted. Pending
/// messages that never found a partner are discarded.
pub fn sync<'a, K, T, S, I>(stream: S, keys: I, config: SyncConfig) -> Result<OutputStream<'a, K, T>>
where
    K: Key + 'a,
    T: WithTimestamp + 'a,
    S: Stream<Item = Result<(K, T)>> + Unpin + Send + 'a,
    I: IntoIterator<Item = K>,
{
    let mut state = SyncState::new(keys, &config)?;

    let output_stream = {
        let mut stream = Some(stream);
        stream::poll_fn(move |ctx| poll(Pin::new(&mut stream), &mut state, ctx))
    };

    Ok(output_stream.boxed())
}

/// The polling function is repeatedly called to generate groups.
fn poll<K, T, S>(
    mut input_stream: Pin<&mut Option<S>>,
    state: &mut SyncState<K, T>,
    ctx: &mut Context<'_>,
) -> Poll<Option<Result<SyncedGroup<K, T>>>>
where
    K: Key,
    S: Stream<Item = Result<(K, T)>> + Unpin + Send,
    T: WithTimestamp,
{
    let Some(mut input_stream_mut) = input_stream.as_mut().as_pin_mut() else {
        return Ready(None);
    };

    let group = loop {
        match input_stream_mut.as_mut().poll_next(ctx) {
            Ready(Some(Ok((key, item)))) => match state.push(key, item) {
                Ok(Some(group)) => break Some(Ok(group)),
                Ok(None) => continue,
                Err(_) => {
                    debug!("drop a late message");
                    continue;
                }
            },
            Ready(Some(Err(err))) => {
                input_stream.set(None);
                break Some(Err(err));
            }
            Ready(None) => {
                debug!(
                    pending = state.pending(),
                    "Input stream depleted, discarding unmatched messages"
                );
                input_stream.set(None);
                break None;
            }
            Pending => return Pending,
        }
    };

    Ready(group)
}
