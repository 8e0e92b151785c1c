pub mod listener;

pub use listener::{ChangeFeedListener, ListenerHandle};

use crate::core::{ChangeEvent, PipelineError, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

/// Ordered source of change events.
///
/// `Ok(None)` means the feed ended. `next_event` must be cancel-safe: the
/// listener races it against its shutdown signal.
#[async_trait]
pub trait ChangeFeed: Send {
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>>;
}

/// Change feed backed by a bounded channel.
///
/// Senders wait when the channel is full, so a slow consumer throttles the
/// producer.
#[derive(Debug)]
pub struct ChannelFeed {
    receiver: mpsc::Receiver<Result<ChangeEvent>>,
}

/// Producer half of a [`ChannelFeed`].
#[derive(Debug, Clone)]
pub struct FeedSender {
    sender: mpsc::Sender<Result<ChangeEvent>>,
}

impl ChannelFeed {
    pub fn channel(capacity: usize) -> (FeedSender, ChannelFeed) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (FeedSender { sender }, ChannelFeed { receiver })
    }
}

#[async_trait]
impl ChangeFeed for ChannelFeed {
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>> {
        match self.receiver.recv().await {
            Some(Ok(change)) => Ok(Some(change)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }
}

impl FeedSender {
    /// Delivers one event, waiting for capacity. Fails once the feed is dropped.
    pub async fn send(&self, change: ChangeEvent) -> Result<()> {
        self.sender
            .send(Ok(change))
            .await
            .map_err(|_| PipelineError::FeedFailed("change feed receiver dropped".to_string()))
    }

    /// Injects a feed-level failure; the listener treats it as fatal.
    pub async fn fail(&self, reason: impl Into<String>) -> Result<()> {
        self.sender
            .send(Err(PipelineError::FeedFailed(reason.into())))
            .await
            .map_err(|_| PipelineError::FeedFailed("change feed receiver dropped".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Adapts any stream of change events into a [`ChangeFeed`].
pub struct StreamFeed<S> {
    inner: S,
}

impl<S> StreamFeed<S>
where
    S: Stream<Item = Result<ChangeEvent>> + Unpin + Send,
{
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> ChangeFeed for StreamFeed<S>
where
    S: Stream<Item = Result<ChangeEvent>> + Unpin + Send,
{
    async fn next_event(&mut self) -> Result<Option<ChangeEvent>> {
        self.inner.next().await.transpose()
    }
}
