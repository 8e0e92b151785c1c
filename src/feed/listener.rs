use super::ChangeFeed;
use crate::bucket::BucketManager;
use crate::core::{PipelineError, Result};
use crate::pipeline::{PipelineStats, TtlPipeline};
use crate::sink::AuditSink;
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

/// Single consumer of a change feed.
///
/// Pulls one event at a time and runs it through the pipeline to completion
/// before admitting the next one.
pub struct ChangeFeedListener<B, S> {
    pipeline: TtlPipeline<B, S>,
}

impl<B: BucketManager, S: AuditSink> ChangeFeedListener<B, S> {
    pub fn new(pipeline: TtlPipeline<B, S>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &TtlPipeline<B, S> {
        &self.pipeline
    }

    /// Consumes the feed until it fails or ends. Both are fatal.
    pub async fn run<F: ChangeFeed>(&mut self, feed: &mut F) -> Result<()> {
        self.run_until(feed, std::future::pending()).await
    }

    /// Consumes the feed until `shutdown` resolves, the feed fails, or the
    /// feed ends.
    ///
    /// Shutdown is only observed between events; an event already pulled from
    /// the feed is classified or audited before the loop exits.
    pub async fn run_until<F, Fut>(&mut self, feed: &mut F, shutdown: Fut) -> Result<()>
    where
        F: ChangeFeed,
        Fut: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let span = info_span!("ttl.listener");

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    span.in_scope(|| {
                        event!(
                            Level::INFO,
                            events_seen = self.pipeline.stats().events_seen,
                            "change feed listener stopped"
                        )
                    });
                    return Ok(());
                }
                next = feed.next_event() => next,
            };

            match next {
                Ok(Some(change)) => {
                    self.pipeline.handle(change).instrument(span.clone()).await;
                }
                Ok(None) => {
                    span.in_scope(|| event!(Level::ERROR, "change feed terminated"));
                    return Err(PipelineError::FeedTerminated);
                }
                Err(err) => {
                    span.in_scope(|| event!(Level::ERROR, error = %err, "change feed failed"));
                    return Err(match err {
                        PipelineError::FeedFailed(_) | PipelineError::FeedTerminated => err,
                        other => PipelineError::FeedFailed(other.to_string()),
                    });
                }
            }
        }
    }
}

impl<B, S> ChangeFeedListener<B, S>
where
    B: BucketManager + 'static,
    S: AuditSink + 'static,
{
    /// Runs the listener on a background task.
    pub fn spawn<F>(mut self, mut feed: F) -> ListenerHandle
    where
        F: ChangeFeed + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let join_handle = tokio::spawn(async move {
            let result = self
                .run_until(&mut feed, async move {
                    let _ = stop_rx.await;
                })
                .await;
            drop(feed);
            result.map(|()| self.pipeline.stats().clone())
        });

        ListenerHandle {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }
}

/// Handle to a spawned listener.
pub struct ListenerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<PipelineStats>>>,
}

impl ListenerHandle {
    /// Stops admitting events, lets the in-flight event finish, releases the
    /// feed and returns the final stats.
    pub async fn shutdown(mut self) -> Result<PipelineStats> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.join().await
    }

    /// Waits for the listener to exit on its own (feed failure or end).
    pub async fn wait(mut self) -> Result<PipelineStats> {
        self.join().await
    }

    async fn join(&mut self) -> Result<PipelineStats> {
        let Some(join_handle) = self.join_handle.take() else {
            return Err(PipelineError::FeedTerminated);
        };
        join_handle
            .await
            .map_err(|err| PipelineError::FeedFailed(format!("listener join: {}", err)))?
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::TieredBuckets;
    use crate::config::PipelineConfig;
    use crate::core::{ChangeEvent, Entity, SystemClock};
    use crate::feed::{ChannelFeed, StreamFeed};
    use crate::sink::MemoryAuditSink;
    use chrono::Utc;
    use std::sync::Arc;

    fn listener() -> ChangeFeedListener<TieredBuckets, MemoryAuditSink> {
        let pipeline = TtlPipeline::new(
            TieredBuckets::new(),
            MemoryAuditSink::new(),
            Arc::new(SystemClock),
            &PipelineConfig::default(),
        )
        .unwrap();
        ChangeFeedListener::new(pipeline)
    }

    #[tokio::test]
    async fn test_end_of_feed_is_fatal() {
        let entity = Entity::new("a".into(), "v", Utc::now() + chrono::Duration::minutes(2));
        let mut feed = StreamFeed::new(futures::stream::iter(vec![Ok(ChangeEvent::insert(entity))]));
        let mut listener = listener();

        let err = listener.run(&mut feed).await.unwrap_err();

        assert!(matches!(err, PipelineError::FeedTerminated));
        assert_eq!(listener.pipeline().stats().inserts_short, 1);
    }

    #[tokio::test]
    async fn test_feed_error_is_fatal_and_stops_processing() {
        let entity = Entity::new("a".into(), "v", Utc::now());
        let events = vec![
            Err(PipelineError::IoError("connection reset".to_string())),
            Ok(ChangeEvent::insert(entity)),
        ];
        let mut feed = StreamFeed::new(futures::stream::iter(events));
        let mut listener = listener();

        let err = listener.run(&mut feed).await.unwrap_err();

        assert!(matches!(err, PipelineError::FeedFailed(_)));
        assert_eq!(listener.pipeline().stats().events_seen, 0);
    }

    #[tokio::test]
    async fn test_spawned_listener_shuts_down_gracefully() {
        let buckets = Arc::new(TieredBuckets::new());
        let pipeline = TtlPipeline::new(
            buckets.clone(),
            MemoryAuditSink::new(),
            Arc::new(SystemClock),
            &PipelineConfig::default(),
        )
        .unwrap();
        let (sender, feed) = ChannelFeed::channel(8);
        let handle = ChangeFeedListener::new(pipeline).spawn(feed);

        let entity = Entity::new("a".into(), "v", Utc::now() + chrono::Duration::minutes(30));
        sender.send(ChangeEvent::insert(entity)).await.unwrap();
        while buckets.len().unwrap() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }

        let stats = handle.shutdown().await.unwrap();
        assert_eq!(stats.events_seen, 1);
        assert_eq!(stats.inserts_long, 1);
        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn test_spawned_listener_reports_feed_failure() {
        let (sender, feed) = ChannelFeed::channel(2);
        let handle = listener().spawn(feed);

        sender.fail("resume token lost").await.unwrap();

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, PipelineError::FeedFailed(_)));
    }
}
