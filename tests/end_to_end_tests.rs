use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use ttlwatch::{
    BucketTier, ChangeFeedListener, Clock, ExpiryStore, JsonLinesAuditSink, LoadGenConfig,
    ManualClock, MemoryAuditSink, NewEntity, PipelineConfig, PipelineError,
    SyntheticLoadGenerator, TieredBuckets, TtlPipeline,
};

async fn wait_for<F: Fn() -> bool>(condition: F) {
    let mut waited = Duration::ZERO;
    while !condition() {
        assert!(waited < Duration::from_secs(5), "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(2)).await;
        waited += Duration::from_millis(2);
    }
}

#[tokio::test]
async fn store_feed_drives_buckets_and_jsonl_audit() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()));
    let config = PipelineConfig::default();

    let store = Arc::new(ExpiryStore::new(config.feed_capacity));
    let feed = store.subscribe().await;
    let buckets = Arc::new(TieredBuckets::new());
    let sink = JsonLinesAuditSink::open(dir.path(), config.no_of_objects)
        .await
        .unwrap();
    let pipeline = TtlPipeline::new(buckets.clone(), sink.clone(), clock.clone(), &config).unwrap();
    let handle = ChangeFeedListener::new(pipeline).spawn(feed);

    let now = clock.now();
    let soon = store
        .insert(NewEntity::new("soon", now + ChronoDuration::seconds(30)))
        .await
        .unwrap();
    store
        .insert(NewEntity::new("mid", now + ChronoDuration::minutes(4)))
        .await
        .unwrap();
    store
        .insert(NewEntity::new("far", now + ChronoDuration::minutes(30)))
        .await
        .unwrap();
    wait_for(|| buckets.len().unwrap() == 3).await;

    assert_eq!(buckets.tier_len(BucketTier::SubMinute).unwrap(), 1);
    assert_eq!(buckets.tier_len(BucketTier::Short).unwrap(), 1);
    assert_eq!(buckets.tier_len(BucketTier::Long).unwrap(), 1);

    clock.set(now + ChronoDuration::seconds(35));
    let swept = store.sweep_expired(clock.now()).await.unwrap();
    assert_eq!(swept, 1);

    let mut polls = 0;
    let stats = loop {
        let deletions = sink.read_deletions().await.unwrap();
        if !deletions.is_empty() {
            assert_eq!(deletions[0].deleted_entity_id, soon.id);
            assert_eq!(deletions[0].deletion_time_diff_ms, 5_000);
            break handle.shutdown().await.unwrap();
        }
        polls += 1;
        assert!(polls < 2_500, "deletion record never written");
        tokio::time::sleep(Duration::from_millis(2)).await;
    };

    assert_eq!(stats.inserts_classified(), 3);
    assert_eq!(stats.deletions_audited, 1);
    let computations = sink.read_computations().await.unwrap();
    assert_eq!(computations.len(), 1);
    assert_eq!(computations[0].no_of_objects, 1000);
}

#[tokio::test]
async fn generated_load_is_classified_into_long_tier() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(ExpiryStore::new(64));
    let feed = store.subscribe().await;
    let buckets = Arc::new(TieredBuckets::new());
    let pipeline = TtlPipeline::new(
        buckets.clone(),
        MemoryAuditSink::new(),
        clock.clone(),
        &PipelineConfig::default(),
    )
    .unwrap();
    let handle = ChangeFeedListener::new(pipeline).spawn(feed);

    let generator = SyntheticLoadGenerator::new(
        store.clone(),
        clock,
        LoadGenConfig::default().batch_size(100).seed(5),
    )
    .unwrap();
    let report = generator.generate(250).await.unwrap();
    assert_eq!(report.batches, 3);

    wait_for(|| buckets.len().unwrap() == 250).await;
    assert_eq!(buckets.tier_len(BucketTier::Long).unwrap(), 250);

    let stats = handle.shutdown().await.unwrap();
    assert_eq!(stats.inserts_long, 250);
}

#[tokio::test]
async fn dropping_the_store_terminates_the_listener() {
    let store = ExpiryStore::new(4);
    let feed = store.subscribe().await;
    let pipeline = TtlPipeline::new(
        TieredBuckets::new(),
        MemoryAuditSink::new(),
        Arc::new(ManualClock::new(Utc::now())),
        &PipelineConfig::default(),
    )
    .unwrap();
    let handle = ChangeFeedListener::new(pipeline).spawn(feed);

    drop(store);

    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, PipelineError::FeedTerminated));
}
