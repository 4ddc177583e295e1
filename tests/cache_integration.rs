use std::{sync::Arc, time::Duration};

use color_eyre::eyre::{eyre, Result};
use pretty_assertions::assert_eq;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use pagewise::{
    test_helpers::ScriptedSource, CachedSnapshots, LoadState, Pager, PagingConfig,
    PagingRequest, RequestBus, Snapshot, SnapshotSubscription,
};

type Source = Arc<ScriptedSource<u32, &'static str>>;

fn cached(scope: &CancellationToken) -> (Source, CachedSnapshots<u32, &'static str>) {
    let source = Arc::new(
        ScriptedSource::new()
            .with_page(1, vec!["a", "b"], None, Some(2))
            .with_page(2, vec!["c", "d"], Some(1), None),
    );
    let cache = Pager::new(PagingConfig::new(2), 1, Arc::clone(&source)).cached_in(scope);
    (source, cache)
}

async fn next(
    subscription: &mut SnapshotSubscription<u32, &'static str>,
) -> Result<Snapshot<u32, &'static str>> {
    timeout(Duration::from_secs(5), subscription.next())
        .await?
        .ok_or_else(|| eyre!("cache stopped"))
}

/// Skip snapshots until `done` holds; the cache may coalesce intermediate ones
async fn until(
    subscription: &mut SnapshotSubscription<u32, &'static str>,
    done: impl Fn(&Snapshot<u32, &'static str>) -> bool,
) -> Result<Snapshot<u32, &'static str>> {
    loop {
        let snapshot = next(subscription).await?;
        if done(&snapshot) {
            return Ok(snapshot);
        }
    }
}

async fn wait_closed(bus: &RequestBus<u32>) -> Result<()> {
    timeout(Duration::from_secs(5), async {
        while !bus.is_closed() {
            tokio::task::yield_now().await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_nothing_runs_before_the_first_subscriber() {
    let scope = CancellationToken::new();
    let (source, cache) = cached(&scope);

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!cache.is_started());
    assert!(cache.latest().is_none());
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn test_subscribers_share_a_single_fetch() -> Result<()> {
    let scope = CancellationToken::new();
    let (source, cache) = cached(&scope);
    let mut first = cache.subscribe();
    let mut second = cache.subscribe();

    next(&mut first).await?.bus.send(PagingRequest::Refresh)?;
    let refreshed = |snapshot: &Snapshot<u32, &'static str>| {
        snapshot.load_states.refresh == LoadState::Complete
    };
    let seen_first = until(&mut first, refreshed).await?;
    let seen_second = until(&mut second, refreshed).await?;

    assert_eq!(seen_first.generation, seen_second.generation);
    assert!(Arc::ptr_eq(&seen_first.pages, &seen_second.pages));
    assert_eq!(source.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_late_subscriber_gets_the_latest_snapshot_without_a_fetch() -> Result<()> {
    let scope = CancellationToken::new();
    let (source, cache) = cached(&scope);
    let mut early = cache.subscribe();
    next(&mut early).await?.bus.send(PagingRequest::Refresh)?;
    let settled = until(&mut early, |snapshot| snapshot.item_count() == 2).await?;

    let mut late = cache.subscribe();
    let replayed = next(&mut late).await?;

    assert_eq!(replayed.generation, settled.generation);
    assert_eq!(replayed.items().copied().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(source.call_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_rapid_resubscription_keeps_one_engine() -> Result<()> {
    let scope = CancellationToken::new();
    let (source, cache) = cached(&scope);
    let bus = next(&mut cache.subscribe()).await?.bus;

    for _ in 0..20 {
        let mut subscription = cache.subscribe();
        let snapshot = next(&mut subscription).await?;
        assert!(snapshot.bus.same_bus(&bus));
        assert_eq!(snapshot.generation, 1);
    }

    assert!(!bus.is_closed());
    assert_eq!(source.call_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_scope_stops_engine_and_subscribers() -> Result<()> {
    let scope = CancellationToken::new();
    let (_source, cache) = cached(&scope);
    let mut subscription = cache.subscribe();
    let bus = next(&mut subscription).await?.bus;

    scope.cancel();

    assert!(timeout(Duration::from_secs(5), subscription.next()).await?.is_none());
    assert!(cache.is_cancelled());
    wait_closed(&bus).await
}

#[tokio::test]
async fn test_dropping_every_handle_stops_engine() -> Result<()> {
    let scope = CancellationToken::new();
    let (_source, cache) = cached(&scope);
    let mut subscription = cache.subscribe();
    let bus = next(&mut subscription).await?.bus;

    drop(subscription);
    drop(cache);

    wait_closed(&bus).await?;
    assert!(!scope.is_cancelled());
    Ok(())
}
