use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use lazycache::{
    CacheError, ExpirationPolicy, LazyCacheHandler, MapCacheStore, SelfExpiringResult,
};
use tokio::sync::Barrier;

fn minute_policy() -> ExpirationPolicy {
    ExpirationPolicy::absolute(Duration::from_secs(60))
}

#[tokio::test]
async fn test_async_cache_hits_share_one_instance() {
    let cache = LazyCacheHandler::with_map_store();
    let runs = Arc::new(AtomicUsize::new(0));

    let mut results = Vec::new();
    for _ in 0..4 {
        let runs_ref = runs.clone();
        let value: Arc<String> = cache
            .get_or_add_async(
                "async-same-key",
                move || async move {
                    let n = runs_ref.fetch_add(1, Ordering::SeqCst);
                    Ok(format!("payload-{n}"))
                },
                minute_policy(),
            )
            .await
            .unwrap();
        results.push(value);
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    for value in &results {
        assert!(Arc::ptr_eq(value, &results[0]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_single_flight_under_contention() {
    let cache = Arc::new(LazyCacheHandler::with_map_store());
    let runs = Arc::new(AtomicUsize::new(0));
    let tasks = 16;
    let barrier = Arc::new(Barrier::new(tasks));

    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let cache = cache.clone();
            let runs = runs.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_add_async(
                        "async-contended",
                        move || async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(25)).await;
                            Ok(String::from("winner"))
                        },
                        ExpirationPolicy::absolute(Duration::from_secs(60)),
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    for value in &results {
        assert!(Arc::ptr_eq(value, &results[0]));
    }
}

#[tokio::test]
async fn test_async_distinct_keys_independent() {
    let cache = LazyCacheHandler::with_map_store();
    for i in 0..3u32 {
        let value: Arc<u32> = cache
            .get_or_add_async(
                &format!("async-distinct-{i}"),
                move || async move { Ok(i * 10) },
                minute_policy(),
            )
            .await
            .unwrap();
        assert_eq!(*value, i * 10);
    }
    assert_eq!(cache.cache_entry_count(), 3);
}

#[tokio::test]
async fn test_async_disabled_policy_bypasses_store() {
    let cache = LazyCacheHandler::with_map_store();
    let runs = Arc::new(AtomicUsize::new(0));

    for expected in 0..3 {
        let runs_ref = runs.clone();
        let value: Arc<usize> = cache
            .get_or_add_async(
                "async-disabled",
                move || async move { Ok(runs_ref.fetch_add(1, Ordering::SeqCst)) },
                ExpirationPolicy::disabled(),
            )
            .await
            .unwrap();
        assert_eq!(*value, expected);
    }
    assert_eq!(cache.cache_entry_count(), 0);
}

#[tokio::test]
async fn test_async_failure_evicted_every_attempt() {
    let cache = LazyCacheHandler::with_map_store();
    let runs = Arc::new(AtomicUsize::new(0));
    let attempts = 4;

    for _ in 0..attempts {
        let runs_ref = runs.clone();
        let result: Result<Arc<u32>, _> = cache
            .get_or_add_async(
                "async-always-fails",
                move || async move {
                    runs_ref.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(anyhow!("remote rejected the call"))
                },
                minute_policy(),
            )
            .await;
        assert!(matches!(result, Err(CacheError::Factory(_))));
        assert_eq!(cache.cache_entry_count(), 0);
    }

    assert_eq!(runs.load(Ordering::SeqCst), attempts);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_concurrent_callers_share_one_failure() {
    let cache = Arc::new(LazyCacheHandler::with_map_store());
    let runs = Arc::new(AtomicUsize::new(0));
    let tasks = 8;
    let barrier = Arc::new(Barrier::new(tasks));

    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let cache = cache.clone();
            let runs = runs.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_add_async(
                        "async-shared-failure",
                        move || async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(25)).await;
                            Err::<u32, _>(anyhow!("one shared async failure"))
                        },
                        ExpirationPolicy::absolute(Duration::from_secs(60)),
                    )
                    .await
            })
        })
        .collect();

    let mut failures = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Err(CacheError::Factory(shared)) => failures.push(shared),
            other => panic!("expected factory failure, got {other:?}"),
        }
    }

    // Every awaiting caller evicted-and-reraised the same shared failure.
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.cache_entry_count(), 0);
    for failure in &failures {
        assert!(failure.same_failure(&failures[0]));
    }
}

#[tokio::test]
async fn test_async_ttl_expiry_recomputes() {
    let cache = LazyCacheHandler::with_map_store();
    let ttl = Duration::from_millis(60);

    let first: Arc<u32> = cache
        .get_or_add_async(
            "async-ttl",
            || async { Ok(1) },
            ExpirationPolicy::absolute(ttl),
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let second: Arc<u32> = cache
        .get_or_add_async(
            "async-ttl",
            || async { Ok(2) },
            ExpirationPolicy::absolute(ttl),
        )
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*second, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_self_expiring_single_flight() {
    let cache = Arc::new(LazyCacheHandler::with_map_store());
    let runs = Arc::new(AtomicUsize::new(0));
    let tasks = 8;
    let barrier = Arc::new(Barrier::new(tasks));

    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let cache = cache.clone();
            let runs = runs.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                cache
                    .get_or_add_self_expiring_async("async-token", move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(SelfExpiringResult::from_ttl(
                            String::from("bearer-abc"),
                            Duration::from_secs(600),
                        ))
                    })
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.cache_entry_count(), 1);
    for value in &results {
        assert!(Arc::ptr_eq(value, &results[0]));
    }
}

#[tokio::test]
async fn test_async_self_expiring_failure_not_cached() {
    let cache: LazyCacheHandler<MapCacheStore> = LazyCacheHandler::with_map_store();
    let runs = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let runs_ref = runs.clone();
        let result: Result<Arc<String>, _> = cache
            .get_or_add_self_expiring_async("async-token-failing", move || async move {
                runs_ref.fetch_add(1, Ordering::SeqCst);
                Err::<SelfExpiringResult<String>, _>(anyhow!("token endpoint 503"))
            })
            .await;
        assert!(matches!(result, Err(CacheError::Factory(_))));
    }

    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(cache.cache_entry_count(), 0);
}
