//! Integration tests for the Redis store.
//!
//! These tests require a Redis instance running at `redis://127.0.0.1/`.
//! Tests are ignored by default - run with `cargo test --test redis_store -- --ignored`

#![cfg(feature = "redis-store")]

use std::sync::Arc;
use std::time::Duration;
use lingua_gate::infrastructure::mocks::MockTranslator;
use lingua_gate::{
    BackendMode, ClientIdentity, GatewayBuilder, GatewayConfig, KeyValueStore, RedisStore,
    TranslationRequest,
};

const URL: &str = "redis://127.0.0.1/";

/// Check if Redis is available before running tests
async fn connect() -> Option<RedisStore> {
    match RedisStore::connect(URL).await {
        Ok(store) => Some(store),
        Err(_) => {
            eprintln!("Skipping test: Redis not available at {}", URL);
            None
        }
    }
}

fn key(test_name: &str, suffix: &str) -> String {
    format!("lingua-test:{}:{}:{}", test_name, std::process::id(), suffix)
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_set_get_and_expiry() {
    let Some(store) = connect().await else { return };
    let k = key("set_get", "v");

    store
        .set(&k, b"value".to_vec(), Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(store.get(&k).await.unwrap(), Some(b"value".to_vec()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.get(&k).await.unwrap(), None);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_incr_keeps_creation_expiry() {
    let Some(store) = connect().await else { return };
    let k = key("incr", "c");
    store.delete(&k).await.unwrap();

    assert_eq!(store.incr(&k, Duration::from_millis(300)).await.unwrap(), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(store.incr(&k, Duration::from_millis(300)).await.unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.incr(&k, Duration::from_millis(300)).await.unwrap(), 1);
    store.delete(&k).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_push_bounded_trims_to_cap() {
    let Some(store) = connect().await else { return };
    let k = key("push", "l");
    store.delete(&k).await.unwrap();

    for item in ["a", "b", "c", "d"] {
        store
            .push_bounded(&k, item.as_bytes().to_vec(), 2, Duration::from_secs(10))
            .await
            .unwrap();
    }

    assert_eq!(
        store.range(&k).await.unwrap(),
        vec![b"c".to_vec(), b"d".to_vec()]
    );
    store.delete(&k).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires Redis
async fn test_concurrent_increments_are_atomic() {
    let Some(store) = connect().await else { return };
    let store = Arc::new(store);
    let k = key("concurrent", "c");
    store.delete(&k).await.unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let store = Arc::clone(&store);
            let k = k.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    store.incr(&k, Duration::from_secs(10)).await.unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.get(&k).await.unwrap(), Some(b"200".to_vec()));
    store.delete(&k).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_two_gateways_share_limits() {
    if connect().await.is_none() {
        return;
    }

    let config = GatewayConfig {
        rate_limit: 3,
        redis_url: Some(URL.to_string()),
        key_prefix: format!("lingua-test:shared:{}:", std::process::id()),
        ..GatewayConfig::default()
    };
    let a = GatewayBuilder::new(config.clone())
        .with_translator(Arc::new(MockTranslator::new()))
        .build()
        .await
        .unwrap();
    let b = GatewayBuilder::new(config)
        .with_translator(Arc::new(MockTranslator::new()))
        .build()
        .await
        .unwrap();
    assert_eq!(a.mode(), BackendMode::Distributed);

    let client = ClientIdentity::new("shared-client");
    let mut admitted = 0;
    for i in 0..6 {
        let node = if i % 2 == 0 { a.gateway() } else { b.gateway() };
        let request = TranslationRequest::new(client.clone(), format!("text {}", i), "es");
        if node.handle(request).await.is_ok() {
            admitted += 1;
        }
    }

    // Could straddle a window boundary, never more than two windows' worth
    assert!((3..=6).contains(&admitted));
    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
}
