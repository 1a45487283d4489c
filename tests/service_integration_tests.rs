//! Integration Tests for the Cache Service
//!
//! Exercises the public API end to end against the local provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use identity_cache::cache::{
    CacheKeys, CacheMetrics, CachePolicy, EvictionPolicy, InvalidationEvent, LocalProvider,
    PolicyResolver, TTL_MISSING, TTL_PERSISTENT,
};
use identity_cache::{CacheCategory, CacheError, CacheService};
use serde::{Deserialize, Serialize};

// == Helper Functions ==

fn create_test_cache() -> CacheService {
    CacheService::local(PolicyResolver::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Principal {
    id: u32,
    name: String,
    roles: Vec<String>,
}

fn alice() -> Principal {
    Principal {
        id: 1,
        name: "alice".to_string(),
        roles: vec!["admin".to_string(), "auditor".to_string()],
    }
}

// == Round Trip ==

#[tokio::test]
async fn test_set_then_get_returns_value() {
    let cache = create_test_cache();
    let key = CacheKeys::principal(1);

    assert!(cache.set(&key, &alice(), CacheCategory::Principal).await.unwrap());
    let cached: Option<Principal> = cache.get(&key).await.unwrap();
    assert_eq!(cached, Some(alice()));
}

#[tokio::test]
async fn test_large_value_round_trips_through_compression() {
    let cache = create_test_cache();
    let permissions: Vec<String> = (0..2000).map(|i| format!("resource:{}:read", i)).collect();

    cache
        .set("permissions:role:1:global", &permissions, CacheCategory::Permission)
        .await
        .unwrap();
    let cached: Option<Vec<String>> = cache.get("permissions:role:1:global").await.unwrap();
    assert_eq!(cached, Some(permissions));
}

#[tokio::test]
async fn test_get_absent_key_is_none() {
    let cache = create_test_cache();
    let value: Option<String> = cache.get("missing").await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_type_mismatch_is_an_error() {
    let cache = create_test_cache();
    cache.set("k", &"text", CacheCategory::Default).await.unwrap();
    let result = cache.get::<Principal>("k").await;
    assert!(matches!(result, Err(CacheError::Serialization(_))));
}

// == Remove ==

#[tokio::test]
async fn test_remove_semantics() {
    let cache = create_test_cache();
    cache.set("k", &1, CacheCategory::Default).await.unwrap();

    assert!(cache.remove("k").await.unwrap());
    assert_eq!(cache.get::<i32>("k").await.unwrap(), None);
    assert!(!cache.remove("k").await.unwrap());
    assert!(!cache.exists("k").await.unwrap());
}

// == Counters ==

#[tokio::test]
async fn test_increment_then_decrement_restores() {
    let cache = create_test_cache();
    assert_eq!(cache.increment("logins", 10).await.unwrap(), Some(10));
    assert_eq!(cache.increment("logins", 5).await.unwrap(), Some(15));
    assert_eq!(cache.decrement("logins", 5).await.unwrap(), Some(10));
    assert_eq!(cache.get::<i64>("logins").await.unwrap(), Some(10));
}

#[tokio::test]
async fn test_increment_non_numeric_value_fails() {
    let cache = create_test_cache();
    cache.set("name", &"alice", CacheCategory::Default).await.unwrap();
    assert!(cache.increment("name", 1).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_lose_no_updates() {
    let cache = create_test_cache();
    let tasks = 16;

    let handles: Vec<_> = (0..tasks)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..tasks {
                    cache.increment("hits", 1).await.unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(cache.get::<i64>("hits").await.unwrap(), Some(tasks * tasks));
}

// == Get Or Set ==

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_get_or_set_runs_factory_once() {
    let cache = create_test_cache();
    let calls = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_set(&CacheKeys::principal(1), CacheCategory::Principal, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(alice())
                    })
                    .await
                    .unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), alice());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        cache.get::<Principal>(&CacheKeys::principal(1)).await.unwrap(),
        Some(alice())
    );
}

#[tokio::test]
async fn test_get_or_set_factory_error_is_not_cached() {
    let cache = create_test_cache();

    let result = cache
        .get_or_set("role:9", CacheCategory::Role, || async {
            Err::<String, _>("directory unreachable")
        })
        .await;
    assert!(matches!(result, Err(CacheError::Factory(_))));
    assert!(!cache.exists("role:9").await.unwrap());

    // The key is not stuck after a failure
    let value = cache
        .get_or_set("role:9", CacheCategory::Role, || async { Ok::<_, String>("viewer".to_string()) })
        .await
        .unwrap();
    assert_eq!(value, "viewer");
}

// == Time To Live ==

#[tokio::test]
async fn test_ttl_sentinels() {
    let policies = PolicyResolver::new().with_policy(
        CacheCategory::Configuration,
        CachePolicy {
            absolute_ttl: None,
            ..CachePolicy::minutes(1)
        },
    );
    let cache = CacheService::local(policies);

    assert_eq!(cache.time_to_live("absent").await.unwrap(), TTL_MISSING);

    cache
        .set("config:site", &"x", CacheCategory::Configuration)
        .await
        .unwrap();
    assert_eq!(cache.time_to_live("config:site").await.unwrap(), TTL_PERSISTENT);

    cache
        .set_with_ttl("short", &"x", CacheCategory::Default, Duration::from_secs(30))
        .await
        .unwrap();
    let ttl = cache.time_to_live("short").await.unwrap();
    assert!(ttl > 0 && ttl <= 30);
}

#[tokio::test]
async fn test_permission_category_ttl() {
    let cache = create_test_cache();
    cache
        .set("perm:role:1", &vec!["read", "write"], CacheCategory::Permission)
        .await
        .unwrap();

    let ttl = cache.time_to_live("perm:role:1").await.unwrap();
    assert!(ttl <= 3600, "ttl {} above category limit", ttl);
    assert!(ttl > 3500, "ttl {} unexpectedly low", ttl);
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let cache = create_test_cache();
    cache
        .set_with_ttl("temp", &"v", CacheCategory::Default, Duration::from_millis(100))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(cache.get::<String>("temp").await.unwrap(), None);
    assert_eq!(cache.summary().counters.expirations, 1);
}

// == Pattern Invalidation ==

#[tokio::test]
async fn test_remove_by_pattern_user_keys() {
    let cache = create_test_cache();
    for key in ["user:1", "user:2", "role:1"] {
        cache.set(key, &key, CacheCategory::Default).await.unwrap();
    }

    assert_eq!(cache.remove_by_pattern("user:*").await.unwrap(), 2);
    assert!(!cache.exists("user:1").await.unwrap());
    assert!(!cache.exists("user:2").await.unwrap());
    assert!(cache.exists("role:1").await.unwrap());
}

#[tokio::test]
async fn test_empty_pattern_rejected() {
    let cache = create_test_cache();
    let result = cache.remove_by_pattern("").await;
    assert!(matches!(result, Err(CacheError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_role_change_drops_dependent_permissions() {
    let cache = create_test_cache();
    cache.set(&CacheKeys::role(7), &"editor", CacheCategory::Role).await.unwrap();
    cache
        .set(&CacheKeys::role_permissions(7, "docs"), &vec!["write"], CacheCategory::Permission)
        .await
        .unwrap();
    cache
        .set(&CacheKeys::principal_permissions(1, "docs"), &vec!["write"], CacheCategory::Permission)
        .await
        .unwrap();
    cache.set(&CacheKeys::role(8), &"viewer", CacheCategory::Role).await.unwrap();

    let removed = cache.invalidate(&InvalidationEvent::RoleChanged {
        role_id: "7".to_string(),
    }).await.unwrap();
    assert_eq!(removed, 3);
    assert!(cache.exists(&CacheKeys::role(8)).await.unwrap());
}

// == Clear ==

#[tokio::test]
async fn test_clear_empties_cache() {
    let cache = create_test_cache();
    for i in 0..10 {
        cache.set(&format!("key:{}", i), &i, CacheCategory::Default).await.unwrap();
    }

    assert!(cache.clear().await.unwrap());
    for i in 0..10 {
        assert_eq!(cache.get::<i32>(&format!("key:{}", i)).await.unwrap(), None);
    }
    assert_eq!(cache.summary().counters.current_items, 0);
}

// == Metrics ==

#[tokio::test]
async fn test_hit_rate_tracks_gets() {
    let cache = create_test_cache();
    assert_eq!(cache.summary().hit_rate(), 0.0);

    cache.set("a", &1, CacheCategory::Role).await.unwrap();
    for _ in 0..3 {
        cache.get::<i32>("a").await.unwrap();
    }
    cache.get::<i32>("b").await.unwrap();

    let summary = cache.summary();
    assert_eq!(summary.counters.hits, 3);
    assert_eq!(summary.counters.misses, 1);
    assert_eq!(summary.hit_rate(), 75.0);

    let role = summary.category(CacheCategory::Role).unwrap();
    assert_eq!(role.counters.hits, 3);
    assert_eq!(role.counters.current_items, 1);
}

#[tokio::test]
async fn test_snapshot_serializes_to_json() {
    let cache = create_test_cache();
    cache.set("a", &1, CacheCategory::Directory).await.unwrap();
    cache.get::<i32>("a").await.unwrap();

    let json = serde_json::to_value(cache.summary()).unwrap();
    assert_eq!(json["hits"], 1);
    assert!(json["categories"]["directory"].is_object());
}

// == Bounded Local Provider ==

#[tokio::test]
async fn test_bounded_provider_evicts() {
    let metrics = Arc::new(CacheMetrics::new());
    let provider = Arc::new(
        LocalProvider::new(Arc::clone(&metrics)).with_capacity(3, EvictionPolicy::LeastRecentlyUsed),
    );
    let cache = CacheService::new(provider, PolicyResolver::new(), metrics);

    for i in 0..5 {
        cache.set(&format!("k:{}", i), &i, CacheCategory::Default).await.unwrap();
    }

    let summary = cache.summary();
    assert_eq!(summary.counters.evictions, 2);
    assert_eq!(summary.counters.current_items, 3);
}

// == Argument Validation ==

#[tokio::test]
async fn test_invalid_keys_rejected() {
    let cache = create_test_cache();
    assert!(matches!(
        cache.get::<i32>("").await,
        Err(CacheError::InvalidArgument(_))
    ));
    let long_key = "k".repeat(identity_cache::cache::MAX_KEY_LENGTH + 1);
    assert!(matches!(
        cache.set(&long_key, &1, CacheCategory::Default).await,
        Err(CacheError::InvalidArgument(_))
    ));
}

// == Invalidation Listener ==

#[tokio::test]
async fn test_embedder_drives_invalidation_listener() {
    let cache = create_test_cache();
    cache.set("directory:admins", &vec!["alice"], CacheCategory::Directory).await.unwrap();
    cache.set("config:smtp", &"mail.local", CacheCategory::Configuration).await.unwrap();

    let (events, receiver) = tokio::sync::mpsc::channel(16);
    let listener = identity_cache::spawn_invalidation_listener(cache.clone(), receiver);

    events.send(InvalidationEvent::DirectoryChanged).await.unwrap();
    drop(events);
    listener.await.unwrap();

    assert!(!cache.exists("directory:admins").await.unwrap());
    assert!(cache.exists("config:smtp").await.unwrap());
}
