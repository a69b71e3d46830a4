use std::time::Duration;

use tune_relay::engine::cache::ResolutionCache;

#[test]
fn test_put_then_get() {
    let cache = ResolutionCache::new();
    cache.put("t1", "u1", Duration::from_secs(300));
    assert_eq!(cache.get("t1"), Some("u1".to_string()));
    assert_eq!(cache.get("t2"), None);
}

#[test]
fn test_zero_ttl_expires_immediately() {
    let cache = ResolutionCache::new();
    cache.put("t1", "u1", Duration::ZERO);
    assert_eq!(cache.get("t1"), None);
    // The expired entry still occupies a slot until invalidated; lazy
    // expiry only affects reads.
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_short_ttl_expires_after_deadline() {
    let cache = ResolutionCache::new();
    cache.put("t1", "u1", Duration::from_millis(20));
    assert_eq!(cache.get("t1"), Some("u1".to_string()));

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(cache.get("t1"), None);
}

#[test]
fn test_overwrite_replaces_entry() {
    let cache = ResolutionCache::new();
    cache.put("t1", "old", Duration::ZERO);
    cache.put("t1", "new", Duration::from_secs(300));
    assert_eq!(cache.get("t1"), Some("new".to_string()));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_invalidate_missing_key_is_noop() {
    let cache = ResolutionCache::new();
    cache.invalidate("missing-key");
    assert!(cache.is_empty());

    cache.put("t1", "u1", Duration::from_secs(300));
    cache.invalidate("t1");
    assert_eq!(cache.get("t1"), None);
    assert!(cache.is_empty());
}
