// Tests for the streaming relay core, below the HTTP surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{http::header, response::IntoResponse, routing::get, Router};
use tokio::net::TcpListener;

use tune_relay::config::ProxyConfig;
use tune_relay::engine::cache::ResolutionCache;
use tune_relay::engine::relay::{RelayError, StreamProxy};
use tune_relay::resolver::traits::{MediaResolver, Resolution, TrackSummary};

const CONTENT_SIZE: usize = 100 * 1024;

fn generate_content() -> Vec<u8> {
    (0..CONTENT_SIZE).map(|i| (i % 256) as u8).collect()
}

async fn serve_full_content() -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/webm")],
        generate_content(),
    )
}

async fn start_upstream() -> String {
    let app = Router::new().route("/audio", get(serve_full_content));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{}/audio", addr)
}

struct FixedResolver {
    url: Option<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl MediaResolver for FixedResolver {
    async fn resolve(&self, _source_ref: &str) -> Result<Resolution> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.url {
            Some(url) => Ok(Resolution {
                url: Some(url.clone()),
                formats: Vec::new(),
            }),
            None => Err(anyhow!("no luck")),
        }
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<TrackSummary>> {
        Ok(Vec::new())
    }

    async fn related(&self, _reference: &str) -> Result<Vec<TrackSummary>> {
        Ok(Vec::new())
    }

    async fn artist(&self, _name: &str) -> Result<Vec<TrackSummary>> {
        Ok(Vec::new())
    }
}

fn proxy_with(url: Option<String>, chunk_size: usize) -> (StreamProxy, Arc<ResolutionCache>) {
    let resolver = Arc::new(FixedResolver {
        url,
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(ResolutionCache::new());
    let config = ProxyConfig {
        chunk_size,
        fetch_timeout_secs: 5,
        ..ProxyConfig::default()
    };
    (StreamProxy::new(resolver, cache.clone(), config), cache)
}

#[tokio::test]
async fn test_body_chunks_bounded_by_chunk_size() {
    let upstream_url = start_upstream().await;
    let (proxy, _cache) = proxy_with(Some(upstream_url), 1024);

    let mut relayed = proxy.stream("ref1", "t1", None).await.unwrap();
    assert_eq!(relayed.status.as_u16(), 200);
    assert_eq!(relayed.content_type.as_deref(), Some("audio/webm"));

    let mut collected = Vec::new();
    while let Some(chunk) = relayed.body.recv().await {
        let chunk = chunk.unwrap();
        assert!(chunk.len() <= 1024, "chunk of {} bytes", chunk.len());
        assert!(!chunk.is_empty());
        collected.extend_from_slice(&chunk);
    }
    assert_eq!(collected, generate_content());
}

#[tokio::test]
async fn test_cache_hit_skips_resolver() {
    let upstream_url = start_upstream().await;
    let resolver = Arc::new(FixedResolver {
        url: Some("http://127.0.0.1:1/stale".to_string()),
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(ResolutionCache::new());
    cache.put("t1", &upstream_url, std::time::Duration::from_secs(300));

    let proxy = StreamProxy::new(
        resolver.clone(),
        cache,
        ProxyConfig {
            fetch_timeout_secs: 5,
            ..ProxyConfig::default()
        },
    );

    let relayed = proxy.stream("ref1", "t1", None).await.unwrap();
    assert_eq!(relayed.status.as_u16(), 200);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resolution_error_before_any_fetch() {
    let (proxy, cache) = proxy_with(None, 64 * 1024);

    let err = proxy.stream("ref1", "t1", None).await.err().unwrap();
    assert!(matches!(err, RelayError::Resolution(_)));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_dropping_body_receiver_stops_relay() {
    let upstream_url = start_upstream().await;
    let (proxy, _cache) = proxy_with(Some(upstream_url), 1024);

    let mut relayed = proxy.stream("ref1", "t1", None).await.unwrap();
    let first = relayed.body.recv().await.unwrap().unwrap();
    assert!(!first.is_empty());

    // Dropping the receiver mid-body must not wedge anything; the
    // relay task notices the closed channel and exits.
    drop(relayed);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
