// Streaming relay core. Resolves a direct URL through the cache and
// resolver, issues one ranged upstream fetch, and hands the body back
// as a bounded channel of chunks.

use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::cache::ResolutionCache;
use super::range::{open_ended_range, parse_range_start};
use crate::config::ProxyConfig;
use crate::resolver::traits::MediaResolver;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The resolver failed or produced no usable audio URL.
    #[error("could not resolve media URL: {0}")]
    Resolution(String),
    /// The resolved URL could not be fetched or answered with an error status.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetch(String),
}

/// An upstream response ready to be relayed to the client.
///
/// `status` is always 200 or 206. The body channel yields chunks no
/// larger than the configured chunk size; dropping the receiver stops
/// the producer and releases the upstream connection.
pub struct RelayedStream {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub content_range: Option<String>,
    pub content_length: Option<String>,
    pub body: mpsc::Receiver<Result<Bytes>>,
}

pub struct StreamProxy {
    resolver: Arc<dyn MediaResolver>,
    cache: Arc<ResolutionCache>,
    client: Client,
    config: ProxyConfig,
}

impl StreamProxy {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        cache: Arc<ResolutionCache>,
        config: ProxyConfig,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(config.fetch_timeout())
            .build()
            .unwrap_or_default();
        Self {
            resolver,
            cache,
            client,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &Arc<dyn MediaResolver> {
        &self.resolver
    }

    /// Stream the audio behind `source_ref`, honoring an optional
    /// inbound `Range` header. Exactly one upstream connection is
    /// opened; it is released when the returned body is exhausted or
    /// its receiver is dropped.
    pub async fn stream(
        &self,
        source_ref: &str,
        track_key: &str,
        range_header: Option<&str>,
    ) -> Result<RelayedStream, RelayError> {
        let direct_url = self.resolve_direct_url(source_ref, track_key).await?;

        let start = parse_range_start(range_header);
        let mut request = self.client.get(&direct_url);
        if let Some(start) = start {
            request = request.header(header::RANGE, open_ended_range(start));
        }

        let response = tokio::time::timeout(self.config.fetch_timeout(), request.send())
            .await
            .map_err(|_| {
                warn!("upstream fetch timed out src={} track={}", source_ref, track_key);
                RelayError::UpstreamFetch("timed out".to_string())
            })?
            .map_err(|e| {
                warn!(
                    "upstream fetch failed src={} track={}: {}",
                    source_ref, track_key, e
                );
                RelayError::UpstreamFetch(e.to_string())
            })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            // Anything else would mean streaming a provider error page
            // as audio; surface it as a gateway failure instead.
            warn!(
                "upstream returned HTTP {} src={} track={}",
                status.as_u16(),
                source_ref,
                track_key
            );
            return Err(RelayError::UpstreamFetch(format!(
                "upstream returned HTTP {}",
                status.as_u16()
            )));
        }

        let header_string = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let content_type = header_string(header::CONTENT_TYPE);
        let content_range = header_string(header::CONTENT_RANGE);
        let content_length = header_string(header::CONTENT_LENGTH);

        debug!(
            "relaying track={} status={} start={:?}",
            track_key,
            status.as_u16(),
            start
        );

        let body = spawn_chunk_relay(response, self.config.chunk_size.max(1));

        Ok(RelayedStream {
            status,
            content_type,
            content_range,
            content_length,
            body,
        })
    }

    /// Look up the direct URL for `track_key`, invoking the resolver on
    /// a miss and caching the result. Resolver failures leave the cache
    /// untouched.
    async fn resolve_direct_url(
        &self,
        source_ref: &str,
        track_key: &str,
    ) -> Result<String, RelayError> {
        if let Some(url) = self.cache.get(track_key) {
            debug!("cache hit track={}", track_key);
            return Ok(url);
        }

        let resolution =
            tokio::time::timeout(self.config.fetch_timeout(), self.resolver.resolve(source_ref))
                .await
                .map_err(|_| {
                    warn!("resolution timed out src={} track={}", source_ref, track_key);
                    RelayError::Resolution("resolver timed out".to_string())
                })?
                .map_err(|e| {
                    warn!(
                        "resolution failed src={} track={}: {}",
                        source_ref, track_key, e
                    );
                    RelayError::Resolution(e.to_string())
                })?;

        let direct_url = resolution
            .audio_url()
            .ok_or_else(|| {
                warn!(
                    "no audio-bearing format src={} track={}",
                    source_ref, track_key
                );
                RelayError::Resolution("no audio-bearing format".to_string())
            })?
            .to_string();

        self.cache.put(track_key, &direct_url, self.config.ttl());
        Ok(direct_url)
    }
}

/// Pump the upstream body into a bounded channel, splitting oversized
/// network reads so no relayed chunk exceeds `chunk_size`. The channel
/// capacity bounds buffering to O(chunk size); a dropped receiver ends
/// the task and with it the upstream response.
fn spawn_chunk_relay(
    mut response: reqwest::Response,
    chunk_size: usize,
) -> mpsc::Receiver<Result<Bytes>> {
    let (tx, rx) = mpsc::channel::<Result<Bytes>>(1);

    tokio::spawn(async move {
        loop {
            match response.chunk().await {
                Ok(Some(mut data)) => {
                    while data.len() > chunk_size {
                        let piece = data.split_to(chunk_size);
                        if tx.send(Ok(piece)).await.is_err() {
                            debug!("stream receiver dropped mid-body");
                            return;
                        }
                    }
                    if !data.is_empty() && tx.send(Ok(data)).await.is_err() {
                        debug!("stream receiver dropped mid-body");
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("upstream body read failed: {}", e);
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            }
        }
    });

    rx
}
