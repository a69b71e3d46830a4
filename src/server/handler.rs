// Axum route layer. Translates API requests into cache, resolver, and
// relay operations.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use crate::config::ProxyConfig;
use crate::engine::cache::ResolutionCache;
use crate::engine::relay::{RelayError, StreamProxy};
use crate::resolver::traits::MediaResolver;

/// How many results a plain search asks the provider for.
const SEARCH_LIMIT: usize = 10;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    proxy: Arc<StreamProxy>,
}

impl AppState {
    pub fn new(
        resolver: Arc<dyn MediaResolver>,
        cache: Arc<ResolutionCache>,
        config: ProxyConfig,
    ) -> Self {
        Self {
            proxy: Arc::new(StreamProxy::new(resolver, cache, config)),
        }
    }

    fn cache(&self) -> &Arc<ResolutionCache> {
        self.proxy.cache()
    }

    fn resolver(&self) -> &Arc<dyn MediaResolver> {
        self.proxy.resolver()
    }
}

pub struct ApiServer {
    port: u16,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ApiServer {
    /// Bind `addr` and serve the API until shutdown, returning a handle.
    pub async fn start(state: AppState, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = router(state);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL of the running server.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/stream", get(stream_handler))
        .route("/api/clear-cache/{track_id}", post(clear_cache_handler))
        .route("/api/ping", get(ping_handler))
        .route("/api/search", get(search_handler))
        .route("/api/similar", get(similar_handler))
        .route("/api/artist", get(artist_handler))
        .layer(middleware::from_fn(cors_headers))
        .with_state(state)
}

/// Permissive cross-origin headers on every API response, range header
/// included so browser audio elements can seek.
async fn cors_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Range,Content-Type"),
    );
    response
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    src: Option<String>,
    track: Option<String>,
    id: Option<String>,
}

/// GET /api/stream: resolve and relay audio with range support.
async fn stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Response {
    let Some(src) = params.src.filter(|s| !s.is_empty()) else {
        return error_body(StatusCode::BAD_REQUEST, "missing src parameter");
    };
    let track_key = params
        .track
        .or(params.id)
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| src.clone());

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    let relayed = match state.proxy.stream(&src, &track_key, range_header).await {
        Ok(relayed) => relayed,
        Err(RelayError::Resolution(_)) => {
            return error_body(StatusCode::BAD_GATEWAY, "could not resolve media URL");
        }
        Err(RelayError::UpstreamFetch(_)) => {
            return error_body(StatusCode::BAD_GATEWAY, "upstream fetch failed");
        }
    };

    let mut builder = Response::builder()
        .status(relayed.status)
        .header(header::ACCEPT_RANGES, "bytes");
    if let Some(content_type) = &relayed.content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    if let Some(content_range) = &relayed.content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }
    if let Some(content_length) = &relayed.content_length {
        builder = builder.header(header::CONTENT_LENGTH, content_length);
    }

    match builder.body(Body::from_stream(ReceiverStream::new(relayed.body))) {
        Ok(response) => response,
        Err(e) => {
            // Upstream handed back a header value axum refuses; treat
            // it like any other bad upstream response.
            error!("relay response build failed track={}: {}", track_key, e);
            error_body(StatusCode::BAD_GATEWAY, "upstream fetch failed")
        }
    }
}

/// POST /api/clear-cache/{track_id}: drop a cached resolution.
async fn clear_cache_handler(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
) -> Json<serde_json::Value> {
    state.cache().invalidate(&track_id);
    Json(json!({ "ok": true }))
}

/// GET /api/ping: liveness probe.
async fn ping_handler() -> Json<serde_json::Value> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Json(json!({ "ok": true, "time": now }))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

/// GET /api/search: provider catalog search.
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.unwrap_or_default();
    let query = query.trim();
    if query.is_empty() {
        return Json(json!({ "results": [] })).into_response();
    }

    match state.resolver().search(query, SEARCH_LIMIT).await {
        Ok(results) => {
            debug!("search q={} results={}", query, results.len());
            Json(json!({ "results": results })).into_response()
        }
        Err(e) => {
            error!("search failed q={}: {}", query, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "results": [] })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimilarParams {
    #[serde(rename = "trackId")]
    track_id: Option<String>,
    src: Option<String>,
}

/// GET /api/similar: entries related to a track.
async fn similar_handler(
    State(state): State<AppState>,
    Query(params): Query<SimilarParams>,
) -> Response {
    let reference = params
        .src
        .or(params.track_id)
        .filter(|r| !r.is_empty());
    let Some(reference) = reference else {
        return Json(json!({ "results": [] })).into_response();
    };

    match state.resolver().related(&reference).await {
        Ok(results) => Json(json!({ "results": results })).into_response(),
        Err(e) => {
            error!("similar lookup failed ref={}: {}", reference, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "results": [] })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArtistParams {
    name: Option<String>,
}

/// GET /api/artist: tracks attributed to an artist name.
async fn artist_handler(
    State(state): State<AppState>,
    Query(params): Query<ArtistParams>,
) -> Response {
    let name = params.name.unwrap_or_default();
    let name = name.trim();
    if name.is_empty() {
        return Json(json!({ "tracks": [] })).into_response();
    }

    match state.resolver().artist(name).await {
        Ok(tracks) => Json(json!({ "tracks": tracks })).into_response(),
        Err(e) => {
            error!("artist lookup failed name={}: {}", name, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "tracks": [] })),
            )
                .into_response()
        }
    }
}
