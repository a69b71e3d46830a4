use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tune_relay::config::ProxyConfig;
use tune_relay::engine::cache::ResolutionCache;
use tune_relay::resolver::traits::MediaResolver;
use tune_relay::resolver::ytdlp::YtDlpResolver;
use tune_relay::server::handler::{ApiServer, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = ProxyConfig::from_env();
    info!(
        "starting relay ttl={}s chunk={}B timeout={}s extractor={}",
        config.ttl_secs, config.chunk_size, config.fetch_timeout_secs, config.extractor_bin
    );

    let resolver: Arc<dyn MediaResolver> = Arc::new(YtDlpResolver::new(&config));
    let cache = Arc::new(ResolutionCache::new());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;

    let state = AppState::new(resolver, cache, config);
    let server = ApiServer::start(state, addr).await?;
    info!("api server listening on http://{}:{}", addr.ip(), server.port());

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl+C handler")?;
    info!("shutdown requested");
    server.shutdown();

    Ok(())
}
