// Extractor-backed resolver. Shells out to a yt-dlp compatible binary
// and maps its JSON dump onto the resolver contract.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use super::traits::{MediaFormat, MediaResolver, Resolution, TrackSummary};
use crate::config::ProxyConfig;

/// Cap on entries returned by the related-tracks query.
const RELATED_LIMIT: usize = 12;

/// Cap on entries returned by the artist query.
const ARTIST_LIMIT: usize = 50;

pub struct YtDlpResolver {
    binary: String,
    timeout: Duration,
}

/// Single catalog entry inside an extractor dump.
#[derive(Debug, Clone, Default, Deserialize)]
struct ExtractedEntry {
    id: Option<String>,
    title: Option<String>,
    uploader: Option<String>,
    artist: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    webpage_url: Option<String>,
    url: Option<String>,
    upload_date: Option<String>,
    like_count: Option<u64>,
    view_count: Option<u64>,
}

/// Top-level shape of `--dump-single-json` output. A plain reference
/// yields `formats`/`url`; a search or playlist reference yields
/// `entries`; some providers attach `related_videos`.
#[derive(Debug, Default, Deserialize)]
struct ExtractedInfo {
    url: Option<String>,
    #[serde(default)]
    formats: Vec<MediaFormat>,
    #[serde(default)]
    entries: Vec<ExtractedEntry>,
    #[serde(default)]
    related_videos: Vec<ExtractedEntry>,
}

impl YtDlpResolver {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            binary: config.extractor_bin.clone(),
            timeout: config.fetch_timeout(),
        }
    }

    /// Run the extractor for `reference` and parse its JSON dump.
    async fn extract(&self, reference: &str) -> Result<ExtractedInfo> {
        debug!("extractor invoke ref={}", reference);

        let mut command = Command::new(&self.binary);
        command
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-check-certificates")
            .arg("-f")
            .arg("bestaudio/best")
            .arg(reference)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow!("extractor timed out for {}", reference))?
            .with_context(|| format!("failed to launch extractor '{}'", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "extractor failed ref={} status={} stderr={}",
                reference,
                output.status,
                stderr.trim()
            );
            return Err(anyhow!("extractor exited with {}", output.status));
        }

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("unparsable extractor output for {}", reference))
    }

    /// Expand a bare track id into a provider watch URL; full URLs pass through.
    fn watch_reference(reference: &str) -> String {
        if reference.starts_with("http://") || reference.starts_with("https://") {
            reference.to_string()
        } else {
            format!("https://www.youtube.com/watch?v={}", reference)
        }
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, source_ref: &str) -> Result<Resolution> {
        let info = self.extract(source_ref).await?;
        Ok(Resolution {
            url: info.url,
            formats: info.formats,
        })
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackSummary>> {
        let info = self.extract(&format!("ytsearch{}:{}", limit, query)).await?;
        Ok(info.entries.iter().map(entry_to_summary).collect())
    }

    async fn related(&self, reference: &str) -> Result<Vec<TrackSummary>> {
        let info = self.extract(&Self::watch_reference(reference)).await?;
        let entries = if info.related_videos.is_empty() {
            &info.entries
        } else {
            &info.related_videos
        };
        Ok(entries
            .iter()
            .take(RELATED_LIMIT)
            .map(entry_to_summary)
            .collect())
    }

    /// Artist lookup is a wider search, attributed to the queried name
    /// when the provider omits an uploader.
    async fn artist(&self, name: &str) -> Result<Vec<TrackSummary>> {
        let info = self.extract(&format!("ytsearch20:{}", name)).await?;
        Ok(info
            .entries
            .iter()
            .take(ARTIST_LIMIT)
            .map(|e| {
                let mut track = entry_to_summary(e);
                if track.artist.is_empty() {
                    track.artist = name.to_string();
                }
                track.release_date = e.upload_date.clone();
                track.likes = e.like_count;
                track.popularity = e.view_count;
                track
            })
            .collect())
    }
}

fn entry_to_summary(entry: &ExtractedEntry) -> TrackSummary {
    TrackSummary {
        id: entry.id.clone().or_else(|| entry.webpage_url.clone()),
        title: entry.title.clone(),
        artist: entry
            .uploader
            .clone()
            .or_else(|| entry.artist.clone())
            .unwrap_or_default(),
        thumbnail: entry.thumbnail.clone(),
        duration: entry.duration,
        src: entry.webpage_url.clone().or_else(|| entry.url.clone()),
        release_date: None,
        likes: None,
        popularity: None,
    }
}
