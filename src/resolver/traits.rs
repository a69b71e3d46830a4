use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One playable format advertised by the provider for a resolved reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFormat {
    pub format_id: Option<String>,
    pub acodec: Option<String>,
    pub url: Option<String>,
}

impl MediaFormat {
    /// A format counts as audio-bearing when the provider attached any
    /// non-empty codec marker. Providers list formats in ascending
    /// quality order, which the selection below relies on.
    fn has_audio_marker(&self) -> bool {
        self.acodec.as_deref().is_some_and(|a| !a.is_empty())
    }

    fn usable_url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Outcome of resolving a source reference: the provider's format list
/// plus an optional top-level direct URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resolution {
    pub url: Option<String>,
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}

impl Resolution {
    /// Pick the direct URL to stream: the last format carrying both an
    /// audio codec marker and a URL, else the top-level URL. The
    /// last-wins scan assumes provider order is worst-to-best and is
    /// kept as-is for provider compatibility.
    pub fn audio_url(&self) -> Option<&str> {
        self.formats
            .iter()
            .rev()
            .find_map(|f| {
                if f.has_audio_marker() {
                    f.usable_url()
                } else {
                    None
                }
            })
            .or_else(|| self.url.as_deref().filter(|u| !u.is_empty()))
    }
}

/// A track as returned by the metadata endpoints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackSummary {
    pub id: Option<String>,
    pub title: Option<String>,
    pub artist: String,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub src: Option<String>,
    #[serde(rename = "releaseDate", skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub likes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u64>,
}

/// External capability that turns a source reference into a direct
/// media URL and answers metadata queries about the same catalog.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolve a source reference to its direct URL and format list.
    async fn resolve(&self, source_ref: &str) -> Result<Resolution>;

    /// Full-text search over the provider catalog.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackSummary>>;

    /// Entries related to a reference (a source URL or a bare track id).
    async fn related(&self, reference: &str) -> Result<Vec<TrackSummary>>;

    /// Tracks attributed to an artist name, enriched with release and
    /// popularity fields where the provider supplies them.
    async fn artist(&self, name: &str) -> Result<Vec<TrackSummary>>;
}
