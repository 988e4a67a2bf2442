use std::time::Duration;

use async_trait::async_trait;
use m3u8_rs::Playlist;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use super::{Probe, ProbeOutcome};
use crate::config::DEFAULT_USER_AGENT;

const MEDIA_CONTENT_TYPES: [&str; 6] = [
    "application/vnd.apple.mpegurl",
    "application/x-mpegurl",
    "application/octet-stream",
    "video/",
    "audio/",
    "mpegurl",
];

/// Probe that requests the stream over HTTP and accepts it when the server
/// answers 2xx with a media content type or a non-empty first chunk.
///
/// HLS playlists are parsed so the diagnostics can report their shape.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(user_agent: &str) -> Self {
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(20)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn attempt(&self, url: &str) -> Option<Option<serde_json::Value>> {
        let mut response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(url, error = %e, "HTTP probe request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "HTTP probe got error status");
            return None;
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let media_type = MEDIA_CONTENT_TYPES.iter().any(|t| content_type.contains(t));

        let first_chunk = match response.chunk().await {
            Ok(chunk) => chunk.unwrap_or_default(),
            Err(e) => {
                debug!(url, error = %e, "HTTP probe failed reading body");
                Default::default()
            }
        };

        if !media_type && first_chunk.is_empty() {
            debug!(url, content_type = %content_type, "HTTP probe got empty non-media response");
            return None;
        }

        Some(describe_playlist(&first_chunk))
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENT)
    }
}

/// Diagnostics for a body that starts an HLS playlist, `None` otherwise.
fn describe_playlist(body: &[u8]) -> Option<serde_json::Value> {
    if !body.starts_with(b"#EXTM3U") {
        return None;
    }
    match m3u8_rs::parse_playlist(body) {
        Ok((_, Playlist::MasterPlaylist(pl))) => Some(json!({
            "playlist": "master",
            "variants": pl.variants.len(),
        })),
        Ok((_, Playlist::MediaPlaylist(pl))) => Some(json!({
            "playlist": "media",
            "segments": pl.segments.len(),
            "target_duration": pl.target_duration,
        })),
        Err(_) => None,
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.attempt(url)).await {
            Ok(Some(diagnostics)) => ProbeOutcome::success(started.elapsed(), diagnostics),
            Ok(None) => ProbeOutcome::failure(started.elapsed()),
            Err(_) => {
                debug!(url, timeout_ms = timeout.as_millis(), "HTTP probe timed out");
                ProbeOutcome::failure(started.elapsed())
            }
        }
    }
}
