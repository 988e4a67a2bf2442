mod http;

pub use http::HttpSource;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::playlist::{parse_playlist, Channel, PlaylistError};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Playlist file not found: {path}")]
    NotFound { path: String },
    #[error("Failed to read playlist file {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("HTTP error {status} fetching {url}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Timeout fetching {url}")]
    Timeout { url: String },
    #[error("Failed to parse playlist {source_name}: {reason}")]
    Parse {
        source_name: String,
        #[source]
        reason: PlaylistError,
    },
}

impl SourceError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Trait for reading the raw text of a playlist from a URL or file path.
///
/// The trait is object-safe and Send + Sync for use across async tasks.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn load(&self, source: &str) -> Result<String, SourceError>;
}

/// Whether `source` names a remote playlist rather than a local file.
pub fn is_remote(source: &str) -> bool {
    url::Url::parse(source)
        .map(|u| u.scheme() == "http" || u.scheme() == "https")
        .unwrap_or(false)
}

/// Load and parse the channels of `source`. Any failure is fatal to a run.
pub async fn load_channels(
    loader: &dyn PlaylistSource,
    source: &str,
) -> Result<Vec<Channel>, SourceError> {
    let text = loader.load(source).await?;
    let channels = parse_playlist(&text).map_err(|reason| SourceError::Parse {
        source_name: source.to_string(),
        reason,
    })?;
    info!(source, channels = channels.len(), "Playlist loaded");
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource(&'static str);

    #[async_trait]
    impl PlaylistSource for StaticSource {
        async fn load(&self, _source: &str) -> Result<String, SourceError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("http://example.com/list.m3u"));
        assert!(is_remote("https://example.com/list.m3u"));
        assert!(!is_remote("/tmp/list.m3u"));
        assert!(!is_remote("list.m3u"));
        assert!(!is_remote("ftp://example.com/list.m3u"));
    }

    #[tokio::test]
    async fn load_channels_parses_text() {
        let source = StaticSource("#EXTM3U\n#EXTINF:-1,One\nhttp://a/1.ts\n");
        let channels = load_channels(&source, "static").await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "One");
    }

    #[tokio::test]
    async fn load_channels_reports_parse_failure() {
        let source = StaticSource("#EXTM3U\n");
        let err = load_channels(&source, "static").await.unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
        assert!(err.to_string().contains("static"));
    }
}
