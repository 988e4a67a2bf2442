use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{is_remote, PlaylistSource, SourceError};

/// Playlist source backed by a pooled HTTP client, with retries and backoff
/// for remote playlists. Anything that is not an http(s) URL is read from
/// the local filesystem.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    max_retries: u32,
    base_backoff: Duration,
}

impl HttpSource {
    pub fn new(timeout: Duration, max_retries: u32, base_backoff: Duration) -> Self {
        Self::with_client(Self::build_client(timeout), max_retries, base_backoff)
    }

    pub fn with_client(client: Client, max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            client,
            max_retries,
            base_backoff,
        }
    }

    pub fn build_client(timeout: Duration) -> Client {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_max_idle_per_host(20)
            .gzip(true)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            })
    }

    async fn fetch(&self, url: &str) -> Result<String, SourceError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.base_backoff * 2u32.saturating_pow(attempt - 1);
                debug!(url, attempt, backoff_ms = backoff.as_millis(), "Retrying playlist fetch");
                tokio::time::sleep(backoff).await;
            }

            match self.client.get(url).send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => {
                                last_error = Some(SourceError::Network {
                                    url: url.to_string(),
                                    reason: e.to_string(),
                                });
                            }
                        }
                    } else {
                        let status = response.status().as_u16();
                        let message = response
                            .status()
                            .canonical_reason()
                            .unwrap_or("Unknown")
                            .to_string();
                        warn!(url, status, attempt, "Playlist fetch returned error status");
                        let err = SourceError::Http {
                            url: url.to_string(),
                            status,
                            message,
                        };

                        if (400..500).contains(&status) && status != 429 {
                            return Err(err);
                        }
                        last_error = Some(err);
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        warn!(url, attempt, "Playlist fetch timed out");
                        last_error = Some(SourceError::Timeout {
                            url: url.to_string(),
                        });
                    } else {
                        warn!(url, attempt, error = %e, "Playlist fetch network error");
                        last_error = Some(SourceError::Network {
                            url: url.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Network {
            url: url.to_string(),
            reason: "no attempt was made".to_string(),
        }))
    }

    async fn read_file(path: &str) -> Result<String, SourceError> {
        tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                SourceError::NotFound {
                    path: path.to_string(),
                }
            } else {
                SourceError::Io {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

impl Default for HttpSource {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), 2, Duration::from_millis(250))
    }
}

#[async_trait]
impl PlaylistSource for HttpSource {
    async fn load(&self, source: &str) -> Result<String, SourceError> {
        if is_remote(source) {
            self.fetch(source).await
        } else {
            Self::read_file(source).await
        }
    }
}
