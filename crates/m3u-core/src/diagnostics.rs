//! Per-channel persistence of probe diagnostics.
//!
//! Each successful probe payload lands in `<dir>/<sanitized url>.json`.
//! Distinct URLs that sanitize to the same name overwrite each other.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("Failed to create diagnostics directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize diagnostics for {url}: {source}")]
    Serialize {
        url: String,
        source: serde_json::Error,
    },
    #[error("Failed to write diagnostics file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Map the characters that are unsafe in file names (`/`, `:`, `?`) to `_`.
pub fn sanitize_url(url: &str) -> String {
    url.chars()
        .map(|c| match c {
            '/' | ':' | '?' => '_',
            other => other,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct DiagnosticsWriter {
    dir: PathBuf,
}

impl DiagnosticsWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_url(url)))
    }

    /// Write `payload` for `url`, creating the directory if needed.
    pub async fn write(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<PathBuf, DiagnosticsError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| DiagnosticsError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let body =
            serde_json::to_vec_pretty(payload).map_err(|source| DiagnosticsError::Serialize {
                url: url.to_string(),
                source,
            })?;

        let path = self.path_for(url);
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| DiagnosticsError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("m3u-diag-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(
            sanitize_url("http://host:8080/live/ch1.m3u8?token=a"),
            "http___host_8080_live_ch1.m3u8_token=a"
        );
    }

    #[tokio::test]
    async fn write_creates_directory_and_file() {
        let dir = temp_dir().join("nested");
        let writer = DiagnosticsWriter::new(&dir);
        let payload = json!({"streams": [{"codec_name": "h264", "width": 1920, "height": 1080}]});

        let path = writer.write("http://a/b.ts", &payload).await.unwrap();
        assert_eq!(path, dir.join("http___a_b.ts.json"));

        let written: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(written, payload);

        tokio::fs::remove_dir_all(dir.parent().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn colliding_urls_keep_last_write() {
        let dir = temp_dir();
        let writer = DiagnosticsWriter::new(&dir);
        writer.write("http://a/b", &json!({"n": 1})).await.unwrap();
        let path = writer.write("http:/?a/b", &json!({"n": 2})).await.unwrap();
        assert_eq!(path, writer.path_for("http://a/b"));

        let written: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(written["n"], 2);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn write_fails_when_directory_is_a_file() {
        let file = temp_dir();
        tokio::fs::write(&file, b"x").await.unwrap();
        let writer = DiagnosticsWriter::new(&file);

        let err = writer.write("http://a/b", &json!({})).await.unwrap_err();
        assert!(matches!(err, DiagnosticsError::CreateDir { .. }));

        tokio::fs::remove_file(&file).await.unwrap();
    }
}
