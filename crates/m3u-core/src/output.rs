//! Writes the classified channels of a run back out as playlists.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::checker::{ChannelResult, ChannelStatus, CheckReport};
use crate::playlist::render_playlist;

pub const ALIVE_FILE: &str = "alive_channels.m3u";
pub const DEAD_FILE: &str = "dead_channels.m3u";
pub const UNSTABLE_FILE: &str = "unstable_channels.m3u";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Paths of the playlists written for a run. `None` when the partition was
/// empty and no file was written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputFiles {
    pub alive: Option<PathBuf>,
    pub dead: Option<PathBuf>,
    pub unstable: Option<PathBuf>,
}

/// Channels that belong in the alive playlist: ALIVE ones plus UNSTABLE ones
/// that were never retested.
pub fn alive_partition(report: &CheckReport) -> Vec<&ChannelResult> {
    report
        .sorted_by_channel()
        .into_iter()
        .filter(|r| match r.status {
            ChannelStatus::Alive => true,
            ChannelStatus::Unstable => !r.retested,
            ChannelStatus::Dead => false,
        })
        .collect()
}

/// Render the alive playlist of `report` without touching the filesystem.
pub fn render_alive(report: &CheckReport) -> String {
    render_playlist(alive_partition(report).into_iter().map(|r| &r.channel))
}

pub async fn write_outputs(report: &CheckReport, dir: &Path) -> Result<OutputFiles, OutputError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| OutputError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

    let sorted = report.sorted_by_channel();
    let alive = alive_partition(report);
    let dead: Vec<&ChannelResult> = sorted
        .iter()
        .copied()
        .filter(|r| r.status == ChannelStatus::Dead)
        .collect();
    let recovered: Vec<&ChannelResult> = sorted
        .iter()
        .copied()
        .filter(|r| r.retested && r.status == ChannelStatus::Alive)
        .collect();

    Ok(OutputFiles {
        alive: write_partition(dir, ALIVE_FILE, "alive", &alive).await?,
        dead: write_partition(dir, DEAD_FILE, "dead", &dead).await?,
        unstable: write_partition(dir, UNSTABLE_FILE, "unstable", &recovered).await?,
    })
}

async fn write_partition(
    dir: &Path,
    file: &str,
    label: &str,
    results: &[&ChannelResult],
) -> Result<Option<PathBuf>, OutputError> {
    if results.is_empty() {
        info!("No {} channels found", label);
        return Ok(None);
    }
    let path = dir.join(file);
    let body = render_playlist(results.iter().map(|r| &r.channel));
    tokio::fs::write(&path, body)
        .await
        .map_err(|source| OutputError::Write {
            path: path.clone(),
            source,
        })?;
    info!(path = %path.display(), channels = results.len(), "Saved {} channels", label);
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::{parse_playlist, Channel};
    use chrono::Utc;
    use uuid::Uuid;

    fn report(results: Vec<ChannelResult>) -> CheckReport {
        CheckReport {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results,
            batches: 1,
            final_timeout_secs: 10.0,
        }
    }

    fn result(id: usize, successes: u32) -> ChannelResult {
        ChannelResult::from_counts(
            Channel::new(id, format!("Channel {}", id), format!("http://example.com/{}.ts", id)),
            10,
            successes,
            0.7,
        )
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("m3u-output-{}", Uuid::new_v4()))
    }

    async fn names(path: &Path) -> Vec<String> {
        let text = tokio::fs::read_to_string(path).await.unwrap();
        parse_playlist(&text)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect()
    }

    #[tokio::test]
    async fn partitions_without_retest() {
        let dir = temp_dir();
        let report = report(vec![result(3, 0), result(1, 10), result(2, 3)]);
        let files = write_outputs(&report, &dir).await.unwrap();

        assert_eq!(
            names(files.alive.as_ref().unwrap()).await,
            vec!["Channel 1", "Channel 2"]
        );
        assert_eq!(names(files.dead.as_ref().unwrap()).await, vec!["Channel 3"]);
        assert!(files.unstable.is_none());
        assert!(!dir.join(UNSTABLE_FILE).exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn retested_channels_move_to_their_own_files() {
        let dir = temp_dir();
        let mut recovered = result(1, 3);
        recovered.retested = true;
        recovered.status = ChannelStatus::Alive;
        let mut failed = result(2, 3);
        failed.retested = true;
        failed.status = ChannelStatus::Dead;

        let report = report(vec![recovered, failed, result(3, 9)]);
        let files = write_outputs(&report, &dir).await.unwrap();

        // recovered channels are ALIVE, so they appear in both files
        assert_eq!(
            names(files.alive.as_ref().unwrap()).await,
            vec!["Channel 1", "Channel 3"]
        );
        assert_eq!(names(files.dead.as_ref().unwrap()).await, vec!["Channel 2"]);
        assert_eq!(
            names(files.unstable.as_ref().unwrap()).await,
            vec!["Channel 1"]
        );

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn empty_report_writes_nothing() {
        let dir = temp_dir();
        let files = write_outputs(&report(Vec::new()), &dir).await.unwrap();
        assert_eq!(files, OutputFiles::default());
        assert!(dir.exists());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn render_alive_skips_dead() {
        let text = render_alive(&report(vec![result(1, 10), result(2, 0)]));
        assert!(text.starts_with("#EXTM3U\n"));
        assert!(text.contains("http://example.com/1.ts"));
        assert!(!text.contains("http://example.com/2.ts"));
    }
}
