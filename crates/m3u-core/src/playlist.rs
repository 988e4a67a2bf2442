//! M3U playlist model, parser and writer.
//!
//! The parser keeps the original `#EXTINF` and `#EXTGRP` lines of every entry
//! so that output playlists can reproduce them verbatim.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("Playlist contains no channel URLs")]
    Empty,
}

/// One streaming endpoint from a playlist. Never mutated by the checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: usize,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extinf: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extgrp: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Channel {
    pub fn new(id: usize, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            group: None,
            extinf: None,
            extgrp: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Default)]
struct PendingEntry {
    extinf: String,
    title: String,
    attributes: BTreeMap<String, String>,
    extgrp: Option<String>,
}

/// Parse M3U text into channels, numbered from 1 in playlist order.
///
/// Duplicate URLs are kept as independent channels.
pub fn parse_playlist(text: &str) -> Result<Vec<Channel>, PlaylistError> {
    let mut channels = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            let (attributes, title) = parse_extinf(rest);
            pending = Some(PendingEntry {
                extinf: line.to_string(),
                title,
                attributes,
                extgrp: None,
            });
        } else if let Some(group) = line.strip_prefix("#EXTGRP:") {
            if let Some(entry) = pending.as_mut() {
                entry.extgrp = Some(group.trim().to_string());
            }
        } else if line.starts_with('#') {
            continue;
        } else {
            let id = channels.len() + 1;
            let channel = match pending.take() {
                Some(entry) => {
                    let name = if entry.title.is_empty() {
                        name_from_url(line)
                    } else {
                        entry.title
                    };
                    let group = entry
                        .attributes
                        .get("group-title")
                        .filter(|g| !g.is_empty())
                        .cloned()
                        .or_else(|| entry.extgrp.clone());
                    Channel {
                        id,
                        name,
                        url: line.to_string(),
                        group,
                        extinf: Some(entry.extinf),
                        extgrp: entry.extgrp,
                        attributes: entry.attributes,
                    }
                }
                None => Channel::new(id, name_from_url(line), line),
            };
            channels.push(channel);
        }
    }

    if channels.is_empty() {
        return Err(PlaylistError::Empty);
    }
    Ok(channels)
}

/// Split the part after `#EXTINF:` into its `key="value"` attributes and the
/// title following the first unquoted comma.
fn parse_extinf(rest: &str) -> (BTreeMap<String, String>, String) {
    let mut in_quotes = false;
    let mut split_at = None;
    for (i, c) in rest.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                split_at = Some(i);
                break;
            }
            _ => {}
        }
    }

    let (head, title) = match split_at {
        Some(i) => (&rest[..i], rest[i + 1..].trim()),
        None => (rest, ""),
    };

    (parse_attributes(head), title.to_string())
}

fn parse_attributes(head: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    let mut rest = head;

    while let Some(eq) = rest.find("=\"") {
        let key = rest[..eq]
            .rsplit(|c: char| c.is_whitespace())
            .next()
            .unwrap_or_default()
            .trim();
        let after = &rest[eq + 2..];
        let Some(end) = after.find('"') else {
            break;
        };
        if !key.is_empty() {
            attributes.insert(key.to_ascii_lowercase(), after[..end].to_string());
        }
        rest = &after[end + 1..];
    }

    attributes
}

fn name_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(url)
        .to_string()
}

/// Render channels as an extended M3U document.
pub fn render_playlist<'a>(channels: impl IntoIterator<Item = &'a Channel>) -> String {
    let mut out = String::from("#EXTM3U\n");

    for ch in channels {
        match ch.extinf.as_deref() {
            Some(extinf) => match split_extinf_title(extinf) {
                Some(head) => {
                    let _ = writeln!(out, "{},{}", head, ch.name);
                }
                None => {
                    let _ = writeln!(out, "{},{}", extinf, ch.name);
                }
            },
            None => {
                let mut attrs = Vec::new();
                for key in ["tvg-id", "tvg-name", "tvg-logo"] {
                    if let Some(v) = ch.attribute(key) {
                        attrs.push(format!("{}=\"{}\"", key, v));
                    }
                }
                if let Some(group) = ch.group.as_deref().filter(|g| !g.is_empty()) {
                    attrs.push(format!("group-title=\"{}\"", group));
                }
                if attrs.is_empty() {
                    let _ = writeln!(out, "#EXTINF:-1,{}", ch.name);
                } else {
                    let _ = writeln!(out, "#EXTINF:-1 {},{}", attrs.join(" "), ch.name);
                }
            }
        }
        if let Some(extgrp) = ch.extgrp.as_deref() {
            let _ = writeln!(out, "#EXTGRP:{}", extgrp);
        }
        let _ = writeln!(out, "{}", ch.url);
    }

    out
}

/// The EXTINF line up to (not including) the comma that starts its title.
fn split_extinf_title(extinf: &str) -> Option<&str> {
    let mut in_quotes = false;
    for (i, c) in extinf.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return Some(&extinf[..i]),
            _ => {}
        }
    }
    None
}
