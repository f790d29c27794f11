//! The catalog collaborator: track identity, quality tiers and stream resolution.

pub mod models;
pub mod proxy;
pub mod resolve;

pub use models::{Platform, Quality, Track, TrackKey};
pub use proxy::ProxyRule;
pub use resolve::{CatalogClient, Resolution, ResolveError, ResolveRequest};

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// A track as listed by the catalog browser. Listings for a single platform
/// usually leave the platform out.
#[derive(Debug, Deserialize)]
struct ListedTrack {
    platform: Option<Platform>,
    id: String,
    name: String,
    #[serde(default)]
    artist: String,
    album: Option<String>,
    pic: Option<String>,
}

/// Read a JSON array of tracks, filling in `platform` where it is missing.
pub fn read_track_list(path: &Path, platform: Platform) -> anyhow::Result<Vec<Track>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    parse_track_list(&raw, platform).with_context(|| format!("parse {}", path.display()))
}

fn parse_track_list(raw: &str, platform: Platform) -> anyhow::Result<Vec<Track>> {
    let listed: Vec<ListedTrack> = serde_json::from_str(raw)?;
    Ok(listed
        .into_iter()
        .map(|t| Track {
            platform: t.platform.unwrap_or(platform),
            id: t.id,
            name: t.name,
            artist: t.artist,
            album: t.album,
            pic: t.pic,
        })
        .collect())
}
