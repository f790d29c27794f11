use super::models::{Quality, TrackKey};
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Why a track could not be turned into a playable stream.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("catalog returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("catalog returned error code {0}")]
    Api(i64),

    #[error("no usable stream for {0}")]
    NoStream(TrackKey),
}

/// A successful answer from the catalog for one track.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub url: String,
    pub lyrics: Option<String>,
    pub cover: Option<String>,
}

/// One outstanding resolution, tagged with the track it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub key: TrackKey,
    pub quality: Quality,
    /// Monotonic per session; a later `play()` always carries a larger ticket.
    pub ticket: u64,
}

#[derive(Debug, Deserialize)]
struct ParseEnvelope {
    code: i64,
    #[serde(default)]
    data: Option<ParseData>,
}

#[derive(Debug, Deserialize)]
struct ParseData {
    #[serde(default)]
    data: Vec<ParsedSong>,
}

#[derive(Debug, Deserialize)]
struct ParsedSong {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    lyrics: Option<String>,
    #[serde(default)]
    cover: Option<String>,
}

/// Client for the catalog's `parse` action.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
}

impl CatalogClient {
    const USER_AGENT: &'static str = concat!("reprise/", env!("CARGO_PKG_VERSION"));

    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(timeout)
            .build()
            .context("build reqwest client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    pub async fn resolve(&self, key: &TrackKey, quality: Quality) -> Result<Resolution, ResolveError> {
        let body = json!({
            "action": "parse",
            "platform": key.platform.as_str(),
            "ids": key.id,
            "quality": quality.as_str(),
        });

        let response = self.http.post(&self.base_url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::Status(response.status()));
        }
        let envelope: ParseEnvelope = response.json().await?;
        pick_resolution(envelope, key)
    }
}

fn pick_resolution(envelope: ParseEnvelope, key: &TrackKey) -> Result<Resolution, ResolveError> {
    if envelope.code != 0 {
        return Err(ResolveError::Api(envelope.code));
    }
    let song = envelope
        .data
        .and_then(|d| d.data.into_iter().next())
        .ok_or_else(|| ResolveError::NoStream(key.clone()))?;

    match song.url {
        Some(url) if song.success && !url.trim().is_empty() => Ok(Resolution {
            url,
            lyrics: song.lyrics.filter(|l| !l.trim().is_empty()),
            cover: song.cover.filter(|c| !c.trim().is_empty()),
        }),
        _ => Err(ResolveError::NoStream(key.clone())),
    }
}
