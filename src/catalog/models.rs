use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Netease,
    Qq,
    Kuwo,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Netease, Platform::Qq, Platform::Kuwo];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Netease => "netease",
            Platform::Qq => "qq",
            Platform::Kuwo => "kuwo",
        }
    }

    /// Whether plain-HTTP media from this platform must go through the proxy
    /// when the player itself is served over a secure origin.
    pub fn needs_proxy(self) -> bool {
        matches!(self, Platform::Kuwo)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow::anyhow!("unknown platform: {s}"))
    }
}

/// Stream quality tier, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "128k")]
    Low,
    #[default]
    #[serde(rename = "320k")]
    Standard,
    #[serde(rename = "flac")]
    Lossless,
    #[serde(rename = "flac24bit")]
    HiRes,
}

impl Quality {
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Low => "128k",
            Quality::Standard => "320k",
            Quality::Lossless => "flac",
            Quality::HiRes => "flac24bit",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Quality::Low => Quality::Standard,
            Quality::Standard => Quality::Lossless,
            Quality::Lossless => Quality::HiRes,
            Quality::HiRes => Quality::Low,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "128k" | "low" => Ok(Quality::Low),
            "320k" | "standard" => Ok(Quality::Standard),
            "flac" | "lossless" => Ok(Quality::Lossless),
            "flac24bit" | "hires" | "hi-res" => Ok(Quality::HiRes),
            other => anyhow::bail!("unknown quality: {other}"),
        }
    }
}

/// Identity of a track across the catalog: `(platform, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackKey {
    pub platform: Platform,
    pub id: String,
}

impl TrackKey {
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.platform, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub platform: Platform,
    pub id: String,
    pub name: String,
    pub artist: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pic: Option<String>,
}

impl Track {
    pub fn key(&self) -> TrackKey {
        TrackKey::new(self.platform, self.id.clone())
    }

    pub fn is(&self, key: &TrackKey) -> bool {
        self.platform == key.platform && self.id == key.id
    }

    pub fn display_name(&self) -> String {
        if self.artist.is_empty() {
            self.name.clone()
        } else {
            format!("{} - {}", self.name, self.artist)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_uses_wire_names() {
        let json = serde_json::to_string(&Quality::HiRes).unwrap();
        assert_eq!(json, "\"flac24bit\"");
        assert_eq!("320k".parse::<Quality>().unwrap(), Quality::Standard);
        assert_eq!(Quality::HiRes.next(), Quality::Low);
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("KuWo".parse::<Platform>().unwrap(), Platform::Kuwo);
        assert!("spotify".parse::<Platform>().is_err());
        assert!(Platform::Kuwo.needs_proxy());
        assert!(!Platform::Qq.needs_proxy());
    }

    #[test]
    fn key_display_matches_store_key() {
        let key = TrackKey::new(Platform::Qq, "0039MnYb0qxYhV");
        assert_eq!(key.to_string(), "qq+0039MnYb0qxYhV");
    }
}
