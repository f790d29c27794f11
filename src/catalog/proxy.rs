use super::models::Platform;

/// Rewrites media URLs that a secure page could not load directly.
#[derive(Debug, Clone)]
pub struct ProxyRule {
    /// Whether the player is served over a secure origin.
    pub secure_origin: bool,
    /// Same-origin path that fetches `?url=` on the player's behalf.
    pub proxy_path: String,
}

impl ProxyRule {
    pub fn new(secure_origin: bool, proxy_path: impl Into<String>) -> Self {
        Self {
            secure_origin,
            proxy_path: proxy_path.into(),
        }
    }

    /// Stream or artwork URL as the media element should see it.
    ///
    /// Only the proxied platform's plain-HTTP URLs are rewritten, and only when
    /// the origin is secure. Everything else passes through unchanged.
    pub fn rewrite(&self, platform: Platform, url: &str) -> String {
        if platform.needs_proxy() && self.secure_origin && url.starts_with("http://") {
            format!("{}?url={}", self.proxy_path, urlencoding::encode(url))
        } else {
            url.to_string()
        }
    }
}

impl Default for ProxyRule {
    fn default() -> Self {
        Self::new(false, "/api/music/proxy")
    }
}
