//! Cookie export from a CookieCloud server.
//!
//! yt-dlp needs logged-in cookies for some Bilibili videos. CookieCloud
//! keeps browser cookies on a server; this adapter fetches them and writes
//! a Netscape cookie file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::config::CookieCloudSettings;

const NETSCAPE_HEADER: &str =
    "# Netscape HTTP Cookie File\n# Domain\tIncludeSubdomains\tPath\tSecure\tExpiry\tName\tValue\n\n";

/// A browser cookie as stored by CookieCloud
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCookie {
    pub domain: String,
    pub name: String,
    pub value: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub host_only: bool,
    #[serde(default)]
    pub expiration_date: Option<f64>,
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Deserialize)]
struct CloudPayload {
    #[serde(default)]
    cookie_data: BTreeMap<String, Vec<CloudCookie>>,
}

/// Client for a CookieCloud server
pub struct CookieCloudClient {
    client: reqwest::Client,
    server: String,
    key: String,
    password: String,
}

impl CookieCloudClient {
    pub fn new(
        server: impl Into<String>,
        key: impl Into<String>,
        password: impl Into<String>,
        http_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            server: server.into().trim_end_matches('/').to_string(),
            key: key.into(),
            password: password.into(),
        })
    }

    pub fn from_settings(settings: &CookieCloudSettings, http_timeout: Duration) -> Result<Self> {
        let server = settings
            .server
            .as_deref()
            .context("COOKIE_CLOUD_SERVER is not set")?;
        let key = settings.key.as_deref().context("COOKIE_CLOUD_KEY is not set")?;
        let password = settings
            .password
            .as_deref()
            .context("COOKIE_CLOUD_PASS is not set")?;
        Self::new(server, key, password, http_timeout)
    }

    /// Fetch every cookie, grouped by domain
    #[instrument(skip(self), fields(server = %self.server))]
    pub async fn fetch(&self) -> Result<BTreeMap<String, Vec<CloudCookie>>> {
        let url = format!("{}/get/{}", self.server, self.key);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "password": self.password }))
            .send()
            .await
            .context("Failed to reach cookie server")?
            .error_for_status()
            .context("Cookie server returned an error")?;

        let payload: CloudPayload = response
            .json()
            .await
            .context("Failed to parse cookie server response")?;
        Ok(payload.cookie_data)
    }

    /// Write the cookies of `root_domain` to `path`
    ///
    /// An existing file is left alone unless `force` is set. Returns whether
    /// a file was written.
    pub async fn export(
        &self,
        path: &Path,
        root_domain: &str,
        no_subdomain: bool,
        force: bool,
    ) -> Result<bool> {
        if path.exists() && !force {
            info!(path = %path.display(), "Cookie file already exists");
            return Ok(false);
        }

        info!("Fetching cookies from cloud server");
        let cookies = self.fetch().await?;
        let content = netscape_format(&cookies, root_domain, no_subdomain);

        crate::core::storage::write_atomic(path, content.into_bytes())
            .await
            .with_context(|| format!("Failed to write cookie file: {}", path.display()))?;
        Ok(true)
    }
}

/// Render cookies of domains ending with `root_domain` as a Netscape file
pub fn netscape_format(
    cookies: &BTreeMap<String, Vec<CloudCookie>>,
    root_domain: &str,
    no_subdomain: bool,
) -> String {
    let mut out = String::from(NETSCAPE_HEADER);

    for (domain, list) in cookies {
        if !domain.ends_with(root_domain) {
            continue;
        }
        for cookie in list {
            if no_subdomain && cookie.host_only {
                warn!(domain = %cookie.domain, "Skip host-only cookie");
                continue;
            }
            info!(name = %cookie.name, domain = %cookie.domain, "Export cookie");
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                cookie.domain,
                if cookie.host_only { "FALSE" } else { "TRUE" },
                cookie.path,
                if cookie.secure { "TRUE" } else { "FALSE" },
                cookie.expiration_date.unwrap_or(0.0).round() as i64,
                cookie.name,
                cookie.value,
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookies() -> BTreeMap<String, Vec<CloudCookie>> {
        let json = r#"{
            ".bilibili.com": [
                {"domain": ".bilibili.com", "name": "SESSDATA", "value": "s1", "path": "/",
                 "secure": true, "hostOnly": false, "expirationDate": 1735689600.4}
            ],
            "www.bilibili.com": [
                {"domain": "www.bilibili.com", "name": "host", "value": "h", "path": "/",
                 "secure": false, "hostOnly": true}
            ],
            ".youtube.com": [
                {"domain": ".youtube.com", "name": "SID", "value": "y", "path": "/",
                 "secure": true, "hostOnly": false}
            ]
        }"#;
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_netscape_lines() {
        let out = netscape_format(&cookies(), "bilibili.com", false);

        assert!(out.starts_with("# Netscape HTTP Cookie File\n"));
        assert!(out.contains(".bilibili.com\tTRUE\t/\tTRUE\t1735689600\tSESSDATA\ts1\n"));
        assert!(out.contains("www.bilibili.com\tFALSE\t/\tFALSE\t0\thost\th\n"));
        assert!(!out.contains("youtube"));
    }

    #[test]
    fn test_no_subdomain_skips_host_only() {
        let out = netscape_format(&cookies(), "bilibili.com", true);
        assert!(out.contains("SESSDATA"));
        assert!(!out.contains("\thost\t"));
    }
}
