use serde::Deserialize;
use serde_json::json;

use super::{CdnBackend, host_of};
use crate::config::CloudflareConfig;
use crate::error::{Error, Result};

const API_ROOT: &str = "https://api.cloudflare.com/client/v4";

pub struct CloudflareCdn {
    config: CloudflareConfig,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct ZonesResponse {
    #[serde(default)]
    result: Vec<Zone>,
}

#[derive(Deserialize)]
struct Zone {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    success: bool,
}

impl CloudflareCdn {
    pub fn new(config: CloudflareConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: reqwest::blocking::Client::builder().build()?,
        })
    }

    /// Pinned zone id from configuration, or the zone whose name suffixes
    /// the first URL's host.
    fn zone_id(&self, url: &str) -> Result<String> {
        if let Some(zone_id) = &self.config.zone_id {
            return Ok(zone_id.clone());
        }
        let host = host_of(url);
        let zones: ZonesResponse = self
            .client
            .get(format!("{API_ROOT}/zones?per_page=100"))
            .bearer_auth(&self.config.token)
            .send()?
            .error_for_status()?
            .json()?;
        zones
            .result
            .into_iter()
            .find(|zone| host.ends_with(&zone.name))
            .map(|zone| zone.id)
            .ok_or_else(|| Error::Purge {
                backend: "cloudflare",
                reason: format!("no zone matches host {host}"),
            })
    }
}

impl CdnBackend for CloudflareCdn {
    fn name(&self) -> &'static str {
        "cloudflare"
    }

    fn purge(&self, urls: &[String]) -> Result<()> {
        let Some(first) = urls.first() else {
            return Ok(());
        };
        let zone_id = self.zone_id(first)?;
        let response: ApiResponse = self
            .client
            .post(format!("{API_ROOT}/zones/{zone_id}/purge_cache"))
            .bearer_auth(&self.config.token)
            .json(&json!({ "files": urls }))
            .send()?
            .error_for_status()?
            .json()?;
        if !response.success {
            return Err(Error::Purge {
                backend: "cloudflare",
                reason: "purge_cache reported failure".to_string(),
            });
        }
        Ok(())
    }
}
