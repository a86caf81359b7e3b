use serde_json::{Value, json};

use super::CdnBackend;
use crate::config::OtterCloudConfig;
use crate::error::{Error, Result};

pub struct OtterCloudCdn {
    config: OtterCloudConfig,
    client: reqwest::blocking::Client,
}

impl OtterCloudCdn {
    pub fn new(config: OtterCloudConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: reqwest::blocking::Client::builder().build()?,
        })
    }

    /// Short-lived admin token minted per purge call.
    fn access_token(&self) -> Result<String> {
        let response: Value = self
            .client
            .post(format!(
                "https://{}/APIAccessTokenService/getAPIAccessToken",
                self.config.host
            ))
            .json(&json!({
                "type": "admin",
                "accessKeyId": self.config.access_id,
                "accessKey": self.config.access_key,
            }))
            .send()?
            .error_for_status()?
            .json()?;
        response
            .pointer("/data/token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Purge {
                backend: "ottercloud",
                reason: "token response missing data.token".to_string(),
            })
    }
}

impl CdnBackend for OtterCloudCdn {
    fn name(&self) -> &'static str {
        "ottercloud"
    }

    fn purge(&self, urls: &[String]) -> Result<()> {
        let token = self.access_token()?;
        let response: Value = self
            .client
            .post(format!(
                "https://{}/HTTPCacheTaskService/createHTTPCacheTask",
                self.config.host
            ))
            .header("X-Edge-Access-Token", token)
            .json(&json!({
                "type": "purge",
                "keyType": "key",
                "keys": urls,
            }))
            .send()?
            .error_for_status()?
            .json()?;
        let code = response.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 200 {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(Error::Purge {
                backend: "ottercloud",
                reason: format!("cache task rejected ({code}): {message}"),
            });
        }
        Ok(())
    }
}
