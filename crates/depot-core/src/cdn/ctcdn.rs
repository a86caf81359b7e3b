use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;

use super::CdnBackend;
use crate::config::CtcdnConfig;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const API_HOST: &str = "open.ctcdn.cn";
const PURGE_PATH: &str = "/v1/refreshmanage/create";

pub struct CtCdn {
    config: CtcdnConfig,
    client: reqwest::blocking::Client,
}

impl CtCdn {
    pub fn new(config: CtcdnConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: reqwest::blocking::Client::builder().build()?,
        })
    }

    /// Double HMAC: the secret key first signs `ak:{day}` (the day-bucketed
    /// intermediate key), which then signs `ak\n{now_ms}\n{path}`.
    fn signature(&self, path: &str, now_ms: u128) -> Result<String> {
        let day_bucket = now_ms / 86_400_000;
        let intermediate = sign(
            &self.config.secret_key,
            &format!("{}:{day_bucket}", self.config.access_key),
        )?;
        sign(
            &intermediate,
            &format!("{}\n{now_ms}\n{path}", self.config.access_key),
        )
    }
}

/// Base64url HMAC-SHA256; keys are themselves transported base64url-encoded.
fn sign(key_b64: &str, content: &str) -> Result<String> {
    let key = URL_SAFE_NO_PAD
        .decode(key_b64.trim_end_matches('='))
        .map_err(|err| Error::Purge {
            backend: "ctcdn",
            reason: format!("invalid signing key: {err}"),
        })?;
    let mut mac = HmacSha256::new_from_slice(&key).map_err(|err| Error::Purge {
        backend: "ctcdn",
        reason: err.to_string(),
    })?;
    mac.update(content.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

impl CdnBackend for CtCdn {
    fn name(&self) -> &'static str {
        "ctcdn"
    }

    fn purge(&self, urls: &[String]) -> Result<()> {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_millis())
            .unwrap_or(0);
        let signature = self.signature(PURGE_PATH, now_ms)?;
        let response: Value = self
            .client
            .post(format!("https://{API_HOST}{PURGE_PATH}"))
            .header("x-alogic-now", now_ms.to_string())
            .header("x-alogic-app", &self.config.access_key)
            .header("x-alogic-signature", signature)
            .header("x-alogic-ac", "app")
            .json(&json!({ "values": urls, "task_type": 1 }))
            .send()?
            .error_for_status()?
            .json()?;
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if message != "success" {
            return Err(Error::Purge {
                backend: "ctcdn",
                reason: format!("refresh task rejected: {message}"),
            });
        }
        Ok(())
    }
}
