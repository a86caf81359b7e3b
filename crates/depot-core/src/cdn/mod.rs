use std::str::FromStr;

use url::Url;

use crate::config::Settings;
use crate::error::{Error, Result};

mod cloudflare;
mod ctcdn;
mod ottercloud;

pub use cloudflare::CloudflareCdn;
pub use ctcdn::CtCdn;
pub use ottercloud::OtterCloudCdn;

/// One CDN provider's purge integration.
///
/// Backends only ever see absolute URLs; relative serving paths are
/// promoted through [`absolute_urls`] before dispatch.
pub trait CdnBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn purge(&self, urls: &[String]) -> Result<()>;
}

/// Supported purge backends, selected through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdnKind {
    Cloudflare,
    CtCdn,
    OtterCloud,
}

impl FromStr for CdnKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "cloudflare" => Ok(Self::Cloudflare),
            "ctcdn" => Ok(Self::CtCdn),
            "ottercloud" | "ottercloudcdn" => Ok(Self::OtterCloud),
            other => Err(Error::Config(format!("unsupported CDN backend `{other}`"))),
        }
    }
}

/// Instantiate every backend named in the configuration.
pub fn build_backends(settings: &Settings) -> Result<Vec<Box<dyn CdnBackend>>> {
    let mut backends: Vec<Box<dyn CdnBackend>> = Vec::new();
    for kind in &settings.cdn_list {
        match kind {
            CdnKind::Cloudflare => {
                let config = settings.cloudflare.clone().ok_or_else(|| {
                    Error::Config("cloudflare backend enabled without DEPOT_CF_TOKEN".into())
                })?;
                backends.push(Box::new(CloudflareCdn::new(config)?));
            }
            CdnKind::CtCdn => {
                let config = settings.ctcdn.clone().ok_or_else(|| {
                    Error::Config("ctcdn backend enabled without DEPOT_CTCDN_AK/SK".into())
                })?;
                backends.push(Box::new(CtCdn::new(config)?));
            }
            CdnKind::OtterCloud => {
                let config = settings.ottercloud.clone().ok_or_else(|| {
                    Error::Config("ottercloud backend enabled without DEPOT_OTTERCLOUD_* settings".into())
                })?;
                backends.push(Box::new(OtterCloudCdn::new(config)?));
            }
        }
    }
    Ok(backends)
}

/// Promote relative serving paths to absolute URLs under the public base;
/// already-absolute paths pass through unchanged.
pub fn absolute_urls(base: &Url, paths: &[&str]) -> Vec<String> {
    let root = base.as_str().trim_end_matches('/');
    paths
        .iter()
        .map(|path| {
            if path.starts_with("http") {
                (*path).to_string()
            } else if path.starts_with('/') {
                format!("{root}{path}")
            } else {
                format!("{root}/{path}")
            }
        })
        .collect()
}

/// Host component of an absolute URL, for zone lookups.
pub(crate) fn host_of(url: &str) -> &str {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped.split('/').next().unwrap_or(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_relative_paths() {
        let base = Url::parse("https://dist.example.com/").unwrap();
        let urls = absolute_urls(
            &base,
            &["/Plugin/PluginMaster", "Proxy/Meta", "https://other.example.com/x"],
        );
        assert_eq!(
            urls,
            vec![
                "https://dist.example.com/Plugin/PluginMaster",
                "https://dist.example.com/Proxy/Meta",
                "https://other.example.com/x",
            ]
        );
    }

    #[test]
    fn preserves_query_strings() {
        let base = Url::parse("https://dist.example.com").unwrap();
        let urls = absolute_urls(&base, &["/Release/VersionInfo?track=stg"]);
        assert_eq!(urls, vec!["https://dist.example.com/Release/VersionInfo?track=stg"]);
    }

    #[test]
    fn extracts_hosts() {
        assert_eq!(host_of("https://dist.example.com/a/b"), "dist.example.com");
        assert_eq!(host_of("http://dist.example.com"), "dist.example.com");
    }

    #[test]
    fn parses_backend_names() {
        assert_eq!(CdnKind::from_str("CloudFlare").unwrap(), CdnKind::Cloudflare);
        assert_eq!(CdnKind::from_str("ctcdn").unwrap(), CdnKind::CtCdn);
        assert!(CdnKind::from_str("akamai").is_err());
    }
}
