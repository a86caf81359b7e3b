use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use crate::cdn::CdnKind;
use crate::error::{Error, Result};

/// Environment-driven configuration for one regeneration cycle.
///
/// Constructed once at startup and passed by reference into every
/// component; nothing re-reads the environment mid-cycle.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Public base URL the serving layer is reachable under.
    pub hosted_url: Url,
    /// Root of the content-addressed artifact cache.
    pub cache_dir: PathBuf,
    /// Root under which git working copies are kept.
    pub repo_dir: PathBuf,
    pub redis_url: String,
    /// Key prefix applied to every registry namespace.
    pub redis_prefix: String,
    pub github_token: Option<String>,

    pub plugin_repo: RemoteRepo,
    pub distrib_repo: RemoteRepo,
    pub asset_repo: RemoteRepo,
    pub core_repo: RemoteRepo,
    pub launcher_repo: RemoteRepo,
    pub injector_repo: RemoteRepo,
    pub updater_repo: RemoteRepo,

    /// Archive extension of the core distributable, `zip` or `7z`.
    pub dist_format: String,
    /// Base URL the runtime installer archives are fetched from.
    pub runtime_base_url: String,

    pub cdn_list: Vec<CdnKind>,
    pub cloudflare: Option<CloudflareConfig>,
    pub ctcdn: Option<CtcdnConfig>,
    pub ottercloud: Option<OtterCloudConfig>,
}

#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    pub token: String,
    /// Pinned zone id; discovered through the zones API when absent.
    pub zone_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CtcdnConfig {
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct OtterCloudConfig {
    pub host: String,
    pub access_id: String,
    pub access_key: String,
}

impl Settings {
    /// Build [`Settings`] by reading the documented DEPOT_* variables.
    pub fn from_env() -> Result<Self> {
        let hosted_url = required("DEPOT_HOSTED_URL")?;
        let hosted_url = Url::parse(&hosted_url)
            .map_err(|err| Error::Config(format!("DEPOT_HOSTED_URL is not a valid URL: {err}")))?;

        let cdn_list = env::var("DEPOT_CDN_LIST")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(CdnKind::from_str)
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            hosted_url,
            cache_dir: env::var("DEPOT_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cache")),
            repo_dir: env::var("DEPOT_REPO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("repo")),
            redis_url: env::var("DEPOT_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1/".to_string()),
            redis_prefix: env::var("DEPOT_REDIS_PREFIX").unwrap_or_else(|_| "depot|".to_string()),
            github_token: env::var("DEPOT_GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            plugin_repo: required("DEPOT_PLUGIN_REPO")?.parse()?,
            distrib_repo: required("DEPOT_DISTRIB_REPO")?.parse()?,
            asset_repo: required("DEPOT_ASSET_REPO")?.parse()?,
            core_repo: required("DEPOT_CORE_REPO")?.parse()?,
            launcher_repo: required("DEPOT_LAUNCHER_REPO")?.parse()?,
            injector_repo: required("DEPOT_INJECTOR_REPO")?.parse()?,
            updater_repo: required("DEPOT_UPDATER_REPO")?.parse()?,
            dist_format: env::var("DEPOT_DIST_FORMAT").unwrap_or_else(|_| "zip".to_string()),
            runtime_base_url: env::var("DEPOT_RUNTIME_BASE_URL")
                .unwrap_or_else(|_| "https://dotnetcli.azureedge.net/dotnet".to_string()),
            cdn_list,
            cloudflare: env::var("DEPOT_CF_TOKEN").ok().map(|token| CloudflareConfig {
                token,
                zone_id: env::var("DEPOT_CF_ZONE_ID").ok().filter(|z| !z.is_empty()),
            }),
            ctcdn: match (env::var("DEPOT_CTCDN_AK"), env::var("DEPOT_CTCDN_SK")) {
                (Ok(access_key), Ok(secret_key)) => Some(CtcdnConfig {
                    access_key,
                    secret_key,
                }),
                _ => None,
            },
            ottercloud: match (
                env::var("DEPOT_OTTERCLOUD_HOST"),
                env::var("DEPOT_OTTERCLOUD_ID"),
                env::var("DEPOT_OTTERCLOUD_KEY"),
            ) {
                (Ok(host), Ok(access_id), Ok(access_key)) => Some(OtterCloudConfig {
                    host,
                    access_id,
                    access_key,
                }),
                _ => None,
            },
        })
    }

    /// Public base URL without a trailing slash, ready for concatenation.
    pub fn public_base(&self) -> String {
        self.hosted_url.as_str().trim_end_matches('/').to_string()
    }

    /// URL the serving layer redirects to for a cached artifact.
    pub fn file_url(&self, hashed_name: &str) -> String {
        format!("{}/File/Get/{hashed_name}", self.public_base())
    }
}

fn required(name: &'static str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("{name} is required")))
}

/// A remote repository reference, parsed once at configuration load.
///
/// Accepts `https://host/owner/name(.git)` and `git@host:owner/name.git`
/// forms; `owner`/`name` feed the release API, `url` feeds git itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    pub url: String,
    pub owner: String,
    pub name: String,
}

impl RemoteRepo {
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let path = if let Some((_, rest)) = trimmed.split_once("://") {
            rest.split_once('/')
                .map(|(_, path)| path)
                .unwrap_or_default()
        } else if let Some((_, path)) = trimmed.split_once(':') {
            // scp-like syntax: git@host:owner/name.git
            path
        } else {
            ""
        };
        let path = path.trim_matches('/').trim_end_matches(".git");
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        match (segments.next(), segments.next(), segments.next()) {
            (Some(owner), Some(name), None) => Ok(Self {
                url: trimmed.to_string(),
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(Error::Config(format!(
                "cannot parse owner/name from repository URL `{trimmed}`"
            ))),
        }
    }
}

impl FromStr for RemoteRepo {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}
