use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{JobContext, read_json_map, strip_bom, value_as_i64};
use crate::error::{Error, Result};

/// Regenerate the plugin master manifest from the plugin source repository.
pub fn regenerate(ctx: &JobContext<'_>) -> Result<()> {
    let repo = &ctx.settings.plugin_repo;
    let repo_dir = ctx.fetcher.ensure_repo(repo)?;
    let branch = ctx.fetcher.current_branch(repo)?;
    generate_from_checkout(&repo_dir, &repo.name, &branch, ctx)
}

/// Generate from an already-synced working copy.
pub fn generate_from_checkout(
    repo_dir: &Path,
    repo_name: &str,
    branch: &str,
    ctx: &JobContext<'_>,
) -> Result<()> {
    let namespace = format!("plugin-{repo_name}-{branch}");
    let dialect = RepoDialect::detect(repo_dir);
    tracing::info!(%namespace, ?dialect, "regenerating plugin master");

    let last_updated = load_last_updated(repo_dir, dialect)?;
    let (stable_dir, testing_dir) = dialect.channel_dirs();

    // Stable entries first, then testing, preserving the published order.
    let mut manifest = Vec::new();
    for (channel_dir, is_testing) in [(stable_dir, false), (testing_dir, true)] {
        collect_channel(
            &repo_dir.join(channel_dir),
            is_testing,
            &namespace,
            &last_updated,
            ctx,
            &mut manifest,
        )?;
    }

    let doc = serde_json::to_string(&Value::Array(manifest))
        .map_err(|err| Error::parse("pluginmaster", err))?;
    ctx.registry.set_field(&namespace, "pluginmaster", &doc)
}

fn collect_channel(
    dir: &Path,
    is_testing: bool,
    namespace: &str,
    last_updated: &HashMap<String, i64>,
    ctx: &JobContext<'_>,
    out: &mut Vec<Value>,
) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let plugin = entry.file_name().to_string_lossy().into_owned();
        let meta_path = entry.path().join(format!("{plugin}.json"));
        let mut meta = match read_json_map(&meta_path) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(%plugin, error = %err, "skipping plugin with unreadable metadata");
                continue;
            }
        };

        for (key, value) in default_fields() {
            meta.entry(key).or_insert(value);
        }

        meta.insert("IsTestingExclusive".into(), json!(is_testing));
        if is_testing {
            let assembly = meta.get("AssemblyVersion").cloned().unwrap_or(Value::Null);
            meta.insert("TestingAssemblyVersion".into(), assembly);
        }

        let api_level = meta.get("ApiLevel").and_then(value_as_i64).unwrap_or(0);
        let count = ctx
            .registry
            .get_field("plugin-count", &plugin)?
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);
        meta.insert("DownloadCount".into(), json!(count));

        let last_update = last_updated
            .get(&plugin)
            .copied()
            .or_else(|| meta.get("LastUpdate").and_then(value_as_i64))
            .unwrap_or(0);
        meta.insert("LastUpdate".into(), json!(last_update));

        let tags = category_fallbacks().get(&plugin).cloned().unwrap_or_default();
        meta.insert("CategoryTags".into(), json!(tags));

        let base = ctx.settings.public_base();
        meta.insert(
            "DownloadLinkInstall".into(),
            json!(download_link(&base, &plugin, api_level, false, false)),
        );
        meta.insert(
            "DownloadLinkUpdate".into(),
            json!(download_link(&base, &plugin, api_level, true, false)),
        );
        meta.insert(
            "DownloadLinkTesting".into(),
            json!(download_link(&base, &plugin, api_level, false, true)),
        );

        let archive = entry.path().join("latest.zip");
        let Some(record) = ctx.cache.cache_file(&archive)? else {
            tracing::warn!(%plugin, "skipping plugin without packaged artifact");
            continue;
        };
        let logical = if is_testing {
            format!("{plugin}-testing")
        } else {
            plugin.clone()
        };
        ctx.registry.set_field(namespace, &logical, &record.hashed_name)?;

        out.push(Value::Object(meta));
    }
    Ok(())
}

/// Repository layouts the generator understands. The dialect only decides
/// which directories hold the channels and where `LastUpdate` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepoDialect {
    /// Separate channel directories plus a `State.toml` recording per-plugin
    /// build timestamps.
    Segmented,
    /// Single combined `pluginmaster.json` carrying last-updated stamps.
    LegacyFlat,
}

impl RepoDialect {
    fn detect(repo_dir: &Path) -> Self {
        if repo_dir.join("State.toml").exists() {
            Self::Segmented
        } else {
            Self::LegacyFlat
        }
    }

    fn channel_dirs(self) -> (&'static str, &'static str) {
        match self {
            Self::Segmented => ("stable", "testing-live"),
            Self::LegacyFlat => ("plugins", "testing"),
        }
    }
}

#[derive(Deserialize)]
struct StateFile {
    #[serde(default)]
    channels: HashMap<String, ChannelState>,
}

#[derive(Deserialize)]
struct ChannelState {
    #[serde(default)]
    plugins: HashMap<String, PluginState>,
}

#[derive(Deserialize)]
struct PluginState {
    time_built: toml::value::Datetime,
}

fn load_last_updated(repo_dir: &Path, dialect: RepoDialect) -> Result<HashMap<String, i64>> {
    let mut map = HashMap::new();
    match dialect {
        RepoDialect::Segmented => {
            let raw = fs::read_to_string(repo_dir.join("State.toml"))?;
            let state: StateFile =
                toml::from_str(&raw).map_err(|err| Error::parse("State.toml", err))?;
            for channel in state.channels.into_values() {
                for (name, plugin) in channel.plugins {
                    if let Some(epoch) = toml_datetime_epoch(&plugin.time_built) {
                        map.insert(name, epoch);
                    }
                }
            }
        }
        RepoDialect::LegacyFlat => {
            let path = repo_dir.join("pluginmaster.json");
            let bytes = fs::read(&path)?;
            let entries: Vec<Map<String, Value>> = serde_json::from_slice(strip_bom(&bytes))
                .map_err(|err| Error::parse(path.display().to_string(), err))?;
            for entry in entries {
                let Some(name) = entry.get("InternalName").and_then(Value::as_str) else {
                    continue;
                };
                if let Some(stamp) = entry.get("LastUpdated").and_then(value_as_i64) {
                    map.insert(name.to_string(), stamp);
                }
            }
        }
    }
    Ok(map)
}

fn toml_datetime_epoch(datetime: &toml::value::Datetime) -> Option<i64> {
    OffsetDateTime::parse(&datetime.to_string(), &Rfc3339)
        .ok()
        .map(|stamp| stamp.unix_timestamp())
}

/// Optional fields absent from source metadata are filled from this table
/// before emission.
fn default_fields() -> [(&'static str, Value); 7] {
    [
        ("Changelog", json!("")),
        ("Tags", json!([])),
        ("IsHide", json!(false)),
        ("TestingAssemblyVersion", Value::Null),
        ("AcceptsFeedback", json!(true)),
        ("FeedbackMessage", Value::Null),
        ("FeedbackWebhook", Value::Null),
    ]
}

static CATEGORY_FALLBACKS: OnceLock<HashMap<String, Vec<String>>> = OnceLock::new();

/// Static category tags keyed by plugin name, for plugins that predate
/// in-repo category metadata.
fn category_fallbacks() -> &'static HashMap<String, Vec<String>> {
    CATEGORY_FALLBACKS.get_or_init(|| {
        serde_json::from_str(include_str!("categoryfallbacks.json")).unwrap_or_default()
    })
}

/// The serving layer matches these query flags literally, capitalized.
fn download_link(base: &str, plugin: &str, api_level: i64, is_update: bool, is_testing: bool) -> String {
    format!(
        "{base}/Plugin/Download/{plugin}?isUpdate={}&isTesting={}&branch=api{api_level}",
        flag(is_update),
        flag(is_testing),
    )
}

fn flag(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_links_use_capitalized_flags() {
        assert_eq!(
            download_link("https://dist.example.com", "Foo", 9, false, true),
            "https://dist.example.com/Plugin/Download/Foo?isUpdate=False&isTesting=True&branch=api9"
        );
    }

    #[test]
    fn toml_datetimes_convert_to_epoch_seconds() {
        let dt: toml::value::Datetime = "2024-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(toml_datetime_epoch(&dt), Some(1_704_067_200));
    }
}
