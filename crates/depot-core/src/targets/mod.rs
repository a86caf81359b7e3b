use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::cache::ArtifactCache;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::source::SourceFetcher;

pub mod assets;
pub mod changelog;
pub mod dist;
pub mod launcher;
pub mod plugins;

/// Closed set of regeneration targets.
///
/// Dispatch is an exhaustive match — adding a target without wiring its
/// generator is a compile error, not a runtime "invalid task".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Core,
    Changelog,
    Asset,
    PluginMaster,
    Launcher,
    Injector,
    Updater,
}

impl Target {
    pub const ALL: [Target; 7] = [
        Target::Core,
        Target::Changelog,
        Target::Asset,
        Target::PluginMaster,
        Target::Launcher,
        Target::Injector,
        Target::Updater,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "core" => Some(Self::Core),
            "changelog" => Some(Self::Changelog),
            "asset" => Some(Self::Asset),
            "plugin" | "pluginmaster" => Some(Self::PluginMaster),
            "launcher" => Some(Self::Launcher),
            "injector" => Some(Self::Injector),
            "updater" => Some(Self::Updater),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Changelog => "changelog",
            Self::Asset => "asset",
            Self::PluginMaster => "pluginmaster",
            Self::Launcher => "launcher",
            Self::Injector => "injector",
            Self::Updater => "updater",
        }
    }

    /// Relative HTTP paths the serving layer exposes for this target; the
    /// purge phase invalidates these on every configured CDN.
    pub fn purge_paths(self) -> &'static [&'static str] {
        match self {
            Self::Core => &[
                "/Core/Release/VersionInfo",
                "/Core/Release/Meta",
                "/Release/VersionInfo?track=release",
                "/Release/VersionInfo?track=staging",
                "/Release/VersionInfo?track=stg",
                "/Release/VersionInfo?track=canary",
            ],
            Self::Changelog => &["/Plugin/CoreChangelog"],
            Self::Asset => &["/Core/Asset/Meta"],
            Self::PluginMaster => &["/Plugin/PluginMaster"],
            Self::Launcher => &["/Proxy/Meta"],
            Self::Injector => &["/Injector/Release/VersionInfo"],
            Self::Updater => &["/Updater/Release/VersionInfo"],
        }
    }
}

/// Shared collaborators handed to every generator.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub settings: &'a Settings,
    pub registry: &'a dyn Registry,
    pub cache: &'a ArtifactCache,
    pub fetcher: &'a SourceFetcher,
}

/// Run one target's generator to completion.
pub fn run(target: Target, ctx: &JobContext<'_>) -> Result<()> {
    match target {
        Target::Core => dist::regenerate(ctx),
        Target::Changelog => changelog::regenerate(ctx),
        Target::Asset => assets::regenerate(ctx),
        Target::PluginMaster => plugins::regenerate(ctx),
        Target::Launcher => launcher::regenerate_launcher(ctx),
        Target::Injector => {
            launcher::regenerate_single_track(ctx, "injector", &ctx.settings.injector_repo)
        }
        Target::Updater => {
            launcher::regenerate_single_track(ctx, "updater", &ctx.settings.updater_repo)
        }
    }
}

/// Read a JSON object, tolerating a UTF-8 byte-order mark.
pub(crate) fn read_json_map(path: &Path) -> Result<Map<String, Value>> {
    let bytes = fs::read(path)?;
    let bytes = strip_bom(&bytes);
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::parse(path.display().to_string(), "expected a JSON object")),
        Err(err) => Err(Error::parse(path.display().to_string(), err)),
    }
}

pub(crate) fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes)
}

/// Numeric field that upstream metadata sometimes encodes as a string.
pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_job_names() {
        assert_eq!(Target::parse("pluginmaster"), Some(Target::PluginMaster));
        assert_eq!(Target::parse("plugin"), Some(Target::PluginMaster));
        assert_eq!(Target::parse("core"), Some(Target::Core));
        assert_eq!(Target::parse("bogus"), None);
    }

    #[test]
    fn strips_byte_order_mark() {
        assert_eq!(strip_bom(b"\xef\xbb\xbf{}"), b"{}");
        assert_eq!(strip_bom(b"{}"), b"{}");
    }

    #[test]
    fn coerces_numbers_from_strings() {
        assert_eq!(value_as_i64(&Value::String("42".into())), Some(42));
        assert_eq!(value_as_i64(&serde_json::json!(7)), Some(7));
        assert_eq!(value_as_i64(&Value::Null), None);
    }
}
