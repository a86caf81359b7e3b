use std::fs;
use std::path::Path;

use serde_json::{Value, json};

use super::{JobContext, read_json_map};
use crate::error::{Error, Result};

/// Release lives at the repository root, the other tracks in subdirectories
/// of the same name.
const TRACKS: [&str; 3] = ["release", "stg", "canary"];

/// Regenerate the core distribution manifests and runtime artifacts.
pub fn regenerate(ctx: &JobContext<'_>) -> Result<()> {
    let repo_dir = ctx.fetcher.ensure_repo(&ctx.settings.distrib_repo)?;
    generate_from_checkout(&repo_dir, ctx)
}

/// Generate from an already-synced working copy.
///
/// A missing descriptor or archive for any track fails the whole job;
/// there is no sub-job isolation below job granularity.
pub fn generate_from_checkout(repo_dir: &Path, ctx: &JobContext<'_>) -> Result<()> {
    let mut runtime_versions: Vec<String> = Vec::new();

    for track in TRACKS {
        let dist_dir = if track == "release" {
            repo_dir.to_path_buf()
        } else {
            repo_dir.join(track)
        };
        let mut descriptor = read_json_map(&dist_dir.join("version"))?;

        if descriptor
            .get("RuntimeRequired")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            if let Some(version) = descriptor.get("RuntimeVersion").and_then(Value::as_str) {
                if !runtime_versions.iter().any(|v| v == version) {
                    runtime_versions.push(version.to_string());
                }
            }
        }

        let archive = dist_dir.join(format!("latest.{}", ctx.settings.dist_format));
        let record = ctx
            .cache
            .cache_file(&archive)?
            .ok_or_else(|| Error::ArtifactMissing(archive.clone()))?;

        descriptor.insert(
            "downloadUrl".into(),
            json!(ctx.settings.file_url(&record.hashed_name)),
        );
        descriptor.insert("track".into(), json!(track));
        if track == "release" {
            // The serving layer splices the generated changelog in here.
            descriptor.insert("changelog".into(), json!([]));
        }
        if !descriptor.contains_key("key") && !descriptor.contains_key("Key") {
            descriptor.insert("key".into(), Value::Null);
        }

        let doc = serde_json::to_string(&Value::Object(descriptor))
            .map_err(|err| Error::parse(format!("dist-{track}"), err))?;
        ctx.registry.set_field("core", &format!("dist-{track}"), &doc)?;
        tracing::info!(track, "published core distribution manifest");
    }

    for version in &runtime_versions {
        let base = ctx.settings.runtime_base_url.trim_end_matches('/');
        let downloads = [
            (
                "desktop",
                format!(
                    "{base}/WindowsDesktop/{version}/windowsdesktop-runtime-{version}-win-x64.zip"
                ),
            ),
            (
                "dotnet",
                format!("{base}/Runtime/{version}/dotnet-runtime-{version}-win-x64.zip"),
            ),
        ];
        for (kind, url) in downloads {
            // Runtime archives are immutable per version; skip when cached.
            let path = ctx.cache.download_file(&url, false)?;
            let record = ctx
                .cache
                .cache_file(&path)?
                .ok_or_else(|| Error::ArtifactMissing(path.clone()))?;
            ctx.registry
                .set_field("runtime", &format!("{kind}-{version}"), &record.hashed_name)?;
        }
    }

    let hashes_dir = repo_dir.join("runtimehashes");
    if hashes_dir.is_dir() {
        for entry in fs::read_dir(&hashes_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(version) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let version = version.to_string();
            let record = ctx
                .cache
                .cache_file(&path)?
                .ok_or_else(|| Error::ArtifactMissing(path.clone()))?;
            ctx.registry
                .set_field("runtime", &format!("hashes-{version}"), &record.hashed_name)?;
        }
    }

    Ok(())
}
