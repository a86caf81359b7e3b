use std::path::Path;

use serde_json::{Value, json};

use super::{JobContext, read_json_map};
use crate::error::{Error, Result};

/// Regenerate the asset bundle manifest.
pub fn regenerate(ctx: &JobContext<'_>) -> Result<()> {
    let repo_dir = ctx.fetcher.ensure_repo(&ctx.settings.asset_repo)?;
    generate_from_checkout(&repo_dir, ctx)
}

/// Generate from an already-synced working copy.
///
/// Every listed asset file is content-hashed into the cache; entries whose
/// upstream URL points at the source host are rewritten to the hashed copy.
/// A missing file keeps its upstream URL and is only logged.
pub fn generate_from_checkout(repo_dir: &Path, ctx: &JobContext<'_>) -> Result<()> {
    let mut doc = read_json_map(&repo_dir.join("asset.json"))?;
    let assets = doc
        .get("Assets")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut rewritten = Vec::with_capacity(assets.len());
    for asset in assets {
        let Value::Object(mut asset) = asset else {
            rewritten.push(asset);
            continue;
        };
        let file_name = asset
            .get("FileName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match ctx.cache.cache_file(&repo_dir.join(&file_name))? {
            Some(record) => {
                let upstream_hosted = asset
                    .get("Url")
                    .and_then(Value::as_str)
                    .is_some_and(|url| url.contains("github"));
                if upstream_hosted {
                    asset.insert("Url".into(), json!(ctx.settings.file_url(&record.hashed_name)));
                }
            }
            None => {
                tracing::warn!(file = %file_name, "asset file missing, keeping upstream URL");
            }
        }
        rewritten.push(Value::Object(asset));
    }

    doc.insert("Assets".into(), Value::Array(rewritten));
    let raw = serde_json::to_string(&Value::Object(doc))
        .map_err(|err| Error::parse("asset meta", err))?;
    ctx.registry.set_field("asset", "meta", &raw)
}
