use std::fs;

use serde_json::json;
use time::format_description::well_known::Rfc3339;

use super::JobContext;
use crate::config::RemoteRepo;
use crate::error::{Error, Result};
use crate::source::Release;

/// Asset stored as a raw registry string: the release index the launcher's
/// self-updater polls.
const RELEASES_LIST: &str = "RELEASES";
/// Asset stored as a raw registry string and inlined into the track meta.
const CHANGELOG_FILE: &str = "CHANGELOG.txt";

/// Regenerate the launcher distribution from its release sequence.
pub fn regenerate_launcher(ctx: &JobContext<'_>) -> Result<()> {
    let repo = &ctx.settings.launcher_repo;
    let releases = ctx.fetcher.list_releases(repo)?;
    let (prerelease, release) =
        resolve_tracks(&releases).ok_or_else(|| unresolvable(repo))?;
    for (track, selected) in [("prerelease", prerelease), ("release", release)] {
        publish_track(ctx, "launcher", track, selected)?;
    }
    Ok(())
}

/// Reduced single-binary variant of the launcher pipeline, shared by the
/// injector and updater targets.
pub fn regenerate_single_track(
    ctx: &JobContext<'_>,
    namespace: &str,
    repo: &RemoteRepo,
) -> Result<()> {
    let releases = ctx.fetcher.list_releases(repo)?;
    let (prerelease, release) =
        resolve_tracks(&releases).ok_or_else(|| unresolvable(repo))?;

    for (track, selected) in [("prerelease", prerelease), ("release", release)] {
        ctx.registry
            .set_field(namespace, &format!("{track}-tag"), &selected.tag)?;
        let mut primary: Option<String> = None;
        for asset in &selected.assets {
            // Fixed asset names carry fresh content on every release.
            let path = ctx.cache.download_file(&asset.download_url, true)?;
            let record = ctx
                .cache
                .cache_file(&path)?
                .ok_or_else(|| Error::ArtifactMissing(path.clone()))?;
            ctx.registry.set_field(
                namespace,
                &format!("{track}-{}", asset.name),
                &record.hashed_name,
            )?;
            if primary.is_none() {
                primary = Some(record.hashed_name);
            }
        }
        if let Some(hashed) = primary {
            ctx.registry
                .set_field(namespace, &format!("{track}-asset"), &hashed)?;
        }
        let meta = json!({
            "version": selected.tag,
            "url": selected.html_url,
            "when": published_stamp(selected)?,
        });
        ctx.registry
            .set_field(namespace, &format!("{track}-meta"), &meta.to_string())?;
    }

    let versions = json!({
        "release": release.tag,
        "prerelease": prerelease.tag,
    });
    ctx.registry
        .set_field(namespace, "version", &versions.to_string())
}

fn publish_track(
    ctx: &JobContext<'_>,
    namespace: &str,
    track: &str,
    release: &Release,
) -> Result<()> {
    tracing::info!(namespace, track, tag = %release.tag, "publishing release track");
    ctx.registry
        .set_field(namespace, &format!("{track}-tag"), &release.tag)?;

    let mut changelog = String::new();
    for asset in &release.assets {
        // Fixed asset names carry fresh content on every rolling release.
        let path = ctx.cache.download_file(&asset.download_url, true)?;
        if asset.name == RELEASES_LIST {
            let listing = fs::read_to_string(&path)?;
            ctx.registry
                .set_field(namespace, &format!("{track}-releaseslist"), &listing)?;
            continue;
        }
        if asset.name == CHANGELOG_FILE {
            changelog = fs::read_to_string(&path)?;
        }
        let record = ctx
            .cache
            .cache_file(&path)?
            .ok_or_else(|| Error::ArtifactMissing(path.clone()))?;
        ctx.registry.set_field(
            namespace,
            &format!("{track}-{}", asset.name),
            &record.hashed_name,
        )?;
    }

    let meta = json!({
        "releasesInfo": format!("/Proxy/Update/{}/RELEASES", capitalized(track)),
        "version": release.tag,
        "url": release.html_url,
        "changelog": changelog,
        "when": published_stamp(release)?,
    });
    ctx.registry
        .set_field(namespace, &format!("{track}-meta"), &meta.to_string())
}

/// Resolve `(prerelease, release)` from a newest-first release sequence.
///
/// The prerelease track is the most recent entry. When that entry is not
/// flagged prerelease, both tracks alias the same release; otherwise the
/// release track is the most recent entry without the flag.
pub fn resolve_tracks(releases: &[Release]) -> Option<(&Release, &Release)> {
    let latest = releases.first()?;
    if latest.prerelease {
        let release = releases.iter().find(|candidate| !candidate.prerelease)?;
        Some((latest, release))
    } else {
        Some((latest, latest))
    }
}

fn unresolvable(repo: &RemoteRepo) -> Error {
    Error::Parse {
        item: repo.url.clone(),
        reason: "release sequence has no resolvable release/prerelease pair".to_string(),
    }
}

fn published_stamp(release: &Release) -> Result<String> {
    release
        .published_at
        .map(|stamp| stamp.format(&Rfc3339))
        .transpose()
        .map_err(|err| Error::parse("published_at", err))
        .map(Option::unwrap_or_default)
}

fn capitalized(track: &str) -> String {
    let mut chars = track.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
