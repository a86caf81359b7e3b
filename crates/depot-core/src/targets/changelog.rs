use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::JobContext;
use crate::config::RemoteRepo;
use crate::error::{Error, Result};
use crate::source::{CommitEntry, SourceFetcher, TagRef};

/// One more than the number of changelog entries: each entry diffs a tag
/// against its predecessor.
const TAG_WINDOW: usize = 11;

const SKIP_PREFIXES: [&str; 3] = ["build:", "Merge pull request", "Merge branch"];

/// Regenerate the core changelog from the source repository's tag history.
pub fn regenerate(ctx: &JobContext<'_>) -> Result<()> {
    let repo = &ctx.settings.core_repo;
    let tags = ctx.fetcher.list_tags(repo, TAG_WINDOW)?;
    let doc = build_changelog(ctx.fetcher, repo, &tags)?;
    let raw = serde_json::to_string(&doc).map_err(|err| Error::parse("changelog", err))?;
    ctx.registry.set_field("core", "changelog", &raw)
}

pub fn build_changelog(
    fetcher: &SourceFetcher,
    repo: &RemoteRepo,
    tags: &[TagRef],
) -> Result<Value> {
    let mut changelogs = Vec::new();
    for pair in tags.windows(2) {
        let (tag, previous) = (&pair[0], &pair[1]);
        let diff = fetcher.compare(repo, &previous.commit.sha, &tag.commit.sha)?;
        let changes: Vec<Value> = diff
            .commits
            .iter()
            .filter(|entry| is_interesting(&entry.commit.message))
            .map(change_json)
            .collect::<Result<_>>()?;
        let tagged = fetcher.commit(repo, &tag.commit.sha)?;
        changelogs.push(json!({
            "version": tag.name,
            "date": format_stamp(&tagged.commit.author.date)?,
            "changes": changes,
        }));
    }
    Ok(Value::Array(changelogs))
}

fn is_interesting(message: &str) -> bool {
    !SKIP_PREFIXES
        .iter()
        .any(|prefix| message.starts_with(prefix))
}

fn change_json(entry: &CommitEntry) -> Result<Value> {
    Ok(json!({
        "author": entry.commit.author.name,
        "message": entry.commit.message.lines().next().unwrap_or_default(),
        "sha": entry.sha,
        "date": format_stamp(&entry.commit.author.date)?,
    }))
}

fn format_stamp(stamp: &OffsetDateTime) -> Result<String> {
    stamp
        .format(&Rfc3339)
        .map_err(|err| Error::parse("timestamp", err))
}
