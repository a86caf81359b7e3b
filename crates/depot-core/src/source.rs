use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use crate::config::RemoteRepo;
use crate::error::{Error, Result};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Synchronizes git working copies and enumerates tags/releases from the
/// hosting provider's release API.
pub struct SourceFetcher {
    repo_root: PathBuf,
    api_base: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl SourceFetcher {
    pub fn new(repo_root: PathBuf, token: Option<String>) -> Result<Self> {
        Self::with_api_base(repo_root, token, DEFAULT_API_BASE)
    }

    /// Like [`SourceFetcher::new`] but pointed at a different release API
    /// origin (tests run one on loopback).
    pub fn with_api_base(
        repo_root: PathBuf,
        token: Option<String>,
        api_base: impl Into<String>,
    ) -> Result<Self> {
        fs::create_dir_all(&repo_root)?;
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Ok(Self {
            repo_root,
            api_base,
            token,
            client: reqwest::blocking::Client::builder()
                .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
                .build()?,
        })
    }

    pub fn repo_dir(&self, repo: &RemoteRepo) -> PathBuf {
        self.repo_root.join(&repo.name)
    }

    /// Shallow-clone the repository on first use, fast-forward pull after.
    ///
    /// A pull that the remote rejects (or any other git failure) aborts the
    /// calling job only, never the batch.
    pub fn ensure_repo(&self, repo: &RemoteRepo) -> Result<PathBuf> {
        let dir = self.repo_dir(repo);
        if dir.join(".git").exists() {
            tracing::info!(repo = %repo.url, "updating working copy");
            run_git(&dir, &["pull", "--ff-only"], repo)?;
        } else {
            tracing::info!(repo = %repo.url, "cloning working copy");
            run_git(
                &self.repo_root,
                &["clone", "--depth=1", &repo.url, &repo.name],
                repo,
            )?;
        }
        Ok(dir)
    }

    pub fn current_branch(&self, repo: &RemoteRepo) -> Result<String> {
        run_git(&self.repo_dir(repo), &["rev-parse", "--abbrev-ref", "HEAD"], repo)
    }

    /// Releases, most recent first. One page is enough — consumers only
    /// look at the head of the sequence.
    pub fn list_releases(&self, repo: &RemoteRepo) -> Result<Vec<Release>> {
        self.get_json(&format!(
            "/repos/{}/{}/releases?per_page=30",
            repo.owner, repo.name
        ))
    }

    /// Tags, most recent first, capped at `limit`.
    pub fn list_tags(&self, repo: &RemoteRepo, limit: usize) -> Result<Vec<TagRef>> {
        self.get_json(&format!(
            "/repos/{}/{}/tags?per_page={limit}",
            repo.owner, repo.name
        ))
    }

    /// Commits contained in `base...head`.
    pub fn compare(&self, repo: &RemoteRepo, base: &str, head: &str) -> Result<Comparison> {
        self.get_json(&format!(
            "/repos/{}/{}/compare/{base}...{head}",
            repo.owner, repo.name
        ))
    }

    pub fn commit(&self, repo: &RemoteRepo, sha: &str) -> Result<CommitEntry> {
        self.get_json(&format!("/repos/{}/{}/commits/{sha}", repo.owner, repo.name))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.api_base);
        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        Ok(request.send()?.error_for_status()?.json()?)
    }
}

fn run_git(cwd: &Path, args: &[&str], repo: &RemoteRepo) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|err| Error::SourceUnavailable {
            repo: repo.url.clone(),
            reason: format!("failed to spawn git: {err}"),
        })?;
    if !output.status.success() {
        return Err(Error::SourceUnavailable {
            repo: repo.url.clone(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// One entry of the release sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagRef {
    pub name: String,
    pub commit: CommitPointer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitPointer {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comparison {
    #[serde(default)]
    pub commits: Vec<CommitEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitEntry {
    pub sha: String,
    pub commit: CommitDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    pub message: String,
    pub author: CommitSignature,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitSignature {
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_release_payload() {
        let raw = r#"[{
            "tag_name": "v2.0.0-rc1",
            "prerelease": true,
            "html_url": "https://example.com/releases/v2.0.0-rc1",
            "published_at": "2024-03-01T10:00:00Z",
            "assets": [
                {"name": "Setup.exe", "browser_download_url": "https://example.com/Setup.exe"}
            ]
        }]"#;
        let releases: Vec<Release> = serde_json::from_str(raw).unwrap();
        assert_eq!(releases.len(), 1);
        assert_eq!(releases[0].tag, "v2.0.0-rc1");
        assert!(releases[0].prerelease);
        assert_eq!(releases[0].assets[0].name, "Setup.exe");
        assert_eq!(releases[0].published_at.unwrap().year(), 2024);
    }

    #[test]
    fn deserializes_compare_payload() {
        let raw = r#"{
            "commits": [{
                "sha": "abc",
                "commit": {
                    "message": "fix: nil deref\n\ndetails",
                    "author": {"name": "Dev", "date": "2024-01-02T03:04:05Z"}
                }
            }]
        }"#;
        let cmp: Comparison = serde_json::from_str(raw).unwrap();
        assert_eq!(cmp.commits[0].commit.message.lines().next(), Some("fix: nil deref"));
    }
}
