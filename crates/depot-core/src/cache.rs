use std::fs::{self, File};
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Mapping from a source file to its content-hashed cached copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    /// Original file name the artifact was cached from.
    pub logical_name: String,
    /// Lowercase hex SHA-256 of the file bytes.
    pub content_hash: String,
    /// `{stem}.{hash}.{ext}` — a pure function of bytes and original name.
    pub hashed_name: String,
    /// Location of the cached copy.
    pub path: PathBuf,
}

/// Content-addressed local file store.
///
/// Writes are idempotent (identical content always lands under the
/// identical hashed name), so the cache directory is safe to share across
/// concurrent regeneration jobs.
pub struct ArtifactCache {
    root: PathBuf,
    downloads: PathBuf,
    client: reqwest::blocking::Client,
}

impl ArtifactCache {
    pub fn new(root: PathBuf) -> Result<Self> {
        let downloads = root.join("downloads");
        fs::create_dir_all(&downloads)?;
        Ok(Self {
            root,
            downloads,
            client: reqwest::blocking::Client::builder().build()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Hash `path` and copy it into the cache under its hashed name.
    ///
    /// Returns `Ok(None)` when the source file does not exist; callers are
    /// expected to treat that as a skip, not a failure. The copy is always
    /// performed — an existing file of the same hashed name is byte-equal
    /// by construction, so overwriting it (or racing another writer) is
    /// harmless.
    pub fn cache_file(&self, path: &Path) -> Result<Option<ArtifactRecord>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "artifact not found, skipping");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let content_hash = hash_reader(file)?;

        let logical_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::ArtifactMissing(path.to_path_buf()))?;
        let hashed_name = hashed_file_name(&logical_name, &content_hash);
        let dest = self.root.join(&hashed_name);
        copy_atomic(path, &dest)?;
        tracing::debug!(
            source = %path.display(),
            cached = %dest.display(),
            "cached artifact"
        );

        Ok(Some(ArtifactRecord {
            logical_name,
            content_hash,
            hashed_name,
            path: dest,
        }))
    }

    /// Fetch `url` into the deterministic download location.
    ///
    /// When the destination already exists and `force` is false the network
    /// is not touched at all — stable downloads are skipped across cycles.
    /// `force` always re-fetches and atomically replaces the file, which is
    /// required for upstream assets that keep a fixed name but change
    /// content between releases.
    pub fn download_file(&self, url: &str, force: bool) -> Result<PathBuf> {
        let name = url_file_name(url)?;
        let dest = self.downloads.join(name);
        if !force && dest.exists() {
            tracing::debug!(url, dest = %dest.display(), "download already cached, skipping");
            return Ok(dest);
        }

        tracing::info!(url, "downloading");
        let mut response = self.client.get(url).send()?.error_for_status()?;
        let mut temp = NamedTempFile::new_in(&self.downloads)?;
        io::copy(&mut response, temp.as_file_mut())?;
        temp.persist(&dest).map_err(|err| Error::Io(err.error))?;
        Ok(dest)
    }
}

/// `{stem}.{hash}.{ext}`, collapsing to `{stem}.{hash}` for bare names.
fn hashed_file_name(logical_name: &str, content_hash: &str) -> String {
    match logical_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}.{content_hash}.{ext}"),
        _ => format!("{logical_name}.{content_hash}"),
    }
}

fn url_file_name(url: &str) -> Result<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Parse {
            item: url.to_string(),
            reason: "URL has no file name component".to_string(),
        })
}

fn hash_reader(file: File) -> Result<String> {
    const BUF_SIZE: usize = 64 * 1024;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn copy_atomic(source: &Path, dest: &Path) -> Result<()> {
    let tmp = dest.with_extension(format!(
        "tmp-{}",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|dur| dur.as_nanos())
            .unwrap_or(0)
    ));
    fs::copy(source, &tmp)?;
    fs::rename(&tmp, dest)?;
    Ok(())
}
