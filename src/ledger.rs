use std::path::{Path, PathBuf};

use anyhow::Context as _;
use sha2::Digest as _;

use crate::formats::{LedgerEntry, LedgerFile};

const KEY_HEX_LEN: usize = 16;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Completed-download ledger keyed by [`url_key`].
///
/// An entry only proves the file was written at some point; later runs do not
/// re-check the file on disk.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    data: LedgerFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub total_downloaded: usize,
    pub ledger_path: PathBuf,
}

/// First 16 hex characters of the SHA-256 of the exact URL string.
pub fn url_key(url: &str) -> String {
    let digest = sha2::Sha256::digest(url.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(KEY_HEX_LEN);
    key
}

impl Ledger {
    /// Loads the ledger at `path`. A missing file starts empty; so does an
    /// unparsable one, with a warning.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    data: LedgerFile::default(),
                });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read ledger: {}", path.display()));
            }
        };

        let data = match serde_json::from_slice::<LedgerFile>(&bytes) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(
                    ledger = %path.display(),
                    %err,
                    "could not parse ledger; starting fresh"
                );
                LedgerFile::default()
            }
        };

        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_downloaded(&self, url: &str) -> bool {
        self.data.downloads.contains_key(&url_key(url))
    }

    /// Missing fields read as empty; an entry that is not an object reads as `None`
    /// but still counts for [`Ledger::is_downloaded`].
    pub fn get(&self, url: &str) -> Option<LedgerEntry> {
        let value = self.data.downloads.get(&url_key(url))?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Records `url` as downloaded and rewrites the ledger file before returning.
    pub fn mark_downloaded(
        &mut self,
        url: &str,
        filename: &str,
        title: &str,
    ) -> anyhow::Result<()> {
        let entry = LedgerEntry {
            url: url.to_owned(),
            filename: filename.to_owned(),
            title: title.to_owned(),
            downloaded_at: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        };
        let value = serde_json::to_value(&entry).context("serialize ledger entry")?;
        self.data.downloads.insert(url_key(url), value);
        self.save()
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            total_downloaded: self.data.downloads.len(),
            ledger_path: self.path.clone(),
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        write_json_atomic(&self.path, &self.data)
            .with_context(|| format!("save ledger: {}", self.path.display()))
    }
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create parent dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    std::fs::write(&tmp_path, &data)
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
