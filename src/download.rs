use std::fs::File;
use std::io::{BufWriter, Read as _, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::USER_AGENT;

use crate::cli::DownloadArgs;
use crate::config::DownloadConfig;
use crate::formats::LinkEntry;
use crate::ledger::Ledger;

static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("unsafe chars regex"));
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Downloaded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Downloaded => self.downloaded += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

pub fn run(args: DownloadArgs) -> anyhow::Result<Summary> {
    let links_path = PathBuf::from(&args.links);
    if !links_path.is_file() {
        anyhow::bail!("link file not found: {}", links_path.display());
    }

    let config = DownloadConfig::from(&args);
    std::fs::create_dir_all(&config.download_dir).with_context(|| {
        format!("create download dir: {}", config.download_dir.display())
    })?;
    let mut ledger = Ledger::load(&config.ledger_path).context("load ledger")?;

    let entries = crate::links::extract(&links_path)?;
    let stats = ledger.stats();
    tracing::info!(
        found = entries.len(),
        already_downloaded = stats.total_downloaded,
        ledger = %stats.ledger_path.display(),
        "extracted links"
    );

    let downloader = Downloader::new(config).context("build downloader")?;
    let summary = downloader.run(&entries, &mut ledger)?;

    tracing::info!(
        total = summary.total(),
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        failed = summary.failed,
        dir = %downloader.config().download_dir.display(),
        ledger = %ledger.path().display(),
        "download summary"
    );
    if summary.has_failures() {
        tracing::warn!(
            failed = summary.failed,
            "some files failed to download; re-run to retry"
        );
    }

    Ok(summary)
}

/// Turns a title into a file name: drops `<>:"/\|?*`, joins whitespace runs
/// with `_`, keeps at most `max_len` characters, then appends `extension`.
pub fn sanitize_filename(title: &str, max_len: usize, extension: &str) -> String {
    let safe = UNSAFE_CHARS.replace_all(title, "");
    let safe = WHITESPACE_RUN.replace_all(&safe, "_");
    let mut name = safe.chars().take(max_len).collect::<String>();
    name.push_str(extension);
    name
}

#[derive(Debug)]
pub struct Downloader {
    config: DownloadConfig,
    client: reqwest::blocking::Client,
}

impl Downloader {
    pub fn new(config: DownloadConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("build download http client")?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn file_name_for(&self, title: &str) -> String {
        sanitize_filename(title, self.config.max_name_len, &self.config.extension)
    }

    /// Processes entries in order, committing the ledger after each file.
    pub fn run(&self, entries: &[LinkEntry], ledger: &mut Ledger) -> anyhow::Result<Summary> {
        let mut summary = Summary::default();
        let total = entries.len();

        for (idx, entry) in entries.iter().enumerate() {
            tracing::info!(index = idx + 1, total, title = %entry.title, "processing");
            let (outcome, fetched) = self.process_entry(entry, ledger)?;
            summary.record(outcome);

            if fetched && idx + 1 < total && !self.config.entry_delay.is_zero() {
                std::thread::sleep(self.config.entry_delay);
            }
        }

        Ok(summary)
    }

    /// Returns the outcome and whether the network was touched.
    fn process_entry(
        &self,
        entry: &LinkEntry,
        ledger: &mut Ledger,
    ) -> anyhow::Result<(Outcome, bool)> {
        if ledger.is_downloaded(&entry.url) {
            tracing::info!(url = %entry.url, "already downloaded; skipping");
            return Ok((Outcome::Skipped, false));
        }

        let filename = self.file_name_for(&entry.title);
        let dest = self.config.download_dir.join(&filename);

        // Adopted files are trusted as-is; nothing about their content is checked.
        if dest.exists() {
            tracing::info!(file = %filename, "file exists; marking as downloaded");
            ledger.mark_downloaded(&entry.url, &filename, &entry.title)?;
            return Ok((Outcome::Skipped, false));
        }

        tracing::info!(file = %filename, "downloading");
        match self.download_file(&entry.url, &dest) {
            Ok(bytes) => {
                tracing::info!(file = %filename, bytes, "downloaded");
                ledger.mark_downloaded(&entry.url, &filename, &entry.title)?;
                Ok((Outcome::Downloaded, true))
            }
            Err(err) => {
                tracing::warn!(url = %entry.url, "download failed: {err:#}");
                Ok((Outcome::Failed, true))
            }
        }
    }

    /// Fetches `url` into `dest`, retrying up to `max_retries` attempts.
    /// On final failure no file is left at `dest`.
    pub fn download_file(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 1;
        loop {
            tracing::info!(attempt, attempts, "download attempt");
            match self.fetch_to_file(url, dest) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if attempt < attempts => {
                    tracing::warn!(
                        attempt,
                        retry_in = ?self.config.retry_delay,
                        "attempt failed: {err:#}"
                    );
                    if !self.config.retry_delay.is_zero() {
                        std::thread::sleep(self.config.retry_delay);
                    }
                    attempt += 1;
                }
                Err(err) => {
                    remove_partial(dest)?;
                    return Err(err.context(format!("failed after {attempts} attempts")));
                }
            }
        }
    }

    fn fetch_to_file(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("casefetch/", env!("CARGO_PKG_VERSION")))
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;

        let file = File::create(dest).with_context(|| format!("create: {}", dest.display()))?;
        let mut writer = BufWriter::new(file);
        let mut chunk = vec![0_u8; self.config.chunk_size.max(1)];
        let mut written = 0_u64;
        loop {
            let n = response
                .read(&mut chunk)
                .with_context(|| format!("read body: {url}"))?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&chunk[..n])
                .with_context(|| format!("write: {}", dest.display()))?;
            written += n as u64;
        }
        writer
            .flush()
            .with_context(|| format!("flush: {}", dest.display()))?;

        Ok(written)
    }
}

fn remove_partial(dest: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(dest) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove partial file: {}", dest.display())),
    }
}
