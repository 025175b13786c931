use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{DiscoverArgs, DownloadArgs};

pub const DEFAULT_LISTING_URL: &str =
    "https://mitsloan.mit.edu/teaching-resources-library/mit-sloan-case-studies-0";
pub const DEFAULT_SUBGROUPS_URL: &str =
    "https://mitsloan.mit.edu/teaching-resources-library/case-studies";
pub const DEFAULT_API_URL: &str = "https://mitsloan.mit.edu/api/loadmore/dynamic_list_master";

/// Knobs for catalog discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Endpoint answering load-more requests with an HTML fragment.
    pub api_url: String,
    /// Card anchors must have an href starting with this path.
    pub resource_prefix: String,
    /// Exact text of the load-more link.
    pub load_more_label: String,
    /// Offset increment per batch.
    pub page_size: u64,
    pub batch_delay: Duration,
    /// Stop after this many API batches even if the endpoint keeps answering.
    pub max_batches: Option<usize>,
    /// `None` leaves discovery requests without a timeout.
    pub request_timeout: Option<Duration>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            resource_prefix: "/teaching-resources-library/".to_owned(),
            load_more_label: "Load More".to_owned(),
            page_size: 10,
            batch_delay: Duration::from_millis(500),
            max_batches: Some(500),
            request_timeout: None,
        }
    }
}

impl From<&DiscoverArgs> for DiscoveryConfig {
    fn from(args: &DiscoverArgs) -> Self {
        Self {
            api_url: args.api_url.clone(),
            page_size: args.page_size,
            batch_delay: Duration::from_millis(args.delay_ms),
            max_batches: (args.max_batches > 0).then_some(args.max_batches),
            ..Self::default()
        }
    }
}

/// Knobs for the tracked downloader.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub download_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pause after each entry that touched the network, except the last.
    pub entry_delay: Duration,
    pub chunk_size: usize,
    pub max_name_len: usize,
    pub extension: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloaded_pdfs"),
            ledger_path: PathBuf::from("download_tracking.json"),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            entry_delay: Duration::from_millis(500),
            chunk_size: 8192,
            max_name_len: 200,
            extension: ".pdf".to_owned(),
        }
    }
}

impl From<&DownloadArgs> for DownloadConfig {
    fn from(args: &DownloadArgs) -> Self {
        Self {
            download_dir: PathBuf::from(&args.dir),
            ledger_path: PathBuf::from(&args.ledger),
            request_timeout: Duration::from_secs(args.timeout_secs),
            max_retries: args.max_retries.max(1),
            retry_delay: Duration::from_millis(args.retry_delay_ms),
            entry_delay: Duration::from_millis(args.delay_ms),
            ..Self::default()
        }
    }
}
