use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Discover(DiscoverArgs),
    Subgroups(SubgroupsArgs),
    Links(LinksArgs),
    Download(DownloadArgs),
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Listing page to start from (must be http/https).
    #[arg(long, default_value = crate::config::DEFAULT_LISTING_URL)]
    pub url: String,

    /// Output file path for the catalog JSON array.
    #[arg(long, default_value = "mit_sloan_cases.json")]
    pub out: String,

    /// Load-more API endpoint.
    #[arg(long, default_value = crate::config::DEFAULT_API_URL)]
    pub api_url: String,

    /// Offset increment per API batch.
    #[arg(long, default_value_t = 10)]
    pub page_size: u64,

    /// Delay between API batches (politeness).
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,

    /// Maximum API batches to request (0 = unlimited).
    #[arg(long, default_value_t = 500)]
    pub max_batches: usize,
}

#[derive(Debug, Args)]
pub struct SubgroupsArgs {
    /// Case study index page.
    #[arg(long, default_value = crate::config::DEFAULT_SUBGROUPS_URL)]
    pub url: String,

    /// Output file path for the subgroup JSON array.
    #[arg(long, default_value = "case_study_subgroups.json")]
    pub out: String,
}

#[derive(Debug, Args)]
pub struct LinksArgs {
    /// Curated link file (numbered titles followed by PDF URLs).
    #[arg(long, default_value = "pdf_download_links.txt")]
    pub links: String,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Curated link file (numbered titles followed by PDF URLs).
    #[arg(long, default_value = "pdf_download_links.txt")]
    pub links: String,

    /// Directory receiving downloaded files (created if absent).
    #[arg(long, default_value = "downloaded_pdfs")]
    pub dir: String,

    /// Ledger of completed downloads.
    #[arg(long, default_value = "download_tracking.json")]
    pub ledger: String,

    /// Per-request timeout.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per file before giving up.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Delay between attempts for the same file.
    #[arg(long, default_value_t = 2000)]
    pub retry_delay_ms: u64,

    /// Delay between files (politeness).
    #[arg(long, default_value_t = 500)]
    pub delay_ms: u64,
}
