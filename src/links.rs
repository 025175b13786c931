use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::cli::LinksArgs;
use crate::formats::LinkEntry;

const BANNER_PREFIXES: &[&str] = &["===", "PDF DOWNLOAD", "SUMMARY"];
const URL_SCHEME: &str = "http";
const FILE_MARKER: &str = ".pdf";

static NUMBERED_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\s+(.+)$").expect("numbered title regex"));
static PART_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(FULL CASE|PART \d+):\s*(.+)$").expect("part label regex"));

pub fn run(args: LinksArgs) -> anyhow::Result<()> {
    let entries = extract(Path::new(&args.links))?;
    tracing::info!(count = entries.len(), file = %args.links, "extracted links");

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for entry in entries {
        serde_json::to_writer(&mut out, &entry).context("serialize link entry")?;
        out.write_all(b"\n").context("write link entry newline")?;
    }
    out.flush().context("flush stdout")?;
    Ok(())
}

/// Reads a curated link file and returns its entries in file order.
pub fn extract(path: &Path) -> anyhow::Result<Vec<LinkEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read link file: {}", path.display()))?;
    Ok(parse_links(&contents))
}

/// A `<n>. <title>` line sets the title for the URL lines that follow it.
/// `FULL CASE:` / `PART <n>:` prefixes split one title into labelled parts.
pub fn parse_links(contents: &str) -> Vec<LinkEntry> {
    let mut entries = Vec::new();
    let mut current_title = String::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || is_banner(line) {
            continue;
        }

        if let Some(caps) = NUMBERED_TITLE.captures(line) {
            current_title = caps[1].to_owned();
            continue;
        }

        if let Some(caps) = PART_LABEL.captures(line) {
            let url = caps[2].trim();
            if is_file_url(url) {
                let title = format!("{current_title} - {}", &caps[1]);
                entries.push(LinkEntry::new(title, url));
            }
            continue;
        }

        if is_file_url(line) {
            entries.push(LinkEntry::new(current_title.clone(), line));
        }
    }

    entries
}

fn is_banner(line: &str) -> bool {
    BANNER_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

fn is_file_url(text: &str) -> bool {
    text.starts_with(URL_SCHEME) && text.to_ascii_lowercase().contains(FILE_MARKER)
}
