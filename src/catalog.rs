use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::cli::{DiscoverArgs, SubgroupsArgs};
use crate::config::DiscoveryConfig;
use crate::formats::{CaseRecord, SubgroupLink};

const MONTHS: &[&str] = &[
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];
const AUTHOR_PREFIX: &str = "By ";
const SUBGROUP_TIMEOUT: Duration = Duration::from_secs(10);
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";

pub fn run(args: DiscoverArgs) -> anyhow::Result<()> {
    let start_url = parse_http_url(&args.url).context("parse --url")?;
    let out_path = Path::new(&args.out);

    let catalog = Catalog::new(DiscoveryConfig::from(&args)).context("build catalog client")?;
    let records = catalog.fetch_all(&start_url)?;

    write_json_pretty(out_path, &records)?;
    tracing::info!(total = records.len(), out = %out_path.display(), "saved catalog");
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        tracing::info!(
            title = %first.title,
            authors = %first.authors.join(", "),
            url = %first.url,
            "first case"
        );
        tracing::info!(
            title = %last.title,
            authors = %last.authors.join(", "),
            url = %last.url,
            "last case"
        );
    }
    Ok(())
}

pub fn run_subgroups(args: SubgroupsArgs) -> anyhow::Result<()> {
    let index_url = parse_http_url(&args.url).context("parse --url")?;
    let out_path = Path::new(&args.out);

    let catalog = Catalog::new(DiscoveryConfig::default()).context("build catalog client")?;
    let links = catalog.fetch_subgroups(&index_url)?;
    if links.is_empty() {
        tracing::warn!(url = %index_url, "no case study subgroups found");
        return Ok(());
    }

    for link in &links {
        tracing::info!(title = %link.title, url = %link.url, "subgroup");
    }
    write_json_pretty(out_path, &links)?;
    tracing::info!(total = links.len(), out = %out_path.display(), "saved subgroups");
    Ok(())
}

/// Query tokens carried by the load-more link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationTokens {
    /// `pid`
    pub page_id: String,
    /// `base_nid`
    pub base_id: String,
    pub offset: u64,
}

#[derive(Debug)]
pub struct Catalog {
    config: DiscoveryConfig,
    client: reqwest::blocking::Client,
    selectors: Selectors,
}

impl Catalog {
    pub fn new(config: DiscoveryConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("build discovery http client")?;
        let selectors = Selectors::new(&config.resource_prefix)?;
        Ok(Self {
            config,
            client,
            selectors,
        })
    }

    /// Collects every card from the listing page, then follows the load-more
    /// API until it answers with nothing.
    pub fn fetch_all(&self, start_url: &Url) -> anyhow::Result<Vec<CaseRecord>> {
        tracing::info!(url = %start_url, "fetching initial page");
        let html = self
            .get_text(self.client.get(start_url.clone()))
            .with_context(|| format!("fetch listing page: {start_url}"))?;
        let doc = Html::parse_document(&html);

        let mut records = self.parse_listing(&doc, start_url);
        tracing::info!(count = records.len(), "cases on initial page");

        let Some(tokens) = self.find_pagination_tokens(&doc, start_url) else {
            return Ok(records);
        };
        tracing::info!(
            pid = %tokens.page_id,
            base_nid = %tokens.base_id,
            offset = tokens.offset,
            "fetching additional cases via load-more api"
        );

        self.paginate(&tokens, &mut records);
        tracing::info!(total = records.len(), "discovery finished");
        Ok(records)
    }

    fn parse_listing(&self, doc: &Html, page_url: &Url) -> Vec<CaseRecord> {
        let cards = doc
            .select(&self.selectors.cards)
            .filter(|anchor| !points_to(anchor, page_url))
            .filter(|anchor| anchor.select(&self.selectors.heading).next().is_some());

        let mut records = Vec::new();
        for (idx, anchor) in cards.enumerate() {
            let record = parse_case_element(anchor, &self.selectors, page_url);
            if !record.title.is_empty() {
                records.push(record);
            } else if idx == 0 {
                let snippet = anchor.html().chars().take(500).collect::<String>();
                tracing::debug!(%snippet, "first card has no title");
            }
        }
        records
    }

    fn find_pagination_tokens(&self, doc: &Html, page_url: &Url) -> Option<PaginationTokens> {
        let Some(load_more) = doc
            .select(&self.selectors.links)
            .find(|anchor| element_text(*anchor) == self.config.load_more_label)
        else {
            tracing::info!("no load-more link; returning initial results only");
            return None;
        };

        let href = load_more.value().attr("href").unwrap_or_default();
        if href.is_empty() {
            tracing::info!("load-more link has no href; returning initial results only");
            return None;
        }

        let tokens = parse_load_more(href, page_url, self.config.page_size);
        if tokens.is_none() {
            tracing::info!(
                %href,
                "could not extract api parameters; returning initial results only"
            );
        }
        tokens
    }

    fn paginate(&self, tokens: &PaginationTokens, records: &mut Vec<CaseRecord>) {
        let mut offset = tokens.offset;
        let mut batches = 0_usize;

        loop {
            if let Some(max) = self.config.max_batches {
                if batches >= max {
                    tracing::warn!(max_batches = max, "batch cap reached; stopping pagination");
                    break;
                }
            }
            batches += 1;

            tracing::info!(batch = batches, offset, "fetching batch");
            let body = match self.fetch_batch(tokens, offset) {
                Ok(body) => body,
                Err(err) => {
                    tracing::warn!("error fetching batch: {err:#}");
                    break;
                }
            };

            let Some(batch) = self.parse_fragment(&body) else {
                tracing::info!("no more cases; all cases fetched");
                break;
            };
            tracing::info!(count = batch.len(), "cases in batch");
            records.extend(batch);

            offset += self.config.page_size;
            if !self.config.batch_delay.is_zero() {
                std::thread::sleep(self.config.batch_delay);
            }
        }
    }

    /// `None` signals the end of the catalog: a whitespace-only body or a
    /// fragment without card anchors.
    fn parse_fragment(&self, body: &str) -> Option<Vec<CaseRecord>> {
        if body.trim().is_empty() {
            return None;
        }
        let base = Url::parse(&self.config.api_url).ok();
        let fragment = Html::parse_fragment(body);
        let anchors = fragment.select(&self.selectors.cards).collect::<Vec<_>>();
        if anchors.is_empty() {
            return None;
        }
        Some(
            anchors
                .into_iter()
                .map(|anchor| parse_case_element_with_base(anchor, &self.selectors, base.as_ref()))
                .filter(|record| !record.title.is_empty())
                .collect(),
        )
    }

    fn fetch_batch(&self, tokens: &PaginationTokens, offset: u64) -> anyhow::Result<String> {
        let offset = offset.to_string();
        let request = self.client.get(&self.config.api_url).query(&[
            ("pid", tokens.page_id.as_str()),
            ("base_nid", tokens.base_id.as_str()),
            ("offset", offset.as_str()),
        ]);
        self.get_text(request)
    }

    pub fn fetch_subgroups(&self, index_url: &Url) -> anyhow::Result<Vec<SubgroupLink>> {
        tracing::info!(url = %index_url, "fetching case study subgroups");
        let request = self.client.get(index_url.clone()).timeout(SUBGROUP_TIMEOUT);
        match self.get_text(request) {
            Ok(html) => Ok(parse_subgroups(
                &html,
                index_url,
                self.config.resource_prefix.trim_matches('/'),
            )),
            Err(err) => {
                tracing::warn!("error fetching subgroup index: {err:#}");
                Ok(Vec::new())
            }
        }
    }

    fn get_text(&self, request: reqwest::blocking::RequestBuilder) -> anyhow::Result<String> {
        let response = request
            .header(USER_AGENT, concat!("casefetch/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .context("send request")?;
        let url = response.url().clone();
        let response = response
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        response.text().with_context(|| format!("read body: {url}"))
    }
}

#[derive(Debug)]
struct Selectors {
    cards: Selector,
    links: Selector,
    heading: Selector,
    paragraph: Selector,
    container: Selector,
}

impl Selectors {
    fn new(resource_prefix: &str) -> anyhow::Result<Self> {
        Ok(Self {
            cards: selector(&format!(r#"a[href^="{resource_prefix}"]"#))?,
            links: selector("a")?,
            heading: selector("h3")?,
            paragraph: selector("p")?,
            container: selector("div")?,
        })
    }
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("parse selector {css:?}: {err}"))
}

fn parse_case_element(anchor: ElementRef<'_>, selectors: &Selectors, base: &Url) -> CaseRecord {
    parse_case_element_with_base(anchor, selectors, Some(base))
}

/// Builds one record from a card anchor. Missing parts stay empty.
fn parse_case_element_with_base(
    anchor: ElementRef<'_>,
    selectors: &Selectors,
    base: Option<&Url>,
) -> CaseRecord {
    let href = anchor.value().attr("href").unwrap_or_default();
    let url = resolve_href(href, base);

    let title = anchor
        .select(&selectors.heading)
        .next()
        .map(element_text)
        .unwrap_or_default();

    let mut authors = Vec::new();
    let mut date = String::new();
    let mut others = Vec::new();
    for paragraph in anchor.select(&selectors.paragraph) {
        let text = element_text(paragraph);
        match text.strip_prefix(AUTHOR_PREFIX) {
            Some(names) if authors.is_empty() => {
                authors = names.split(',').map(|name| name.trim().to_owned()).collect();
            }
            _ if looks_like_date(&text) => date = text,
            _ => others.push(text),
        }
    }
    let description = pick_description(others.iter().map(String::as_str));

    let categories = anchor
        .select(&selectors.container)
        .next()
        .map(element_text)
        .unwrap_or_default();

    CaseRecord {
        url,
        title,
        authors,
        description,
        date,
        categories,
    }
}

/// Longest candidate wins; on equal length the first one seen is kept.
pub fn pick_description<'a>(candidates: impl IntoIterator<Item = &'a str>) -> String {
    let mut best = "";
    let mut best_len = 0;
    for candidate in candidates {
        let len = candidate.chars().count();
        if len > best_len {
            best = candidate;
            best_len = len;
        }
    }
    best.to_owned()
}

fn looks_like_date(text: &str) -> bool {
    text.contains(',') && MONTHS.iter().any(|month| text.contains(month))
}

/// Recovers `pid`, `base_nid` and `offset` from a load-more href.
/// `offset` falls back to `default_offset` when absent.
pub fn parse_load_more(href: &str, base: &Url, default_offset: u64) -> Option<PaginationTokens> {
    let url = base.join(href).ok()?;

    let mut page_id = None;
    let mut base_id = None;
    let mut offset = None;
    for (key, value) in url.query_pairs() {
        match &*key {
            "pid" if page_id.is_none() => page_id = Some(value.into_owned()),
            "base_nid" if base_id.is_none() => base_id = Some(value.into_owned()),
            "offset" if offset.is_none() => offset = Some(value.into_owned()),
            _ => {}
        }
    }

    let page_id = page_id.filter(|v| !v.is_empty())?;
    let base_id = base_id.filter(|v| !v.is_empty())?;
    let offset = match offset {
        Some(raw) => raw.trim().parse().ok()?,
        None => default_offset,
    };

    Some(PaginationTokens {
        page_id,
        base_id,
        offset,
    })
}

/// Anchors under the resource path whose href mentions `case`, resolved,
/// deduplicated, and excluding the index page itself.
pub fn parse_subgroups(html: &str, index_url: &Url, path_segment: &str) -> Vec<SubgroupLink> {
    let doc = Html::parse_document(html);
    let Ok(anchors) = selector("a[href]") else {
        return Vec::new();
    };

    let mut links: Vec<SubgroupLink> = Vec::new();
    for anchor in doc.select(&anchors) {
        let href = anchor.value().attr("href").unwrap_or_default();
        if !href.contains(path_segment) || !href.to_lowercase().contains("case") {
            continue;
        }
        let Ok(full) = index_url.join(href) else {
            continue;
        };
        if full == *index_url || links.iter().any(|link| link.url == full.as_str()) {
            continue;
        }
        let title = element_text(anchor);
        if !title.is_empty() {
            links.push(SubgroupLink {
                title,
                url: full.to_string(),
            });
        }
    }
    links
}

fn resolve_href(href: &str, base: Option<&Url>) -> String {
    if href.is_empty() || href.starts_with("http") {
        return href.to_owned();
    }
    base.and_then(|base| base.join(href).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| href.to_owned())
}

fn points_to(anchor: &ElementRef<'_>, page_url: &Url) -> bool {
    let Some(href) = anchor.value().attr("href") else {
        return false;
    };
    let Ok(mut target) = page_url.join(href) else {
        return false;
    };
    target.set_fragment(None);
    let mut page = page_url.clone();
    page.set_fragment(None);
    target == page
}

/// Concatenated text with whitespace runs collapsed to single spaces.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid url: {raw}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("url must be http/https: {url}");
    }
    Ok(url)
}

fn write_json_pretty<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    let mut data = serde_json::to_vec_pretty(value).context("serialize json")?;
    data.push(b'\n');
    std::fs::write(path, data).with_context(|| format!("write: {}", path.display()))
}
