mod http_stub;

use std::time::Duration;

use casefetch::catalog::Catalog;
use casefetch::config::DiscoveryConfig;
use http_stub::{StubResponse, StubServer};
use url::Url;

const LISTING_PATH: &str = "/teaching-resources-library/cases";
const API_PATH: &str = "/api/loadmore/dynamic_list_master";

fn card(slug: &str, title: &str) -> String {
    format!(
        r#"<a href="/teaching-resources-library/{slug}">
  <div>Operations</div>
  <h3>{title}</h3>
  <p>By Ann Lee, Bo Kim</p>
  <p>June 1, 2022</p>
  <p>About {title}.</p>
</a>"#
    )
}

fn listing(with_load_more: bool) -> String {
    let load_more = if with_load_more {
        format!(r#"<a class="button" href="{API_PATH}?pid=7&offset=10&base_nid=3">Load More</a>"#)
    } else {
        String::new()
    };
    format!(
        r#"<!doctype html>
<html><body>
<nav>
  <a href="{LISTING_PATH}">Case studies</a>
  <a href="/teaching-resources-library/about">About</a>
</nav>
{}
{}
{load_more}
</body></html>"#,
        card("alpha", "Alpha"),
        card("beta", "Beta"),
    )
}

fn config(server: &StubServer) -> DiscoveryConfig {
    DiscoveryConfig {
        api_url: server.url(API_PATH),
        batch_delay: Duration::ZERO,
        ..DiscoveryConfig::default()
    }
}

fn offset_of(url: &str) -> Option<u64> {
    let parsed = Url::parse(&format!("http://stub{url}")).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "offset")
        .and_then(|(_, value)| value.parse().ok())
}

fn titles(records: &[casefetch::formats::CaseRecord]) -> Vec<&str> {
    records.iter().map(|record| record.title.as_str()).collect()
}

#[test]
fn pagination_stops_on_empty_body_and_keeps_batch_order() -> anyhow::Result<()> {
    let server = StubServer::spawn(|url| {
        if url.starts_with(LISTING_PATH) {
            return StubResponse::html(&listing(true));
        }
        match offset_of(url) {
            Some(10) => StubResponse::html(&format!(
                "{}{}",
                card("gamma", "Gamma"),
                card("delta", "Delta")
            )),
            Some(20) => StubResponse::html(&card("epsilon", "Epsilon")),
            Some(30) => StubResponse::html("   \n"),
            _ => StubResponse::status(404),
        }
    });

    let catalog = Catalog::new(config(&server))?;
    let start = Url::parse(&server.url(LISTING_PATH))?;
    let records = catalog.fetch_all(&start)?;

    assert_eq!(
        titles(&records),
        vec!["Alpha", "Beta", "Gamma", "Delta", "Epsilon"]
    );
    assert_eq!(
        records[2].url,
        server.url("/teaching-resources-library/gamma")
    );
    assert_eq!(records[0].authors, vec!["Ann Lee", "Bo Kim"]);
    assert_eq!(records[0].date, "June 1, 2022");
    assert_eq!(records[0].description, "About Alpha.");
    assert_eq!(records[0].categories, "Operations");

    let api_calls = server
        .requests()
        .into_iter()
        .filter(|url| url.starts_with(API_PATH))
        .collect::<Vec<_>>();
    assert_eq!(
        api_calls.iter().map(|url| offset_of(url)).collect::<Vec<_>>(),
        vec![Some(10), Some(20), Some(30)]
    );
    assert!(api_calls.iter().all(|url| url.contains("pid=7") && url.contains("base_nid=3")));
    Ok(())
}

#[test]
fn fragment_without_cards_ends_pagination() -> anyhow::Result<()> {
    let server = StubServer::spawn(|url| {
        if url.starts_with(LISTING_PATH) {
            return StubResponse::html(&listing(true));
        }
        match offset_of(url) {
            Some(10) => StubResponse::html(&card("gamma", "Gamma")),
            _ => StubResponse::html("<p>That's all.</p>"),
        }
    });

    let catalog = Catalog::new(config(&server))?;
    let records = catalog.fetch_all(&Url::parse(&server.url(LISTING_PATH))?)?;

    assert_eq!(titles(&records), vec!["Alpha", "Beta", "Gamma"]);
    assert_eq!(server.hits(API_PATH), 2);
    Ok(())
}

#[test]
fn batch_failure_keeps_collected_records() -> anyhow::Result<()> {
    let server = StubServer::spawn(|url| {
        if url.starts_with(LISTING_PATH) {
            return StubResponse::html(&listing(true));
        }
        match offset_of(url) {
            Some(10) => StubResponse::html(&card("gamma", "Gamma")),
            _ => StubResponse::status(500),
        }
    });

    let catalog = Catalog::new(config(&server))?;
    let records = catalog.fetch_all(&Url::parse(&server.url(LISTING_PATH))?)?;

    assert_eq!(titles(&records), vec!["Alpha", "Beta", "Gamma"]);
    assert_eq!(server.hits(API_PATH), 2);
    Ok(())
}

#[test]
fn batch_cap_stops_an_endless_endpoint() -> anyhow::Result<()> {
    let server = StubServer::spawn(|url| {
        if url.starts_with(LISTING_PATH) {
            return StubResponse::html(&listing(true));
        }
        StubResponse::html(&card("again", "Again"))
    });

    let catalog = Catalog::new(DiscoveryConfig {
        max_batches: Some(3),
        ..config(&server)
    })?;
    let records = catalog.fetch_all(&Url::parse(&server.url(LISTING_PATH))?)?;

    assert_eq!(records.len(), 5);
    assert_eq!(server.hits(API_PATH), 3);
    Ok(())
}

#[test]
fn listing_without_load_more_returns_initial_cards() -> anyhow::Result<()> {
    let server = StubServer::spawn(|_| StubResponse::html(&listing(false)));

    let catalog = Catalog::new(config(&server))?;
    let records = catalog.fetch_all(&Url::parse(&server.url(LISTING_PATH))?)?;

    assert_eq!(titles(&records), vec!["Alpha", "Beta"]);
    assert_eq!(server.hits(API_PATH), 0);
    Ok(())
}

#[test]
fn listing_fetch_failure_is_an_error() -> anyhow::Result<()> {
    let server = StubServer::spawn(|_| StubResponse::status(503));

    let catalog = Catalog::new(config(&server))?;
    let err = catalog
        .fetch_all(&Url::parse(&server.url(LISTING_PATH))?)
        .unwrap_err();

    assert!(format!("{err:#}").contains("fetch listing page"));
    Ok(())
}
