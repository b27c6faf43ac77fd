use anyhow::{anyhow, Context, Result};
use clap::Parser;
use reqwest::{header, Client, Url};
use scour_core::{
    Document, DocumentStore, IndexHandle, IndexStorage, RebuildCoordinator, SledStore,
};
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scour-crawler")]
#[command(about = "Crawl seed URLs breadth-first into the document store")]
struct Cli {
    /// Path to a file with seed URLs (one per line)
    #[arg(long)]
    seeds: String,
    /// Document store path
    #[arg(long, default_value = "./store")]
    store: String,
    /// Index directory, used when --rebuild is set
    #[arg(long, default_value = "./index")]
    index: String,
    /// Stop after this many pages have been stored
    #[arg(long, default_value_t = 50)]
    max_pages: usize,
    /// Pause between fetches, in milliseconds
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    /// User-Agent string sent with every request
    #[arg(long, default_value = "scour-bot/0.1 (+https://example.com/bot)")]
    user_agent: String,
    /// If true, only follow links that remain on the same host as the page
    #[arg(long, default_value_t = true)]
    same_host_only: bool,
    /// Rebuild the search index once the crawl finishes
    #[arg(long)]
    rebuild: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Cli::parse();

    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;

    let mut frontier: VecDeque<Url> = VecDeque::new();
    let seeds = File::open(&args.seeds).with_context(|| format!("opening {}", args.seeds))?;
    for line in BufReader::new(seeds).lines() {
        let s = line?.trim().to_string();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let u = Url::parse(&s).or_else(|_| Url::parse(&format!("https://{}", s)));
        if let Ok(u) = u {
            frontier.push_back(u);
        }
    }
    if frontier.is_empty() {
        return Err(anyhow!("no valid seeds"));
    }

    let store = SledStore::open(&args.store)
        .with_context(|| format!("opening store at {}", args.store))?;
    info!(
        seeds = frontier.len(),
        max_pages = args.max_pages,
        same_host_only = args.same_host_only,
        store = %args.store,
        "starting crawl"
    );

    let sel_title = Selector::parse("title").unwrap();
    let sel_body = Selector::parse("body").unwrap();
    let sel_a = Selector::parse("a").unwrap();

    let mut seen: HashSet<String> = HashSet::new();
    let mut stored = 0usize;

    while stored < args.max_pages {
        let url = match frontier.pop_front() {
            Some(u) => u,
            None => break,
        };
        let url_key = norm(&url);
        if !seen.insert(url_key.clone()) {
            continue;
        }

        info!(url = %url_key, "crawling");
        let body = match fetch(&client, &url).await {
            Ok(Some(body)) => body,
            Ok(None) => continue,
            Err(e) => {
                warn!(url = %url_key, error = %e, "fetch failed, skipping");
                continue;
            }
        };

        let (title, text, links) = extract(&body, &url, &sel_title, &sel_body, &sel_a);
        for link in links {
            if args.same_host_only && link.host_str() != url.host_str() {
                continue;
            }
            frontier.push_back(link);
        }

        match store.upsert(Document::new(&url_key, &title, &text, Some(body))) {
            Ok(doc) => {
                stored += 1;
                debug!(id = %doc.id, stored, "stored page");
            }
            Err(e) => warn!(url = %url_key, error = %e, "store write failed, skipping"),
        }

        sleep(Duration::from_millis(args.delay_ms)).await;
    }

    store.flush()?;
    info!(
        stored,
        visited = seen.len(),
        frontier = frontier.len(),
        "crawl finished"
    );

    if args.rebuild {
        let store: Arc<dyn DocumentStore> = Arc::new(store);
        let coordinator = RebuildCoordinator::new(
            store,
            IndexStorage::new(&args.index),
            Arc::new(IndexHandle::new()),
        );
        let (_, summary) = coordinator.rebuild()?;
        info!(
            documents_indexed = summary.documents_indexed,
            terms_indexed = summary.terms_indexed,
            "index rebuilt"
        );
    }

    Ok(())
}

/// Frontier and seen-set key: the URL with its fragment dropped.
fn norm(u: &Url) -> String {
    let mut s = u.clone();
    s.set_fragment(None);
    s.to_string()
}

/// GET one page. `Ok(None)` means the response is not indexable HTML: a
/// non-2xx status, a non-HTML content type, or a body past the 2 MiB cap.
async fn fetch(client: &Client, url: &Url) -> Result<Option<String>> {
    let resp = client.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        debug!(url = %url, status = %resp.status(), "skipping non-2xx response");
        return Ok(None);
    }
    if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
        if let Ok(v) = ct.to_str() {
            if !v.starts_with("text/html") {
                return Ok(None);
            }
        }
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > 2 * 1024 * 1024 {
        debug!(url = %url, len = bytes.len(), "skipping oversized page");
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&bytes).to_string()))
}

/// Pull the title, the visible body text, and the outgoing links out of a
/// page. Relative hrefs resolve against the page URL; fragments are dropped.
fn extract(
    body: &str,
    base: &Url,
    sel_title: &Selector,
    sel_body: &Selector,
    sel_a: &Selector,
) -> (String, String, Vec<Url>) {
    let doc = Html::parse_document(body);
    let title = doc
        .select(sel_title)
        .next()
        .map(|n| n.text().collect::<String>())
        .unwrap_or_default()
        .trim()
        .to_string();
    let text = doc
        .select(sel_body)
        .next()
        .map(|n| {
            n.text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let mut links = Vec::new();
    for a in doc.select(sel_a) {
        if let Some(h) = a.value().attr("href") {
            if let Ok(mut u) = Url::parse(h).or_else(|_| base.join(h)) {
                if u.scheme().starts_with("http") {
                    u.set_fragment(None);
                    links.push(u);
                }
            }
        }
    }
    (title, text, links)
}
