use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::extract::extract_from;
use crate::source::{ListingSource, RedditSource};
use crate::types::{Listing, NormalizedPost};

/// Wait between consecutive listing requests. Fixed: the source's abuse protection
/// triggers on faster paging.
pub const POLITENESS_DELAY: Duration = Duration::from_secs(2);

pub const MIN_PAGES: u32 = 1;
pub const MAX_PAGES: u32 = 50;

pub fn clamp_pages(pages: u32) -> u32 { pages.clamp(MIN_PAGES, MAX_PAGES) }

/// Cooperative stop flag, checked once before every fetch.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self { Self::default() }
    pub fn stop(&self) { self.0.store(true, Ordering::Relaxed) }
    pub fn is_stopped(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// The requested number of pages was fetched.
    BudgetExhausted,
    /// The source returned no next cursor.
    EndOfListing,
    /// A request failed; posts from earlier pages are kept.
    FetchFailed(String),
    Stopped,
}

#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub collection: String,
    pub posts: Vec<NormalizedPost>,
    /// Requests issued, including a failed last one.
    pub pages_fetched: u32,
    pub outcome: CrawlOutcome,
}

// Per-invocation state; lives only for the duration of one crawl.
struct CrawlJob {
    collection: String,
    budget: u32,
    after: Option<String>,
    posts: Vec<NormalizedPost>,
    pages_done: u32,
    fetches: u32,
}

impl CrawlJob {
    fn finish(self, outcome: CrawlOutcome) -> CrawlReport {
        CrawlReport { collection: self.collection, posts: self.posts, pages_fetched: self.fetches, outcome }
    }
}

/// Walks a collection's listing page by page and keeps the posts that carry an image.
pub struct Crawler<S> {
    source: S,
    config: Config,
}

impl Crawler<RedditSource> {
    pub fn reddit(config: Config) -> Result<Self> {
        let source = RedditSource::new(&config)?;
        Ok(Self::new(source, config))
    }
}

impl<S: ListingSource> Crawler<S> {
    pub fn new(source: S, config: Config) -> Self { Self { source, config } }

    pub fn config(&self) -> &Config { &self.config }
    pub fn source(&self) -> &S { &self.source }

    /// Blank names fall back to the configured default collection. Anything other than
    /// letters, digits and `_` is rejected so the name cannot reshape the request path.
    pub fn resolve_collection(&self, collection: &str) -> Result<String> {
        let trimmed = collection.trim().trim_start_matches("r/");
        if trimmed.is_empty() {
            return Ok(self.config.default_collection.clone());
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            bail!("invalid collection name: {trimmed:?}");
        }
        Ok(trimmed.to_string())
    }

    pub async fn crawl(&self, collection: &str, pages: u32) -> Result<Vec<NormalizedPost>> {
        Ok(self.crawl_with(collection, pages, &StopSignal::new()).await?.posts)
    }

    /// Errors only on a bad collection name, before anything is fetched. Failures while
    /// paging end the crawl and are reported through [`CrawlReport::outcome`].
    pub async fn crawl_with(&self, collection: &str, pages: u32, stop: &StopSignal) -> Result<CrawlReport> {
        let mut job = CrawlJob {
            collection: self.resolve_collection(collection)?,
            budget: clamp_pages(pages),
            after: None,
            posts: Vec::new(),
            pages_done: 0,
            fetches: 0,
        };
        tracing::info!(collection = %job.collection, pages = job.budget, "Starting crawl");

        let outcome = loop {
            if stop.is_stopped() {
                tracing::info!(collection = %job.collection, "Crawl stopped by caller");
                break CrawlOutcome::Stopped;
            }

            job.fetches += 1;
            tracing::debug!(collection = %job.collection, after = ?job.after, "Fetching page");
            let listing = match self.source.fetch_page(&job.collection, job.after.as_deref(), self.config.page_size).await {
                Ok(listing) => listing,
                Err(e) => {
                    let msg = format!("{e:#}");
                    tracing::warn!(collection = %job.collection, error = %msg, "Failed to fetch page, stopping");
                    break CrawlOutcome::FetchFailed(msg);
                }
            };

            let found = self.collect(&listing, &mut job.posts);
            job.pages_done += 1;
            tracing::info!(
                collection = %job.collection,
                page = job.pages_done,
                budget = job.budget,
                found,
                "Scraped page"
            );

            job.after = listing.after;
            if job.after.is_none() {
                tracing::info!(collection = %job.collection, "No more pages available");
                break CrawlOutcome::EndOfListing;
            }
            if job.pages_done >= job.budget {
                // No wait after the last budgeted page: no request follows it.
                break CrawlOutcome::BudgetExhausted;
            }
            tokio::time::sleep(POLITENESS_DELAY).await;
        };

        tracing::info!(collection = %job.collection, total = job.posts.len(), outcome = ?outcome, "Crawl complete");
        Ok(job.finish(outcome))
    }

    /// Append every image-bearing post on the page; returns how many were added.
    fn collect(&self, listing: &Listing, into: &mut Vec<NormalizedPost>) -> usize {
        let before = into.len();
        for child in listing.children.iter().filter(|c| c.is_post()) {
            let Some(post) = child.post() else {
                tracing::debug!("Skipping post with unexpected shape");
                continue;
            };
            let Some(image_url) = extract_from(&post) else { continue };
            let record = NormalizedPost::from_post(post, image_url, &self.config.site_url);
            let short: String = record.title.chars().take(50).collect();
            tracing::debug!(title = %short, "Found image post");
            into.push(record);
        }
        into.len() - before
    }
}
