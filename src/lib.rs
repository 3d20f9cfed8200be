pub mod config;
pub mod crawler;
pub mod extract;
pub mod filter;
pub mod jobs;
pub mod source;
pub mod storage;
pub mod types;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crawler::{CrawlOutcome, CrawlReport, Crawler, StopSignal};
    pub use crate::filter::FilteredPost;
    pub use crate::jobs::{JobHandle, JobRecord, JobRegistry, JobRequest, JobStatus};
    pub use crate::source::{ListingSource, RedditSource};
    pub use crate::storage::{OutputFile, OutputStore, ViewEntry};
    pub use crate::types::{NormalizedPost, RawPost};
    pub use crate::{ImgCrawl, SavedCrawl};
}

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::crawler::{CrawlReport, Crawler, StopSignal};
use crate::jobs::{JobHandle, JobRecord, JobRegistry, JobRequest};
use crate::source::{ListingSource, RedditSource};
use crate::storage::{checked_name, OutputFile, OutputStore};

/// A foreground crawl and the result of writing it out. When `saved` is an error the
/// posts are still in `report`, so the caller can retry the write or discard them.
#[derive(Debug)]
pub struct SavedCrawl {
    pub report: CrawlReport,
    pub saved: Result<PathBuf>,
}

/// Library entry point: one crawler, the output directory, and the background jobs
/// started through it.
pub struct ImgCrawl<S = RedditSource> {
    crawler: Arc<Crawler<S>>,
    store: OutputStore,
    jobs: JobRegistry,
}

impl ImgCrawl<RedditSource> {
    /// Build against the live listing API.
    pub fn connect(config: Config) -> Result<Self> {
        let store = OutputStore::from_config(&config);
        Ok(Self::with_crawler(Crawler::reddit(config)?, store))
    }
}

impl<S: ListingSource + 'static> ImgCrawl<S> {
    pub fn with_crawler(crawler: Crawler<S>, store: OutputStore) -> Self {
        Self { crawler: Arc::new(crawler), store, jobs: JobRegistry::new() }
    }

    pub fn config(&self) -> &Config { self.crawler.config() }
    pub fn store(&self) -> &OutputStore { &self.store }
    pub fn jobs(&self) -> &JobRegistry { &self.jobs }

    pub fn resolve_collection(&self, collection: &str) -> Result<String> { self.crawler.resolve_collection(collection) }

    /// Crawl in the foreground and save whatever was collected, even after a failed fetch.
    /// Bad collection or output names are an error before any request is made.
    pub async fn crawl_and_save(&self, collection: &str, pages: u32, output: Option<&str>, stop: &StopSignal) -> Result<SavedCrawl> {
        if let Some(name) = output { checked_name(name)?; }
        let report = self.crawler.crawl_with(collection, pages, stop).await?;
        let saved = self.store.save(&report.posts, output).await;
        if let Err(e) = &saved {
            tracing::error!(collection = %report.collection, posts = report.posts.len(), error = %format!("{e:#}"), "Could not save crawl results");
        }
        Ok(SavedCrawl { report, saved })
    }

    /// Start a crawl in the background; poll [`JobRegistry::status`] or join the handle.
    pub fn submit(&self, request: JobRequest) -> Result<JobHandle> {
        self.jobs.submit(self.crawler.clone(), self.store.clone(), request)
    }

    pub fn list_jobs(&self) -> Vec<JobRecord> { self.jobs.list() }

    pub fn list_files(&self) -> Result<Vec<String>> { self.store.list() }

    pub fn open_file(&self, name: Option<&str>) -> Result<Option<OutputFile>> { self.store.open(name) }
}
