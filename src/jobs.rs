//! Background crawl jobs with observable status.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::crawler::{CrawlOutcome, CrawlReport, Crawler, StopSignal};
use crate::source::ListingSource;
use crate::storage::{checked_name, OutputStore};

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub collection: String,
    pub pages: u32,
    /// Output file name; the store's timestamped default when `None`.
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done { path: PathBuf, posts: usize },
    /// Stopped via [`JobRegistry::cancel`]; what was collected is still saved.
    Cancelled { path: PathBuf, posts: usize },
    /// The results could not be saved, or the task died. Whatever was collected is kept
    /// in [`JobRegistry::report`].
    Failed { error: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub collection: String,
    pub status: JobStatus,
}

struct Entry {
    record: JobRecord,
    stop: StopSignal,
    report: Option<CrawlReport>,
}

/// Tracks crawl jobs spawned onto the tokio runtime. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

/// Returned by [`JobRegistry::submit`]. Dropping it detaches the job; it keeps running.
pub struct JobHandle {
    pub id: Uuid,
    task: JoinHandle<()>,
}

impl JobHandle {
    /// Wait for the job to finish. Its result is available from the registry.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(job = %self.id, error = %e, "Crawl job supervisor aborted");
        }
    }
}

impl JobRegistry {
    pub fn new() -> Self { Self::default() }

    /// Spawn a crawl that saves its results when it ends. A failed fetch still saves
    /// the partial results; only a failed save (or a crashed task) marks the job as failed.
    /// The collection and output names are checked up front, so a bad name fails here.
    pub fn submit<S>(&self, crawler: Arc<Crawler<S>>, store: OutputStore, request: JobRequest) -> Result<JobHandle>
    where S: ListingSource + 'static {
        let collection = crawler.resolve_collection(&request.collection)?;
        if let Some(name) = request.output.as_deref() { checked_name(name)?; }

        let id = Uuid::new_v4();
        let stop = StopSignal::new();
        self.lock().insert(id, Entry {
            record: JobRecord { id, collection: collection.clone(), status: JobStatus::Pending },
            stop: stop.clone(),
            report: None,
        });
        tracing::info!(job = %id, collection = %collection, "Queued crawl job");

        let registry = self.clone();
        let work = tokio::spawn(async move {
            registry.set_status(id, JobStatus::Running);
            let report = match crawler.crawl_with(&collection, request.pages, &stop).await {
                Ok(report) => report,
                Err(e) => {
                    registry.set_status(id, JobStatus::Failed { error: format!("{e:#}") });
                    return;
                }
            };
            let posts = report.posts.len();
            let status = match store.save(&report.posts, request.output.as_deref()).await {
                Ok(path) if report.outcome == CrawlOutcome::Stopped => JobStatus::Cancelled { path, posts },
                Ok(path) => JobStatus::Done { path, posts },
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::error!(job = %id, error = %error, posts, "Crawl job could not save results");
                    JobStatus::Failed { error }
                }
            };
            registry.finish(id, status, report);
        });

        let registry = self.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = work.await {
                let error = if e.is_panic() { "crawl task panicked".to_string() } else { format!("crawl task aborted: {e}") };
                tracing::error!(job = %id, error = %error, "Crawl job died");
                registry.set_status(id, JobStatus::Failed { error });
            }
        });
        Ok(JobHandle { id, task })
    }

    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.lock().get(&id).map(|e| e.record.status.clone())
    }

    /// Posts collected by a finished job, including one whose save failed.
    pub fn report(&self, id: Uuid) -> Option<CrawlReport> {
        self.lock().get(&id).and_then(|e| e.report.clone())
    }

    pub fn list(&self) -> Vec<JobRecord> {
        let mut out: Vec<JobRecord> = self.lock().values().map(|e| e.record.clone()).collect();
        out.sort_by(|a, b| a.collection.cmp(&b.collection).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Ask a job to stop before its next page. Returns false for unknown or finished jobs.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.lock().get(&id) {
            Some(e) if !e.record.status.is_finished() => { e.stop.stop(); true }
            _ => false,
        }
    }

    fn set_status(&self, id: Uuid, status: JobStatus) {
        if let Some(e) = self.lock().get_mut(&id) {
            tracing::debug!(job = %id, status = ?status, "Job status changed");
            e.record.status = status;
        }
    }

    fn finish(&self, id: Uuid, status: JobStatus, report: CrawlReport) {
        if let Some(e) = self.lock().get_mut(&id) {
            tracing::debug!(job = %id, status = ?status, "Job finished");
            e.record.status = status;
            e.report = Some(report);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Entry>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::source::testing::{direct, page, ScriptedSource};

    fn crawler(pages: Vec<Result<serde_json::Value, String>>) -> Arc<Crawler<ScriptedSource>> {
        Arc::new(Crawler::new(ScriptedSource::new(pages), Config::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn finished_job_reports_saved_file() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let c = crawler(vec![Ok(page(vec![direct("a", "https://i.redd.it/a.jpg")], None))]);
        let req = JobRequest { collection: "pics".into(), pages: 3, output: Some("pics.json".into()) };

        let handle = registry.submit(c, OutputStore::new(tmp.path()), req).unwrap();
        let id = handle.id;
        assert_eq!(registry.status(id), Some(JobStatus::Pending));
        handle.join().await;

        assert_eq!(registry.status(id), Some(JobStatus::Done { path: tmp.path().join("pics.json"), posts: 1 }));
        assert!(!registry.cancel(id));
        assert_eq!(registry.list().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_still_saves_partial_results() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let c = crawler(vec![
            Ok(page(vec![direct("a", "https://i.redd.it/a.jpg")], Some("t3_1"))),
            Err("timed out".into()),
        ]);
        let req = JobRequest { collection: "pics".into(), pages: 5, output: Some("partial.json".into()) };
        let handle = registry.submit(c, OutputStore::new(tmp.path()), req).unwrap();
        let id = handle.id;
        handle.join().await;

        assert!(matches!(registry.status(id), Some(JobStatus::Done { posts: 1, .. })));
        assert_eq!(OutputStore::new(tmp.path()).read_posts("partial.json").unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unwritable_output_fails_but_keeps_posts() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let registry = JobRegistry::new();
        let c = crawler(vec![Ok(page(
            vec![direct("a", "https://i.redd.it/a.jpg"), direct("b", "https://i.redd.it/b.jpg")],
            None,
        ))]);
        let req = JobRequest { collection: "pics".into(), pages: 1, output: None };
        let handle = registry.submit(c, OutputStore::new(&blocker), req).unwrap();
        let id = handle.id;
        handle.join().await;
        assert!(matches!(registry.status(id), Some(JobStatus::Failed { .. })));

        // the caller can still write the results somewhere else
        let report = registry.report(id).unwrap();
        assert_eq!(report.posts.len(), 2);
        let retry = OutputStore::new(tmp.path().join("retry"));
        retry.save(&report.posts, Some("pics.json")).await.unwrap();
        assert_eq!(retry.read_posts("pics.json").unwrap(), report.posts);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_names_are_rejected_before_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let c = crawler(vec![Ok(page(vec![], None))]);
        let store = OutputStore::new(tmp.path());

        let bad_collection = JobRequest { collection: "pics/top".into(), pages: 1, output: None };
        assert!(registry.submit(c.clone(), store.clone(), bad_collection).is_err());
        let bad_output = JobRequest { collection: "pics".into(), pages: 1, output: Some("../pics.json".into()) };
        assert!(registry.submit(c.clone(), store, bad_output).is_err());

        assert!(registry.list().is_empty());
    }

    struct PanickingSource;

    #[async_trait::async_trait]
    impl ListingSource for PanickingSource {
        async fn fetch_page(&self, _: &str, _: Option<&str>, _: u32) -> anyhow::Result<crate::types::Listing> {
            panic!("listing decoder bug");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_job_is_marked_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let c = Arc::new(Crawler::new(PanickingSource, Config::default()));
        let req = JobRequest { collection: "pics".into(), pages: 1, output: None };
        let handle = registry.submit(c, OutputStore::new(tmp.path()), req).unwrap();
        let id = handle.id;
        handle.join().await;

        assert_eq!(registry.status(id), Some(JobStatus::Failed { error: "crawl task panicked".into() }));
        assert!(!registry.cancel(id));
        assert!(registry.report(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_job_stops_before_next_page() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let c = crawler(vec![Ok(page(vec![direct("a", "https://i.redd.it/a.jpg")], Some("t3_1")))]);
        let req = JobRequest { collection: "pics".into(), pages: 5, output: Some("c.json".into()) };
        let handle = registry.submit(c.clone(), OutputStore::new(tmp.path()), req).unwrap();
        let id = handle.id;
        // The task has not been polled yet on the paused current-thread runtime.
        assert!(registry.cancel(id));
        handle.join().await;

        assert!(matches!(registry.status(id), Some(JobStatus::Cancelled { posts: 0, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_jobs_keep_separate_results() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new();
        let store = OutputStore::new(tmp.path());
        let a = registry.submit(
            crawler(vec![Ok(page(vec![direct("a", "https://i.redd.it/a.jpg")], None))]),
            store.clone(),
            JobRequest { collection: "one".into(), pages: 1, output: Some("one.json".into()) },
        ).unwrap();
        let b = registry.submit(
            crawler(vec![Ok(page(
                vec![direct("b", "https://i.redd.it/b.jpg"), direct("c", "https://i.redd.it/c.jpg")],
                None,
            ))]),
            store.clone(),
            JobRequest { collection: "two".into(), pages: 1, output: Some("two.json".into()) },
        ).unwrap();
        futures::future::join(a.join(), b.join()).await;

        assert_eq!(store.read_posts("one.json").unwrap().len(), 1);
        assert_eq!(store.read_posts("two.json").unwrap().len(), 2);
        let collections: Vec<String> = registry.list().into_iter().map(|r| r.collection).collect();
        assert_eq!(collections, ["one", "two"]);
    }
}
