mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use imgcrawl::config::Config;
use imgcrawl::crawler::StopSignal;
use imgcrawl::filter;
use imgcrawl::jobs::{JobRequest, JobStatus};
use imgcrawl::{ImgCrawl, SavedCrawl};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir { config.output_dir = dir; }

    match cli.command {
        Commands::Crawl { collection, pages, output } => {
            let app = ImgCrawl::connect(config)?;
            let pages = pages.unwrap_or(app.config().default_pages);
            let collection = collection.unwrap_or_default();

            // Ctrl-C stops after the current page; what was collected is still saved.
            let stop = StopSignal::new();
            let on_interrupt = stop.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, finishing current page");
                    on_interrupt.stop();
                }
            });

            let name = match output {
                Some(name) => name,
                None => format!("{}_posts.json", app.resolve_collection(&collection)?),
            };
            let SavedCrawl { report, saved } = app.crawl_and_save(&collection, pages, Some(&name), &stop).await?;

            println!("\n{}", "=".repeat(50));
            println!("Scraping Summary");
            println!("{}", "=".repeat(50));
            println!("Subreddit: r/{}", report.collection);
            println!("Pages fetched: {}", report.pages_fetched);
            println!("Posts with images found: {}", report.posts.len());
            println!("Stopped because: {:?}", report.outcome);
            match &saved {
                Ok(path) => println!("Output saved to: {}", path.display()),
                Err(e) => println!("Output NOT saved: {e:#}"),
            }
            println!("{}\n", "=".repeat(50));
            for (i, post) in report.posts.iter().take(3).enumerate() {
                println!("{}. Title: {}", i + 1, truncate(&post.title, 60));
                println!("   Image: {}", truncate(&post.image_url, 60));
                println!("   Score: {} | Comments: {}", post.score, post.comment_count);
            }
            if let Err(e) = saved {
                // Fall back to stdout so the crawl is not lost.
                println!("{}", serde_json::to_string_pretty(&report.posts)?);
                return Err(e.context("saving crawl results"));
            }
        }
        Commands::Batch { collections, pages } => {
            let app = ImgCrawl::connect(config)?;
            let pages = pages.unwrap_or(app.config().default_pages);
            let handles = collections
                .iter()
                .map(|c| {
                    let output = Some(format!("{}_posts.json", app.resolve_collection(c)?));
                    app.submit(JobRequest { collection: c.clone(), pages, output })
                })
                .collect::<Result<Vec<_>>>()?;
            join_all(handles.into_iter().map(|h| h.join())).await;

            let mut failed = false;
            for job in app.list_jobs() {
                match &job.status {
                    JobStatus::Done { path, posts } | JobStatus::Cancelled { path, posts } => {
                        println!("r/{}: {} posts -> {}", job.collection, posts, path.display())
                    }
                    JobStatus::Failed { error } => {
                        failed = true;
                        eprintln!("r/{}: failed: {}", job.collection, error)
                    }
                    other => println!("r/{}: {:?}", job.collection, other),
                }
            }
            if failed { anyhow::bail!("one or more crawl jobs failed"); }
        }
        Commands::Filter { input, output } => {
            if !input.exists() { anyhow::bail!("Input file not found: {}", input.display()); }
            let output = output.unwrap_or_else(|| filter::default_output_path(&input, &config.output_dir));
            let kept = filter::filter_file(&input, &output)?;
            println!("Kept {kept} posts with images");
            println!("Saved to: {}", output.display());
        }
        Commands::Files => {
            let store = imgcrawl::storage::OutputStore::from_config(&config);
            for name in store.list()? { println!("{name}"); }
        }
        Commands::Show { file, json } => {
            let store = imgcrawl::storage::OutputStore::from_config(&config);
            let loaded = store
                .open(file.as_deref())?
                .with_context(|| format!("File not found: {}", file.as_deref().unwrap_or_default()))?;
            let entries = loaded.entries();
            if json {
                let count = entries.len();
                let mirror = serde_json::json!({
                    "file": loaded.name,
                    "files": store.list()?,
                    "count": count,
                    "posts": entries,
                });
                println!("{}", serde_json::to_string_pretty(&mirror)?);
            } else {
                println!("{} ({} posts)", loaded.name, entries.len());
                for e in entries { println!("{}\n  {}", e.title, e.image_url); }
            }
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { return s.to_string(); }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}
