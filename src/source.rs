use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::types::Listing;

/// Something that can return one page of a collection's listing.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_page(&self, collection: &str, after: Option<&str>, limit: u32) -> Result<Listing>;
}

/// Reddit's public JSON listing (`/r/<collection>.json`).
pub struct RedditSource {
    client: reqwest::Client,
    site_url: String,
}

impl RedditSource {
    pub fn new(config: &Config) -> Result<Self> {
        // The API throttles or rejects default library agents; always identify ourselves.
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("building http client")?;
        Ok(Self { client, site_url: config.site_url.trim_end_matches('/').to_string() })
    }

    pub fn listing_url(&self, collection: &str, after: Option<&str>, limit: u32) -> Result<Url> {
        let mut url = Url::parse(&self.site_url).with_context(|| format!("invalid site url: {}", self.site_url))?;
        // Pushed as one segment, so `/`, `?` and `#` in the name are escaped.
        url.path_segments_mut()
            .map_err(|_| anyhow!("site url cannot carry a path: {}", self.site_url))?
            .pop_if_empty()
            .extend(["r", &format!("{collection}.json")]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string()).append_pair("raw_json", "1");
            if let Some(a) = after { query.append_pair("after", a); }
        }
        Ok(url)
    }
}

#[async_trait]
impl ListingSource for RedditSource {
    async fn fetch_page(&self, collection: &str, after: Option<&str>, limit: u32) -> Result<Listing> {
        let url = self.listing_url(collection, after, limit)?;
        let resp = self.client.get(url.clone()).send().await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        let body: serde_json::Value = resp.json().await
            .with_context(|| format!("decoding listing body from {url}"))?;
        Ok(Listing::from_value(&body))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed sequence of pages and records every request it receives.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        pages: Mutex<VecDeque<Result<Value, String>>>,
        pub(crate) requests: Mutex<Vec<(String, Option<String>, u32)>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(pages: Vec<Result<Value, String>>) -> Self {
            Self { pages: Mutex::new(pages.into()), requests: Mutex::default() }
        }

        pub(crate) fn request_count(&self) -> usize { self.requests.lock().unwrap().len() }
    }

    #[async_trait]
    impl ListingSource for ScriptedSource {
        async fn fetch_page(&self, collection: &str, after: Option<&str>, limit: u32) -> Result<Listing> {
            self.requests.lock().unwrap().push((collection.to_string(), after.map(str::to_owned), limit));
            match self.pages.lock().unwrap().pop_front() {
                Some(Ok(body)) => Ok(Listing::from_value(&body)),
                Some(Err(e)) => Err(anyhow!(e)),
                None => Err(anyhow!("no more scripted pages")),
            }
        }
    }

    pub(crate) fn page(children: Vec<Value>, after: Option<&str>) -> Value {
        json!({ "kind": "Listing", "data": { "children": children, "after": after } })
    }

    pub(crate) fn direct(title: &str, url: &str) -> Value {
        json!({ "kind": "t3", "data": {
            "title": title,
            "url": url,
            "permalink": format!("/r/pics/comments/{title}/"),
            "author": "poster",
            "score": 10,
            "created_utc": 1_700_000_000.0,
            "num_comments": 2,
            "subreddit": "pics"
        }})
    }

    pub(crate) fn gallery(title: &str, url: &str) -> Value {
        json!({ "kind": "t3", "data": {
            "title": title,
            "url": "https://www.reddit.com/gallery/g1",
            "gallery_data": { "items": [{ "media_id": "m1" }] },
            "media_metadata": { "m1": { "s": { "u": url } } },
            "subreddit": "pics"
        }})
    }

    pub(crate) fn text(title: &str) -> Value {
        json!({ "kind": "t3", "data": {
            "title": title,
            "url": format!("https://www.reddit.com/r/pics/comments/{title}/"),
            "subreddit": "pics"
        }})
    }

    pub(crate) fn comment(body: &str) -> Value {
        json!({ "kind": "t1", "data": { "body": body, "url": "https://i.redd.it/sneaky.jpg" } })
    }
}
