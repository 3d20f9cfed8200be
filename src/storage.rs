use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::config::Config;
use crate::types::NormalizedPost;

pub const UNTITLED: &str = "Untitled";

/// Directory of crawl output files (one JSON array per job).
#[derive(Debug, Clone)]
pub struct OutputStore {
    dir: PathBuf,
}

/// One output file as read back for browsing. Rows stay untyped so that files written by
/// the filter (`{post_title, image_url}` only) load as well as full crawl output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    pub name: String,
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEntry {
    pub title: String,
    pub image_url: String,
}

impl OutputStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

    pub fn from_config(config: &Config) -> Self { Self::new(config.output_dir.clone()) }

    pub fn dir(&self) -> &Path { &self.dir }

    /// Write `records` as a pretty JSON array. An existing file of the same name is replaced.
    pub async fn save(&self, records: &[NormalizedPost], name: Option<&str>) -> Result<PathBuf> {
        let name = match name {
            Some(n) => checked_name(n)?.to_string(),
            None => default_file_name(),
        };
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating output dir: {}", self.dir.display()))?;
        let path = self.dir.join(&name);
        let payload = serde_json::to_vec_pretty(records)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("writing output file: {}", path.display()))?;
        tracing::info!(path = %path.display(), records = records.len(), "Data saved");
        Ok(path)
    }

    /// `.json` file names in the directory, most recently modified first.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() { return Ok(Vec::new()); }
        let mut files: Vec<(SystemTime, String)> = Vec::new();
        for entry in std::fs::read_dir(&self.dir).with_context(|| format!("reading {}", self.dir.display()))? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") { continue; }
            let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, entry.file_name().to_string_lossy().to_string()));
        }
        files.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(files.into_iter().map(|(_, name)| name).collect())
    }

    /// Load a named file, or the newest one when `name` is `None`.
    ///
    /// A named file that does not exist yields `Ok(None)`. With no name and an empty
    /// directory the result is an empty file named `-`.
    pub fn open(&self, name: Option<&str>) -> Result<Option<OutputFile>> {
        let name = match name {
            Some(n) => {
                let n = checked_name(n)?;
                if !self.dir.join(n).is_file() { return Ok(None); }
                n.to_string()
            }
            None => match self.list()?.into_iter().next() {
                Some(newest) => newest,
                None => return Ok(Some(OutputFile { name: "-".to_string(), rows: Vec::new() })),
            },
        };
        let path = self.dir.join(&name);
        let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let value: Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        let rows = match value {
            Value::Array(rows) => rows,
            _ => Vec::new(),
        };
        Ok(Some(OutputFile { name, rows }))
    }

    /// Read a crawl output file back into typed records.
    pub fn read_posts(&self, name: &str) -> Result<Vec<NormalizedPost>> {
        let path = self.dir.join(checked_name(name)?);
        let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

impl OutputFile {
    /// Rows that carry an image, with the title resolved from either key the writers use.
    pub fn entries(&self) -> Vec<ViewEntry> {
        self.rows
            .iter()
            .filter_map(|row| {
                let image_url = row.get("image_url").and_then(Value::as_str).filter(|u| !u.is_empty())?;
                Some(ViewEntry { title: row_title(row), image_url: image_url.to_string() })
            })
            .collect()
    }
}

pub(crate) fn row_title(row: &Value) -> String {
    ["post_title", "title"]
        .iter()
        .find_map(|k| row.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .unwrap_or(UNTITLED)
        .to_string()
}

pub fn default_file_name() -> String {
    format!("reddit_posts_{}.json", chrono::Local::now().format("%Y%m%d_%H%M%S"))
}

/// File names only; anything that could escape the output directory is refused.
pub fn checked_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || name == "." || name.contains("..") || name.contains('/') || name.contains('\\') {
        bail!("invalid output file name: {name:?}");
    }
    Ok(name)
}
