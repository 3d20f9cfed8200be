use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_USER_AGENT: &str = concat!("imgcrawl/", env!("CARGO_PKG_VERSION"));

/// Settings shared by the crawler and the output store. Built once and passed in;
/// nothing reads configuration from global state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub user_agent: String,
    /// Listing host and permalink prefix.
    pub site_url: String,
    pub page_size: u32,
    pub default_collection: String,
    pub default_pages: u32,
    pub output_dir: PathBuf,
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            site_url: "https://www.reddit.com".to_string(),
            page_size: 25,
            default_collection: "malaysia".to_string(),
            default_pages: 10,
            output_dir: PathBuf::from("output"),
            request_timeout_ms: 30_000,
        }
    }
}

impl Config {
    /// Load from an explicit TOML file, else `config.toml` in the user config dir if present,
    /// else defaults. `IMGCRAWL_*` environment variables override whatever was loaded.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.is_file()),
        };
        let mut cfg = match file {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg.sanitized())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config: {}", path.display()))
    }

    fn apply_env<F>(&mut self, lookup: F)
    where F: Fn(&str) -> Option<String> {
        if let Some(v) = lookup("IMGCRAWL_USER_AGENT").filter(|s| !s.trim().is_empty()) { self.user_agent = v; }
        if let Some(v) = lookup("IMGCRAWL_SITE_URL").filter(|s| !s.trim().is_empty()) { self.site_url = v; }
        if let Some(v) = lookup("IMGCRAWL_PAGE_SIZE").and_then(|s| s.parse().ok()) { self.page_size = v; }
        if let Some(v) = lookup("IMGCRAWL_COLLECTION").filter(|s| !s.trim().is_empty()) { self.default_collection = v; }
        if let Some(v) = lookup("IMGCRAWL_PAGES").and_then(|s| s.parse().ok()) { self.default_pages = v; }
        if let Some(v) = lookup("IMGCRAWL_OUTPUT_DIR").filter(|s| !s.trim().is_empty()) { self.output_dir = PathBuf::from(v); }
        if let Some(v) = lookup("IMGCRAWL_TIMEOUT_MS").and_then(|s| s.parse().ok()) { self.request_timeout_ms = v; }
    }

    fn sanitized(mut self) -> Self {
        // The listing endpoint caps `limit` at 100.
        self.page_size = self.page_size.clamp(1, 100);
        if self.user_agent.trim().is_empty() { self.user_agent = DEFAULT_USER_AGENT.to_string(); }
        if self.default_collection.trim().is_empty() { self.default_collection = Self::default().default_collection; }
        self
    }
}

fn default_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("dev", "imgcrawl", "imgcrawl")?;
    Some(proj.config_dir().join("config.toml"))
}
