use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::extract::has_image_extension;
use crate::storage::row_title;

/// Hosts that serve images without a file extension in the URL (e.g. `?width=` previews).
pub const IMAGE_HOSTS: [&str; 2] = ["preview.redd.it", "i.redd.it"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredPost {
    pub post_title: String,
    pub image_url: String,
}

pub fn is_image_url(url: &str) -> bool {
    if url.is_empty() { return false; }
    let lowered = url.to_ascii_lowercase();
    has_image_extension(&lowered) || IMAGE_HOSTS.iter().any(|h| lowered.contains(h))
}

/// Keep rows with an image URL, deduplicated on (title, url) in first-seen order.
/// Anything other than a JSON array yields no rows.
pub fn filter_posts(rows: &Value) -> Vec<FilteredPost> {
    let Some(rows) = rows.as_array() else { return Vec::new() };
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in rows {
        let Some(url) = row.get("image_url").and_then(Value::as_str) else { continue };
        if !is_image_url(url) { continue; }
        let title = row_title(row);
        if !seen.insert((title.clone(), url.to_string())) { continue; }
        out.push(FilteredPost { post_title: title, image_url: url.to_string() });
    }
    out
}

/// `<out_dir>/<input-stem>_images_only.json`
pub fn default_output_path(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("posts");
    out_dir.join(format!("{stem}_images_only.json"))
}

/// Filter `input` into `output`, creating the output's parent directory. Returns rows kept.
pub fn filter_file(input: &Path, output: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let rows: Value = serde_json::from_str(&text).with_context(|| format!("parsing {}", input.display()))?;
    let kept = filter_posts(&rows);
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(output, serde_json::to_vec_pretty(&kept)?)
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(kept = kept.len(), output = %output.display(), "Filtered posts with images");
    Ok(kept.len())
}
