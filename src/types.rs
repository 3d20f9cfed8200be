use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Listing children of this kind are link posts; everything else (comments, more-stubs) is ignored.
pub const POST_KIND: &str = "t3";

pub const NO_TITLE: &str = "No Title";
pub const UNKNOWN_AUTHOR: &str = "Unknown";

// --- Listing envelope ---

/// One page of a listing, parsed leniently: a body without the expected
/// `data` object yields no children and no cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub children: Vec<Child>,
    pub after: Option<String>,
}

impl Listing {
    pub fn from_value(value: &Value) -> Self {
        let Some(data) = value.get("data") else { return Self::default() };
        let after = data
            .get("after")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        let children = data
            .get("children")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(|c| Child::deserialize(c).ok()).collect())
            .unwrap_or_default();
        Self { children, after }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Child {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Child {
    pub fn is_post(&self) -> bool { self.kind == POST_KIND }

    /// Parse the child's payload as a post. `None` for other kinds or payloads of the wrong shape.
    pub fn post(&self) -> Option<PostData> {
        if !self.is_post() { return None; }
        PostData::deserialize(&self.data).ok()
    }
}

// --- Post payload ---

/// The subset of a post's `data` object the crawler reads. Every field is optional
/// because the API omits or nulls them depending on the post type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostData {
    pub title: Option<String>,
    pub url: Option<String>,
    pub permalink: Option<String>,
    pub author: Option<String>,
    pub score: Option<i64>,
    pub created_utc: Option<f64>,
    pub num_comments: Option<i64>,
    pub subreddit: Option<String>,
    pub preview: Option<Preview>,
    pub gallery_data: Option<Value>,
    pub media_metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Preview {
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<PreviewImage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreviewImage {
    pub source: Option<ImageSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageSource {
    pub url: Option<String>,
}

/// One `media_metadata` entry of a gallery post. `s` is the full-size rendition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaItem {
    pub s: Option<MediaSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaSource {
    pub u: Option<String>,
}

fn null_as_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

/// The post encodings the extractor understands, told apart by which fields are present.
/// URLs are carried as the API sent them; decoding happens in the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPost {
    /// The post links straight to an image file.
    Direct { url: String },
    /// The API embedded a preview rendition of the linked content.
    Preview { source_url: String },
    /// A multi-image gallery; `first_url` is the first media entry in document order.
    Gallery { first_url: String },
    Unrecognized,
}

// --- Output record ---

/// One post that carried an image. Serialized field names are the on-disk contract
/// read by the filter and the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPost {
    #[serde(rename = "post_title")]
    pub title: String,
    pub image_url: String,
    #[serde(rename = "post_url")]
    pub source_url: String,
    pub author: String,
    pub score: i64,
    #[serde(rename = "created_utc")]
    pub created_at: f64,
    #[serde(rename = "num_comments")]
    pub comment_count: i64,
    #[serde(rename = "subreddit")]
    pub source_collection: String,
}

impl NormalizedPost {
    pub fn from_post(post: PostData, image_url: String, site_url: &str) -> Self {
        let permalink = post.permalink.unwrap_or_default();
        Self {
            title: post.title.unwrap_or_else(|| NO_TITLE.to_string()),
            image_url,
            source_url: permalink_url(site_url, &permalink),
            author: post.author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            score: post.score.unwrap_or(0),
            created_at: post.created_utc.unwrap_or(0.0),
            comment_count: post.num_comments.unwrap_or(0),
            source_collection: post.subreddit.unwrap_or_default(),
        }
    }
}

fn permalink_url(site_url: &str, permalink: &str) -> String {
    if permalink.starts_with("http://") || permalink.starts_with("https://") {
        return permalink.to_string();
    }
    format!("{}{}", site_url.trim_end_matches('/'), permalink)
}
