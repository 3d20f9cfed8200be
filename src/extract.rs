//! Image URL extraction from a single post.

use serde::Deserialize;

use crate::types::{MediaItem, PostData, RawPost};

pub const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

pub fn has_image_extension(url: &str) -> bool {
    let lowered = url.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext))
}

/// The API HTML-escapes ampersands in embedded URLs. Decode a single level only.
pub fn decode_entities(url: &str) -> String { url.replace("&amp;", "&") }

impl From<&PostData> for RawPost {
    /// Classify in strategy order: direct link, then preview, then gallery.
    fn from(post: &PostData) -> Self {
        if let Some(url) = post.url.as_deref().filter(|u| has_image_extension(u)) {
            return RawPost::Direct { url: url.to_string() };
        }
        if let Some(url) = preview_source(post) {
            return RawPost::Preview { source_url: url.to_string() };
        }
        if let Some(url) = gallery_first(post) {
            return RawPost::Gallery { first_url: url };
        }
        RawPost::Unrecognized
    }
}

fn preview_source(post: &PostData) -> Option<&str> {
    post.preview
        .as_ref()?
        .images
        .first()?
        .source
        .as_ref()?
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
}

fn gallery_first(post: &PostData) -> Option<String> {
    post.gallery_data.as_ref().filter(|g| !g.is_null())?;
    // Only the first entry is considered, in document order.
    let (_, first) = post.media_metadata.as_ref()?.iter().next()?;
    let item = MediaItem::deserialize(first).ok()?;
    item.s?.u.filter(|u| !u.is_empty())
}

/// The image URL for a classified post, decoded where the API escapes it.
pub fn extract(post: &RawPost) -> Option<String> {
    match post {
        RawPost::Direct { url } => Some(url.clone()),
        RawPost::Preview { source_url } => Some(decode_entities(source_url)),
        RawPost::Gallery { first_url } => Some(decode_entities(first_url)),
        RawPost::Unrecognized => None,
    }
    .filter(|u| !u.is_empty())
}

pub fn extract_from(post: &PostData) -> Option<String> { extract(&RawPost::from(post)) }

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(value: serde_json::Value) -> PostData { serde_json::from_value(value).unwrap() }

    #[test]
    fn direct_link_is_returned_unchanged() {
        let p = post(json!({ "url": "https://i.redd.it/Cat.JPEG?x=1&amp;y=2.png" }));
        assert!(matches!(RawPost::from(&p), RawPost::Direct { .. }));
        assert_eq!(extract_from(&p).as_deref(), Some("https://i.redd.it/Cat.JPEG?x=1&amp;y=2.png"));

        let p = post(json!({ "url": "https://example.com/photo.WebP" }));
        assert_eq!(extract_from(&p).as_deref(), Some("https://example.com/photo.WebP"));
    }

    #[test]
    fn preview_source_is_decoded_once() {
        let p = post(json!({
            "url": "https://imgur.com/gallery/abc",
            "preview": { "images": [
                { "source": { "url": "https://preview.redd.it/a.jpg?width=640&amp;s=abc&amp;amp;t=1" } },
                { "source": { "url": "https://preview.redd.it/second.jpg" } }
            ]}
        }));
        assert!(matches!(RawPost::from(&p), RawPost::Preview { .. }));
        assert_eq!(
            extract_from(&p).as_deref(),
            Some("https://preview.redd.it/a.jpg?width=640&s=abc&amp;t=1")
        );
    }

    #[test]
    fn plain_url_is_not_altered_by_decoding() {
        assert_eq!(decode_entities("https://x.test/a.jpg?a=1&b=2"), "https://x.test/a.jpg?a=1&b=2");
    }

    #[test]
    fn gallery_uses_first_entry_in_document_order() {
        let p = post(json!({
            "url": "https://www.reddit.com/gallery/xyz",
            "gallery_data": { "items": [{ "media_id": "zzz" }, { "media_id": "aaa" }] },
            "media_metadata": {
                "zzz": { "s": { "u": "https://preview.redd.it/zzz.jpg?w=1&amp;s=2" } },
                "aaa": { "s": { "u": "https://preview.redd.it/aaa.jpg" } }
            }
        }));
        assert!(matches!(RawPost::from(&p), RawPost::Gallery { .. }));
        assert_eq!(extract_from(&p).as_deref(), Some("https://preview.redd.it/zzz.jpg?w=1&s=2"));
    }

    #[test]
    fn gallery_without_gallery_data_is_ignored() {
        let p = post(json!({
            "media_metadata": { "a": { "s": { "u": "https://preview.redd.it/a.jpg" } } }
        }));
        assert_eq!(RawPost::from(&p), RawPost::Unrecognized);
    }

    #[test]
    fn first_gallery_entry_without_source_is_a_miss() {
        let p = post(json!({
            "gallery_data": {},
            "media_metadata": {
                "a": { "status": "failed" },
                "b": { "s": { "u": "https://preview.redd.it/b.jpg" } }
            }
        }));
        assert_eq!(extract_from(&p), None);
    }

    #[test]
    fn text_post_yields_nothing() {
        let p = post(json!({
            "url": "https://www.reddit.com/r/malaysia/comments/1/discussion/",
            "preview": { "images": [] },
            "media_metadata": null
        }));
        assert_eq!(RawPost::from(&p), RawPost::Unrecognized);
        assert_eq!(extract_from(&p), None);
    }

    #[test]
    fn preview_wins_over_gallery() {
        let p = post(json!({
            "preview": { "images": [{ "source": { "url": "https://preview.redd.it/p.png" } }] },
            "gallery_data": {},
            "media_metadata": { "a": { "s": { "u": "https://preview.redd.it/g.png" } } }
        }));
        assert_eq!(extract_from(&p).as_deref(), Some("https://preview.redd.it/p.png"));
    }
}
