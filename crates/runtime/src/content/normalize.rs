//! Turning raw tool responses into model parts and display payloads.
//!
//! Nothing here fails: a malformed response or an unusable block degrades
//! to a diagnostic placeholder instead of an error.

use mcp::{ContentBlock, Media, MediaKind, first_response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::display::{DisplayContent, DisplayImage, ImageResult};
use super::images::ImageStore;
use super::parts::Part;

const DEFAULT_BLOB_MIME_TYPE: &str = "application/octet-stream";

/// Model content and display payload for one tool response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub model_content: Vec<Part>,
    pub display_content: DisplayContent,
}

/// Normalize a raw response into both representations.
pub async fn normalize(tool_name: &str, raw: &[Value], images: &ImageStore) -> NormalizedResult {
    let blocks = content_blocks(raw);
    let model_content = match &blocks {
        Some(blocks) => to_model_parts(tool_name, blocks),
        None => vec![Part::text("[Error: Could not parse tool response]")],
    };
    let display_content = match &blocks {
        Some(blocks) => to_display(blocks, images).await,
        None => raw_dump(raw),
    };
    NormalizedResult {
        model_content,
        display_content,
    }
}

/// The parsed `content` array of the first response part, or `None` when
/// the response is not shaped like one.
pub fn content_blocks(raw: &[Value]) -> Option<Vec<ContentBlock>> {
    first_response(raw)
        .and_then(|response| response.get("content"))
        .and_then(ContentBlock::parse_list)
}

/// Convert blocks into the parts the model receives, preserving order.
pub fn to_model_parts(tool_name: &str, blocks: &[ContentBlock]) -> Vec<Part> {
    let mut parts = Vec::with_capacity(blocks.len());
    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(Part::text(text.as_str())),
            ContentBlock::Image(media) => {
                push_media(&mut parts, tool_name, MediaKind::Image, media);
            }
            ContentBlock::Audio(media) => {
                push_media(&mut parts, tool_name, MediaKind::Audio, media);
            }
            ContentBlock::Resource { resource } => {
                if let Some(text) = &resource.text {
                    parts.push(Part::text(text.as_str()));
                } else if let Some(blob) = &resource.blob {
                    let mime_type = resource
                        .mime_type
                        .as_deref()
                        .unwrap_or(DEFAULT_BLOB_MIME_TYPE);
                    parts.push(Part::text(format!(
                        "[Tool '{tool_name}' provided the following embedded resource \
                         with mime-type: {mime_type}]"
                    )));
                    parts.push(Part::inline(mime_type, blob.as_str()));
                }
            }
            ContentBlock::ResourceLink(link) => parts.push(Part::text(format!(
                "Resource Link: {} at {}",
                link.label(),
                link.uri
            ))),
            ContentBlock::Unknown { .. } => {}
        }
    }
    parts
}

fn push_media(parts: &mut Vec<Part>, tool_name: &str, kind: MediaKind, media: &Media) {
    parts.push(Part::text(format!(
        "[Tool '{tool_name}' provided the following {} data with mime-type: {}]",
        kind.as_str(),
        media.mime_type
    )));
    let mime_type = media.mime_type.as_str();
    let payload = if let Some(path) = &media.file_path {
        Part::file(file_uri(path), mime_type)
    } else if let Some(uri) = &media.uri {
        Part::file(uri.as_str(), mime_type)
    } else if let Some(data) = &media.data {
        Part::inline(mime_type, data.as_str())
    } else {
        Part::text(format!(
            "[Tool '{tool_name}' provided {} data with no payload]",
            kind.as_str()
        ))
    };
    parts.push(payload);
}

/// Build the display payload: images when any image block resolves to a
/// file, otherwise a line-per-block text summary.
pub async fn to_display(blocks: &[ContentBlock], images: &ImageStore) -> DisplayContent {
    let has_images = blocks
        .iter()
        .any(|block| matches!(block, ContentBlock::Image(_)));
    if has_images {
        if let Some(result) = resolve_images(blocks, images).await {
            return DisplayContent::Images(result);
        }
        warn!("no image in the response resolved to a file, showing text summary");
    }
    DisplayContent::Text(summarize(blocks))
}

async fn resolve_images(blocks: &[ContentBlock], store: &ImageStore) -> Option<ImageResult> {
    let caption = blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join("\n");
    let alt = (!caption.is_empty()).then_some(caption);

    let mut images = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        let ContentBlock::Image(media) = block else {
            continue;
        };
        match store.resolve(media, index).await {
            Some(path) => images.push(DisplayImage {
                file_path: path.to_string_lossy().into_owned(),
                mime_type: media.mime_type.clone(),
                alt: alt.clone(),
            }),
            None => warn!(
                index,
                mime_type = %media.mime_type,
                "dropping image with no usable source"
            ),
        }
    }

    (!images.is_empty()).then_some(ImageResult { images })
}

/// One human-readable line per block, joined with newlines.
pub fn summarize(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::Image(media) => {
                format!("[{}: {}]", MediaKind::Image.label(), media.mime_type)
            }
            ContentBlock::Audio(media) => {
                format!("[{}: {}]", MediaKind::Audio.label(), media.mime_type)
            }
            ContentBlock::ResourceLink(link) => format!("[Link to {}: {}]", link.label(), link.uri),
            ContentBlock::Resource { resource } => match &resource.text {
                Some(text) => text.clone(),
                None => format!(
                    "[Embedded Resource: {}]",
                    resource.mime_type.as_deref().unwrap_or("unknown type")
                ),
            },
            ContentBlock::Unknown { kind } => format!("[Unknown content type: {kind}]"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn file_uri(path: &str) -> String {
    if path.starts_with("file://") {
        path.to_string()
    } else {
        format!("file://{path}")
    }
}

fn raw_dump(raw: &[Value]) -> DisplayContent {
    let pretty = serde_json::to_string_pretty(raw).unwrap_or_else(|_| format!("{raw:?}"));
    warn!("tool response is not a list of content blocks");
    DisplayContent::Text(format!("```json\n{pretty}\n```"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::prelude::BASE64_STANDARD;
    use serde_json::json;

    fn response(content: Value) -> Vec<Value> {
        vec![json!({"functionResponse": {"name": "tool", "response": {"content": content}}})]
    }

    fn blocks(content: Value) -> Vec<ContentBlock> {
        ContentBlock::parse_list(&content).unwrap()
    }

    #[tokio::test]
    async fn text_block_maps_verbatim() {
        let store = ImageStore::default();
        let raw = response(json!([{"type": "text", "text": "hello"}]));
        let result = normalize("echo", &raw, &store).await;
        assert_eq!(result.model_content, vec![Part::text("hello")]);
        assert_eq!(
            serde_json::to_value(&result.model_content[0]).unwrap(),
            json!({"text": "hello"})
        );
        assert_eq!(result.display_content, DisplayContent::Text("hello".into()));
    }

    #[test]
    fn media_with_file_path_yields_file_reference() {
        let parts = to_model_parts(
            "snap",
            &blocks(json!([{
                "type": "image",
                "mimeType": "image/png",
                "filePath": "/tmp/x.png",
                "uri": "https://e/x.png"
            }])),
        );
        assert_eq!(
            parts,
            vec![
                Part::text(
                    "[Tool 'snap' provided the following image data with mime-type: image/png]"
                ),
                Part::file("file:///tmp/x.png", "image/png"),
            ]
        );
    }

    #[test]
    fn media_uri_used_without_file_path() {
        let parts = to_model_parts(
            "rec",
            &blocks(json!([{"type": "audio", "mimeType": "audio/wav", "uri": "https://e/a.wav"}])),
        );
        assert_eq!(
            parts[0].as_text(),
            Some("[Tool 'rec' provided the following audio data with mime-type: audio/wav]")
        );
        assert_eq!(parts[1], Part::file("https://e/a.wav", "audio/wav"));
    }

    #[test]
    fn media_inline_and_missing_payload() {
        let parts = to_model_parts(
            "snap",
            &blocks(json!([
                {"type": "image", "mimeType": "image/png", "data": "AAAA"},
                {"type": "image", "mimeType": "image/gif"}
            ])),
        );
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1], Part::inline("image/png", "AAAA"));
        assert_eq!(parts[3], Part::text("[Tool 'snap' provided image data with no payload]"));
    }

    #[test]
    fn resources_and_links() {
        let parts = to_model_parts(
            "res",
            &blocks(json!([
                {"type": "resource", "resource": {"uri": "mem://a", "text": "body"}},
                {"type": "resource", "resource": {"uri": "mem://b", "blob": "QkxPQg=="}},
                {"type": "resource", "resource": {"uri": "mem://c"}},
                {
                    "type": "resource_link",
                    "uri": "https://e/doc",
                    "name": "doc",
                    "title": "The Doc"
                },
                {"type": "hologram"}
            ])),
        );
        assert_eq!(
            parts,
            vec![
                Part::text("body"),
                Part::text(
                    "[Tool 'res' provided the following embedded resource with mime-type: \
                     application/octet-stream]"
                ),
                Part::inline("application/octet-stream", "QkxPQg=="),
                Part::text("Resource Link: The Doc at https://e/doc"),
            ]
        );
    }

    #[test]
    fn summary_lines() {
        let summary = summarize(&blocks(json!([
            {"type": "text", "text": "first"},
            {"type": "audio", "mimeType": "audio/wav", "data": "AAAA"},
            {"type": "resource_link", "uri": "https://e/doc", "name": "doc"},
            {"type": "resource", "resource": {"blob": "AAAA", "mimeType": "application/pdf"}},
            {"type": "resource", "resource": {"blob": "AAAA"}},
            {"type": "resource", "resource": {"text": "inline"}},
            {"type": "hologram"}
        ])));
        assert_eq!(
            summary,
            [
                "first",
                "[Audio: audio/wav]",
                "[Link to doc: https://e/doc]",
                "[Embedded Resource: application/pdf]",
                "[Embedded Resource: unknown type]",
                "inline",
                "[Unknown content type: hologram]",
            ]
            .join("\n")
        );
    }

    #[tokio::test]
    async fn malformed_response_degrades() {
        let store = ImageStore::default();
        let raw = response(json!({"not": "a list"}));
        let result = normalize("t", &raw, &store).await;
        assert_eq!(
            result.model_content,
            vec![Part::text("[Error: Could not parse tool response]")]
        );
        let text = result.display_content.as_text().unwrap();
        assert!(text.starts_with("```json\n"));
        assert!(text.contains("\"not\": \"a list\""));
    }

    #[tokio::test]
    async fn empty_raw_response_degrades() {
        let result = normalize("t", &[], &ImageStore::default()).await;
        assert_eq!(result.display_content, DisplayContent::Text("```json\n[]\n```".into()));
    }

    #[tokio::test]
    async fn inline_image_becomes_display_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let encoded = BASE64_STANDARD.encode(b"pixels");

        let display = to_display(
            &blocks(json!([{"type": "image", "mimeType": "image/png", "data": encoded}])),
            &store,
        )
        .await;

        let images = display.as_images().unwrap();
        assert_eq!(images.images.len(), 1);
        let image = &images.images[0];
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.alt, None);
        assert_eq!(std::fs::read(&image.file_path).unwrap(), b"pixels");
    }

    #[tokio::test]
    async fn caption_is_shared_by_every_image() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let display = to_display(
            &blocks(json!([
                {"type": "text", "text": "two"},
                {"type": "image", "mimeType": "image/png", "filePath": a},
                {"type": "text", "text": "shots"},
                {"type": "image", "mimeType": "image/png", "filePath": b}
            ])),
            &ImageStore::new(dir.path()),
        )
        .await;

        let images = &display.as_images().unwrap().images;
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|i| i.alt.as_deref() == Some("two\nshots")));
        assert_eq!(images[0].file_path, a.to_string_lossy());
        assert_eq!(images[1].file_path, b.to_string_lossy());
    }

    #[tokio::test]
    async fn unresolvable_image_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        std::fs::write(&good, b"ok").unwrap();

        let display = to_display(
            &blocks(json!([
                {"type": "image", "mimeType": "image/png", "filePath": "/missing/one.png"},
                {"type": "image", "mimeType": "image/png", "filePath": good}
            ])),
            &ImageStore::new(dir.path()),
        )
        .await;

        let images = &display.as_images().unwrap().images;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_path, good.to_string_lossy());
    }

    #[tokio::test]
    async fn all_images_dropped_falls_back_to_summary() {
        let dir = tempfile::tempdir().unwrap();
        let display = to_display(
            &blocks(json!([
                {"type": "text", "text": "look"},
                {"type": "image", "mimeType": "image/png", "uri": "https://e/x.png"}
            ])),
            &ImageStore::new(dir.path()),
        )
        .await;
        assert_eq!(display, DisplayContent::Text("look\n[Image: image/png]".into()));
    }

    #[tokio::test]
    async fn audio_alone_stays_text() {
        let display = to_display(
            &blocks(json!([{"type": "audio", "mimeType": "audio/mp3", "data": "AAAA"}])),
            &ImageStore::default(),
        )
        .await;
        assert_eq!(display, DisplayContent::Text("[Audio: audio/mp3]".into()));
    }
}
