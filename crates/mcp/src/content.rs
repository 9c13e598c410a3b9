//! Content blocks returned by `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of a tool server's response.
///
/// Blocks whose `type` is unknown, or whose fields do not match their tag,
/// parse as [`ContentBlock::Unknown`] instead of failing the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image(Media),
    Audio(Media),
    Resource {
        resource: EmbeddedResource,
    },
    ResourceLink(ResourceLink),
    #[serde(skip_deserializing)]
    Unknown {
        kind: String,
    },
}

/// Binary media payload; at least one of the location fields is usually set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Base64-encoded bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64-encoded bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ResourceLink {
    /// The title when present, otherwise the name.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    /// Lowercase wire name (`image`, `audio`).
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Audio => "audio",
        }
    }

    /// Capitalized name for human-readable summaries.
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Image => "Image",
            MediaKind::Audio => "Audio",
        }
    }
}

impl ContentBlock {
    /// Parse a single raw block, degrading to [`ContentBlock::Unknown`].
    pub fn from_value(value: &Value) -> Self {
        match serde_json::from_value(value.clone()) {
            Ok(block) => block,
            Err(_) => ContentBlock::Unknown {
                kind: value
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            },
        }
    }

    /// Parse a raw `content` value; `None` when it is not an array.
    pub fn parse_list(value: &Value) -> Option<Vec<Self>> {
        value
            .as_array()
            .map(|items| items.iter().map(Self::from_value).collect())
    }

    /// Media kind and payload if this is an image or audio block.
    pub fn as_media(&self) -> Option<(MediaKind, &Media)> {
        match self {
            ContentBlock::Image(media) => Some((MediaKind::Image, media)),
            ContentBlock::Audio(media) => Some((MediaKind::Audio, media)),
            _ => None,
        }
    }

    /// Get text content if this is a text content block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}
