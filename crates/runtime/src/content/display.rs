//! Display payloads handed to the UI.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the UI shows for a tool result: plain text or a set of images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayContent {
    Images(ImageResult),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResult {
    pub images: Vec<DisplayImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayImage {
    pub file_path: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl DisplayContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            DisplayContent::Text(text) => Some(text),
            DisplayContent::Images(_) => None,
        }
    }

    pub fn as_images(&self) -> Option<&ImageResult> {
        match self {
            DisplayContent::Images(result) => Some(result),
            DisplayContent::Text(_) => None,
        }
    }
}

/// Structural check for an image result in untyped display data.
///
/// Requires a non-empty `images` array whose every element has a
/// `mimeType` and either a `filePath` or inline `data`.
pub fn is_image_result(value: &Value) -> bool {
    let Some(images) = value.get("images").and_then(Value::as_array) else {
        return false;
    };
    !images.is_empty()
        && images.iter().all(|image| {
            let has_source = image.get("filePath").is_some_and(Value::is_string)
                || image.get("data").is_some_and(Value::is_string);
            has_source && image.get("mimeType").is_some_and(Value::is_string)
        })
}
