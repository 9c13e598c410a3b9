//! Message parts returned to the model.

use serde::{Deserialize, Serialize};

/// One part of a tool result as the model receives it.
///
/// Serializes as `{"text": ..}`, `{"fileData": {..}}` or `{"inlineData": {..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FileData(FileData),
    InlineData(InlineData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub file_uri: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn file(file_uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Part::FileData(FileData {
            file_uri: file_uri.into(),
            mime_type: mime_type.into(),
        })
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Part::InlineData(InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            _ => None,
        }
    }
}
