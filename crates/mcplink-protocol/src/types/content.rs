//! Content blocks carried by tool results, prompt messages, and sampling.

use serde::{Deserialize, Serialize};

use super::resources::ResourceContents;

/// A single piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text
    #[serde(rename_all = "camelCase")]
    Text {
        /// The text
        text: String,
    },
    /// Base64-encoded image
    #[serde(rename_all = "camelCase")]
    Image {
        /// Base64 payload
        data: String,
        /// Image MIME type
        mime_type: String,
    },
    /// Base64-encoded audio
    #[serde(rename_all = "camelCase")]
    Audio {
        /// Base64 payload
        data: String,
        /// Audio MIME type
        mime_type: String,
    },
    /// Embedded resource contents
    #[serde(rename_all = "camelCase")]
    Resource {
        /// The embedded resource
        resource: ResourceContents,
    },
}

impl Content {
    /// Shorthand for a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user
    User,
    /// Model
    Assistant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn text_content_wire_shape() {
        let c = Content::text("hi");
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({"type": "text", "text": "hi"})
        );
    }

    #[test]
    fn image_content_uses_camel_case() {
        let c = Content::Image {
            data: "QUJD".into(),
            mime_type: "image/png".into(),
        };
        assert_eq!(
            serde_json::to_value(&c).unwrap(),
            json!({"type": "image", "data": "QUJD", "mimeType": "image/png"})
        );
    }

    #[test]
    fn embedded_resource_round_trips() {
        let v = json!({
            "type": "resource",
            "resource": {"uri": "file:///a.txt", "text": "body"}
        });
        let c: Content = serde_json::from_value(v.clone()).unwrap();
        assert_eq!(serde_json::to_value(&c).unwrap(), v);
    }
}
