use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Conversational role of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Tool,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
            Self::Tool => "tool",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            "tool" => Ok(Self::Tool),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaContent {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPart {
    pub media: MediaContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPart {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequestPart {
    pub tool_request: ToolRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponsePart {
    pub tool_response: ToolResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Metadata-only part, used for pending sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataPart {
    pub metadata: Map<String, Value>,
}

/// One piece of message content
///
/// Serialized untagged, so a text part is `{"text": ...}`, a media part is
/// `{"media": {...}}` and so on. `Metadata` must stay last: every other
/// variant may also carry a `metadata` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text(TextPart),
    Media(MediaPart),
    Data(DataPart),
    ToolRequest(ToolRequestPart),
    ToolResponse(ToolResponsePart),
    Metadata(MetadataPart),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextPart {
            text: text.into(),
            metadata: None,
        })
    }

    pub fn media(url: impl Into<String>, content_type: Option<String>) -> Self {
        Self::Media(MediaPart {
            media: MediaContent {
                url: url.into(),
                content_type,
            },
            metadata: None,
        })
    }

    /// Placeholder for a named section to be filled in later
    pub fn pending_section(name: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("purpose".to_string(), Value::String(name.into()));
        metadata.insert("pending".to_string(), Value::Bool(true));
        Self::Metadata(MetadataPart { metadata })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(part) => Some(&part.text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl Message {
    pub fn new(role: Role, content: Vec<Part>) -> Self {
        Self {
            role,
            content,
            metadata: None,
        }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![Part::text(text)])
    }

    /// Copy of this message tagged with `metadata.purpose = "history"`
    pub fn as_history(&self) -> Self {
        let mut metadata = self.metadata.clone().unwrap_or_default();
        metadata.insert("purpose".to_string(), Value::String("history".to_string()));
        Self {
            role: self.role,
            content: self.content.clone(),
            metadata: Some(metadata),
        }
    }

    pub fn is_history(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("purpose"))
            .is_some_and(|p| p == "history")
    }
}

/// A retrieved document made available to templates through `@metadata.docs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Caller-supplied render input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataArgument {
    /// Template variables, layered over the prompt's input defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs: Option<Vec<Document>>,

    /// Conversation history spliced in at `{{history}}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,

    /// Exposed to templates as `@`-prefixed variables, never as input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl DataArgument {
    pub fn with_input(input: Value) -> Self {
        Self {
            input: match input {
                Value::Object(map) => Some(map),
                _ => None,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_deserialize_by_shape() {
        let parts: Vec<Part> = serde_json::from_value(json!([
            {"text": "hi"},
            {"media": {"url": "https://x/y.png", "contentType": "image/png"}},
            {"toolRequest": {"name": "search", "input": {"q": "rust"}}},
            {"metadata": {"purpose": "examples", "pending": true}},
        ]))
        .unwrap();

        assert_eq!(parts[0], Part::text("hi"));
        assert!(matches!(parts[1], Part::Media(_)));
        assert!(matches!(parts[2], Part::ToolRequest(_)));
        assert_eq!(parts[3], Part::pending_section("examples"));
    }

    #[test]
    fn history_tag_keeps_existing_metadata() {
        let mut msg = Message::text(Role::Model, "earlier");
        msg.metadata = Some(json!({"id": 7}).as_object().unwrap().clone());

        let tagged = msg.as_history();
        assert!(tagged.is_history());
        assert_eq!(tagged.metadata.unwrap()["id"], 7);
        assert!(!msg.is_history());
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Model, Role::Tool, Role::System] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("assistant".parse::<Role>().is_err());
    }
}
