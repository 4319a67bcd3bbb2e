use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Decode a field whose explicit `null` means the same as leaving it out.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MessageUsage {
    #[serde(deserialize_with = "null_as_default")]
    pub input_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub output_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub cache_creation_input_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub cache_read_input_tokens: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub thinking_tokens: u64,
}

/// The `message` object carried by user and assistant lines.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct MessageObj {
    pub role: Option<String>,
    pub model: Option<String>,
    pub content: Content,
    #[serde(deserialize_with = "null_as_default")]
    pub usage: MessageUsage,
}

impl MessageObj {
    /// Decode a raw `message` value. A message of the wrong shape yields `None`
    /// so the enclosing line still counts.
    pub fn from_value(raw: &Value) -> Option<Self> {
        MessageObj::deserialize(raw).ok()
    }
}

/// Message content: either a plain string or an ordered list of typed items.
///
/// Client versions disagree about which shape a given line type uses, so both
/// are accepted everywhere. Anything else (null, numbers, objects) is `Empty`.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Items(Vec<ContentItem>),
    #[default]
    Empty,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Text {
        #[serde(default, deserialize_with = "null_as_default")]
        text: String,
    },
    Thinking {
        #[serde(default, deserialize_with = "null_as_default")]
        thinking: String,
    },
    ToolUse {
        #[serde(default, deserialize_with = "null_as_default")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

impl From<Value> for Content {
    fn from(raw: Value) -> Self {
        match raw {
            Value::String(s) => Content::Text(s),
            Value::Array(items) => Content::Items(
                items
                    .into_iter()
                    .map(|item| ContentItem::deserialize(item).unwrap_or(ContentItem::Unknown))
                    .collect(),
            ),
            _ => Content::Empty,
        }
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Content::from)
    }
}

impl Content {
    /// Plain text of the content. For item lists, every `text` item is joined
    /// with a newline in list order; other item kinds contribute nothing.
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Items(items) => items
                .iter()
                .filter_map(|item| match item {
                    ContentItem::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Content::Empty => String::new(),
        }
    }

    /// Tool invocations embedded in an item list, as `(name, input)` pairs.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &Value)> {
        let items: &[ContentItem] = match self {
            Content::Items(items) => items,
            _ => &[],
        };
        items.iter().filter_map(|item| match item {
            ContentItem::ToolUse { name, input } => Some((name.as_str(), input)),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Items(items) => items.is_empty(),
            Content::Empty => true,
        }
    }
}
