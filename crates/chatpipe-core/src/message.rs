// Message and part model (PRIMARY conversation data)
//
// A message is an ordered list of parts. Parts are append-or-update: an
// event addressing a known identity mutates that part in place, an unknown
// identity appends a new part. Once a part has a position it keeps it; only
// content and state mutate.
//
// Like the events, parts use dynamic wire tags ("tool-<name>",
// "data-<kind>") and therefore (de)serialize through an envelope struct.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Completion state of a part
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PartState {
    Streaming,
    Done,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

impl PartState {
    /// Terminal or stable states a resume cursor may anchor on.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PartState::Done | PartState::OutputAvailable | PartState::OutputError
        )
    }
}

// ============================================
// Parts - discriminated union of message content
// ============================================

/// Text span streamed via text-start/delta/end
#[derive(Debug, Clone, PartialEq)]
pub struct TextPart {
    pub id: String,
    pub text: String,
    pub state: PartState,
}

/// Reasoning span streamed via reasoning-start/delta/end
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningPart {
    pub id: String,
    pub text: String,
    pub state: PartState,
}

/// Tool invocation, keyed by tool_call_id, wire tag `tool-<name>`
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPart {
    pub tool_name: String,
    pub tool_call_id: String,
    pub state: PartState,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// Structured data block, keyed by (kind, id), wire tag `data-<kind>`.
/// Carries no part state; its payload tracks its own status.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPart {
    pub kind: String,
    pub id: String,
    pub data: Value,
}

/// One addressable content unit of a message
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(TextPart),
    Reasoning(ReasoningPart),
    Tool(ToolPart),
    Data(DataPart),
}

/// Identity key used for append-or-update matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKey<'a> {
    Text(&'a str),
    Reasoning(&'a str),
    Tool(&'a str),
    Data(&'a str, &'a str),
}

impl Part {
    /// Create a streaming text placeholder
    pub fn text_streaming(id: impl Into<String>) -> Self {
        Part::Text(TextPart {
            id: id.into(),
            text: String::new(),
            state: PartState::Streaming,
        })
    }

    /// Create a streaming reasoning placeholder
    pub fn reasoning_streaming(id: impl Into<String>) -> Self {
        Part::Reasoning(ReasoningPart {
            id: id.into(),
            text: String::new(),
            state: PartState::Streaming,
        })
    }

    /// The identity this part is addressed by
    pub fn key(&self) -> PartKey<'_> {
        match self {
            Part::Text(p) => PartKey::Text(&p.id),
            Part::Reasoning(p) => PartKey::Reasoning(&p.id),
            Part::Tool(p) => PartKey::Tool(&p.tool_call_id),
            Part::Data(p) => PartKey::Data(&p.kind, &p.id),
        }
    }

    /// The raw id/tool_call_id string, for resume-cursor computation
    pub fn identity(&self) -> &str {
        match self {
            Part::Text(p) => &p.id,
            Part::Reasoning(p) => &p.id,
            Part::Tool(p) => &p.tool_call_id,
            Part::Data(p) => &p.id,
        }
    }

    /// The part state, if this part variant carries one
    pub fn state(&self) -> Option<PartState> {
        match self {
            Part::Text(p) => Some(p.state),
            Part::Reasoning(p) => Some(p.state),
            Part::Tool(p) => Some(p.state),
            Part::Data(_) => None,
        }
    }

    /// Get text if this is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(p) => Some(&p.text),
            _ => None,
        }
    }
}

// ============================================
// Message
// ============================================

/// A chat message: id, role and an ordered parts array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    /// Create an empty assistant message
    pub fn assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            parts: Vec::new(),
        }
    }

    /// Position of the part addressed by `key`, if present
    pub fn position(&self, key: PartKey<'_>) -> Option<usize> {
        self.parts.iter().position(|p| p.key() == key)
    }

    /// Mutable access to the part addressed by `key`
    pub fn part_mut(&mut self, key: PartKey<'_>) -> Option<&mut Part> {
        self.parts.iter_mut().find(|p| p.key() == key)
    }

    /// Append-or-update: replace the part with the same identity in place,
    /// or append at the end. First-occurrence order never changes.
    pub fn upsert(&mut self, part: Part) {
        match self.position(part.key()) {
            Some(idx) => self.parts[idx] = part,
            None => self.parts.push(part),
        }
    }

    /// Force every still-streaming part to done (finish/abort semantics)
    pub fn close_streaming_parts(&mut self) {
        for part in &mut self.parts {
            match part {
                Part::Text(p) if p.state == PartState::Streaming => p.state = PartState::Done,
                Part::Reasoning(p) if p.state == PartState::Streaming => p.state = PartState::Done,
                _ => {}
            }
        }
    }
}

// ============================================
// Wire envelope for parts
// ============================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct WirePart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<PartState>,
    #[serde(rename = "toolCallId", skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl Serialize for Part {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let wire = match self {
            Part::Text(p) => WirePart {
                kind: "text".to_string(),
                id: Some(p.id.clone()),
                text: Some(p.text.clone()),
                state: Some(p.state),
                ..WirePart::default()
            },
            Part::Reasoning(p) => WirePart {
                kind: "reasoning".to_string(),
                id: Some(p.id.clone()),
                text: Some(p.text.clone()),
                state: Some(p.state),
                ..WirePart::default()
            },
            Part::Tool(p) => WirePart {
                kind: format!("tool-{}", p.tool_name),
                tool_call_id: Some(p.tool_call_id.clone()),
                state: Some(p.state),
                input: p.input.clone(),
                output: p.output.clone(),
                error: p.error.clone(),
                ..WirePart::default()
            },
            Part::Data(p) => WirePart {
                kind: format!("data-{}", p.kind),
                id: Some(p.id.clone()),
                data: Some(p.data.clone()),
                ..WirePart::default()
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let wire = WirePart::deserialize(deserializer)?;
        let kind = wire.kind.clone();
        let require = move |field: Option<String>, name: &str| {
            field.ok_or_else(|| D::Error::custom(format!("{kind} part missing {name}")))
        };

        match wire.kind.as_str() {
            "text" => Ok(Part::Text(TextPart {
                id: require(wire.id, "id")?,
                text: wire.text.unwrap_or_default(),
                state: wire.state.unwrap_or(PartState::Done),
            })),
            "reasoning" => Ok(Part::Reasoning(ReasoningPart {
                id: require(wire.id, "id")?,
                text: wire.text.unwrap_or_default(),
                state: wire.state.unwrap_or(PartState::Done),
            })),
            other => {
                if let Some(name) = other.strip_prefix("tool-") {
                    Ok(Part::Tool(ToolPart {
                        tool_name: name.to_string(),
                        tool_call_id: require(wire.tool_call_id, "toolCallId")?,
                        state: wire.state.unwrap_or(PartState::InputAvailable),
                        input: wire.input,
                        output: wire.output,
                        error: wire.error,
                    }))
                } else if let Some(data_kind) = other.strip_prefix("data-") {
                    Ok(Part::Data(DataPart {
                        kind: data_kind.to_string(),
                        id: require(wire.id, "id")?,
                        data: wire.data.unwrap_or(Value::Null),
                    }))
                } else {
                    Err(D::Error::custom(format!("unknown part type: {other}")))
                }
            }
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_part_serialization() {
        let part = Part::Text(TextPart {
            id: "t1".to_string(),
            text: "Hello world".to_string(),
            state: PartState::Done,
        });
        let json = serde_json::to_string(&part).unwrap();
        assert!(json.contains(r#""type":"text""#));
        assert!(json.contains(r#""state":"done""#));

        let back: Part = serde_json::from_str(&json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn test_tool_part_tag_carries_name() {
        let part = Part::Tool(ToolPart {
            tool_name: "search".to_string(),
            tool_call_id: "c1".to_string(),
            state: PartState::OutputAvailable,
            input: Some(json!({"query": "rust"})),
            output: Some(json!({"hits": 3})),
            error: None,
        });
        let json = serde_json::to_string(&part).unwrap();
        assert!(json.contains(r#""type":"tool-search""#));
        assert!(json.contains(r#""state":"output-available""#));

        let back: Part = serde_json::from_str(&json).unwrap();
        assert_eq!(back, part);
    }

    #[test]
    fn test_data_part_round_trip() {
        let part = Part::Data(DataPart {
            kind: "chart".to_string(),
            id: "d1".to_string(),
            data: json!({"status": "complete", "points": [1, 2]}),
        });
        let json = serde_json::to_string(&part).unwrap();
        assert!(json.contains(r#""type":"data-chart""#));

        let back: Part = serde_json::from_str(&json).unwrap();
        assert_eq!(back, part);
        assert_eq!(back.state(), None);
    }

    #[test]
    fn test_upsert_preserves_position() {
        let mut msg = Message::assistant("m1");
        msg.upsert(Part::text_streaming("t1"));
        msg.upsert(Part::reasoning_streaming("r1"));

        msg.upsert(Part::Text(TextPart {
            id: "t1".to_string(),
            text: "updated".to_string(),
            state: PartState::Done,
        }));

        assert_eq!(msg.parts.len(), 2);
        assert_eq!(msg.parts[0].as_text(), Some("updated"));
        assert!(matches!(&msg.parts[1], Part::Reasoning(_)));
    }

    #[test]
    fn test_data_parts_keyed_by_kind_and_id() {
        let mut msg = Message::assistant("m1");
        msg.upsert(Part::Data(DataPart {
            kind: "a".to_string(),
            id: "1".to_string(),
            data: json!(1),
        }));
        // Same id, different kind: distinct part
        msg.upsert(Part::Data(DataPart {
            kind: "b".to_string(),
            id: "1".to_string(),
            data: json!(2),
        }));
        assert_eq!(msg.parts.len(), 2);

        msg.upsert(Part::Data(DataPart {
            kind: "a".to_string(),
            id: "1".to_string(),
            data: json!(3),
        }));
        assert_eq!(msg.parts.len(), 2);
        assert!(matches!(&msg.parts[0], Part::Data(d) if d.data == json!(3)));
    }

    #[test]
    fn test_close_streaming_parts() {
        let mut msg = Message::assistant("m1");
        msg.upsert(Part::text_streaming("t1"));
        msg.upsert(Part::Tool(ToolPart {
            tool_name: "search".to_string(),
            tool_call_id: "c1".to_string(),
            state: PartState::InputAvailable,
            input: None,
            output: None,
            error: None,
        }));

        msg.close_streaming_parts();
        assert_eq!(msg.parts[0].state(), Some(PartState::Done));
        // Tool states are not streaming; untouched
        assert_eq!(msg.parts[1].state(), Some(PartState::InputAvailable));
    }

    #[test]
    fn test_message_round_trip() {
        let mut msg = Message::assistant("m1");
        msg.upsert(Part::Text(TextPart {
            id: "t1".to_string(),
            text: "hi".to_string(),
            state: PartState::Done,
        }));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"assistant""#));

        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
