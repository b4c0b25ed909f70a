// Stream events describing incremental assistant-message generation
//
// Wire format is a JSON object with a hyphenated `type` discriminant
// ("text-delta", "tool-input-available", ...). Data events carry their
// application kind inside the tag itself ("data-weather"), so the enum
// (de)serializes through an envelope struct instead of a serde tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One increment of assistant-message construction.
///
/// Text and reasoning streams follow the start/delta/end pattern keyed by a
/// part id. Tool events are keyed by `tool_call_id`. Data events are
/// application payloads tagged by kind, keyed by `(kind, id)`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new assistant message is being generated.
    Start { message_id: String },

    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },

    ReasoningStart { id: String },
    ReasoningDelta { id: String, delta: String },
    ReasoningEnd { id: String },

    ToolInputAvailable {
        tool_name: String,
        tool_call_id: String,
        input: Value,
    },
    ToolOutputAvailable {
        tool_name: String,
        tool_call_id: String,
        output: Value,
    },
    ToolOutputError {
        tool_name: String,
        tool_call_id: String,
        error: String,
    },

    /// Arbitrary application payload, wire tag `data-<kind>`.
    Data { kind: String, id: String, data: Value },

    /// Generation completed normally.
    Finish,
    /// Generation was aborted by either endpoint.
    Abort,
    /// Heartbeat; carries no state.
    Ping,
}

/// Lifecycle status carried inside a data event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStatus {
    Processing,
    Streaming,
    Complete,
    Error,
}

impl DataStatus {
    /// Read the `status` field from a data payload, if present and known.
    pub fn from_payload(data: &Value) -> Option<DataStatus> {
        let status = data.get("status")?.as_str()?;
        match status {
            "processing" => Some(DataStatus::Processing),
            "streaming" => Some(DataStatus::Streaming),
            "complete" => Some(DataStatus::Complete),
            "error" => Some(DataStatus::Error),
            _ => None,
        }
    }

    /// Whether this status marks the payload as durable.
    pub fn is_terminal(self) -> bool {
        matches!(self, DataStatus::Complete | DataStatus::Error)
    }
}

impl StreamEvent {
    /// Wire discriminant for this event ("text-delta", "data-<kind>", ...).
    pub fn event_type(&self) -> String {
        match self {
            StreamEvent::Start { .. } => "start".to_string(),
            StreamEvent::TextStart { .. } => "text-start".to_string(),
            StreamEvent::TextDelta { .. } => "text-delta".to_string(),
            StreamEvent::TextEnd { .. } => "text-end".to_string(),
            StreamEvent::ReasoningStart { .. } => "reasoning-start".to_string(),
            StreamEvent::ReasoningDelta { .. } => "reasoning-delta".to_string(),
            StreamEvent::ReasoningEnd { .. } => "reasoning-end".to_string(),
            StreamEvent::ToolInputAvailable { .. } => "tool-input-available".to_string(),
            StreamEvent::ToolOutputAvailable { .. } => "tool-output-available".to_string(),
            StreamEvent::ToolOutputError { .. } => "tool-output-error".to_string(),
            StreamEvent::Data { kind, .. } => format!("data-{kind}"),
            StreamEvent::Finish => "finish".to_string(),
            StreamEvent::Abort => "abort".to_string(),
            StreamEvent::Ping => "ping".to_string(),
        }
    }

    /// The part identity this event addresses, if any.
    ///
    /// This is the id replayed streams are resumed against: text, reasoning
    /// and data events use their `id`; tool events use their `tool_call_id`.
    pub fn part_id(&self) -> Option<&str> {
        match self {
            StreamEvent::TextStart { id }
            | StreamEvent::TextDelta { id, .. }
            | StreamEvent::TextEnd { id }
            | StreamEvent::ReasoningStart { id }
            | StreamEvent::ReasoningDelta { id, .. }
            | StreamEvent::ReasoningEnd { id }
            | StreamEvent::Data { id, .. } => Some(id),
            StreamEvent::ToolInputAvailable { tool_call_id, .. }
            | StreamEvent::ToolOutputAvailable { tool_call_id, .. }
            | StreamEvent::ToolOutputError { tool_call_id, .. } => Some(tool_call_id),
            StreamEvent::Start { .. }
            | StreamEvent::Finish
            | StreamEvent::Abort
            | StreamEvent::Ping => None,
        }
    }

    /// Whether this is a text or reasoning delta (the only batchable events).
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            StreamEvent::TextDelta { .. } | StreamEvent::ReasoningDelta { .. }
        )
    }
}

// ============================================
// Wire envelope
// ============================================

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    delta: Option<String>,
    #[serde(rename = "toolName", skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
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

impl Serialize for StreamEvent {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut wire = WireEvent {
            kind: self.event_type(),
            ..WireEvent::default()
        };
        match self {
            StreamEvent::Start { message_id } => wire.message_id = Some(message_id.clone()),
            StreamEvent::TextStart { id }
            | StreamEvent::TextEnd { id }
            | StreamEvent::ReasoningStart { id }
            | StreamEvent::ReasoningEnd { id } => wire.id = Some(id.clone()),
            StreamEvent::TextDelta { id, delta } | StreamEvent::ReasoningDelta { id, delta } => {
                wire.id = Some(id.clone());
                wire.delta = Some(delta.clone());
            }
            StreamEvent::ToolInputAvailable {
                tool_name,
                tool_call_id,
                input,
            } => {
                wire.tool_name = Some(tool_name.clone());
                wire.tool_call_id = Some(tool_call_id.clone());
                wire.input = Some(input.clone());
            }
            StreamEvent::ToolOutputAvailable {
                tool_name,
                tool_call_id,
                output,
            } => {
                wire.tool_name = Some(tool_name.clone());
                wire.tool_call_id = Some(tool_call_id.clone());
                wire.output = Some(output.clone());
            }
            StreamEvent::ToolOutputError {
                tool_name,
                tool_call_id,
                error,
            } => {
                wire.tool_name = Some(tool_name.clone());
                wire.tool_call_id = Some(tool_call_id.clone());
                wire.error = Some(error.clone());
            }
            StreamEvent::Data { id, data, .. } => {
                wire.id = Some(id.clone());
                wire.data = Some(data.clone());
            }
            StreamEvent::Finish | StreamEvent::Abort | StreamEvent::Ping => {}
        }
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StreamEvent {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let wire = WireEvent::deserialize(deserializer)?;
        let kind = wire.kind.clone();
        let require = move |field: Option<String>, name: &str| {
            field.ok_or_else(|| D::Error::custom(format!("{kind} missing {name}")))
        };

        match wire.kind.as_str() {
            "start" => Ok(StreamEvent::Start {
                message_id: require(wire.message_id, "messageId")?,
            }),
            "text-start" => Ok(StreamEvent::TextStart {
                id: require(wire.id, "id")?,
            }),
            "text-delta" => Ok(StreamEvent::TextDelta {
                id: require(wire.id, "id")?,
                delta: wire.delta.unwrap_or_default(),
            }),
            "text-end" => Ok(StreamEvent::TextEnd {
                id: require(wire.id, "id")?,
            }),
            "reasoning-start" => Ok(StreamEvent::ReasoningStart {
                id: require(wire.id, "id")?,
            }),
            "reasoning-delta" => Ok(StreamEvent::ReasoningDelta {
                id: require(wire.id, "id")?,
                delta: wire.delta.unwrap_or_default(),
            }),
            "reasoning-end" => Ok(StreamEvent::ReasoningEnd {
                id: require(wire.id, "id")?,
            }),
            "tool-input-available" => Ok(StreamEvent::ToolInputAvailable {
                tool_name: require(wire.tool_name, "toolName")?,
                tool_call_id: require(wire.tool_call_id, "toolCallId")?,
                input: wire.input.unwrap_or(Value::Null),
            }),
            "tool-output-available" => Ok(StreamEvent::ToolOutputAvailable {
                tool_name: require(wire.tool_name, "toolName")?,
                tool_call_id: require(wire.tool_call_id, "toolCallId")?,
                output: wire.output.unwrap_or(Value::Null),
            }),
            "tool-output-error" => Ok(StreamEvent::ToolOutputError {
                tool_name: require(wire.tool_name, "toolName")?,
                tool_call_id: require(wire.tool_call_id, "toolCallId")?,
                error: wire.error.unwrap_or_default(),
            }),
            "finish" => Ok(StreamEvent::Finish),
            "abort" => Ok(StreamEvent::Abort),
            "ping" => Ok(StreamEvent::Ping),
            other => {
                if let Some(kind) = other.strip_prefix("data-") {
                    if kind.is_empty() {
                        return Err(D::Error::custom("data event with empty kind"));
                    }
                    Ok(StreamEvent::Data {
                        kind: kind.to_string(),
                        id: require(wire.id, "id")?,
                        data: wire.data.unwrap_or(Value::Null),
                    })
                } else {
                    Err(D::Error::custom(format!("unknown event type: {other}")))
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
    fn test_text_delta_round_trip() {
        let event = StreamEvent::TextDelta {
            id: "t1".to_string(),
            delta: "Hello ".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"text-delta""#));
        assert!(json.contains(r#""id":"t1""#));

        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_start_uses_message_id_field() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"start","messageId":"m1"}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Start {
                message_id: "m1".to_string()
            }
        );
    }

    #[test]
    fn test_data_event_kind_in_tag() {
        let event = StreamEvent::Data {
            kind: "weather".to_string(),
            id: "d1".to_string(),
            data: json!({"status": "streaming", "city": "Tokyo"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"data-weather""#));

        let back: StreamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_tool_event_camel_case_keys() {
        let event = StreamEvent::ToolInputAvailable {
            tool_name: "search".to_string(),
            tool_call_id: "c1".to_string(),
            input: json!({"query": "rust"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""toolName":"search""#));
        assert!(json.contains(r#""toolCallId":"c1""#));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: std::result::Result<StreamEvent, _> =
            serde_json::from_str(r#"{"type":"telemetry","id":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_id_rejected() {
        let result: std::result::Result<StreamEvent, _> =
            serde_json::from_str(r#"{"type":"text-delta","delta":"hi"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_data_status_from_payload() {
        assert_eq!(
            DataStatus::from_payload(&json!({"status": "complete"})),
            Some(DataStatus::Complete)
        );
        assert_eq!(DataStatus::from_payload(&json!({"other": 1})), None);
        assert!(DataStatus::Error.is_terminal());
        assert!(!DataStatus::Streaming.is_terminal());
    }

    #[test]
    fn test_part_id() {
        let event = StreamEvent::ToolOutputAvailable {
            tool_name: "search".to_string(),
            tool_call_id: "c9".to_string(),
            output: json!(null),
        };
        assert_eq!(event.part_id(), Some("c9"));
        assert_eq!(StreamEvent::Ping.part_id(), None);
    }
}
