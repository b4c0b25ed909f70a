// Snapshot reducer: folds the event stream into the current best-known
// message for live rendering
//
// Pure, synchronous, single-threaded. Every state-changing event yields a
// full Message snapshot (the consumer does its own diffing); ping and
// malformed events yield None. Reconnects are handled by priming the
// reducer with the persisted base parts for a message id: when `start`
// announces that id, the fold begins from a deep copy of the seed instead
// of an empty parts list, so replayed deltas merge instead of duplicating.

use std::collections::HashMap;

use crate::event::StreamEvent;
use crate::message::{Message, Part, PartKey, PartState, ReasoningPart, TextPart, ToolPart};
use crate::policy::ToolPolicies;

/// Folds stream events into message snapshots
#[derive(Debug, Default)]
pub struct SnapshotReducer {
    current: Option<Message>,
    base_parts: HashMap<String, Vec<Part>>,
    policies: ToolPolicies,
}

impl SnapshotReducer {
    pub fn new(policies: ToolPolicies) -> Self {
        Self {
            current: None,
            base_parts: HashMap::new(),
            policies,
        }
    }

    /// Seed base parts for a message id ahead of a reconnect replay.
    ///
    /// The seed is only adopted when a `start` event announces that id.
    pub fn prime(&mut self, message_id: impl Into<String>, parts: Vec<Part>) {
        self.base_parts.insert(message_id.into(), parts);
    }

    /// Current snapshot, if a message has been announced
    pub fn snapshot(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    /// Apply one event; returns the new snapshot when state changed
    pub fn apply(&mut self, event: &StreamEvent) -> Option<Message> {
        match event {
            StreamEvent::Start { message_id } => {
                if message_id.is_empty() {
                    return None;
                }
                self.ensure_base_parts(message_id);
                self.emit()
            }

            StreamEvent::TextStart { id } => {
                let part = self.open_text(id)?;
                part.text.clear();
                part.state = PartState::Streaming;
                self.emit()
            }
            StreamEvent::TextDelta { id, delta } => {
                let part = self.open_text(id)?;
                part.text.push_str(delta);
                part.state = PartState::Streaming;
                self.emit()
            }
            StreamEvent::TextEnd { id } => {
                let part = self.open_text(id)?;
                part.state = PartState::Done;
                self.emit()
            }

            StreamEvent::ReasoningStart { id } => {
                let part = self.open_reasoning(id)?;
                part.text.clear();
                part.state = PartState::Streaming;
                self.emit()
            }
            StreamEvent::ReasoningDelta { id, delta } => {
                let part = self.open_reasoning(id)?;
                part.text.push_str(delta);
                part.state = PartState::Streaming;
                self.emit()
            }
            StreamEvent::ReasoningEnd { id } => {
                let part = self.open_reasoning(id)?;
                part.state = PartState::Done;
                self.emit()
            }

            StreamEvent::ToolInputAvailable {
                tool_name,
                tool_call_id,
                input,
            } => {
                if self.skip_tool(tool_name, tool_call_id) {
                    return None;
                }
                let input = self.policies.sanitize_input(tool_name, input.clone());
                let part = self.open_tool(tool_name, tool_call_id)?;
                part.input = Some(input);
                part.state = PartState::InputAvailable;
                self.emit()
            }
            StreamEvent::ToolOutputAvailable {
                tool_name,
                tool_call_id,
                output,
            } => {
                if self.skip_tool(tool_name, tool_call_id) {
                    return None;
                }
                let output = output.clone();
                let part = self.open_tool(tool_name, tool_call_id)?;
                part.output = Some(output);
                part.state = PartState::OutputAvailable;
                self.emit()
            }
            StreamEvent::ToolOutputError {
                tool_name,
                tool_call_id,
                error,
            } => {
                if self.skip_tool(tool_name, tool_call_id) {
                    return None;
                }
                let error = error.clone();
                let part = self.open_tool(tool_name, tool_call_id)?;
                part.error = Some(error);
                part.state = PartState::OutputError;
                self.emit()
            }

            StreamEvent::Data { kind, id, data } => {
                if id.is_empty() {
                    return None;
                }
                let part = Part::Data(crate::message::DataPart {
                    kind: kind.clone(),
                    id: id.clone(),
                    data: data.clone(),
                });
                self.current.as_mut()?.upsert(part);
                self.emit()
            }

            StreamEvent::Finish | StreamEvent::Abort => {
                self.current.as_mut()?.close_streaming_parts();
                self.emit()
            }

            StreamEvent::Ping => None,
        }
    }

    /// Reset parts to the caller-supplied seed whenever the stream
    /// announces a message id different from the current one.
    fn ensure_base_parts(&mut self, message_id: &str) {
        let changed = self
            .current
            .as_ref()
            .map(|m| m.id != message_id)
            .unwrap_or(true);
        if changed {
            let mut message = Message::assistant(message_id);
            message.parts = self.base_parts.get(message_id).cloned().unwrap_or_default();
            self.current = Some(message);
        }
    }

    fn emit(&self) -> Option<Message> {
        self.current.clone()
    }

    fn skip_tool(&self, tool_name: &str, tool_call_id: &str) -> bool {
        tool_name.is_empty() || tool_call_id.is_empty() || self.policies.is_excluded(tool_name)
    }

    /// Locate or append the text part for `id` (append-or-update rule)
    fn open_text(&mut self, id: &str) -> Option<&mut TextPart> {
        if id.is_empty() {
            return None;
        }
        let message = self.current.as_mut()?;
        if message.position(PartKey::Text(id)).is_none() {
            message.parts.push(Part::text_streaming(id));
        }
        match message.part_mut(PartKey::Text(id)) {
            Some(Part::Text(p)) => Some(p),
            _ => None,
        }
    }

    fn open_reasoning(&mut self, id: &str) -> Option<&mut ReasoningPart> {
        if id.is_empty() {
            return None;
        }
        let message = self.current.as_mut()?;
        if message.position(PartKey::Reasoning(id)).is_none() {
            message.parts.push(Part::reasoning_streaming(id));
        }
        match message.part_mut(PartKey::Reasoning(id)) {
            Some(Part::Reasoning(p)) => Some(p),
            _ => None,
        }
    }

    fn open_tool(&mut self, tool_name: &str, tool_call_id: &str) -> Option<&mut ToolPart> {
        let message = self.current.as_mut()?;
        if message.position(PartKey::Tool(tool_call_id)).is_none() {
            message.parts.push(Part::Tool(ToolPart {
                tool_name: tool_name.to_string(),
                tool_call_id: tool_call_id.to_string(),
                state: PartState::InputAvailable,
                input: None,
                output: None,
                error: None,
            }));
        }
        match message.part_mut(PartKey::Tool(tool_call_id)) {
            Some(Part::Tool(p)) => Some(p),
            _ => None,
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use serde_json::json;

    fn start(id: &str) -> StreamEvent {
        StreamEvent::Start {
            message_id: id.to_string(),
        }
    }

    fn text_delta(id: &str, delta: &str) -> StreamEvent {
        StreamEvent::TextDelta {
            id: id.to_string(),
            delta: delta.to_string(),
        }
    }

    #[test]
    fn test_hello_world_scenario() {
        let mut reducer = SnapshotReducer::default();

        reducer.apply(&start("m1"));
        reducer.apply(&StreamEvent::TextStart {
            id: "t1".to_string(),
        });
        reducer.apply(&text_delta("t1", "Hello "));
        reducer.apply(&text_delta("t1", "world"));
        reducer.apply(&StreamEvent::TextEnd {
            id: "t1".to_string(),
        });
        let snapshot = reducer.apply(&StreamEvent::Finish).unwrap();

        assert_eq!(snapshot.id, "m1");
        assert_eq!(snapshot.role, Role::Assistant);
        assert_eq!(snapshot.parts.len(), 1);
        match &snapshot.parts[0] {
            Part::Text(p) => {
                assert_eq!(p.id, "t1");
                assert_eq!(p.text, "Hello world");
                assert_eq!(p.state, PartState::Done);
            }
            other => panic!("expected text part, got {other:?}"),
        }
    }

    #[test]
    fn test_part_order_never_changes() {
        let mut reducer = SnapshotReducer::default();
        reducer.apply(&start("m1"));
        reducer.apply(&StreamEvent::TextStart {
            id: "t1".to_string(),
        });
        reducer.apply(&StreamEvent::ReasoningStart {
            id: "r1".to_string(),
        });
        reducer.apply(&StreamEvent::Data {
            kind: "chart".to_string(),
            id: "d1".to_string(),
            data: json!({"status": "processing"}),
        });

        // Updates to earlier parts must not move them
        let snapshot = reducer.apply(&text_delta("t1", "later text")).unwrap();
        assert!(matches!(&snapshot.parts[0], Part::Text(_)));
        assert!(matches!(&snapshot.parts[1], Part::Reasoning(_)));
        assert!(matches!(&snapshot.parts[2], Part::Data(_)));
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut reducer = SnapshotReducer::default();
        reducer.apply(&start("m1"));
        reducer.apply(&StreamEvent::TextStart {
            id: "t1".to_string(),
        });
        reducer.apply(&text_delta("t1", "hi"));

        let first = reducer.apply(&StreamEvent::Finish).unwrap();
        let second = reducer.apply(&StreamEvent::Finish).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_ping_is_noop() {
        let mut reducer = SnapshotReducer::default();
        reducer.apply(&start("m1"));
        assert!(reducer.apply(&StreamEvent::Ping).is_none());
    }

    #[test]
    fn test_events_before_start_ignored() {
        let mut reducer = SnapshotReducer::default();
        assert!(reducer.apply(&text_delta("t1", "early")).is_none());
        assert!(reducer.snapshot().is_none());
    }

    #[test]
    fn test_empty_id_ignored() {
        let mut reducer = SnapshotReducer::default();
        reducer.apply(&start("m1"));
        assert!(reducer.apply(&text_delta("", "x")).is_none());
    }

    #[test]
    fn test_tool_input_sanitized() {
        let policies = ToolPolicies::builder()
            .allow_input_fields("createPersona", ["name"])
            .build();
        let mut reducer = SnapshotReducer::new(policies);
        reducer.apply(&start("m1"));

        let snapshot = reducer
            .apply(&StreamEvent::ToolInputAvailable {
                tool_name: "createPersona".to_string(),
                tool_call_id: "c1".to_string(),
                input: json!({"name": "Ada", "backstory": "secret"}),
            })
            .unwrap();

        match &snapshot.parts[0] {
            Part::Tool(p) => {
                assert_eq!(p.input, Some(json!({"name": "Ada"})));
                assert_eq!(p.state, PartState::InputAvailable);
            }
            other => panic!("expected tool part, got {other:?}"),
        }
    }

    #[test]
    fn test_excluded_tool_materializes_no_part() {
        let policies = ToolPolicies::builder().exclude("renderCanvas").build();
        let mut reducer = SnapshotReducer::new(policies);
        reducer.apply(&start("m1"));

        assert!(reducer
            .apply(&StreamEvent::ToolInputAvailable {
                tool_name: "renderCanvas".to_string(),
                tool_call_id: "c1".to_string(),
                input: json!({}),
            })
            .is_none());
        assert!(reducer.snapshot().unwrap().parts.is_empty());
    }

    #[test]
    fn test_tool_output_preserves_input() {
        let mut reducer = SnapshotReducer::default();
        reducer.apply(&start("m1"));
        reducer.apply(&StreamEvent::ToolInputAvailable {
            tool_name: "search".to_string(),
            tool_call_id: "c1".to_string(),
            input: json!({"query": "rust"}),
        });
        let snapshot = reducer
            .apply(&StreamEvent::ToolOutputAvailable {
                tool_name: "search".to_string(),
                tool_call_id: "c1".to_string(),
                output: json!({"hits": 2}),
            })
            .unwrap();

        match &snapshot.parts[0] {
            Part::Tool(p) => {
                assert_eq!(p.input, Some(json!({"query": "rust"})));
                assert_eq!(p.output, Some(json!({"hits": 2})));
                assert_eq!(p.state, PartState::OutputAvailable);
            }
            other => panic!("expected tool part, got {other:?}"),
        }
    }

    #[test]
    fn test_priming_merges_replayed_events() {
        let mut reducer = SnapshotReducer::default();
        reducer.prime(
            "m1",
            vec![Part::Text(TextPart {
                id: "t1".to_string(),
                text: "already persisted".to_string(),
                state: PartState::Done,
            })],
        );

        reducer.apply(&start("m1"));
        reducer.apply(&StreamEvent::TextStart {
            id: "t2".to_string(),
        });
        let snapshot = reducer.apply(&text_delta("t2", "fresh")).unwrap();

        assert_eq!(snapshot.parts.len(), 2);
        assert_eq!(snapshot.parts[0].as_text(), Some("already persisted"));
        assert_eq!(snapshot.parts[1].as_text(), Some("fresh"));
    }

    #[test]
    fn test_new_message_id_resets_parts() {
        let mut reducer = SnapshotReducer::default();
        reducer.apply(&start("m1"));
        reducer.apply(&StreamEvent::TextStart {
            id: "t1".to_string(),
        });

        let snapshot = reducer.apply(&start("m2")).unwrap();
        assert_eq!(snapshot.id, "m2");
        assert!(snapshot.parts.is_empty());
    }

    #[test]
    fn test_repeated_start_same_id_keeps_parts() {
        let mut reducer = SnapshotReducer::default();
        reducer.apply(&start("m1"));
        reducer.apply(&StreamEvent::TextStart {
            id: "t1".to_string(),
        });

        let snapshot = reducer.apply(&start("m1")).unwrap();
        assert_eq!(snapshot.parts.len(), 1);
    }
}
