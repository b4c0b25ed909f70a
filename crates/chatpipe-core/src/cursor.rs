// Resume cursor computation
//
// After loading the persisted history of a conversation, a reconnecting
// subscriber needs two things: where to resume the event feed, and the
// parts to prime the snapshot reducer with so replayed events merge into
// existing content instead of duplicating it.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Part, PartState, Role};

/// Where to re-subscribe on the event feed for a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeCursor {
    /// Id of the last persisted assistant message
    pub last_assistant_message_id: String,
    /// Identity of the last part that reached a stable state; None means
    /// nothing is safely absorbed yet and the full feed must be replayed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_event_id: Option<String>,
}

/// Cursor plus the base parts to prime a reducer with
#[derive(Debug, Clone)]
pub struct ResumePlan {
    pub cursor: ResumeCursor,
    pub base_parts: Vec<Part>,
}

/// Whether a part is safe to resume after: its content will not be
/// rewritten by replayed events. Data parts carry no state and are
/// upserted idempotently, so they count as stable.
fn is_stable(part: &Part) -> bool {
    match part.state() {
        Some(PartState::Done)
        | Some(PartState::OutputAvailable)
        | Some(PartState::OutputError) => true,
        None => true,
        Some(PartState::Streaming) | Some(PartState::InputAvailable) => false,
    }
}

/// Compute the resume plan from a conversation's persisted messages,
/// oldest first.
///
/// Scans backwards for the last assistant message with at least one part.
/// Its parts are scanned in reverse for the most recent stable one; that
/// part's identity becomes the cursor. A message whose parts are all
/// still in flight yields a cursor with no `after_event_id` (full replay).
/// Returns None when the conversation has no assistant message to resume.
pub fn resume_plan(messages: &[Message]) -> Option<ResumePlan> {
    let last = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant && !m.parts.is_empty())?;

    let after_event_id = last
        .parts
        .iter()
        .rev()
        .find(|p| is_stable(p))
        .map(|p| p.identity().to_string());

    Some(ResumePlan {
        cursor: ResumeCursor {
            last_assistant_message_id: last.id.clone(),
            after_event_id,
        },
        base_parts: last.parts.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{TextPart, ToolPart};
    use serde_json::json;

    fn assistant(id: &str, parts: Vec<Part>) -> Message {
        Message {
            id: id.to_string(),
            role: Role::Assistant,
            parts,
        }
    }

    fn user(id: &str) -> Message {
        Message {
            id: id.to_string(),
            role: Role::User,
            parts: vec![Part::Text(TextPart {
                id: "u".to_string(),
                text: "hi".to_string(),
                state: PartState::Done,
            })],
        }
    }

    fn done_text(id: &str) -> Part {
        Part::Text(TextPart {
            id: id.to_string(),
            text: "full".to_string(),
            state: PartState::Done,
        })
    }

    #[test]
    fn test_cursor_points_at_last_done_part() {
        let messages = vec![
            user("u1"),
            assistant("m1", vec![done_text("p1"), done_text("p7")]),
        ];
        let plan = resume_plan(&messages).unwrap();
        assert_eq!(plan.cursor.last_assistant_message_id, "m1");
        assert_eq!(plan.cursor.after_event_id.as_deref(), Some("p7"));
        assert_eq!(plan.base_parts.len(), 2);
    }

    #[test]
    fn test_streaming_tail_is_skipped() {
        let messages = vec![assistant(
            "m1",
            vec![done_text("p1"), Part::text_streaming("p2")],
        )];
        let plan = resume_plan(&messages).unwrap();
        assert_eq!(plan.cursor.after_event_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_tool_parts_resume_by_tool_call_id() {
        let messages = vec![assistant(
            "m1",
            vec![Part::Tool(ToolPart {
                tool_name: "search".to_string(),
                tool_call_id: "call-1".to_string(),
                state: PartState::OutputAvailable,
                input: Some(json!({})),
                output: Some(json!({"hits": 3})),
                error: None,
            })],
        )];
        let plan = resume_plan(&messages).unwrap();
        assert_eq!(plan.cursor.after_event_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn test_all_parts_in_flight_means_full_replay() {
        let messages = vec![assistant("m1", vec![Part::text_streaming("p1")])];
        let plan = resume_plan(&messages).unwrap();
        assert_eq!(plan.cursor.last_assistant_message_id, "m1");
        assert!(plan.cursor.after_event_id.is_none());
        assert_eq!(plan.base_parts.len(), 1);
    }

    #[test]
    fn test_zero_part_assistant_message_falls_back_to_previous() {
        let messages = vec![
            assistant("m1", vec![done_text("p1")]),
            assistant("m2", vec![]),
        ];
        let plan = resume_plan(&messages).unwrap();
        assert_eq!(plan.cursor.last_assistant_message_id, "m1");
    }

    #[test]
    fn test_no_assistant_message_yields_no_plan() {
        assert!(resume_plan(&[user("u1")]).is_none());
        assert!(resume_plan(&[]).is_none());
    }
}
