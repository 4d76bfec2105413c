//! Turn records.
//!
//! A turn is the atomic unit of one logical exchange: a user or system
//! prompt, zero or more tool-call/tool-response pairs, and a final plain
//! assistant reply. Message order is append-only and reconstructs exactly
//! what was sent and received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use taleweaver_ai::{ChatMessage, ChatRole, TokenEstimator};

/// One logical protocol exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Raw protocol messages in exchange order.
    pub messages: Vec<ChatMessage>,
    /// Budget-selection mark. Recomputed on every prompt build, never
    /// persisted.
    #[serde(skip)]
    pub included: bool,
    /// Set by an external archiver once this turn has been summarized
    /// into long-term storage. Archived turns are never prompt candidates.
    #[serde(default)]
    pub archived: bool,
    /// When this turn was opened.
    pub started_at: DateTime<Utc>,
}

/// Derived view of a turn for callers, without raw protocol messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnContent {
    /// Content of the first user-role message.
    pub user_text: String,
    /// Content of the first system-role message.
    pub system_text: String,
    /// Assistant free-text replies, joined by a blank line.
    pub assistant_text: String,
    /// All annotations, comma-joined.
    pub annotation_text: String,
}

impl TurnRecord {
    /// Creates an empty turn.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            included: false,
            archived: false,
            started_at: Utc::now(),
        }
    }

    /// Appends a message.
    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Appends a message carrying a human-readable annotation. The note is
    /// stored on the message but excluded from token accounting and from
    /// the wire.
    pub fn push_message_annotated(&mut self, mut message: ChatMessage, note: impl Into<String>) {
        message.annotation = Some(note.into());
        self.messages.push(message);
    }

    /// Sums the token cost of every message in this turn.
    #[must_use]
    pub fn token_cost(&self, estimator: &dyn TokenEstimator) -> u32 {
        self.messages
            .iter()
            .map(|message| message.token_cost(estimator))
            .sum()
    }

    /// Returns true iff the last message is an assistant message carrying
    /// no tool-call request. An incomplete turn still open when the next
    /// one starts is discarded, never persisted as-is into a prompt.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == ChatRole::Assistant && !m.has_tool_calls())
    }

    /// Returns true if any tool-call request in this turn names `name` and
    /// its decoded arguments are a superset of `partial_args`: every key
    /// in `partial_args` present with an equal value, extra keys ignored.
    /// Undecodable arguments never match.
    #[must_use]
    pub fn has_tool_call_matching(&self, name: &str, partial_args: &JsonValue) -> bool {
        self.messages
            .iter()
            .flat_map(|message| message.tool_calls.iter())
            .filter(|call| call.name == name)
            .any(|call| match call.decode_arguments() {
                Ok(args) => arguments_match(&args, partial_args),
                Err(_) => false,
            })
    }

    /// Derives the caller-facing four-field view of this turn.
    #[must_use]
    pub fn extract_content(&self) -> TurnContent {
        let user_text = self
            .messages
            .iter()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let system_text = self
            .messages
            .iter()
            .find(|m| m.role == ChatRole::System)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let assistant_text = self
            .messages
            .iter()
            .filter(|m| m.role == ChatRole::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let annotation_text = self
            .messages
            .iter()
            .filter_map(|m| m.annotation.as_deref())
            .collect::<Vec<_>>()
            .join(", ");

        TurnContent {
            user_text,
            system_text,
            assistant_text,
            annotation_text,
        }
    }
}

impl Default for TurnRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Superset match: every entry of `partial` must be present in `actual`
/// with an equal value. A non-object `partial` must equal `actual` whole.
fn arguments_match(actual: &JsonValue, partial: &JsonValue) -> bool {
    match (actual, partial) {
        (JsonValue::Object(actual_map), JsonValue::Object(partial_map)) => partial_map
            .iter()
            .all(|(key, value)| actual_map.get(key) == Some(value)),
        _ => actual == partial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taleweaver_ai::{CharEstimator, ToolCallRequest};

    fn tool_call_turn() -> TurnRecord {
        let mut turn = TurnRecord::new();
        turn.push_message(ChatMessage::user("Forge a sword for Mira."));
        turn.push_message(ChatMessage::assistant("").with_tool_call(ToolCallRequest::new(
            "call_1",
            "create_item",
            r#"{"name":"Sunblade","owner":"Mira"}"#,
        )));
        turn.push_message_annotated(
            ChatMessage::tool_response("call_1", "create_item", &json!({"created": true})),
            "Forged the Sunblade.",
        );
        turn.push_message(ChatMessage::assistant("The Sunblade is forged."));
        turn
    }

    #[test]
    fn system_only_turn_cost() {
        let mut turn = TurnRecord::new();
        turn.push_message(ChatMessage::system("You are a helpful storytelling guide"));
        // 4 framing overhead + 9 for the 36-char text
        assert_eq!(turn.token_cost(&CharEstimator), 13);
    }

    #[test]
    fn completeness_requires_plain_assistant_tail() {
        let mut turn = TurnRecord::new();
        assert!(!turn.is_complete());

        turn.push_message(ChatMessage::user("Hello"));
        assert!(!turn.is_complete());

        turn.push_message(
            ChatMessage::assistant("")
                .with_tool_call(ToolCallRequest::new("call_1", "codex_lookup", "{}")),
        );
        assert!(!turn.is_complete());

        turn.push_message(ChatMessage::tool_response(
            "call_1",
            "codex_lookup",
            &json!({"hits": []}),
        ));
        assert!(!turn.is_complete());

        turn.push_message(ChatMessage::assistant("Nothing in the codex."));
        assert!(turn.is_complete());
    }

    #[test]
    fn tool_call_superset_match() {
        let turn = tool_call_turn();

        assert!(turn.has_tool_call_matching("create_item", &json!({"owner": "Mira"})));
        assert!(turn.has_tool_call_matching(
            "create_item",
            &json!({"name": "Sunblade", "owner": "Mira"})
        ));
        // Extra keys in the actual call are ignored; mismatched values are not.
        assert!(!turn.has_tool_call_matching("create_item", &json!({"owner": "Talia"})));
        assert!(!turn.has_tool_call_matching("create_world", &json!({"owner": "Mira"})));
    }

    #[test]
    fn undecodable_arguments_never_match() {
        let mut turn = TurnRecord::new();
        turn.push_message(
            ChatMessage::assistant("")
                .with_tool_call(ToolCallRequest::new("call_1", "create_item", "{broken")),
        );
        assert!(!turn.has_tool_call_matching("create_item", &json!({})));
    }

    #[test]
    fn extract_content_view() {
        let mut turn = tool_call_turn();
        turn.push_message(ChatMessage::assistant("It hums with light."));

        let content = turn.extract_content();
        assert_eq!(content.user_text, "Forge a sword for Mira.");
        assert_eq!(content.system_text, "");
        // Empty-content tool-call request messages are skipped.
        assert_eq!(
            content.assistant_text,
            "The Sunblade is forged.\n\nIt hums with light."
        );
        assert_eq!(content.annotation_text, "Forged the Sunblade.");
    }

    #[test]
    fn serde_roundtrip_preserves_messages_and_archived() {
        let mut turn = tool_call_turn();
        turn.archived = true;
        turn.included = true;

        let encoded = serde_json::to_string(&turn).expect("serialize");
        let parsed: TurnRecord = serde_json::from_str(&encoded).expect("deserialize");

        assert_eq!(parsed.messages, turn.messages);
        assert!(parsed.archived);
        // The selection mark is transient.
        assert!(!parsed.included);
        // The annotation folds back onto its owning message.
        assert_eq!(
            parsed.messages[2].annotation.as_deref(),
            Some("Forged the Sunblade.")
        );
    }

    #[test]
    fn chained_tool_call_cost_regression() {
        struct UnitEstimator;
        impl TokenEstimator for UnitEstimator {
            fn estimate(&self, _text: &str) -> u32 {
                1
            }
        }

        let mut turn = TurnRecord::new();
        turn.push_message(ChatMessage::user("Chart the northern road."));
        turn.push_message(ChatMessage::assistant("").with_tool_call(ToolCallRequest::new(
            "call_1",
            "codex_lookup",
            r#"{"query":"northern road"}"#,
        )));
        turn.push_message(ChatMessage::tool_response(
            "call_1",
            "codex_lookup",
            &json!({"hits": ["old map"]}),
        ));
        turn.push_message(ChatMessage::assistant("").with_tool_call(ToolCallRequest::new(
            "call_2",
            "describe_world",
            r#"{"region":{"name":"north"}}"#,
        )));
        turn.push_message(ChatMessage::tool_response(
            "call_2",
            "describe_world",
            &json!({"summary": "frozen passes"}),
        ));
        turn.push_message(ChatMessage::assistant("").with_tool_call(ToolCallRequest::new(
            "call_3",
            "create_item",
            "{}",
        )));
        turn.push_message(ChatMessage::tool_response(
            "call_3",
            "create_item",
            &json!({"created": true}),
        ));
        turn.push_message(ChatMessage::assistant("The road is charted."));

        // user: 4 + 1
        // call 1: 4 + name 1 + (key 1 + value 1)
        // response 1: 4 + tool_name 1 + (key 1 + array string 1)
        // call 2: 4 + name 1 + (key 1 + nested key 1 + value 1)
        // response 2: 4 + tool_name 1 + (key 1 + value 1)
        // call 3: 4 + name 1 + empty object 0
        // response 3: 4 + tool_name 1 + (key 1 + bool 0)
        // final reply: 4 + 1
        assert_eq!(turn.token_cost(&UnitEstimator), 5 + 7 + 7 + 8 + 7 + 5 + 6 + 5);
    }

    #[test]
    fn token_cost_deterministic_and_annotation_free() {
        let turn = tool_call_turn();
        let mut unannotated = turn.clone();
        for message in &mut unannotated.messages {
            message.annotation = None;
        }

        assert_eq!(
            turn.token_cost(&CharEstimator),
            unannotated.token_cost(&CharEstimator)
        );
        assert_eq!(
            turn.token_cost(&CharEstimator),
            turn.token_cost(&CharEstimator)
        );
    }
}
