//! Conversation history with token-budgeted selection.
//!
//! History holds the chronological turn list plus the transient prompt
//! scaffolding: the live system instruction and the cached cost of the
//! advertised tool schedule. Selection walks turns newest to oldest and
//! greedily includes whatever fits under the budget; recency always wins
//! over cramming in older content.

use crate::turn::TurnRecord;
use serde::{Deserialize, Serialize};
use taleweaver_ai::estimate::{MESSAGE_OVERHEAD_TOKENS, REQUEST_OVERHEAD_TOKENS};
use taleweaver_ai::{ChatMessage, TokenEstimator, ToolSchema};
use tracing::debug;

/// Ordered conversation history for one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    /// Turns in chronological order, never reordered.
    turns: Vec<TurnRecord>,
    /// The live system instruction. Replaced wholesale on every prompt
    /// build and recomputed from the dispatcher after a load, so it is
    /// never persisted.
    #[serde(skip)]
    system_prompt: Option<String>,
    /// Cached token cost of the advertised tool schedule. Recomputed
    /// whenever the tool set changes.
    #[serde(skip)]
    tool_schedule_cost: u32,
    /// Plain request/reply pairs injected ahead of live turns to preserve
    /// context across turns archived elsewhere. Append-only.
    #[serde(default)]
    continuity: Vec<ChatMessage>,
}

impl History {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new empty turn.
    ///
    /// If the current turn exists and is incomplete it is discarded first:
    /// an exchange interrupted mid tool-call loop is treated as having
    /// never happened rather than persisted half-finished.
    pub fn start_new_turn(&mut self) {
        if let Some(last) = self.turns.last()
            && !last.is_complete()
        {
            debug!(
                messages = last.messages.len(),
                "discarding incomplete trailing turn"
            );
            self.turns.pop();
        }
        self.turns.push(TurnRecord::new());
    }

    /// Replaces the live system instruction.
    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        self.system_prompt = Some(text.into());
    }

    /// Returns the live system instruction.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Recomputes the cached advertisement cost for the current tool set.
    pub fn set_tool_schedule(&mut self, tools: &[ToolSchema], estimator: &dyn TokenEstimator) {
        self.tool_schedule_cost = tools
            .iter()
            .map(|tool| tool.advertisement_cost(estimator))
            .sum();
    }

    /// Returns the cached tool-schedule cost.
    #[must_use]
    pub fn tool_schedule_cost(&self) -> u32 {
        self.tool_schedule_cost
    }

    /// Resets every turn's inclusion mark.
    pub fn clear_included(&mut self) {
        for turn in &mut self.turns {
            turn.included = false;
        }
    }

    /// Fixed prompt cost independent of turn selection: request overhead,
    /// the system prompt as a framed message, and the tool schedule.
    fn base_token_count(&self, estimator: &dyn TokenEstimator) -> u32 {
        let system_cost = self
            .system_prompt
            .as_deref()
            .map_or(0, |text| MESSAGE_OVERHEAD_TOKENS + estimator.estimate(text));
        REQUEST_OVERHEAD_TOKENS + system_cost + self.tool_schedule_cost
    }

    /// Total cost of the prompt as currently selected: exactly the turns
    /// marked included, plus system prompt, tool schedule, and the fixed
    /// per-request overhead.
    #[must_use]
    pub fn budgeted_token_count(&self, estimator: &dyn TokenEstimator) -> u32 {
        self.base_token_count(estimator)
            + self
                .turns
                .iter()
                .filter(|turn| turn.included)
                .map(|turn| turn.token_cost(estimator))
                .sum::<u32>()
    }

    /// Greedy most-recent-first selection under `budget_tokens`.
    ///
    /// Walks turns newest to oldest, accepting each non-archived turn only
    /// while the cumulative cost stays strictly below the budget, and
    /// stops at the first turn that would overflow. Overflow is silent
    /// truncation of older turns, never an error.
    pub fn select_for_budget(&mut self, estimator: &dyn TokenEstimator, budget_tokens: u32) {
        self.clear_included();

        let mut running = self.base_token_count(estimator);
        let mut selected = 0_usize;

        for turn in self.turns.iter_mut().rev() {
            if turn.archived {
                continue;
            }
            let candidate = running + turn.token_cost(estimator);
            if candidate >= budget_tokens {
                break;
            }
            turn.included = true;
            running = candidate;
            selected += 1;
        }

        debug!(
            selected,
            total = self.turns.len(),
            tokens = running,
            budget = budget_tokens,
            "selected turns for prompt"
        );
    }

    /// Appends one continuity request/reply pair.
    pub fn push_continuity_pair(
        &mut self,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
    ) {
        self.continuity.push(ChatMessage::user(user_text));
        self.continuity.push(ChatMessage::assistant(assistant_text));
    }

    /// Returns the continuity messages in insertion order.
    #[must_use]
    pub fn continuity(&self) -> &[ChatMessage] {
        &self.continuity
    }

    /// Emits the exact message list for the next completion request:
    /// system prompt, then continuity pairs, then every included turn's
    /// messages in chronological order. Annotations are stripped.
    #[must_use]
    pub fn build_prompt_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::new();

        if let Some(text) = &self.system_prompt {
            messages.push(ChatMessage::system(text.clone()));
        }

        messages.extend(self.continuity.iter().map(ChatMessage::for_wire));

        for turn in self.turns.iter().filter(|turn| turn.included) {
            messages.extend(turn.messages.iter().map(ChatMessage::for_wire));
        }

        messages
    }

    /// Returns the current (last) turn.
    #[must_use]
    pub fn current_turn(&self) -> Option<&TurnRecord> {
        self.turns.last()
    }

    /// Returns the current (last) turn mutably.
    pub fn current_turn_mut(&mut self) -> Option<&mut TurnRecord> {
        self.turns.last_mut()
    }

    /// Returns all turns in chronological order.
    #[must_use]
    pub fn turns(&self) -> &[TurnRecord] {
        &self.turns
    }

    /// Returns the number of turns.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taleweaver_ai::schema::{ParameterKind, ToolParameter};
    use taleweaver_ai::{CharEstimator, ChatRole, ToolCallRequest};

    fn complete_turn(user: &str, reply: &str) -> TurnRecord {
        let mut turn = TurnRecord::new();
        turn.push_message(ChatMessage::user(user));
        turn.push_message(ChatMessage::assistant(reply));
        turn
    }

    fn push_complete_turn(history: &mut History, user: &str, reply: &str) {
        history.start_new_turn();
        let turn = history.current_turn_mut().expect("open turn");
        turn.push_message(ChatMessage::user(user));
        turn.push_message(ChatMessage::assistant(reply));
    }

    #[test]
    fn start_new_turn_keeps_complete_predecessor() {
        let mut history = History::new();
        push_complete_turn(&mut history, "Hello", "Well met, traveler.");
        history.start_new_turn();

        assert_eq!(history.turn_count(), 2);
        assert!(history.turns()[0].is_complete());
    }

    #[test]
    fn start_new_turn_discards_incomplete_predecessor() {
        let mut history = History::new();
        push_complete_turn(&mut history, "Hello", "Well met.");

        // Leave a turn hanging mid tool-call loop.
        history.start_new_turn();
        let turn = history.current_turn_mut().expect("open turn");
        turn.push_message(ChatMessage::user("Forge a sword"));
        turn.push_message(
            ChatMessage::assistant("")
                .with_tool_call(ToolCallRequest::new("call_1", "create_item", "{}")),
        );
        assert_eq!(history.turn_count(), 2);

        history.start_new_turn();

        // The hanging turn is gone; the complete one survives.
        assert_eq!(history.turn_count(), 2);
        assert!(history.turns()[0].is_complete());
        assert!(history.turns()[1].messages.is_empty());
    }

    #[test]
    fn selection_prefers_recent_turns() {
        let mut history = History::new();
        for i in 0..6 {
            push_complete_turn(
                &mut history,
                &format!("Tell me about chapter {i} of the saga in detail"),
                &format!("Chapter {i} covers the long march through the hills."),
            );
        }

        let full_cost = complete_turn(
            "Tell me about chapter 0 of the saga in detail",
            "Chapter 0 covers the long march through the hills.",
        )
        .token_cost(&CharEstimator);

        // Room for roughly two turns beyond the fixed overhead.
        let budget = REQUEST_OVERHEAD_TOKENS + full_cost * 2 + 1;
        history.select_for_budget(&CharEstimator, budget);

        let included: Vec<bool> = history.turns().iter().map(|t| t.included).collect();
        assert_eq!(included, vec![false, false, false, false, true, true]);
    }

    #[test]
    fn most_recent_turn_included_when_it_fits_alone() {
        let mut history = History::new();
        push_complete_turn(&mut history, "Hi", "Hello!");

        let cost = history.turns()[0].token_cost(&CharEstimator);
        history.select_for_budget(&CharEstimator, REQUEST_OVERHEAD_TOKENS + cost + 1);

        assert!(history.turns()[0].included);
    }

    #[test]
    fn selection_is_strictly_below_budget() {
        let mut history = History::new();
        push_complete_turn(&mut history, "Hi", "Hello!");

        let cost = history.turns()[0].token_cost(&CharEstimator);
        // Exactly equal to the budget must not be accepted.
        history.select_for_budget(&CharEstimator, REQUEST_OVERHEAD_TOKENS + cost);

        assert!(!history.turns()[0].included);
    }

    #[test]
    fn archived_turns_are_never_candidates() {
        let mut history = History::new();
        push_complete_turn(&mut history, "Old business", "Long since settled.");
        push_complete_turn(&mut history, "New business", "At hand.");
        history.current_turn_mut().expect("turn").archived = false;
        history.turns.first_mut().expect("turn").archived = true;

        history.select_for_budget(&CharEstimator, 10_000);

        assert!(!history.turns()[0].included);
        assert!(history.turns()[1].included);
    }

    #[test]
    fn budgeted_count_matches_invariant() {
        let mut history = History::new();
        history.set_system_prompt("Narrate the story");
        push_complete_turn(&mut history, "Begin", "It was a dark night.");
        push_complete_turn(&mut history, "Continue", "Thunder rolled.");

        let tools = vec![
            ToolSchema::new("codex_lookup", "Search the story codex").with_parameter(
                ToolParameter::new("query", ParameterKind::String, "Search terms").required(),
            ),
        ];
        history.set_tool_schedule(&tools, &CharEstimator);
        history.select_for_budget(&CharEstimator, 10_000);

        let expected = REQUEST_OVERHEAD_TOKENS
            + MESSAGE_OVERHEAD_TOKENS
            + CharEstimator.estimate("Narrate the story")
            + history.tool_schedule_cost()
            + history.turns()[0].token_cost(&CharEstimator)
            + history.turns()[1].token_cost(&CharEstimator);

        assert_eq!(history.budgeted_token_count(&CharEstimator), expected);
    }

    #[test]
    fn tool_schedule_cost_tracks_tool_set() {
        let mut history = History::new();
        assert_eq!(history.tool_schedule_cost(), 0);

        let tools = vec![ToolSchema::new("generate_scene", "Render the scene")];
        history.set_tool_schedule(&tools, &CharEstimator);
        assert_eq!(
            history.tool_schedule_cost(),
            tools[0].advertisement_cost(&CharEstimator)
        );

        history.set_tool_schedule(&[], &CharEstimator);
        assert_eq!(history.tool_schedule_cost(), 0);
    }

    #[test]
    fn prompt_message_order() {
        let mut history = History::new();
        history.set_system_prompt("Narrate the story");
        history.push_continuity_pair("Earlier we met Mira.", "Mira, the smith of Eldoria.");
        push_complete_turn(&mut history, "Where is Mira now?", "At her forge.");
        history.select_for_budget(&CharEstimator, 10_000);

        let messages = history.build_prompt_messages();
        let roles: Vec<ChatRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User,
                ChatRole::Assistant,
            ]
        );
        assert_eq!(messages[1].content, "Earlier we met Mira.");
        assert_eq!(messages[3].content, "Where is Mira now?");
    }

    #[test]
    fn prompt_messages_strip_annotations() {
        let mut history = History::new();
        history.start_new_turn();
        let turn = history.current_turn_mut().expect("open turn");
        turn.push_message(ChatMessage::user("Forge it."));
        turn.push_message_annotated(
            ChatMessage::tool_response("call_1", "create_item", &json!({"created": true})),
            "Forged the Sunblade.",
        );
        turn.push_message(ChatMessage::assistant("Done."));
        history.select_for_budget(&CharEstimator, 10_000);

        let messages = history.build_prompt_messages();
        assert!(messages.iter().all(|m| m.annotation.is_none()));
    }

    #[test]
    fn serde_roundtrip_is_lossless_for_persisted_fields() {
        let mut history = History::new();
        history.set_system_prompt("Not persisted");
        history.push_continuity_pair("Earlier", "Indeed");
        push_complete_turn(&mut history, "One", "First reply");
        push_complete_turn(&mut history, "Two", "Second reply");
        history.turns.first_mut().expect("turn").archived = true;
        history.select_for_budget(&CharEstimator, 10_000);

        let encoded = serde_json::to_string(&history).expect("serialize");
        let parsed: History = serde_json::from_str(&encoded).expect("deserialize");

        assert_eq!(parsed.turn_count(), 2);
        assert_eq!(parsed.turns()[0].messages, history.turns()[0].messages);
        assert_eq!(parsed.turns()[1].messages, history.turns()[1].messages);
        assert!(parsed.turns()[0].archived);
        assert!(!parsed.turns()[1].archived);
        assert_eq!(parsed.continuity().len(), 2);
        // Transient fields reset on load.
        assert!(parsed.system_prompt().is_none());
        assert_eq!(parsed.tool_schedule_cost(), 0);
        assert!(parsed.turns().iter().all(|t| !t.included));
    }
}
