//! Session state machine.
//!
//! Drives the turn-by-turn protocol: issuing completion requests,
//! detecting requested tool calls, sequencing their execution, and
//! deciding when a turn is complete. Every operation leaves the session in
//! a state that can be snapshotted and resumed, including mid-batch tool
//! execution.

use crate::config::ChatConfig;
use crate::dispatch::{ToolDispatcher, ToolOutcome};
use crate::error::SessionError;
use crate::history::History;
use crate::store::{SessionSnapshot, ThreadStore};
use crate::turn::TurnRecord;
use serde::{Deserialize, Serialize};
use serde_json::json;
use taleweaver_ai::{
    ChatMessage, CompletionBackend, CompletionClient, CompletionRequest, TokenEstimator,
    TokenUsage, ToolCallRequest,
};
use taleweaver_core::{SessionId, TurnId};
use tracing::{debug, warn};

/// Hard per-turn ceiling on completion calls. Bounds pathological
/// tool-call loops regardless of what the caller configures; exceeding it
/// abandons the turn without contacting the service.
pub const HARD_CALL_CEILING: u32 = 8;

/// Where the session stands in the turn protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No turn is open.
    Idle,
    /// A completion request is about to be or has been issued.
    AwaitingCompletion,
    /// The last reply requested tool calls not yet all executed.
    ToolPending,
    /// The turn finished with a plain assistant reply.
    Done,
    /// The turn was abandoned (call ceiling exceeded).
    Failed,
}

impl SessionPhase {
    /// Returns true for the per-turn terminal phases.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Cumulative token usage across the session lifetime. Monotonic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Total prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Total completion tokens generated.
    pub completion_tokens: u64,
    /// Total tokens overall.
    pub total_tokens: u64,
}

impl UsageTotals {
    /// Folds one request's usage into the totals.
    pub fn track(&mut self, usage: &TokenUsage) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total_tokens);
    }
}

/// Persisted protocol counters for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Identifier of the in-progress turn. Regenerated on every start.
    pub turn_id: TurnId,
    /// Completion calls issued within the current turn.
    pub call_count: u32,
    /// Caller-supplied call ceiling used by the done check.
    pub call_limit: u32,
    /// True while a requested tool-call batch has unexecuted calls.
    pub tool_call_pending: bool,
    /// Index of the next call to execute within the pending batch.
    pub tool_call_index: usize,
    /// Protocol phase.
    pub phase: SessionPhase,
    /// Cumulative token usage.
    pub usage: UsageTotals,
}

impl SessionState {
    /// Creates a fresh idle state.
    #[must_use]
    pub fn new(call_limit: u32) -> Self {
        Self {
            turn_id: TurnId::new(),
            call_count: 0,
            call_limit,
            tool_call_pending: false,
            tool_call_index: 0,
            phase: SessionPhase::Idle,
            usage: UsageTotals::default(),
        }
    }
}

/// Input for starting a new turn.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    /// User prompt text.
    pub user_text: Option<String>,
    /// System/event text injected ahead of the user prompt.
    pub system_text: Option<String>,
    /// Forces the named tool on the first completion call of this turn.
    pub forced_tool: Option<String>,
}

impl TurnInput {
    /// Creates an input carrying a user prompt.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            user_text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Creates an input carrying a system event.
    #[must_use]
    pub fn system_event(text: impl Into<String>) -> Self {
        Self {
            system_text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Adds a system/event text.
    #[must_use]
    pub fn with_system_text(mut self, text: impl Into<String>) -> Self {
        self.system_text = Some(text.into());
        self
    }

    /// Forces a tool choice on the first completion call.
    #[must_use]
    pub fn with_forced_tool(mut self, name: impl Into<String>) -> Self {
        self.forced_tool = Some(name.into());
        self
    }
}

/// Whether a turn step ended normally or abandoned the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// The step completed normally.
    Ok,
    /// The turn was abandoned.
    Error,
}

/// Caller-facing view of the current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Identifier of the turn this view describes.
    pub turn_id: TurnId,
    /// True once the turn finished with a plain reply within limits.
    pub done: bool,
    /// First user-role content of the turn.
    pub user_text: String,
    /// First system-role content of the turn.
    pub system_text: String,
    /// Assistant free-text replies, blank-line joined.
    pub assistant_text: String,
    /// Tool annotations, comma-joined.
    pub annotation_text: String,
    /// The next tool awaiting execution, while a batch is pending.
    pub pending_tool: Option<String>,
    /// Step status.
    pub status: TurnStatus,
}

/// The conversation session driver.
///
/// Owns the retrying completion client, the tool dispatcher capability,
/// the token estimator, the history, and the protocol counters. One
/// session maps to one persisted record; callers serialize access per
/// session key.
pub struct ChatSession<B: CompletionBackend, D: ToolDispatcher> {
    client: CompletionClient<B>,
    dispatcher: D,
    estimator: Box<dyn TokenEstimator>,
    config: ChatConfig,
    history: History,
    state: SessionState,
}

impl<B: CompletionBackend, D: ToolDispatcher> ChatSession<B, D> {
    /// Creates an empty session.
    pub fn new(
        client: CompletionClient<B>,
        dispatcher: D,
        estimator: Box<dyn TokenEstimator>,
        config: ChatConfig,
    ) -> Self {
        let state = SessionState::new(config.call_limit);
        Self {
            client,
            dispatcher,
            estimator,
            config,
            history: History::new(),
            state,
        }
    }

    /// Rebuilds a session from a persisted snapshot.
    pub fn restore(
        snapshot: SessionSnapshot,
        client: CompletionClient<B>,
        dispatcher: D,
        estimator: Box<dyn TokenEstimator>,
        config: ChatConfig,
    ) -> Self {
        Self {
            client,
            dispatcher,
            estimator,
            config,
            history: snapshot.history,
            state: snapshot.state,
        }
    }

    /// Returns the conversation history.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Returns the history mutably, for continuity injection and
    /// archiver bookkeeping.
    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    /// Returns the protocol state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns cumulative token usage.
    #[must_use]
    pub fn usage(&self) -> UsageTotals {
        self.state.usage
    }

    /// Starts a new turn and performs its first completion step.
    ///
    /// Any incomplete predecessor turn is discarded. The forced tool
    /// choice, when present, applies only to this first call.
    ///
    /// # Errors
    ///
    /// Propagates completion-client failures once retries are exhausted;
    /// history is left without a partial reply in that case.
    pub async fn start(&mut self, input: TurnInput) -> Result<TurnOutcome, SessionError> {
        self.state.turn_id = TurnId::new();
        self.state.call_count = 0;
        self.state.tool_call_pending = false;
        self.state.tool_call_index = 0;
        self.state.phase = SessionPhase::AwaitingCompletion;
        self.dispatcher.clear_pending_changes();

        self.history.start_new_turn();
        let turn = self.history.current_turn_mut().ok_or(SessionError::NoOpenTurn)?;
        if let Some(text) = &input.system_text {
            turn.push_message(ChatMessage::system(text.clone()));
        }
        if let Some(text) = &input.user_text {
            turn.push_message(ChatMessage::user(text.clone()));
        }

        debug!(turn_id = %self.state.turn_id, "turn started");
        self.completion_step(input.forced_tool.as_deref()).await?;
        Ok(self.outcome())
    }

    /// Advances the turn by one step: executes the next pending tool call,
    /// or performs another completion step when no calls are pending.
    ///
    /// # Errors
    ///
    /// Propagates completion-client and bookkeeping failures. Tool
    /// execution failures are not errors here; they are fed back to the
    /// model as tool-response messages.
    pub async fn continue_turn(&mut self) -> Result<TurnOutcome, SessionError> {
        if self.state.phase == SessionPhase::Failed || self.turn_done() {
            return Ok(self.outcome());
        }
        if self.history.current_turn().is_none() {
            return Err(SessionError::NoOpenTurn);
        }

        if self.state.tool_call_pending {
            self.execute_pending_call().await?;
        } else {
            self.completion_step(None).await?;
        }
        Ok(self.outcome())
    }

    /// Repeatedly advances the turn until it is done, failed, or `limit`
    /// iterations have run. For non-interactive callers such as automated
    /// event injection.
    ///
    /// # Errors
    ///
    /// Propagates the first failure from [`Self::continue_turn`].
    pub async fn run_until_done(&mut self, limit: u32) -> Result<TurnOutcome, SessionError> {
        let mut outcome = self.outcome();
        for _ in 0..limit {
            if outcome.done || outcome.status == TurnStatus::Error {
                break;
            }
            outcome = self.continue_turn().await?;
        }
        Ok(outcome)
    }

    /// Builds the caller-facing view of the current turn.
    #[must_use]
    pub fn outcome(&self) -> TurnOutcome {
        let content = self
            .history
            .current_turn()
            .map(TurnRecord::extract_content)
            .unwrap_or_default();

        let pending_tool = if self.state.tool_call_pending {
            self.pending_batch()
                .and_then(|batch| batch.get(self.state.tool_call_index))
                .map(|call| call.name.clone())
        } else {
            None
        };

        let status = if self.state.phase == SessionPhase::Failed {
            TurnStatus::Error
        } else {
            TurnStatus::Ok
        };

        TurnOutcome {
            turn_id: self.state.turn_id,
            done: self.turn_done(),
            user_text: content.user_text,
            system_text: content.system_text,
            assistant_text: content.assistant_text,
            annotation_text: content.annotation_text,
            pending_tool,
            status,
        }
    }

    /// Takes a point-in-time snapshot of the persisted state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::new(self.history.clone(), self.state.clone())
    }

    /// Saves the session blob under `key`.
    ///
    /// # Errors
    ///
    /// Propagates encoding and store failures.
    pub async fn save_to<S: ThreadStore>(
        &self,
        store: &S,
        key: &SessionId,
    ) -> Result<(), SessionError> {
        let blob = self.snapshot().to_bytes()?;
        store.save(key, &blob).await?;
        Ok(())
    }

    /// Loads the blob under `key` and rebuilds the session from it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SnapshotMissing`] when no blob exists, and
    /// propagates corrupt-blob decode failures unrecovered.
    pub async fn resume_from<S: ThreadStore>(
        store: &S,
        key: &SessionId,
        client: CompletionClient<B>,
        dispatcher: D,
        estimator: Box<dyn TokenEstimator>,
        config: ChatConfig,
    ) -> Result<Self, SessionError> {
        let blob = store
            .load(key)
            .await?
            .ok_or(SessionError::SnapshotMissing { key: *key })?;
        let snapshot = SessionSnapshot::from_bytes(&blob)?;
        Ok(Self::restore(snapshot, client, dispatcher, estimator, config))
    }

    /// Done means: no tool calls pending, the call count is within the
    /// caller-supplied limit, and the turn ends in a plain reply. The
    /// limit comparison is deliberately distinct from the hard ceiling
    /// check; the two bounds are independent.
    fn turn_done(&self) -> bool {
        !self.state.tool_call_pending
            && self.state.call_count < self.state.call_limit
            && self
                .history
                .current_turn()
                .is_some_and(TurnRecord::is_complete)
    }

    /// One network round-trip: budget-select history, assemble the prompt,
    /// call the service, and fold the reply into the current turn.
    async fn completion_step(&mut self, forced_tool: Option<&str>) -> Result<(), SessionError> {
        self.state.call_count += 1;
        if self.state.call_count > HARD_CALL_CEILING {
            warn!(
                turn_id = %self.state.turn_id,
                call_count = self.state.call_count,
                "call ceiling exceeded, abandoning turn"
            );
            self.state.phase = SessionPhase::Failed;
            return Ok(());
        }

        // Instructions and tool set are re-evaluated every step; both may
        // change as the dispatcher's application state changes. At the
        // ceiling the tools are withheld to force a final answer.
        self.history.set_system_prompt(self.dispatcher.instructions());
        let tools = if self.state.call_count >= HARD_CALL_CEILING {
            Vec::new()
        } else {
            self.dispatcher.available_tools()
        };
        self.history.set_tool_schedule(&tools, self.estimator.as_ref());

        self.history
            .select_for_budget(self.estimator.as_ref(), self.config.token_budget);
        let messages = self.history.build_prompt_messages();

        let mut request = CompletionRequest::new(messages).with_tools(tools);
        if let Some(name) = forced_tool {
            request = request.with_tool_choice(name);
        }

        let response = self.client.complete(&request).await?;
        if let Some(usage) = &response.usage {
            self.state.usage.track(usage);
        }

        let requested_calls = response.message.tool_calls.len();
        let turn = self.history.current_turn_mut().ok_or(SessionError::NoOpenTurn)?;
        turn.push_message(response.message);

        if requested_calls > 0 {
            debug!(
                turn_id = %self.state.turn_id,
                call_count = self.state.call_count,
                requested_calls,
                "assistant requested tool calls"
            );
            self.state.tool_call_pending = true;
            self.state.tool_call_index = 0;
            self.state.phase = SessionPhase::ToolPending;
        } else if self.turn_done() {
            self.state.phase = SessionPhase::Done;
        } else {
            self.state.phase = SessionPhase::AwaitingCompletion;
        }

        Ok(())
    }

    /// Executes the tool call at the pending index and appends its
    /// response to the turn. Malformed arguments and dispatcher failures
    /// become error-payload tool responses so the model can self-correct.
    async fn execute_pending_call(&mut self) -> Result<(), SessionError> {
        let index = self.state.tool_call_index;
        let (call, batch_len) = {
            let batch = self
                .pending_batch()
                .ok_or(SessionError::PendingCallMissing { index })?;
            let call = batch
                .get(index)
                .cloned()
                .ok_or(SessionError::PendingCallMissing { index })?;
            (call, batch.len())
        };

        // Bookkeeping happens before execution so a snapshot taken after
        // a tool ran never re-executes it on resume.
        self.state.tool_call_index += 1;
        if self.state.tool_call_index >= batch_len {
            self.state.tool_call_pending = false;
            self.state.phase = SessionPhase::AwaitingCompletion;
        }

        debug!(
            turn_id = %self.state.turn_id,
            tool = %call.name,
            index,
            batch_len,
            "executing tool call"
        );

        let (payload, note) = match call.decode_arguments() {
            Ok(args) => match self.dispatcher.execute(&call.name, &args).await {
                Ok(ToolOutcome::Payload(response)) => (response, None),
                Ok(ToolOutcome::Annotated {
                    response,
                    status_text,
                }) => (response, Some(status_text)),
                Err(error) => {
                    warn!(tool = %call.name, error = %error, "tool execution failed");
                    (json!({ "error": error.to_string() }), None)
                }
            },
            Err(error) => {
                warn!(tool = %call.name, error = %error, "malformed tool arguments");
                (
                    json!({ "error": format!("invalid tool arguments: {error}") }),
                    None,
                )
            }
        };

        let message = ChatMessage::tool_response(&call.id, &call.name, &payload);
        let turn = self.history.current_turn_mut().ok_or(SessionError::NoOpenTurn)?;
        match note {
            Some(note) => turn.push_message_annotated(message, note),
            None => turn.push_message(message),
        }

        Ok(())
    }

    /// The tool-call batch of the last assistant message, if any.
    fn pending_batch(&self) -> Option<&[ToolCallRequest]> {
        self.history
            .current_turn()?
            .messages
            .iter()
            .rev()
            .find(|m| m.has_tool_calls())
            .map(|m| m.tool_calls.as_slice())
    }
}
