//! The generation session: one user turn in, one committed exchange out.
//!
//! Phases: `Idle → Prompting → Generating → {Committed | Failed}`. A run
//! holds the conversation lock from prompting until it commits or fails,
//! so a second run on the same conversation is rejected as busy instead of
//! interleaving. If the model is not ready the run fails before prompting.
//!
//! Streaming runs relay raw chunks as they arrive and buffer them; the
//! buffer is sanitized and committed only after the generator finishes.
//! Dropping the stream cancels the run and commits nothing.

use std::sync::Arc;

use rustscout_config::{AppConfig, BudgetUnit, ConfigError, PromptsConfig};
use rustscout_core::{
    GenerationError, GenerationRequest, Generator, Mode, RetrievedContext, SamplingParams, Turn,
    truncate_at_stop,
};
use tokio::sync::{OwnedMutexGuard, mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::context::token;
use crate::context::{
    BudgetOutcome, ContextBlock, ContextBudgeter, PromptAssembler, PromptBudget, PromptTemplate,
};
use crate::conversation::{ConversationState, SharedConversation};
use crate::sanitizer::ResponseSanitizer;
use crate::stream_event::{GenerationResult, SessionEvent};

const SYSTEM_BLOCK: &str = "system";
const CONTEXT_BLOCK: &str = "context";
const USER_BLOCK: &str = "user";

/// Separates the user's text from merged context
const CONTEXT_LABEL: &str = "\n\n**Context:**\n";

const CONTEXT_PRIORITY: u8 = 10;
/// Oldest history turn; newer turns rank higher.
const HISTORY_PRIORITY: u8 = 100;

const EVENT_BUFFER: usize = 64;

fn history_block(index: usize) -> String {
    format!("history:{index}")
}

/// Where a session is in its lifecycle. Terminal phases stay visible until
/// the next run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Prompting,
    Generating,
    Committed,
    Failed,
}

/// Tunables for prompt construction and generation.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Most recent turns offered to the budgeter
    pub history_window: usize,
    /// Context window of the model, in tokens
    pub n_ctx: usize,
    pub sampling: SamplingParams,
    pub template: PromptTemplate,
    pub budget_unit: BudgetUnit,
    pub min_truncated_chars: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            history_window: 6,
            n_ctx: 2048,
            sampling: SamplingParams::default(),
            template: PromptTemplate::default(),
            budget_unit: BudgetUnit::default(),
            min_truncated_chars: crate::context::budget::DEFAULT_MIN_TRUNCATED_CHARS,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let template = config
            .model
            .template
            .parse::<PromptTemplate>()
            .map_err(ConfigError::ValidationError)?;
        Ok(Self {
            history_window: config.conversation.history_window,
            n_ctx: config.llm.n_ctx,
            sampling: config.llm.sampling(),
            template,
            budget_unit: config.conversation.budget_unit,
            min_truncated_chars: config.conversation.min_truncated_chars,
        })
    }
}

/// One user turn submitted to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct UserTurn {
    /// What the user said; this is what history records
    pub text: String,
    /// Retrieved material merged into the prompt for this turn only
    pub context: Option<RetrievedContext>,
    /// Switch the conversation to this mode before prompting
    pub mode: Option<Mode>,
}

impl UserTurn {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
            mode: None,
        }
    }

    pub fn with_context(mut self, context: RetrievedContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn in_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }
}

fn merge_context(user_text: &str, context: Option<&str>) -> String {
    match context {
        Some(context) => format!("{user_text}{CONTEXT_LABEL}{context}"),
        None => user_text.to_string(),
    }
}

/// Runs generations against one conversation.
///
/// Cheap to clone; clones share the conversation, the generator and the
/// phase and mode channels.
#[derive(Clone)]
pub struct GenerationSession {
    generator: Arc<dyn Generator>,
    conversation: SharedConversation,
    sanitizer: Arc<ResponseSanitizer>,
    prompts: Arc<PromptsConfig>,
    settings: Arc<SessionSettings>,
    phase: Arc<watch::Sender<SessionPhase>>,
    /// Mirror of the conversation's mode, readable while a run holds the lock.
    mode: Arc<watch::Sender<Mode>>,
}

impl GenerationSession {
    pub fn new(
        generator: Arc<dyn Generator>,
        conversation: SharedConversation,
        settings: SessionSettings,
        prompts: PromptsConfig,
        sanitizer: ResponseSanitizer,
    ) -> Self {
        let (phase, _) = watch::channel(SessionPhase::Idle);
        let initial = conversation
            .try_lock()
            .map(|state| state.mode())
            .unwrap_or_default();
        let (mode, _) = watch::channel(initial);
        Self {
            generator,
            conversation,
            sanitizer: Arc::new(sanitizer),
            prompts: Arc::new(prompts),
            settings: Arc::new(settings),
            phase: Arc::new(phase),
            mode: Arc::new(mode),
        }
    }

    pub fn from_config(
        generator: Arc<dyn Generator>,
        conversation: SharedConversation,
        config: &AppConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            generator,
            conversation,
            SessionSettings::from_config(config)?,
            config.prompts.clone(),
            ResponseSanitizer::from_config(&config.sanitizer)?,
        ))
    }

    pub fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Observe phase changes.
    pub fn phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    /// The conversation's current mode. Never waits on a running generation.
    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    /// Switch the mode of a locked conversation and publish it.
    pub fn switch_mode(&self, state: &mut ConversationState, mode: Mode) {
        state.set_mode(mode);
        self.mode.send_replace(mode);
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.phase.send_replace(phase);
    }

    /// Generate a full reply, then sanitize and commit it.
    pub async fn run(&self, turn: UserTurn) -> Result<GenerationResult, GenerationError> {
        let mut state = self.begin().await?;
        let request = self.prepare(&mut state, &turn);
        let stops = request.stop.clone();

        self.set_phase(SessionPhase::Generating);
        match self.generator.generate(request).await {
            Ok(mut raw) => {
                truncate_at_stop(&mut raw, &stops);
                self.commit(&mut state, &turn.text, raw)
            }
            Err(e) => Err(self.fail(&state, e)),
        }
    }

    /// Stream a reply. Chunks are relayed in order, at most once; the
    /// stream ends with exactly one `Done` or `Error` event.
    pub async fn run_stream(&self, turn: UserTurn) -> ReceiverStream<SessionEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        match self.begin().await {
            Ok(state) => {
                let this = self.clone();
                tokio::spawn(async move {
                    // The conversation lock is released before the terminal
                    // event is sent.
                    if let Some(event) = this.drive_stream(state, turn, &tx).await {
                        let _ = tx.send(event).await;
                    }
                });
            }
            Err(e) => {
                let _ = tx.try_send(SessionEvent::error(&e));
            }
        }
        ReceiverStream::new(rx)
    }

    async fn begin(&self) -> Result<OwnedMutexGuard<ConversationState>, GenerationError> {
        let state = self.conversation.clone().try_lock_owned().map_err(|_| {
            warn!("Rejected run: generation already in progress");
            GenerationError::Busy
        })?;

        if !self.generator.is_ready().await {
            self.set_phase(SessionPhase::Failed);
            warn!(
                conversation_id = %state.id(),
                generator = self.generator.name(),
                "Generator not ready"
            );
            return Err(GenerationError::ModelNotLoaded);
        }
        Ok(state)
    }

    /// Budget and assemble the prompt for `turn`.
    fn prepare(&self, state: &mut ConversationState, turn: &UserTurn) -> GenerationRequest {
        self.set_phase(SessionPhase::Prompting);
        if let Some(mode) = turn.mode {
            self.switch_mode(state, mode);
        }
        let mode = state.mode();
        let settings = &self.settings;
        let unit = settings.budget_unit;
        let assembler = PromptAssembler::new(settings.template);
        let budgeter =
            ContextBudgeter::new(unit).with_min_truncated_chars(settings.min_truncated_chars);

        let system = self.prompts.system_prompt(mode);
        let history = state.recent(settings.history_window);

        let mut budget = PromptBudget::new(token::from_tokens(settings.n_ctx, unit))
            .reserve(
                "output",
                token::from_tokens(settings.sampling.max_output_tokens, unit),
            )
            .reserve("template", assembler.overhead(history.len(), unit));
        if turn.context.is_some() {
            budget = budget.reserve("context_label", token::measure(CONTEXT_LABEL, unit));
        }

        let mut blocks = Vec::with_capacity(history.len() + 3);
        blocks.push(ContextBlock::pinned(SYSTEM_BLOCK, system.as_str()));
        for (i, past) in history.iter().enumerate() {
            let priority = HISTORY_PRIORITY.saturating_add(u8::try_from(i).unwrap_or(u8::MAX));
            blocks.push(ContextBlock::droppable(history_block(i), past.content(), priority));
        }
        if let Some(context) = &turn.context {
            blocks.push(ContextBlock::truncatable(
                CONTEXT_BLOCK,
                context.formatted.as_str(),
                CONTEXT_PRIORITY,
            ));
        }
        blocks.push(ContextBlock::pinned(USER_BLOCK, turn.text.as_str()));

        let outcome = budgeter.fit(blocks, budget.available_for_context());
        log_outcome(state, mode, &outcome);

        let kept_history: Vec<&Turn> = history
            .iter()
            .enumerate()
            .filter(|(i, _)| outcome.get(&history_block(*i)).is_some())
            .map(|(_, t)| *t)
            .collect();
        let user_text = merge_context(&turn.text, outcome.get(CONTEXT_BLOCK));
        let prompt = assembler.assemble(
            outcome.get(SYSTEM_BLOCK).unwrap_or_default(),
            &kept_history,
            &user_text,
        );

        GenerationRequest::new(prompt, settings.sampling.clone(), assembler.stop_sequences())
    }

    /// Relay chunks until the generator finishes. Returns the terminal
    /// event, or `None` when the caller stopped listening.
    async fn drive_stream(
        self,
        mut state: OwnedMutexGuard<ConversationState>,
        turn: UserTurn,
        tx: &mpsc::Sender<SessionEvent>,
    ) -> Option<SessionEvent> {
        let request = self.prepare(&mut state, &turn);
        let stops = request.stop.clone();

        self.set_phase(SessionPhase::Generating);
        let mut upstream = match self.generator.stream(request).await {
            Ok(rx) => rx,
            Err(e) => return Some(SessionEvent::error(&self.fail(&state, e))),
        };

        let mut raw = String::new();
        let mut finished = false;
        loop {
            let item = tokio::select! {
                _ = tx.closed() => {
                    self.abandon(&state);
                    return None;
                }
                item = upstream.recv() => item,
            };

            match item {
                Some(Ok(chunk)) => {
                    if !chunk.text.is_empty() {
                        raw.push_str(&chunk.text);
                        let event = SessionEvent::Chunk {
                            content: chunk.text,
                        };
                        if tx.send(event).await.is_err() {
                            self.abandon(&state);
                            return None;
                        }
                    }
                    if chunk.done {
                        finished = true;
                        break;
                    }
                }
                Some(Err(e)) => return Some(SessionEvent::error(&self.fail(&state, e))),
                None => break,
            }
        }

        if !finished {
            let e = self.fail(
                &state,
                GenerationError::StreamInterrupted("generator closed the stream early".into()),
            );
            return Some(SessionEvent::error(&e));
        }

        truncate_at_stop(&mut raw, &stops);
        Some(match self.commit(&mut state, &turn.text, raw) {
            Ok(result) => SessionEvent::Done { result },
            Err(e) => SessionEvent::error(&e),
        })
    }

    fn commit(
        &self,
        state: &mut ConversationState,
        user_text: &str,
        raw: String,
    ) -> Result<GenerationResult, GenerationError> {
        let cleaned = self.sanitizer.sanitize(&raw);
        if cleaned.is_empty() {
            return Err(self.fail(state, GenerationError::EmptyResponse));
        }

        state.commit_exchange(user_text, cleaned.as_str());
        self.set_phase(SessionPhase::Committed);
        info!(
            conversation_id = %state.id(),
            raw_chars = raw.chars().count(),
            cleaned_chars = cleaned.chars().count(),
            turns = state.len(),
            "Exchange committed"
        );
        Ok(GenerationResult {
            raw_text: raw,
            cleaned_text: cleaned,
        })
    }

    fn fail(&self, state: &ConversationState, error: GenerationError) -> GenerationError {
        self.set_phase(SessionPhase::Failed);
        warn!(conversation_id = %state.id(), error = %error, "Generation failed");
        error
    }

    fn abandon(&self, state: &ConversationState) {
        self.set_phase(SessionPhase::Failed);
        info!(conversation_id = %state.id(), "Stream dropped by consumer; nothing committed");
    }
}

fn log_outcome(state: &ConversationState, mode: Mode, outcome: &BudgetOutcome) {
    debug!(
        conversation_id = %state.id(),
        mode = %mode,
        total = outcome.total,
        ceiling = outcome.ceiling,
        utilization_pct = outcome.utilization_pct,
        dropped = ?outcome.dropped(),
        truncated = ?outcome.truncated(),
        "Prompt budgeted"
    );
    if let Some(violation) = &outcome.violation {
        warn!(conversation_id = %state.id(), %violation, "Prompt exceeds budget");
    }
}
