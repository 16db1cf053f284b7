//! # Meeting Manager
//!
//! Per-meeting orchestration state machine:
//!
//! ```text
//! SettingUp -> Active <-> RaiseHandPending
//!                |
//!                v
//!           WrappingUp -> Completed --(extension)--> Active
//! ```
//!
//! One manager owns one meeting. Inbound events are serialized through a
//! fair async mutex over the meeting state, so events apply in arrival
//! order and two turns never run concurrently. The manager talks outward
//! only through the [`MeetingBroadcaster`] capability and hears synthesis
//! results back through the audio queue's listener, which also paces the
//! automatic turn loop: the next persona turn starts only once the
//! previous turn's audio has published or terminally failed.
//!
//! Failure semantics: a generation failure abandons the turn (nothing
//! appended, session continues); a persistence failure is fatal for the
//! meeting and drives the session to its unrecoverable-error presentation.

use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audio::queue::{AudioOutcome, AudioTask};
use crate::audio::system::AudioSubmitter;
use crate::audio::AudioListener;
use crate::broadcast::{AudioPayload, MeetingBroadcaster, NullBroadcaster};
use crate::error::{AppError, AppResult};
use crate::generation::{GenerationRequest, HistoryEntry, UtteranceGenerator};
use crate::meeting::conversation::{
    Character, ConversationMessage, MeetingOptions, MessageKind, SentenceTiming,
};
use crate::meeting::turn_policy::TurnPolicy;
use crate::persistence::{MeetingDocument, MeetingStore};

/// Lifecycle phase of a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingPhase {
    SettingUp,
    Active,
    RaiseHandPending,
    WrappingUp,
    /// Terminal, but re-openable to Active under the extension policy
    Completed,
}

/// Shared collaborators every manager needs.
#[derive(Clone)]
pub struct MeetingDeps {
    pub store: Arc<dyn MeetingStore>,
    pub generator: Arc<dyn UtteranceGenerator>,
    pub audio: Arc<dyn AudioSubmitter>,
    pub policy: Arc<dyn TurnPolicy>,
}

struct MeetingState {
    phase: MeetingPhase,
    conversation: Vec<ConversationMessage>,
    persona_turns: u32,
    max_turns: u32,
    raised_hand: Option<String>,
    /// Set after a persistence failure; every further event is refused
    fatal: bool,
}

pub struct MeetingManager {
    meeting_id: i64,
    options: MeetingOptions,
    deps: MeetingDeps,
    broadcaster: RwLock<Arc<dyn MeetingBroadcaster>>,
    state: Mutex<MeetingState>,
}

/// Payload for human messages, already schema-validated by the session.
#[derive(Debug, Clone)]
pub struct HumanMessage {
    pub text: String,
    pub speaker: Option<String>,
    /// Persona asked to respond; `None` lets the turn policy pick
    pub ask_particular: Option<String>,
    /// Client-side message id when the client recorded its own audio
    pub id: Option<Uuid>,
    pub sentences: Option<Vec<SentenceTiming>>,
}

impl MeetingManager {
    /// Allocate a meeting, persist its initial document, and return the
    /// manager in `Active` phase. The first turn is NOT triggered here;
    /// callers broadcast `meeting_started` and then call [`Self::kick_off`].
    pub async fn create(
        deps: MeetingDeps,
        options: MeetingOptions,
        broadcaster: Arc<dyn MeetingBroadcaster>,
    ) -> AppResult<Arc<Self>> {
        let mut state = MeetingState {
            phase: MeetingPhase::SettingUp,
            conversation: Vec::new(),
            persona_turns: 0,
            max_turns: options.max_turns,
            raised_hand: None,
            fatal: false,
        };

        let meeting_id = deps.store.next_meeting_id().await?;
        let document = MeetingDocument::new(meeting_id, options.clone());
        deps.store.insert_meeting(&document).await?;

        info!(meeting_id, topic = %options.topic, "meeting created");

        // Allocation and the initial persist succeeded; the meeting is live
        state.phase = MeetingPhase::Active;

        Ok(Arc::new(Self {
            meeting_id,
            options,
            deps,
            broadcaster: RwLock::new(broadcaster),
            state: Mutex::new(state),
        }))
    }

    /// Rebuild a manager from its persisted document for reconnection.
    /// Nothing is generated or synthesized here.
    pub fn resume(
        deps: MeetingDeps,
        document: MeetingDocument,
        broadcaster: Arc<dyn MeetingBroadcaster>,
    ) -> Arc<Self> {
        let phase = if document.summary.is_some() {
            MeetingPhase::Completed
        } else {
            MeetingPhase::Active
        };
        let persona_turns = document
            .conversation
            .iter()
            .filter(|m| m.kind == MessageKind::Utterance)
            .count() as u32;

        info!(meeting_id = document.id, ?phase, "meeting resumed from store");

        let max_turns = document.options.max_turns;
        Arc::new(Self {
            meeting_id: document.id,
            options: document.options,
            deps,
            broadcaster: RwLock::new(broadcaster),
            state: Mutex::new(MeetingState {
                phase,
                conversation: document.conversation,
                persona_turns,
                max_turns,
                raised_hand: None,
                fatal: false,
            }),
        })
    }

    pub fn meeting_id(&self) -> i64 {
        self.meeting_id
    }

    /// Swap the outbound capability, e.g. onto a fresh session after a
    /// reconnect. Meeting state is untouched.
    pub fn rebind(&self, broadcaster: Arc<dyn MeetingBroadcaster>) {
        *self.broadcaster.write().unwrap() = broadcaster;
    }

    /// Detach from the session: in-flight work keeps running and
    /// persisting, but nothing is delivered anywhere.
    pub fn detach(&self) {
        self.rebind(Arc::new(NullBroadcaster));
    }

    fn broadcaster(&self) -> Arc<dyn MeetingBroadcaster> {
        self.broadcaster.read().unwrap().clone()
    }

    /// Trigger the first persona turn after `meeting_started` went out.
    pub fn kick_off(self: &Arc<Self>) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.take_turn(None).await;
        });
    }

    /// Run one persona turn: pick the speaker, generate, append, persist,
    /// broadcast the text, and queue synthesis. Holding the state lock for
    /// the whole turn serializes turns per meeting.
    async fn take_turn(self: &Arc<Self>, directed: Option<String>) {
        let mut state = self.state.lock().await;
        if state.fatal || state.phase != MeetingPhase::Active {
            return;
        }
        if state.persona_turns >= state.max_turns {
            drop(state);
            self.run_wrap_up().await;
            return;
        }

        let speaker = match &directed {
            Some(name) => match self.options.character_by_name(name) {
                Some(character) => character.clone(),
                None => {
                    let err = AppError::Validation(format!("unknown speaker '{}'", name));
                    self.broadcaster().error(&err.to_string(), err.code());
                    return;
                }
            },
            None => self
                .deps
                .policy
                .next_speaker(&self.options.characters, &state.conversation)
                .clone(),
        };

        let instruction = match &directed {
            Some(_) => "Respond directly to the last message, then add your own view.".to_string(),
            None => "Continue the discussion with your next contribution.".to_string(),
        };

        let request = self.generation_request(
            &speaker,
            &state.conversation,
            instruction,
            self.options.utterance_word_limit,
        );

        match self.deps.generator.generate(&request).await {
            Ok(text) => {
                let message = ConversationMessage::new(MessageKind::Utterance, speaker.name.as_str(), text);
                if self.append_and_publish(&mut state, message.clone()).await {
                    state.persona_turns += 1;
                    self.submit_audio(&speaker, &message);
                }
            }
            Err(err) => {
                // Turn abandoned: nothing appended, session continues
                warn!(meeting_id = self.meeting_id, error = %err, "turn generation failed");
                self.broadcaster().error(&err.to_string(), err.code());
            }
        }
    }

    /// Human or panelist message, inserted out of normal order; a persona
    /// responds, re-entering the loop. Resolves a pending raised hand.
    pub async fn handle_human_message(self: &Arc<Self>, payload: HumanMessage) {
        let responder = {
            let mut state = self.state.lock().await;
            if state.fatal {
                return;
            }
            if !matches!(
                state.phase,
                MeetingPhase::Active | MeetingPhase::RaiseHandPending
            ) {
                self.broadcaster()
                    .error("meeting is not accepting messages", "invalid_state");
                return;
            }

            let speaker = payload
                .speaker
                .clone()
                .or_else(|| state.raised_hand.clone())
                .unwrap_or_else(|| "Audience".to_string());

            let mut message = ConversationMessage::new(MessageKind::Human, speaker, payload.text.as_str());
            if let Some(id) = payload.id {
                message.id = id;
            }
            message.sentences = payload.sentences.clone();

            if !self.append_and_publish(&mut state, message).await {
                return;
            }

            // A pending raised hand is resolved by the human speaking
            if state.phase == MeetingPhase::RaiseHandPending {
                state.phase = MeetingPhase::Active;
                state.raised_hand = None;
            }

            payload.ask_particular
        };

        self.take_turn(responder).await;
    }

    /// Raise-hand: move to `RaiseHandPending` and have the chair persona
    /// invite the human to speak.
    pub async fn handle_raise_hand(self: &Arc<Self>, human_name: &str) {
        let mut state = self.state.lock().await;
        if state.fatal {
            return;
        }
        if state.phase != MeetingPhase::Active {
            self.broadcaster()
                .error("cannot raise a hand right now", "invalid_state");
            return;
        }

        state.phase = MeetingPhase::RaiseHandPending;
        state.raised_hand = Some(human_name.to_string());

        let chair = self.options.chair().clone();
        let request = self.generation_request(
            &chair,
            &state.conversation,
            format!(
                "{} in the audience has raised their hand. Briefly invite them to speak next.",
                human_name
            ),
            self.options.utterance_word_limit,
        );

        match self.deps.generator.generate(&request).await {
            Ok(text) => {
                let message = ConversationMessage::new(MessageKind::Invitation, chair.name.as_str(), text);
                if self.append_and_publish(&mut state, message.clone()).await {
                    self.submit_audio(&chair, &message);
                }
            }
            Err(err) => {
                // Invitation abandoned; the hand is lowered again
                warn!(meeting_id = self.meeting_id, error = %err, "invitation generation failed");
                state.phase = MeetingPhase::Active;
                state.raised_hand = None;
                self.broadcaster().error(&err.to_string(), err.code());
            }
        }
    }

    /// Inject operator text at `index` under a length envelope. If the
    /// index no longer matches the conversation length (a concurrent turn
    /// won the race), fail soft: an error event, no mutation.
    pub async fn handle_injection(self: &Arc<Self>, text: &str, index: usize, length: usize) {
        let mut state = self.state.lock().await;
        if state.fatal {
            return;
        }
        if !matches!(
            state.phase,
            MeetingPhase::Active | MeetingPhase::RaiseHandPending
        ) {
            self.broadcaster()
                .error("meeting is not accepting injections", "invalid_state");
            return;
        }

        if index != state.conversation.len() {
            warn!(
                meeting_id = self.meeting_id,
                index,
                current = state.conversation.len(),
                "injection index raced a concurrent turn"
            );
            self.broadcaster().error(
                "injection index no longer matches the conversation",
                "injection_conflict",
            );
            return;
        }

        let chair = self.options.chair().clone();
        let message = ConversationMessage::with_length_envelope(
            MessageKind::Injected,
            chair.name.as_str(),
            text,
            length,
        );
        if self.append_and_publish(&mut state, message.clone()).await {
            self.submit_audio(&chair, &message);
        }
    }

    /// Wrap-up: the chair delivers a bounded closing statement. The stored
    /// message keeps its markup; the synthesis pipeline strips it. Allowed
    /// from `Active` and, when forced, from `RaiseHandPending`.
    pub async fn handle_wrap_up(self: &Arc<Self>) {
        let state = self.state.lock().await;
        if state.fatal {
            return;
        }
        if !matches!(
            state.phase,
            MeetingPhase::Active | MeetingPhase::RaiseHandPending
        ) {
            self.broadcaster()
                .error("meeting cannot wrap up right now", "invalid_state");
            return;
        }
        drop(state);
        self.run_wrap_up().await;
    }

    async fn run_wrap_up(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.fatal || state.phase == MeetingPhase::WrappingUp
            || state.phase == MeetingPhase::Completed
        {
            return;
        }
        state.phase = MeetingPhase::WrappingUp;

        let chair = self.options.chair().clone();
        let request = self.generation_request(
            &chair,
            &state.conversation,
            format!(
                "The discussion is ending. Deliver a closing summary of the whole \
                 conversation in at most {} words.",
                self.options.summary_word_limit
            ),
            self.options.summary_word_limit,
        );

        match self.deps.generator.generate(&request).await {
            Ok(text) => {
                let message = ConversationMessage::new(MessageKind::Summary, chair.name.as_str(), text);
                if !self.append_and_publish(&mut state, message.clone()).await {
                    return;
                }
                if let Err(err) = self
                    .deps
                    .store
                    .set_summary(self.meeting_id, &message.text)
                    .await
                {
                    self.fail_meeting(&mut state, err);
                    return;
                }

                state.phase = MeetingPhase::Completed;
                info!(meeting_id = self.meeting_id, "meeting completed");
                self.broadcaster().conversation_end(&state.conversation);
                self.submit_audio(&chair, &message);
            }
            Err(err) => {
                // Closing statement abandoned; the discussion stays open
                warn!(meeting_id = self.meeting_id, error = %err, "wrap-up generation failed");
                state.phase = MeetingPhase::Active;
                self.broadcaster().error(&err.to_string(), err.code());
            }
        }
    }

    /// Extension: re-open a completed meeting when the options allow it.
    pub async fn handle_continue(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().await;
            if state.fatal {
                return;
            }
            if state.phase != MeetingPhase::Completed {
                self.broadcaster()
                    .error("meeting is not completed", "invalid_state");
                return;
            }
            if !self.options.allow_extension {
                self.broadcaster()
                    .error("meeting extension is not allowed", "invalid_state");
                return;
            }
            state.phase = MeetingPhase::Active;
            info!(meeting_id = self.meeting_id, "meeting extended");
        }
        self.take_turn(None).await;
    }

    /// Replay the stored conversation and re-deliver persisted audio to a
    /// reconnected client. Zero generation, zero synthesis. The optional
    /// hints restore raise-hand state and a client-side turn cap.
    pub async fn replay(
        &self,
        hand_raised: Option<bool>,
        conversation_max_length: Option<u32>,
    ) {
        let mut state = self.state.lock().await;

        if let Some(max) = conversation_max_length {
            state.max_turns = max;
        }
        if hand_raised == Some(true) && state.phase == MeetingPhase::Active {
            state.phase = MeetingPhase::RaiseHandPending;
        }

        let broadcaster = self.broadcaster();
        broadcaster.conversation_update(&state.conversation);
        if state.phase == MeetingPhase::Completed {
            broadcaster.conversation_end(&state.conversation);
        }

        match self.deps.store.find_audio_for_meeting(self.meeting_id).await {
            Ok(records) => {
                // Deliver in conversation order, not storage order
                for message in &state.conversation {
                    if let Some(record) = records.iter().find(|r| r.id == message.id) {
                        broadcaster.audio_update(AudioPayload {
                            id: record.id,
                            audio: Some(record.audio.bytes.clone()),
                            sentences: Some(record.sentences.clone()),
                            kind: audio_kind(message.kind),
                        });
                    }
                }
            }
            Err(err) => {
                error!(meeting_id = self.meeting_id, error = %err, "audio replay failed");
                broadcaster.error(&err.to_string(), err.code());
            }
        }
    }

    /// Append one message: in-memory, persisted, and broadcast. Returns
    /// false when persistence failed (the meeting is then dead).
    async fn append_and_publish(
        &self,
        state: &mut MeetingState,
        message: ConversationMessage,
    ) -> bool {
        if let Err(err) = self.deps.store.append_message(self.meeting_id, &message).await {
            self.fail_meeting(state, err);
            return false;
        }
        state.conversation.push(message);
        self.broadcaster().conversation_update(&state.conversation);
        true
    }

    /// Persistence failures are unrecoverable for the meeting: report to
    /// the monitoring sink and refuse everything from here on. The client
    /// UI owns the error presentation.
    fn fail_meeting(&self, state: &mut MeetingState, err: AppError) {
        crate::reporting::report_meeting_failure(self.meeting_id, &err);
        state.fatal = true;
        self.broadcaster().error(&err.to_string(), err.code());
    }

    fn generation_request(
        &self,
        persona: &Character,
        conversation: &[ConversationMessage],
        instruction: String,
        word_limit: u32,
    ) -> GenerationRequest {
        GenerationRequest {
            persona: persona.clone(),
            topic: self.options.topic.clone(),
            language: self.options.language.clone(),
            history: conversation
                .iter()
                .map(|m| HistoryEntry {
                    speaker: m.speaker.clone(),
                    text: m.text.clone(),
                })
                .collect(),
            instruction,
            word_limit,
            model: self.options.model.clone(),
            temperature: self.options.temperature,
        }
    }

    fn submit_audio(self: &Arc<Self>, speaker: &Character, message: &ConversationMessage) {
        self.deps.audio.submit(AudioTask {
            meeting_id: self.meeting_id,
            message_id: message.id,
            kind: message.kind,
            text: message.text.clone(),
            speaker: speaker.clone(),
            language: Some(self.options.language.clone()),
            listener: Arc::new(ManagerListener(self.clone())),
        });
    }

    /// Called (in submission order) when a turn's audio has published or
    /// terminally failed; decides whether the loop advances.
    async fn advance_after_audio(self: Arc<Self>, kind: MessageKind) {
        if !matches!(kind, MessageKind::Utterance | MessageKind::Injected) {
            return;
        }

        let should_wrap = {
            let state = self.state.lock().await;
            if state.fatal {
                return;
            }
            match state.phase {
                MeetingPhase::Active => {
                    if state.persona_turns >= state.max_turns {
                        Some(true)
                    } else {
                        Some(false)
                    }
                }
                // Forced wrap-up applies regardless of a pending hand
                MeetingPhase::RaiseHandPending if state.persona_turns >= state.max_turns => {
                    Some(true)
                }
                _ => None,
            }
        };

        match should_wrap {
            Some(true) => self.run_wrap_up().await,
            Some(false) => self.take_turn(None).await,
            None => {}
        }
    }

    async fn attach_sentences(&self, message_id: Uuid, sentences: Vec<SentenceTiming>) {
        let mut state = self.state.lock().await;
        if let Some(message) = state.conversation.iter_mut().find(|m| m.id == message_id) {
            message.sentences = Some(sentences);
        }
    }
}

fn audio_kind(kind: MessageKind) -> Option<String> {
    match kind {
        MessageKind::Utterance => None,
        other => Some(other.as_str().to_string()),
    }
}

/// Bridges audio resolutions back into the manager. Broadcasting happens
/// synchronously here: the queue invokes listeners in per-meeting
/// submission order, and the order must survive into the transport.
struct ManagerListener(Arc<MeetingManager>);

impl AudioListener for ManagerListener {
    fn audio_resolved(&self, outcome: AudioOutcome) {
        let manager = self.0.clone();
        let kind = outcome.kind;

        match outcome.result {
            Ok(resolved) => {
                manager.broadcaster().audio_update(AudioPayload {
                    id: outcome.message_id,
                    audio: Some(resolved.audio),
                    sentences: Some(resolved.sentences.clone()),
                    kind: audio_kind(kind),
                });

                let message_id = outcome.message_id;
                let sentences = resolved.sentences;
                let for_captions = manager.clone();
                tokio::spawn(async move {
                    for_captions.attach_sentences(message_id, sentences).await;
                });
            }
            Err(failure) if failure.fatal => {
                let for_failure = manager.clone();
                let message = failure.message.clone();
                tokio::spawn(async move {
                    let mut state = for_failure.state.lock().await;
                    for_failure.fail_meeting(&mut state, AppError::Persistence(message));
                });
                return;
            }
            Err(failure) => {
                manager.broadcaster().error(&failure.message, failure.code);
            }
        }

        tokio::spawn(async move {
            manager.advance_after_audio(kind).await;
        });
    }
}
