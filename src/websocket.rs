//! # Meeting Session Handler
//!
//! One WebSocket actor per live session at `/ws/meeting`. The actor is
//! the SocketManager: it validates every inbound message against a strict
//! schema, rejects malformed payloads before they reach the meeting
//! manager, and forwards each valid payload to exactly one manager
//! method. Outbound traffic flows back through an actor-backed
//! [`MeetingBroadcaster`], so orchestration never touches the transport.
//!
//! ## Inbound Protocol
//!
//! JSON objects discriminated by a `type` field:
//! `start_conversation`, `submit_human_message`, `submit_human_panelist`,
//! `submit_injection`, `raise_hand`, `wrap_up_meeting`,
//! `continue_conversation`, `attempt_reconnection`, `request_clientkey`.
//!
//! Payload schemas are strict (unknown fields rejected) with one explicit
//! open-extension field: `start_conversation.options`, honored only in
//! development mode.
//!
//! ## Lifecycle
//!
//! Heartbeat pings every 30s; a client silent for 60s is dropped. On
//! disconnect the manager is detached (broadcasts become no-ops) but keeps
//! running: in-flight generation and synthesis complete and persist, and a
//! later `attempt_reconnection` re-binds the live manager to a new session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::{AudioPayload, MeetingBroadcaster, ServerMessage};
use crate::config::{AppConfig, RuntimeMode};
use crate::error::{AppError, AppResult};
use crate::meeting::{
    Character, HumanMessage, MeetingManager, MeetingOptions, SentenceTiming,
};
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on roster size; anything larger is a malformed request.
const MAX_CHARACTERS: usize = 8;

/// Inbound envelope: the `type` discriminator plus the remaining fields,
/// validated per event against the payload structs below.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(rename = "type")]
    event: String,
    #[serde(flatten)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StartConversationPayload {
    topic: String,
    characters: Vec<Character>,
    language: String,
    /// Client UI state echoed on start; accepted, not interpreted
    #[serde(default)]
    #[allow(dead_code)]
    state: Option<Value>,
    /// Open extension point: generation overrides, honored in development
    #[serde(default)]
    options: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HumanMessagePayload {
    text: String,
    #[serde(rename = "askParticular", default)]
    ask_particular: Option<String>,
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    sentences: Option<Vec<SentenceTiming>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InjectionPayload {
    text: String,
    /// Client-side timestamp; kept for the wire contract
    #[allow(dead_code)]
    date: Value,
    index: usize,
    length: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RaiseHandPayload {
    /// Conversation index at which the hand went up (client bookkeeping)
    #[allow(dead_code)]
    index: usize,
    #[serde(rename = "humanName")]
    human_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WrapUpPayload {
    #[allow(dead_code)]
    date: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContinuePayload {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReconnectionPayload {
    #[serde(rename = "meetingId")]
    meeting_id: i64,
    #[serde(rename = "handRaised", default)]
    hand_raised: Option<bool>,
    #[serde(rename = "conversationMaxLength", default)]
    conversation_max_length: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClientKeyPayload {}

/// WebSocket actor for one live session.
pub struct MeetingSocket {
    state: AppState,
    manager: Option<Arc<MeetingManager>>,
    last_heartbeat: Instant,
}

impl MeetingSocket {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            manager: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn broadcaster(&self, ctx: &mut ws::WebsocketContext<Self>) -> Arc<ActorBroadcaster> {
        Arc::new(ActorBroadcaster {
            addr: ctx.address(),
        })
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str, code: &str) {
        let event = ServerMessage::ConversationError {
            message: message.to_string(),
            code: code.to_string(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            ctx.text(json);
        }
        warn!(code, "session error: {}", message);
    }

    /// Parse the event payload against its strict schema, or answer with
    /// a validation error.
    fn parse<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &mut ws::WebsocketContext<Self>,
        event: &str,
        payload: Value,
    ) -> Option<T> {
        match serde_json::from_value(payload) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                self.send_error(
                    ctx,
                    &format!("invalid {} payload: {}", event, err),
                    "validation_error",
                );
                None
            }
        }
    }

    /// The session's current manager, or a client-visible error.
    fn manager(&self, ctx: &mut ws::WebsocketContext<Self>) -> Option<Arc<MeetingManager>> {
        match &self.manager {
            Some(manager) => Some(manager.clone()),
            None => {
                let err = AppError::InvalidState("no active meeting in this session".into());
                self.send_error(ctx, &err.to_string(), err.code());
                None
            }
        }
    }

    fn dispatch(&mut self, message: InboundMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let InboundMessage { event, payload } = message;
        debug!(event = %event, "inbound session event");

        match event.as_str() {
            "start_conversation" => {
                let Some(payload) =
                    self.parse::<StartConversationPayload>(ctx, &event, payload)
                else {
                    return;
                };
                let options = match build_meeting_options(&self.state.config, payload) {
                    Ok(options) => options,
                    Err(err) => {
                        self.send_error(ctx, &err.to_string(), err.code());
                        return;
                    }
                };

                let deps = self.state.deps.clone();
                let registry = self.state.registry.clone();
                let broadcaster = self.broadcaster(ctx);
                let addr = ctx.address();
                tokio::spawn(async move {
                    match MeetingManager::create(deps, options, broadcaster.clone()).await {
                        Ok(manager) => {
                            registry.insert(manager.clone());
                            broadcaster.meeting_started(manager.meeting_id());
                            addr.do_send(AttachManager(manager.clone()));
                            manager.kick_off();
                        }
                        Err(err) => {
                            broadcaster.error(&err.to_string(), err.code());
                        }
                    }
                });
            }

            // Both carry the same payload; panelist messages come from a
            // participant who joined via raise-hand.
            "submit_human_message" | "submit_human_panelist" => {
                let Some(payload) = self.parse::<HumanMessagePayload>(ctx, &event, payload)
                else {
                    return;
                };
                let Some(manager) = self.manager(ctx) else {
                    return;
                };
                tokio::spawn(async move {
                    manager
                        .handle_human_message(HumanMessage {
                            text: payload.text,
                            speaker: payload.speaker,
                            ask_particular: payload.ask_particular,
                            id: payload.id,
                            sentences: payload.sentences,
                        })
                        .await;
                });
            }

            "submit_injection" => {
                let Some(payload) = self.parse::<InjectionPayload>(ctx, &event, payload)
                else {
                    return;
                };
                let Some(manager) = self.manager(ctx) else {
                    return;
                };
                tokio::spawn(async move {
                    manager
                        .handle_injection(&payload.text, payload.index, payload.length)
                        .await;
                });
            }

            "raise_hand" => {
                let Some(payload) = self.parse::<RaiseHandPayload>(ctx, &event, payload)
                else {
                    return;
                };
                let Some(manager) = self.manager(ctx) else {
                    return;
                };
                tokio::spawn(async move {
                    manager.handle_raise_hand(&payload.human_name).await;
                });
            }

            "wrap_up_meeting" => {
                let Some(_payload) = self.parse::<WrapUpPayload>(ctx, &event, payload)
                else {
                    return;
                };
                let Some(manager) = self.manager(ctx) else {
                    return;
                };
                tokio::spawn(async move {
                    manager.handle_wrap_up().await;
                });
            }

            "continue_conversation" => {
                let Some(_payload) = self.parse::<ContinuePayload>(ctx, &event, payload)
                else {
                    return;
                };
                let Some(manager) = self.manager(ctx) else {
                    return;
                };
                tokio::spawn(async move {
                    manager.handle_continue().await;
                });
            }

            "attempt_reconnection" => {
                let Some(payload) = self.parse::<ReconnectionPayload>(ctx, &event, payload)
                else {
                    return;
                };
                let state = self.state.clone();
                let broadcaster = self.broadcaster(ctx);
                let addr = ctx.address();
                tokio::spawn(async move {
                    reconnect(state, broadcaster, addr, payload).await;
                });
            }

            "request_clientkey" => {
                let Some(_payload) = self.parse::<ClientKeyPayload>(ctx, &event, payload)
                else {
                    return;
                };
                let event = ServerMessage::ClientKeyResponse {
                    value: self.state.config.server.client_key.clone(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    ctx.text(json);
                }
            }

            other => {
                self.send_error(
                    ctx,
                    &format!("unknown event type '{}'", other),
                    "validation_error",
                );
            }
        }
    }
}

/// Re-attach a client to its meeting: the live in-process manager when
/// one exists, otherwise the persisted document. An unknown id yields a
/// single `meeting_not_found` and mutates nothing.
async fn reconnect(
    state: AppState,
    broadcaster: Arc<ActorBroadcaster>,
    addr: Addr<MeetingSocket>,
    payload: ReconnectionPayload,
) {
    let Some(manager) = resolve_meeting(&state, broadcaster, payload.meeting_id).await else {
        return;
    };
    addr.do_send(AttachManager(manager.clone()));
    manager
        .replay(payload.hand_raised, payload.conversation_max_length)
        .await;
}

/// Find the meeting for a reconnection attempt and bind it to the given
/// broadcaster. `None` means the id is unknown (or the lookup failed) and
/// the client has already been told.
async fn resolve_meeting(
    state: &AppState,
    broadcaster: Arc<dyn MeetingBroadcaster>,
    meeting_id: i64,
) -> Option<Arc<MeetingManager>> {
    if let Some(live) = state.registry.get(meeting_id) {
        live.rebind(broadcaster.clone());
        return Some(live);
    }

    match state.deps.store.find_meeting(meeting_id).await {
        Ok(Some(document)) => {
            let manager = MeetingManager::resume(state.deps.clone(), document, broadcaster);
            state.registry.insert(manager.clone());
            Some(manager)
        }
        Ok(None) => {
            info!(meeting_id, "reconnection to unknown meeting");
            broadcaster.meeting_not_found(meeting_id);
            None
        }
        Err(err) => {
            broadcaster.error(&err.to_string(), err.code());
            None
        }
    }
}

/// Validate a start request and snapshot it into meeting options. In
/// production mode client-supplied generation options are stripped even
/// when present; development mode honors them.
fn build_meeting_options(
    config: &AppConfig,
    payload: StartConversationPayload,
) -> AppResult<MeetingOptions> {
    if payload.topic.trim().is_empty() {
        return Err(AppError::Validation("topic must not be empty".into()));
    }
    if payload.characters.is_empty() || payload.characters.len() > MAX_CHARACTERS {
        return Err(AppError::Validation(format!(
            "between 1 and {} characters required",
            MAX_CHARACTERS
        )));
    }
    for character in &payload.characters {
        if character.name.trim().is_empty() || character.voice_id.trim().is_empty() {
            return Err(AppError::Validation(
                "every character needs a name and a voice".into(),
            ));
        }
    }
    if payload.language.trim().is_empty() {
        return Err(AppError::Validation("language must not be empty".into()));
    }

    let mut options = MeetingOptions {
        topic: payload.topic,
        characters: payload.characters,
        language: payload.language,
        max_turns: config.meeting.max_turns,
        utterance_word_limit: config.meeting.utterance_word_limit,
        summary_word_limit: config.meeting.summary_word_limit,
        allow_extension: config.meeting.allow_extension,
        model: None,
        temperature: None,
    };

    match config.server.mode {
        RuntimeMode::Production => {
            if payload.options.is_some() {
                debug!("client generation options stripped in production mode");
            }
        }
        RuntimeMode::Development => {
            if let Some(extra) = payload.options {
                if let Some(model) = extra.get("model").and_then(Value::as_str) {
                    options.model = Some(model.to_string());
                }
                if let Some(temperature) = extra.get("temperature").and_then(Value::as_f64) {
                    options.temperature = Some(temperature as f32);
                }
                if let Some(max_turns) = extra.get("max_turns").and_then(Value::as_u64) {
                    options.max_turns = max_turns as u32;
                }
                if let Some(allowed) = extra.get("allow_extension").and_then(Value::as_bool) {
                    options.allow_extension = allowed;
                }
            }
        }
    }

    Ok(options)
}

/// Outbound event en route to the client.
#[derive(Message)]
#[rtype(result = "()")]
struct SendEvent(ServerMessage);

/// Binds a freshly created or resumed manager to this session.
#[derive(Message)]
#[rtype(result = "()")]
struct AttachManager(Arc<MeetingManager>);

/// Actor-backed broadcaster: enqueues into the session mailbox and
/// returns immediately, so the manager never blocks on the transport.
pub struct ActorBroadcaster {
    addr: Addr<MeetingSocket>,
}

impl MeetingBroadcaster for ActorBroadcaster {
    fn meeting_started(&self, meeting_id: i64) {
        self.addr
            .do_send(SendEvent(ServerMessage::MeetingStarted { meeting_id }));
    }

    fn conversation_update(&self, conversation: &[crate::meeting::ConversationMessage]) {
        self.addr.do_send(SendEvent(ServerMessage::ConversationUpdate {
            conversation: conversation.to_vec(),
        }));
    }

    fn conversation_end(&self, conversation: &[crate::meeting::ConversationMessage]) {
        self.addr.do_send(SendEvent(ServerMessage::ConversationEnd {
            conversation: conversation.to_vec(),
        }));
    }

    fn audio_update(&self, payload: AudioPayload) {
        self.addr.do_send(SendEvent(ServerMessage::audio_update(payload)));
    }

    fn client_key(&self, value: &str) {
        self.addr.do_send(SendEvent(ServerMessage::ClientKeyResponse {
            value: value.to_string(),
        }));
    }

    fn error(&self, message: &str, code: &str) {
        self.addr.do_send(SendEvent(ServerMessage::ConversationError {
            message: message.to_string(),
            code: code.to_string(),
        }));
    }

    fn meeting_not_found(&self, meeting_id: i64) {
        self.addr
            .do_send(SendEvent(ServerMessage::MeetingNotFound { meeting_id }));
    }
}

impl Actor for MeetingSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("session connected");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("session heartbeat timeout, closing");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Detachment, not cancellation: the meeting keeps generating,
        // synthesizing, and persisting; broadcasts become no-ops until a
        // reconnection rebinds it.
        if let Some(manager) = &self.manager {
            manager.detach();
            info!(
                meeting_id = manager.meeting_id(),
                live_meetings = self.state.registry.len(),
                "session disconnected, meeting detached"
            );
        } else {
            info!("session disconnected");
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MeetingSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<InboundMessage>(&text) {
                Ok(message) => self.dispatch(message, ctx),
                Err(err) => {
                    self.send_error(
                        ctx,
                        &format!("malformed message: {}", err),
                        "validation_error",
                    );
                }
            },
            Ok(ws::Message::Binary(_)) => {
                self.send_error(ctx, "binary frames are not accepted", "validation_error");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("session closed: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!("session protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<SendEvent> for MeetingSocket {
    type Result = ();

    fn handle(&mut self, msg: SendEvent, ctx: &mut Self::Context) {
        match serde_json::to_string(&msg.0) {
            Ok(json) => ctx.text(json),
            Err(err) => warn!("failed to serialize outbound event: {}", err),
        }
    }
}

impl Handler<AttachManager> for MeetingSocket {
    type Result = ();

    fn handle(&mut self, msg: AttachManager, _ctx: &mut Self::Context) {
        if let Some(previous) = self.manager.replace(msg.0) {
            // Starting a second meeting in one session orphans the first
            previous.detach();
        }
    }
}

/// HTTP entry point: upgrades the request and starts the session actor.
pub async fn meeting_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(
        peer = ?req.connection_info().peer_addr(),
        "new session connection request"
    );
    ws::start(MeetingSocket::new(app_state.get_ref().clone()), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;

    fn start_payload(options: Option<Value>) -> Value {
        let mut payload = json!({
            "topic": "the future of farming",
            "characters": [
                {"id": "ada", "name": "Ada", "voice_id": "v1", "provider": "elevenlabs"},
                {"id": "alan", "name": "Alan", "voice_id": "v2", "provider": "openai"}
            ],
            "language": "English",
        });
        if let Some(options) = options {
            payload["options"] = options;
        }
        payload
    }

    #[test]
    fn test_envelope_splits_type_from_payload() {
        let message: InboundMessage =
            serde_json::from_str(r#"{"type": "raise_hand", "index": 3, "humanName": "Sam"}"#)
                .unwrap();
        assert_eq!(message.event, "raise_hand");

        let payload: RaiseHandPayload = serde_json::from_value(message.payload).unwrap();
        assert_eq!(payload.human_name, "Sam");
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result = serde_json::from_value::<RaiseHandPayload>(json!({
            "index": 0,
            "humanName": "Sam",
            "surprise": true,
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_start_payload_accepts_open_extension_options() {
        let payload: StartConversationPayload =
            serde_json::from_value(start_payload(Some(json!({"model": "gpt-omega", "weird": 1}))))
                .unwrap();
        // The extension map itself is open; strictness applies around it.
        assert!(payload.options.unwrap().contains_key("weird"));
    }

    #[test]
    fn test_reconnection_payload_field_names() {
        let payload: ReconnectionPayload = serde_json::from_value(json!({
            "meetingId": 42,
            "handRaised": true,
            "conversationMaxLength": 12,
        }))
        .unwrap();
        assert_eq!(payload.meeting_id, 42);
        assert_eq!(payload.hand_raised, Some(true));
        assert_eq!(payload.conversation_max_length, Some(12));
    }

    #[test]
    fn test_production_mode_strips_client_options() {
        let mut config = AppConfig::default();
        config.server.mode = RuntimeMode::Production;

        let payload: StartConversationPayload = serde_json::from_value(start_payload(Some(
            json!({"model": "gpt-omega", "temperature": 1.5, "max_turns": 3}),
        )))
        .unwrap();

        let options = build_meeting_options(&config, payload).unwrap();
        assert!(options.model.is_none());
        assert!(options.temperature.is_none());
        assert_eq!(options.max_turns, config.meeting.max_turns);
    }

    #[test]
    fn test_development_mode_honors_client_options() {
        let config = AppConfig::default();

        let payload: StartConversationPayload = serde_json::from_value(start_payload(Some(
            json!({"model": "gpt-omega", "temperature": 0.4, "max_turns": 3}),
        )))
        .unwrap();

        let options = build_meeting_options(&config, payload).unwrap();
        assert_eq!(options.model.as_deref(), Some("gpt-omega"));
        assert_eq!(options.temperature, Some(0.4));
        assert_eq!(options.max_turns, 3);
    }

    #[test]
    fn test_start_validation_rejects_bad_rosters() {
        let config = AppConfig::default();

        let empty_topic: StartConversationPayload = serde_json::from_value(json!({
            "topic": "  ",
            "characters": [{"id": "a", "name": "A", "voice_id": "v", "provider": "openai"}],
            "language": "English",
        }))
        .unwrap();
        assert!(build_meeting_options(&config, empty_topic).is_err());

        let no_characters: StartConversationPayload = serde_json::from_value(json!({
            "topic": "ok",
            "characters": [],
            "language": "English",
        }))
        .unwrap();
        assert!(build_meeting_options(&config, no_characters).is_err());
    }

    mod reconnection {
        use super::*;
        use crate::audio::queue::AudioTask;
        use crate::audio::system::AudioSubmitter;
        use crate::broadcast::testing::RecordingBroadcaster;
        use crate::generation::{GenerationRequest, UtteranceGenerator};
        use crate::meeting::{
            ConversationMessage, MeetingDeps, MessageKind, RoundRobinPolicy,
        };
        use crate::persistence::store::testing::MemoryStore;
        use crate::persistence::{MeetingDocument, MeetingStore};
        use crate::synthesis::VoiceProvider;
        use async_trait::async_trait;

        /// Reconnection must never invoke text generation.
        struct NoGenerator;

        #[async_trait]
        impl UtteranceGenerator for NoGenerator {
            async fn generate(&self, _request: &GenerationRequest) -> AppResult<String> {
                panic!("reconnection invoked the generator");
            }
        }

        /// Reconnection must never re-synthesize completed turns.
        struct NoSubmitter;

        impl AudioSubmitter for NoSubmitter {
            fn submit(&self, _task: AudioTask) {
                panic!("reconnection submitted a synthesis task");
            }
        }

        fn test_state(store: Arc<MemoryStore>) -> AppState {
            AppState::new(
                AppConfig::default(),
                MeetingDeps {
                    store,
                    generator: Arc::new(NoGenerator),
                    audio: Arc::new(NoSubmitter),
                    policy: Arc::new(RoundRobinPolicy),
                },
            )
        }

        fn stored_meeting(id: i64) -> MeetingDocument {
            let options = MeetingOptions {
                topic: "archives".into(),
                characters: vec![Character {
                    id: "ada".into(),
                    name: "Ada".into(),
                    voice_id: "v1".into(),
                    provider: VoiceProvider::OpenAi,
                    locale: None,
                    instruction: None,
                    temperature: None,
                }],
                language: "English".into(),
                max_turns: 10,
                utterance_word_limit: 80,
                summary_word_limit: 150,
                allow_extension: false,
                model: None,
                temperature: None,
            };
            let mut document = MeetingDocument::new(id, options);
            document.conversation.push(ConversationMessage::new(
                MessageKind::Utterance,
                "Ada",
                "Recorded turn.",
            ));
            document
        }

        #[tokio::test]
        async fn test_unknown_id_yields_single_not_found_and_no_mutation() {
            let store = Arc::new(MemoryStore::default());
            let state = test_state(store.clone());
            let broadcaster = Arc::new(RecordingBroadcaster::default());

            let resolved = resolve_meeting(&state, broadcaster.clone(), 404).await;

            assert!(resolved.is_none());
            assert_eq!(broadcaster.event_types(), vec!["meeting_not_found"]);
            assert!(state.registry.is_empty());
            assert!(store.meetings.lock().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_known_id_replays_once_without_generation_or_synthesis() {
            let store = Arc::new(MemoryStore::default());
            store.insert_meeting(&stored_meeting(5)).await.unwrap();

            let state = test_state(store);
            let broadcaster = Arc::new(RecordingBroadcaster::default());

            let manager = resolve_meeting(&state, broadcaster.clone(), 5)
                .await
                .expect("stored meeting must resolve");
            manager.replay(None, None).await;

            let events = broadcaster.event_types();
            assert_eq!(
                events
                    .iter()
                    .filter(|e| **e == "conversation_update")
                    .count(),
                1
            );
            // The panicking fakes prove no generation/synthesis happened
            assert!(state.registry.get(5).is_some());
        }

        #[tokio::test]
        async fn test_live_meeting_is_rebound_not_rebuilt() {
            let store = Arc::new(MemoryStore::default());
            store.insert_meeting(&stored_meeting(6)).await.unwrap();
            let state = test_state(store);

            let first = Arc::new(RecordingBroadcaster::default());
            let resolved_first = resolve_meeting(&state, first, 6).await.unwrap();

            let second = Arc::new(RecordingBroadcaster::default());
            let resolved_second = resolve_meeting(&state, second.clone(), 6).await.unwrap();

            assert!(Arc::ptr_eq(&resolved_first, &resolved_second));

            // The fresh broadcaster now receives the replay
            resolved_second.replay(None, None).await;
            assert!(second
                .event_types()
                .contains(&"conversation_update"));
        }
    }
}
