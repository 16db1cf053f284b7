//! # Audio Task Queue
//!
//! Synthesis tasks are admitted in submission order with a configured
//! ceiling on how many run at once; the overflow waits in a FIFO backlog.
//! Completion (success or terminal failure) frees a slot and admits the
//! next backlog entry.
//!
//! Ordering guarantee: resolutions for one meeting are delivered in
//! submission order even though provider latency varies. A finished
//! task's resolution is withheld until every earlier-submitted task for
//! that meeting has already resolved.
//!
//! The queue is a single dispatcher task fed by a channel; workers only
//! run the pipeline and report back, so all admission and ordering state
//! lives in one place.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::meeting::conversation::{Character, MessageKind, SentenceTiming};

/// One unit of synthesis work. Ephemeral: lives in the queue only, never
/// persisted.
pub struct AudioTask {
    pub meeting_id: i64,
    pub message_id: Uuid,
    pub kind: MessageKind,
    /// Display text; the pipeline strips markup before any provider step
    pub text: String,
    pub speaker: Character,
    pub language: Option<String>,
    /// Receives the resolution, in per-meeting submission order
    pub listener: Arc<dyn AudioListener>,
}

/// Successful synthesis output for one message.
#[derive(Debug, Clone)]
pub struct ResolvedAudio {
    pub audio: Vec<u8>,
    pub sentences: Vec<SentenceTiming>,
}

/// Terminal failure for one task.
#[derive(Debug, Clone)]
pub struct AudioFailure {
    pub message: String,
    pub code: &'static str,
    /// Storage faults end the meeting; provider faults do not
    pub fatal: bool,
}

/// Resolution of one task, delivered to its listener.
pub struct AudioOutcome {
    pub meeting_id: i64,
    pub message_id: Uuid,
    pub kind: MessageKind,
    pub result: Result<ResolvedAudio, AudioFailure>,
}

/// Who hears about resolved audio. Implementations must not block: they
/// broadcast and hand further work to their own tasks.
pub trait AudioListener: Send + Sync {
    fn audio_resolved(&self, outcome: AudioOutcome);
}

/// Runs the synthesis pipeline for one task. Seam between the queue's
/// scheduling and the pipeline's provider work.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    async fn process(&self, task: &AudioTask) -> Result<ResolvedAudio, AudioFailure>;
}

enum QueueEvent {
    Submit(AudioTask),
    Complete {
        meeting_id: i64,
        seq: u64,
        outcome: AudioOutcome,
        listener: Arc<dyn AudioListener>,
    },
}

/// Handle for submitting tasks. Cheap to clone.
#[derive(Clone)]
pub struct AudioQueue {
    tx: mpsc::UnboundedSender<QueueEvent>,
}

impl AudioQueue {
    /// Start the dispatcher with the given in-flight ceiling.
    pub fn start(processor: Arc<dyn TaskProcessor>, ceiling: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            processor,
            ceiling: ceiling.max(1),
            tx: tx.clone(),
            backlog: VecDeque::new(),
            in_flight: 0,
            submit_seq: HashMap::new(),
            gates: HashMap::new(),
        };
        tokio::spawn(dispatcher.run(rx));
        Self { tx }
    }

    /// Enqueue a task. Submission order defines resolution order within a
    /// meeting.
    pub fn submit(&self, task: AudioTask) {
        if self.tx.send(QueueEvent::Submit(task)).is_err() {
            error!("audio queue dispatcher is gone; dropping task");
        }
    }
}

/// Per-meeting in-order delivery state.
#[derive(Default)]
struct MeetingGate {
    next_seq: u64,
    held: BTreeMap<u64, (AudioOutcome, Arc<dyn AudioListener>)>,
}

struct Dispatcher {
    processor: Arc<dyn TaskProcessor>,
    ceiling: usize,
    tx: mpsc::UnboundedSender<QueueEvent>,
    backlog: VecDeque<(u64, AudioTask)>,
    in_flight: usize,
    /// Next submission sequence number per meeting
    submit_seq: HashMap<i64, u64>,
    gates: HashMap<i64, MeetingGate>,
}

impl Dispatcher {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<QueueEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                QueueEvent::Submit(task) => {
                    let seq_counter = self.submit_seq.entry(task.meeting_id).or_insert(0);
                    let seq = *seq_counter;
                    *seq_counter += 1;
                    self.backlog.push_back((seq, task));
                    self.admit();
                }
                QueueEvent::Complete {
                    meeting_id,
                    seq,
                    outcome,
                    listener,
                } => {
                    self.in_flight -= 1;
                    self.resolve_in_order(meeting_id, seq, outcome, listener);
                    self.admit();
                }
            }
        }
    }

    /// Move backlog entries into flight while a slot is free.
    fn admit(&mut self) {
        while self.in_flight < self.ceiling {
            let Some((seq, task)) = self.backlog.pop_front() else {
                break;
            };
            self.in_flight += 1;

            let processor = self.processor.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let result = processor.process(&task).await;
                let outcome = AudioOutcome {
                    meeting_id: task.meeting_id,
                    message_id: task.message_id,
                    kind: task.kind,
                    result,
                };
                let _ = tx.send(QueueEvent::Complete {
                    meeting_id: task.meeting_id,
                    seq,
                    outcome,
                    listener: task.listener,
                });
            });
        }
    }

    /// Hold resolutions until every earlier-submitted task for the same
    /// meeting has resolved, then flush in sequence order.
    fn resolve_in_order(
        &mut self,
        meeting_id: i64,
        seq: u64,
        outcome: AudioOutcome,
        listener: Arc<dyn AudioListener>,
    ) {
        let gate = self.gates.entry(meeting_id).or_default();
        gate.held.insert(seq, (outcome, listener));

        while let Some((outcome, listener)) = gate.held.remove(&gate.next_seq) {
            gate.next_seq += 1;
            debug!(
                meeting_id,
                message_id = %outcome.message_id,
                "delivering audio resolution"
            );
            listener.audio_resolved(outcome);
        }
    }
}
