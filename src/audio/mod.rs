//! # Audio Pipeline
//!
//! Speech synthesis for conversation messages: a bounded FIFO task queue,
//! the per-task normalization/synthesis/merge pipeline, and container
//! probing for caption-offset reconstruction.
//!
//! Ordering contract: within one meeting, audio resolutions are delivered
//! in submission order; across meetings, tasks only share the process-wide
//! concurrency ceiling.

pub mod merge;
pub mod probe;
pub mod queue;
pub mod system;

pub use queue::{AudioFailure, AudioListener, AudioOutcome, AudioTask, ResolvedAudio};
pub use system::AudioSystem;
