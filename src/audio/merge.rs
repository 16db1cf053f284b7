//! # Multi-Chunk Audio Merging
//!
//! Some synthesis paths return several audio chunks for one utterance
//! (sentence-chunked wrap-up summaries). The chunks are concatenated into
//! one contiguous track, and every chunk's caption timings are shifted by
//! the accumulated duration of the chunks before it. Durations come from
//! probing the chunk's container metadata, never from raw byte length.

use crate::audio::probe::DurationProbe;
use crate::error::AppResult;
use crate::meeting::conversation::SentenceTiming;
use crate::synthesis::SynthesizedChunk;

/// One contiguous track with absolute caption timings.
#[derive(Debug, Clone)]
pub struct MergedAudio {
    pub audio: Vec<u8>,
    pub sentences: Vec<SentenceTiming>,
}

/// Concatenate `chunks` in order, rebasing each chunk's caption timings
/// onto the running total of prior-chunk durations.
pub fn merge_chunks(chunks: &[SynthesizedChunk], probe: &dyn DurationProbe) -> AppResult<MergedAudio> {
    let mut audio = Vec::new();
    let mut sentences = Vec::new();
    let mut offset = 0.0f64;

    for chunk in chunks {
        let duration = probe.duration_secs(&chunk.audio)?;

        for timing in &chunk.sentences {
            sentences.push(SentenceTiming {
                text: timing.text.clone(),
                start: timing.start + offset,
                end: timing.end + offset,
            });
        }

        audio.extend_from_slice(&chunk.audio);
        offset += duration;
    }

    Ok(MergedAudio { audio, sentences })
}
