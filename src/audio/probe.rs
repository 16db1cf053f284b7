//! # Audio Duration Probing
//!
//! Caption-offset reconstruction needs each chunk's real playback
//! duration. Byte length says nothing about duration for compressed
//! audio, so the duration is read from the container itself: track
//! metadata when the encoder wrote it, otherwise a packet walk over the
//! actual frames.

use std::io::Cursor;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{AppError, AppResult};

/// Reads the playback duration of an encoded audio buffer.
///
/// A trait seam so the merge logic is testable without real codec data.
pub trait DurationProbe: Send + Sync {
    fn duration_secs(&self, audio: &[u8]) -> AppResult<f64>;
}

/// Symphonia-backed probe for provider output (mp3).
pub struct SymphoniaProbe;

impl DurationProbe for SymphoniaProbe {
    fn duration_secs(&self, audio: &[u8]) -> AppResult<f64> {
        let source = Cursor::new(audio.to_vec());
        let stream = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        hint.with_extension("mp3");

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AppError::Provider(format!("unreadable audio container: {}", e)))?;

        let mut format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| AppError::Provider("audio container has no tracks".to_string()))?;

        let params = track.codec_params.clone();
        let time_base = params
            .time_base
            .ok_or_else(|| AppError::Provider("audio track has no time base".to_string()))?;

        // Fast path: the encoder declared the frame count up front.
        if let Some(n_frames) = params.n_frames {
            let time = time_base.calc_time(n_frames);
            return Ok(time.seconds as f64 + time.frac);
        }

        // Otherwise walk the packets and sum their durations.
        let mut total_ts = 0u64;
        loop {
            match format.next_packet() {
                Ok(packet) => total_ts += packet.dur,
                Err(symphonia::core::errors::Error::IoError(ref io))
                    if io.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    return Err(AppError::Provider(format!(
                        "failed walking audio packets: {}",
                        e
                    )))
                }
            }
        }

        let time = time_base.calc_time(total_ts);
        Ok(time.seconds as f64 + time.frac)
    }
}
