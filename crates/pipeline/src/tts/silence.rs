//! Silent WAV buffers
//!
//! Used as the stand-in for a chunk whose synthesis failed, and by the
//! offline stub provider.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::PipelineError;

pub const WAV_CONTENT_TYPE: &str = "audio/wav";

/// Encode `duration_ms` of 16-bit mono silence
pub fn silence_wav(duration_ms: u32, sample_rate: u32) -> Result<Bytes, PipelineError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let samples = (sample_rate as u64 * duration_ms as u64 / 1000) as u32;

    let mut buffer = Cursor::new(Vec::with_capacity(44 + samples as usize * 2));
    {
        let mut writer = WavWriter::new(&mut buffer, spec)
            .map_err(|e| PipelineError::Audio(e.to_string()))?;
        let mut samples_writer = writer.get_i16_writer(samples);
        for _ in 0..samples {
            samples_writer.write_sample(0i16);
        }
        samples_writer
            .flush()
            .map_err(|e| PipelineError::Audio(e.to_string()))?;
        writer
            .finalize()
            .map_err(|e| PipelineError::Audio(e.to_string()))?;
    }

    Ok(Bytes::from(buffer.into_inner()))
}

/// Duration of a WAV buffer, read from its header
pub fn wav_duration(bytes: &[u8]) -> Option<Duration> {
    let reader = WavReader::new(Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(
        reader.duration() as f64 / spec.sample_rate as f64,
    ))
}
