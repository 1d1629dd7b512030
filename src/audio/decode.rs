//! # PCM Decoding
//!
//! Converts an uploaded WAV file into the mono 16 kHz f32 stream the speech
//! recognition model expects. Shares the container parser with the
//! diagnostics engine, so the two agree on what counts as a valid file.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};
use std::path::Path;

use super::diagnostics::{open_wav, DiagnosticsError, WavReader};

/// Target rate for recognition input.
pub const RECOGNITION_SAMPLE_RATE: u32 = 16_000;

/// Decode a WAV file to mono f32 samples at [`RECOGNITION_SAMPLE_RATE`].
///
/// Channels are averaged into one; the result is linearly resampled when the
/// source rate differs. Samples are normalized to [-1.0, 1.0].
pub fn decode_to_mono_16k(path: &Path) -> Result<Vec<f32>, DiagnosticsError> {
    let WavReader {
        format,
        data_len,
        mut reader,
    } = open_wav(path)?;

    if format.sample_rate == 0 {
        return Err(DiagnosticsError::UnsupportedFormat(
            "zero sample rate".to_string(),
        ));
    }

    let mut raw = vec![0u8; data_len as usize];
    reader
        .read_exact(&mut raw)
        .map_err(|_| DiagnosticsError::UnsupportedFormat("truncated sample data".to_string()))?;

    let scale = format.max_amplitude() as f32;
    let samples: Vec<f32> = if format.sample_width == 1 {
        raw.iter().map(|&b| (b as f32 - 128.0) / scale).collect()
    } else {
        let mut cursor = Cursor::new(&raw[..raw.len() - raw.len() % 2]);
        let mut out = Vec::with_capacity(raw.len() / 2);
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            out.push(sample as f32 / scale);
        }
        out
    };

    // Average interleaved channels down to mono.
    let channels = format.channels as usize;
    let mono: Vec<f32> = if channels <= 1 {
        samples
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    if format.sample_rate == RECOGNITION_SAMPLE_RATE {
        return Ok(mono);
    }
    Ok(resample_linear(&mono, format.sample_rate, RECOGNITION_SAMPLE_RATE))
}

/// Linear interpolation resampler. Good enough for speech recognition input;
/// anything fancier belongs in the client's capture pipeline.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = input[idx];
        let b = if idx + 1 < input.len() { input[idx + 1] } else { a };
        out.push(a + (b - a) * frac);
    }
    out
}
