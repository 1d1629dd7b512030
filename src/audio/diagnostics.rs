//! # Signal Diagnostics Engine
//!
//! Streaming inspection of uncompressed PCM WAV containers. Produces the
//! structural facts (channels, sample rate, duration) and perceptual loudness
//! metrics (RMS level in dBFS, peak ratio) used to debug client recordings —
//! silent microphones, wrong gain, codec mix-ups.
//!
//! ## Streaming contract:
//! The sample payload is scanned in fixed-size chunks, never loaded whole,
//! so peak memory stays O(chunk size) regardless of file length.
//!
//! ## Failure contract:
//! Diagnostics are best-effort. The transcription flow treats every error
//! from [`inspect`] as "diagnostics omitted" and proceeds; nothing here may
//! abort a transcription.

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// Bytes scanned per read. Even, so 16-bit samples never straddle a chunk.
const CHUNK_BYTES: usize = 8192;

/// Loudness and structure metrics for one PCM container.
///
/// Either the whole object exists or it does not: a container that cannot be
/// parsed yields an error, never a zero-filled struct.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioDiagnostics {
    /// Interleaved channel count from the format chunk
    pub channels: u16,

    /// Frames per second from the format chunk
    pub sample_rate: u32,

    /// `frames / sample_rate`; absent when the header declares no rate
    pub duration_seconds: Option<f64>,

    /// RMS level relative to full scale, in dB; `-inf` for silence and for
    /// zero-length payloads
    pub rms_decibels: f64,

    /// Peak absolute sample over full scale, in [0, 1]; absent when the
    /// payload holds no samples at all
    pub peak_ratio: Option<f64>,
}

/// Diagnostics failures. Both are recoverable: the caller records the
/// failure and continues without a diagnostics block.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticsError {
    /// The referenced audio file does not exist
    NotFound(String),

    /// Not an uncompressed PCM WAV we can inspect (bad header, compressed
    /// codec, unsupported sample width, truncated payload)
    UnsupportedFormat(String),
}

impl std::fmt::Display for DiagnosticsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticsError::NotFound(path) => write!(f, "audio file not found: {}", path),
            DiagnosticsError::UnsupportedFormat(msg) => write!(f, "unsupported audio format: {}", msg),
        }
    }
}

/// Format facts pulled from the `fmt ` chunk, shared with the decode path.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub sample_width: u16,
    pub block_align: u16,
}

impl WavFormat {
    /// Largest representable absolute sample value for this width.
    pub fn max_amplitude(&self) -> f64 {
        ((1u32 << (8 * self.sample_width - 1)) - 1) as f64
    }

    /// Bytes per frame, falling back to the computed value when the header
    /// declares a zero block alignment.
    pub fn frame_bytes(&self) -> u32 {
        if self.block_align > 0 {
            self.block_align as u32
        } else {
            self.channels as u32 * self.sample_width as u32
        }
    }
}

/// A positioned reader plus the parsed format: the cursor sits at the start
/// of the sample payload, `data_len` bytes long.
pub(crate) struct WavReader {
    pub format: WavFormat,
    pub data_len: u32,
    pub reader: BufReader<File>,
}

/// Open a WAV container and walk its chunks up to the sample data.
///
/// Accepts PCM (format tag 1) with 8- or 16-bit samples only; everything
/// else is `UnsupportedFormat`.
pub(crate) fn open_wav(path: &Path) -> Result<WavReader, DiagnosticsError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DiagnosticsError::NotFound(path.display().to_string())
        } else {
            DiagnosticsError::UnsupportedFormat(format!("cannot open {}: {}", path.display(), e))
        }
    })?;
    let mut reader = BufReader::new(file);

    let bad = |msg: &str| DiagnosticsError::UnsupportedFormat(msg.to_string());
    let truncated = |_| DiagnosticsError::UnsupportedFormat("truncated container header".to_string());

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(truncated)?;
    if &magic != b"RIFF" {
        return Err(bad("missing RIFF magic"));
    }
    let _riff_len = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    reader.read_exact(&mut magic).map_err(truncated)?;
    if &magic != b"WAVE" {
        return Err(bad("missing WAVE form type"));
    }

    let mut format: Option<WavFormat> = None;

    // Chunk walk: `fmt ` must precede `data`; unknown chunks are skipped
    // (sizes are padded to even per RIFF).
    loop {
        let mut id = [0u8; 4];
        if reader.read_exact(&mut id).is_err() {
            return Err(bad("no data chunk found"));
        }
        let len = reader.read_u32::<LittleEndian>().map_err(truncated)?;

        match &id {
            b"fmt " => {
                if len < 16 {
                    return Err(bad("format chunk too short"));
                }
                let audio_format = reader.read_u16::<LittleEndian>().map_err(truncated)?;
                if audio_format != 1 {
                    return Err(DiagnosticsError::UnsupportedFormat(format!(
                        "compressed or non-PCM format tag: {}",
                        audio_format
                    )));
                }
                let channels = reader.read_u16::<LittleEndian>().map_err(truncated)?;
                if channels == 0 {
                    return Err(bad("zero channels"));
                }
                let sample_rate = reader.read_u32::<LittleEndian>().map_err(truncated)?;
                let _byte_rate = reader.read_u32::<LittleEndian>().map_err(truncated)?;
                let block_align = reader.read_u16::<LittleEndian>().map_err(truncated)?;
                let bits_per_sample = reader.read_u16::<LittleEndian>().map_err(truncated)?;
                if bits_per_sample != 8 && bits_per_sample != 16 {
                    return Err(DiagnosticsError::UnsupportedFormat(format!(
                        "unsupported sample width: {} bits",
                        bits_per_sample
                    )));
                }
                // Skip any extension bytes the format chunk declares.
                let extra = (len - 16) as i64 + (len % 2) as i64;
                if extra > 0 {
                    reader.seek(SeekFrom::Current(extra)).map_err(truncated)?;
                }
                format = Some(WavFormat {
                    channels,
                    sample_rate,
                    sample_width: bits_per_sample / 8,
                    block_align,
                });
            }
            b"data" => {
                let format = format.ok_or_else(|| bad("data chunk before format chunk"))?;
                return Ok(WavReader {
                    format,
                    data_len: len,
                    reader,
                });
            }
            _ => {
                let skip = len as i64 + (len % 2) as i64;
                reader.seek(SeekFrom::Current(skip)).map_err(truncated)?;
            }
        }
    }
}

/// Compute diagnostics for the container at `path`.
///
/// ## Metrics:
/// - `rms_decibels = 20·log10(RMS / maxAmplitude)` over every interleaved
///   sample, all channels weighted uniformly; `-inf` when RMS is zero
/// - `peak_ratio = maxAbsSample / maxAmplitude`
/// - 8-bit samples are unsigned and re-centered at 128 before use; 16-bit
///   samples are signed little-endian
pub fn inspect(path: &Path) -> Result<AudioDiagnostics, DiagnosticsError> {
    let WavReader {
        format,
        data_len,
        mut reader,
    } = open_wav(path)?;

    let frames = data_len / format.frame_bytes().max(1);
    let duration_seconds = if format.sample_rate > 0 {
        Some(frames as f64 / format.sample_rate as f64)
    } else {
        None
    };

    let mut sum_squares = 0.0f64;
    let mut peak = 0.0f64;
    let mut sample_count: u64 = 0;

    let mut remaining = data_len as usize;
    let mut chunk = vec![0u8; CHUNK_BYTES];
    while remaining > 0 {
        let want = remaining.min(CHUNK_BYTES);
        reader
            .read_exact(&mut chunk[..want])
            .map_err(|_| DiagnosticsError::UnsupportedFormat("truncated sample data".to_string()))?;
        remaining -= want;

        if format.sample_width == 1 {
            for &byte in &chunk[..want] {
                // 8-bit WAV is unsigned, centered at 128.
                let value = byte as f64 - 128.0;
                sample_count += 1;
                sum_squares += value * value;
                peak = peak.max(value.abs());
            }
        } else {
            if want % 2 != 0 {
                return Err(DiagnosticsError::UnsupportedFormat(
                    "sample data not aligned to 16-bit samples".to_string(),
                ));
            }
            let mut cursor = Cursor::new(&chunk[..want]);
            while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
                let value = sample as f64;
                sample_count += 1;
                sum_squares += value * value;
                peak = peak.max(value.abs());
            }
        }
    }

    let max_amplitude = format.max_amplitude();
    let (rms_decibels, peak_ratio) = if sample_count > 0 {
        let rms = (sum_squares / sample_count as f64).sqrt();
        let db = if rms <= 0.0 {
            f64::NEG_INFINITY
        } else {
            20.0 * (rms / max_amplitude).log10()
        };
        (db, Some(peak / max_amplitude))
    } else {
        (f64::NEG_INFINITY, None)
    };

    Ok(AudioDiagnostics {
        channels: format.channels,
        sample_rate: format.sample_rate,
        duration_seconds,
        rms_decibels,
        peak_ratio,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::Write;
    use std::path::PathBuf;

    /// Write a minimal PCM WAV file for tests.
    pub(crate) fn write_wav(
        dir: &Path,
        name: &str,
        channels: u16,
        sample_rate: u32,
        sample_width: u16,
        data: &[u8],
    ) -> PathBuf {
        let path = dir.join(name);
        let mut out = Vec::new();
        out.write_all(b"RIFF").unwrap();
        out.write_u32::<LittleEndian>(36 + data.len() as u32).unwrap();
        out.write_all(b"WAVE").unwrap();
        out.write_all(b"fmt ").unwrap();
        out.write_u32::<LittleEndian>(16).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u16::<LittleEndian>(channels).unwrap();
        out.write_u32::<LittleEndian>(sample_rate).unwrap();
        out.write_u32::<LittleEndian>(sample_rate * channels as u32 * sample_width as u32)
            .unwrap();
        out.write_u16::<LittleEndian>(channels * sample_width).unwrap();
        out.write_u16::<LittleEndian>(sample_width * 8).unwrap();
        out.write_all(b"data").unwrap();
        out.write_u32::<LittleEndian>(data.len() as u32).unwrap();
        out.write_all(data).unwrap();
        std::fs::write(&path, out).unwrap();
        path
    }

    pub(crate) fn pcm16(samples: &[i16]) -> Vec<u8> {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            data.write_i16::<LittleEndian>(s).unwrap();
        }
        data
    }

    #[test]
    fn test_constant_amplitude_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![1000i16; 4000];
        let path = write_wav(dir.path(), "tone.wav", 1, 16000, 2, &pcm16(&samples));

        let diag = inspect(&path).unwrap();
        assert_eq!(diag.channels, 1);
        assert_eq!(diag.sample_rate, 16000);
        assert_eq!(diag.duration_seconds, Some(0.25));

        let expected_ratio: f64 = 1000.0 / 32767.0;
        let expected_db = 20.0 * expected_ratio.log10();
        assert!((diag.peak_ratio.unwrap() - expected_ratio).abs() < 1e-12);
        assert!((diag.rms_decibels - expected_db).abs() < 1e-9);
    }

    #[test]
    fn test_silence_is_negative_infinity() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "silence.wav", 1, 8000, 2, &pcm16(&vec![0i16; 800]));

        let diag = inspect(&path).unwrap();
        assert_eq!(diag.rms_decibels, f64::NEG_INFINITY);
        assert_eq!(diag.peak_ratio, Some(0.0));
    }

    #[test]
    fn test_empty_payload_has_no_peak() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "empty.wav", 1, 16000, 2, &[]);

        let diag = inspect(&path).unwrap();
        assert_eq!(diag.rms_decibels, f64::NEG_INFINITY);
        assert_eq!(diag.peak_ratio, None);
        assert_eq!(diag.duration_seconds, Some(0.0));
    }

    #[test]
    fn test_eight_bit_samples_recentered() {
        let dir = tempfile::tempdir().unwrap();
        // Unsigned 8-bit: 192 re-centers to +64 of a 127 full scale.
        let path = write_wav(dir.path(), "u8.wav", 1, 8000, 1, &[192u8; 100]);

        let diag = inspect(&path).unwrap();
        assert!((diag.peak_ratio.unwrap() - 64.0 / 127.0).abs() < 1e-12);
    }

    #[test]
    fn test_stereo_counts_all_channels() {
        let dir = tempfile::tempdir().unwrap();
        // Left channel 300, right channel -600, interleaved.
        let mut samples = Vec::new();
        for _ in 0..100 {
            samples.push(300i16);
            samples.push(-600i16);
        }
        let path = write_wav(dir.path(), "stereo.wav", 2, 16000, 2, &pcm16(&samples));

        let diag = inspect(&path).unwrap();
        assert_eq!(diag.channels, 2);
        assert!((diag.peak_ratio.unwrap() - 600.0 / 32767.0).abs() < 1e-12);
        let expected_rms = ((300.0f64.powi(2) + 600.0f64.powi(2)) / 2.0).sqrt();
        let expected_db = 20.0 * (expected_rms / 32767.0).log10();
        assert!((diag.rms_decibels - expected_db).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_non_wav_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-audio.wav");
        std::fs::write(&path, b"ID3\x04this is an mp3, honest").unwrap();

        assert!(matches!(
            inspect(&path),
            Err(DiagnosticsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_rejects_unsupported_width() {
        let dir = tempfile::tempdir().unwrap();
        // 24-bit header; width is checked before any sample is read.
        let path = dir.path().join("wide.wav");
        let mut out = Vec::new();
        out.write_all(b"RIFF").unwrap();
        out.write_u32::<LittleEndian>(36).unwrap();
        out.write_all(b"WAVE").unwrap();
        out.write_all(b"fmt ").unwrap();
        out.write_u32::<LittleEndian>(16).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u32::<LittleEndian>(44100).unwrap();
        out.write_u32::<LittleEndian>(44100 * 3).unwrap();
        out.write_u16::<LittleEndian>(3).unwrap();
        out.write_u16::<LittleEndian>(24).unwrap();
        std::fs::write(&path, out).unwrap();

        match inspect(&path) {
            Err(DiagnosticsError::UnsupportedFormat(msg)) => {
                assert!(msg.contains("24"), "unexpected message: {}", msg)
            }
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        // Header claims 4000 bytes of samples but only 10 follow.
        let path = dir.path().join("cut.wav");
        let mut out = Vec::new();
        out.write_all(b"RIFF").unwrap();
        out.write_u32::<LittleEndian>(36 + 4000).unwrap();
        out.write_all(b"WAVE").unwrap();
        out.write_all(b"fmt ").unwrap();
        out.write_u32::<LittleEndian>(16).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u16::<LittleEndian>(1).unwrap();
        out.write_u32::<LittleEndian>(16000).unwrap();
        out.write_u32::<LittleEndian>(32000).unwrap();
        out.write_u16::<LittleEndian>(2).unwrap();
        out.write_u16::<LittleEndian>(16).unwrap();
        out.write_all(b"data").unwrap();
        out.write_u32::<LittleEndian>(4000).unwrap();
        out.write_all(&[0u8; 10]).unwrap();
        std::fs::write(&path, out).unwrap();

        assert!(matches!(
            inspect(&path),
            Err(DiagnosticsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        assert!(matches!(
            inspect(Path::new("/nonexistent/audio.wav")),
            Err(DiagnosticsError::NotFound(_))
        ));
    }
}
