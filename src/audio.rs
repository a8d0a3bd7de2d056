//! 16-bit PCM WAV encoding.

/// Size of the canonical RIFF/WAVE header written by [`to_wav`].
pub const WAV_HEADER_LEN: usize = 44;

const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Encode mono f32 samples as a 16-bit little-endian PCM WAV file.
///
/// The output is always `44 + 2 * samples.len()` bytes: a canonical
/// `RIFF`/`fmt `/`data` header followed by the samples. Samples are clamped
/// to `[-1.0, 1.0]`; negative values scale by `0x8000` and the rest by
/// `0x7FFF`, so full-scale input never overflows.
pub fn to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = (samples.len() * usize::from(block_align)) as u32;

    let mut out = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&CHANNELS.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for &sample in samples {
        out.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
    }
    out
}

/// Convert one float sample to 16-bit PCM.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Playback length of `sample_count` mono samples, in milliseconds.
pub fn duration_ms(sample_count: usize, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    sample_count as f64 / f64::from(sample_rate) * 1000.0
}
