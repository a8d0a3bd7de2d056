use std::collections::HashMap;
use std::path::Path;

use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue, SessionInputs};
use ort::value::Tensor;

/// Crossfade (in samples) used when concatenating chunk audio.
pub const CHUNK_CROSSFADE_SAMPLES: usize = 240;

/// `noise_scale` used by the VITS-family exports.
pub const NOISE_SCALE: f32 = 0.667;

/// `noise_scale_w` used by the VITS-family exports.
pub const NOISE_SCALE_W: f32 = 0.8;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Invalid tokens.txt: {0}")]
    Tokens(String),
    #[error("Invalid lexicon: {0}")]
    Lexicon(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
    #[error("Invalid engine configuration: {0}")]
    Config(String),
    #[error("Model produced no output")]
    EmptyOutput,
}

/// Initialize an ONNX session on the CPU provider.
pub(crate) fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
) -> Result<Session, EngineError> {
    log::info!("Loading ONNX model from {}", onnx_path.display());
    let providers = vec![CPUExecutionProvider::default().build()];

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_execution_providers(providers)?;

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(onnx_path)?)
}

/// Names of the session's inputs, in graph order.
pub(crate) fn input_names(session: &Session) -> Vec<String> {
    session
        .inputs()
        .iter()
        .map(|input| input.name().to_string())
        .collect()
}

/// Whether the named input expects int32 rather than float32.
pub(crate) fn input_is_int32(session: &Session, name: &str) -> bool {
    session
        .inputs()
        .iter()
        .find(|input| input.name() == name)
        .map(|input| {
            let type_str = format!("{:?}", input.dtype());
            type_str.contains("Int32") || type_str.contains("int32")
        })
        .unwrap_or(false)
}

/// Input feed keyed by input name.
pub(crate) type Feed = HashMap<String, SessionInputValue<'static>>;

pub(crate) fn i64_tensor<const N: usize>(
    shape: [usize; N],
    data: Vec<i64>,
) -> Result<SessionInputValue<'static>, EngineError> {
    Ok(Tensor::from_array((shape, data))?.into())
}

pub(crate) fn f32_tensor<const N: usize>(
    shape: [usize; N],
    data: Vec<f32>,
) -> Result<SessionInputValue<'static>, EngineError> {
    Ok(Tensor::from_array((shape, data))?.into())
}

pub(crate) fn i32_tensor<const N: usize>(
    shape: [usize; N],
    data: Vec<i32>,
) -> Result<SessionInputValue<'static>, EngineError> {
    Ok(Tensor::from_array((shape, data))?.into())
}

/// Run the session and copy out its first output as a flat waveform.
pub(crate) fn run_waveform(session: &mut Session, feed: Feed) -> Result<Vec<f32>, EngineError> {
    let outputs = session.run(SessionInputs::from(feed))?;
    let (_, first) = outputs.iter().next().ok_or(EngineError::EmptyOutput)?;
    let waveform = first.try_extract_array::<f32>()?;
    Ok(waveform.iter().copied().collect())
}

/// Build the feed for a VITS-style graph from its declared input names.
///
/// Piper exports take `input`, `input_lengths` and a packed `scales` vector;
/// re-exported VITS, MMS and Matcha graphs take `x`, `x_length` and one
/// scalar per scale. MeloTTS adds a `tones` sequence aligned with the tokens.
pub(crate) fn token_feed(
    names: &[String],
    tokens: &[i64],
    tones: &[i64],
    length_scale: f32,
    speaker: i64,
) -> Result<Feed, EngineError> {
    let n = tokens.len();
    let mut feed = Feed::new();
    for name in names {
        let value = match name.as_str() {
            "x" | "input" | "tokens" | "input_ids" => i64_tensor([1, n], tokens.to_vec())?,
            "x_length" | "x_lengths" | "input_lengths" => i64_tensor([1], vec![n as i64])?,
            "tones" | "tone" => i64_tensor([1, n], tone_values(tones, n))?,
            "noise_scale" => f32_tensor([1], vec![NOISE_SCALE])?,
            "length_scale" => f32_tensor([1], vec![length_scale])?,
            "noise_scale_w" => f32_tensor([1], vec![NOISE_SCALE_W])?,
            "scales" => f32_tensor([3], vec![NOISE_SCALE, length_scale, NOISE_SCALE_W])?,
            "sid" | "speaker_id" | "speaker" => i64_tensor([1], vec![speaker])?,
            other => {
                return Err(EngineError::Config(format!("unsupported model input '{other}'")));
            }
        };
        feed.insert(name.clone(), value);
    }
    Ok(feed)
}

/// Tones for an `n`-token sequence; zeros unless `tones` lines up with it.
pub(crate) fn tone_values(tones: &[i64], n: usize) -> Vec<i64> {
    if tones.len() == n {
        tones.to_vec()
    } else {
        if !tones.is_empty() {
            log::warn!("Got {} tones for {n} tokens, feeding zeros", tones.len());
        }
        vec![0; n]
    }
}

/// Split token ids into chunks of at most `max_len`, preferring to cut
/// after one of `break_ids`.
pub(crate) fn split_chunks(ids: &[i64], max_len: usize, break_ids: &[i64]) -> Vec<Vec<i64>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let max_len = max_len.max(1);

    while start < ids.len() {
        let end = (start + max_len).min(ids.len());
        if end == ids.len() {
            chunks.push(ids[start..end].to_vec());
            break;
        }

        let split = ids[start..end]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, id)| break_ids.contains(id))
            .map(|(i, _)| start + i + 1)
            .unwrap_or(end);

        chunks.push(ids[start..split].to_vec());
        start = split;
    }

    chunks
}

pub(crate) fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade_samples: usize) {
    let overlap = crossfade_samples.min(dst.len()).min(src.len());
    if overlap == 0 {
        dst.extend_from_slice(src);
        return;
    }

    let dst_start = dst.len() - overlap;
    for i in 0..overlap {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        let left = dst[dst_start + i] * (1.0 - t);
        let right = src[i] * t;
        dst[dst_start + i] = left + right;
    }

    dst.extend_from_slice(&src[overlap..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_input_is_one_chunk() {
        assert_eq!(split_chunks(&[1, 2, 3], 10, &[]), vec![vec![1, 2, 3]]);
        assert!(split_chunks(&[], 10, &[]).is_empty());
    }

    #[test]
    fn chunks_break_after_punctuation_ids() {
        let ids = [7, 7, 4, 7, 7, 7, 7, 4, 7];
        let chunks = split_chunks(&ids, 5, &[4]);
        assert_eq!(chunks, vec![vec![7, 7, 4], vec![7, 7, 7, 7, 4], vec![7]]);
    }

    #[test]
    fn chunks_hard_split_without_punctuation() {
        let ids: Vec<i64> = (0..12).collect();
        let chunks = split_chunks(&ids, 5, &[100]);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), ids);
    }

    #[test]
    fn crossfade_blends_the_overlap() {
        let mut dst = vec![1.0; 4];
        append_with_crossfade(&mut dst, &[0.0; 4], 2);
        assert_eq!(dst.len(), 6);
        assert_eq!(dst[0], 1.0);
        assert!(dst[2] < 1.0 && dst[2] > 0.0);
        assert!(dst[3] < dst[2]);
        assert_eq!(dst[5], 0.0);
    }

    #[test]
    fn crossfade_with_empty_destination_appends() {
        let mut dst = Vec::new();
        append_with_crossfade(&mut dst, &[0.5, 0.5], 240);
        assert_eq!(dst, vec![0.5, 0.5]);
    }

    #[test]
    fn token_feed_rejects_unknown_inputs() {
        let names = vec!["mystery".to_string(), "x".to_string()];
        match token_feed(&names, &[1, 2], &[], 1.0, 0) {
            Ok(_) => panic!("unknown input must be rejected"),
            Err(err) => assert!(err.to_string().contains("mystery")),
        }
    }

    #[test]
    fn tones_are_fed_only_when_aligned() {
        assert_eq!(tone_values(&[0, 3, 0], 3), vec![0, 3, 0]);
        assert_eq!(tone_values(&[], 2), vec![0, 0]);
        assert_eq!(tone_values(&[1], 2), vec![0, 0]);
    }
}
