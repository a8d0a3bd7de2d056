use std::path::Path;

use ort::session::Session;

use super::model::{
    append_with_crossfade, f32_tensor, i32_tensor, i64_tensor, init_session, input_is_int32,
    input_names, run_waveform, split_chunks, EngineError, Feed, CHUNK_CROSSFADE_SAMPLES,
};
use super::tokens::TokenTable;
use super::voices::{VoiceStore, STYLE_DIM};

/// Maximum number of phoneme tokens per chunk (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

const BREAK_SYMBOLS: [char; 6] = [';', ':', ',', '.', '!', '?'];

/// Embedding multi-speaker model (Kokoro): tokens plus a per-speaker style
/// vector in, waveform out.
pub struct KokoroModel {
    session: Session,
    voices: VoiceStore,
    /// Detected input name: "input_ids" or "tokens"
    tokens_input_name: String,
    /// True if the speed input expects int32, false for float32
    speed_is_int32: bool,
    break_ids: Vec<i64>,
}

impl KokoroModel {
    pub fn load(
        model: &Path,
        voice_embeddings: &Path,
        tokens: &TokenTable,
        num_threads: Option<usize>,
    ) -> Result<Self, EngineError> {
        let session = init_session(model, num_threads)?;

        let tokens_input_name = detect_tokens_input(&input_names(&session));
        let speed_is_int32 = input_is_int32(&session, "speed");
        log::info!(
            "Detected: tokens_input='{}', speed_is_int32={}",
            tokens_input_name,
            speed_is_int32
        );

        let voices = VoiceStore::load(voice_embeddings)?;
        let break_ids = BREAK_SYMBOLS
            .iter()
            .filter_map(|&ch| tokens.get_char(ch))
            .collect();

        Ok(Self {
            session,
            voices,
            tokens_input_name,
            speed_is_int32,
            break_ids,
        })
    }

    pub fn num_speakers(&self) -> usize {
        self.voices.num_speakers()
    }

    /// Synthesize phoneme ids, chunking long sequences.
    ///
    /// The style index stays at the full sequence length for every chunk so
    /// adjacent chunks keep the same prosody.
    pub fn generate(
        &mut self,
        ids: &[i64],
        speed: f32,
        speaker: usize,
    ) -> Result<Vec<f32>, EngineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let style_idx = ids.len();
        let chunks = if ids.len() > MAX_PHONEME_LEN {
            log::debug!(
                "Phoneme sequence exceeded limit ({} > {}), chunking",
                ids.len(),
                MAX_PHONEME_LEN
            );
            split_chunks(ids, MAX_PHONEME_LEN, &self.break_ids)
        } else {
            vec![ids.to_vec()]
        };

        let style = *self.voices.get_style(speaker, style_idx);
        let mut combined = Vec::with_capacity(ids.len() * 300);

        for chunk_ids in &chunks {
            let audio = self.synthesize_chunk(chunk_ids, &style, speed)?;
            if audio.is_empty() {
                continue;
            }

            if combined.is_empty() {
                combined.extend_from_slice(&audio);
            } else {
                append_with_crossfade(&mut combined, &audio, CHUNK_CROSSFADE_SAMPLES);
            }
        }

        Ok(combined)
    }

    fn synthesize_chunk(
        &mut self,
        tokens: &[i64],
        style: &[f32; STYLE_DIM],
        speed: f32,
    ) -> Result<Vec<f32>, EngineError> {
        let seq_len = tokens.len() + 2;
        let mut feed = Feed::new();
        feed.insert(
            self.tokens_input_name.clone(),
            i64_tensor([1, seq_len], padded(tokens))?,
        );
        feed.insert("style".to_string(), f32_tensor([1, STYLE_DIM], style.to_vec())?);
        let speed = if self.speed_is_int32 {
            i32_tensor([1], vec![speed.round() as i32])?
        } else {
            f32_tensor([1], vec![speed])?
        };
        feed.insert("speed".to_string(), speed);

        run_waveform(&mut self.session, feed)
    }
}

/// `[0, t1..tN, 0]`
fn padded(tokens: &[i64]) -> Vec<i64> {
    let mut padded = vec![0i64; tokens.len() + 2];
    padded[1..=tokens.len()].copy_from_slice(tokens);
    padded
}

/// The token input is named "input_ids" or "tokens" depending on the export.
fn detect_tokens_input(names: &[String]) -> String {
    names
        .iter()
        .find(|name| *name == "input_ids" || *name == "tokens")
        .cloned()
        .unwrap_or_else(|| "input_ids".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_both_ends_with_zero() {
        assert_eq!(padded(&[5, 6, 7]), vec![0, 5, 6, 7, 0]);
        assert_eq!(padded(&[]), vec![0, 0]);
    }

    #[test]
    fn detects_token_input_name() {
        let names = |n: &[&str]| n.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(detect_tokens_input(&names(&["tokens", "style", "speed"])), "tokens");
        assert_eq!(detect_tokens_input(&names(&["style", "input_ids"])), "input_ids");
        assert_eq!(detect_tokens_input(&names(&["x"])), "input_ids");
    }
}
