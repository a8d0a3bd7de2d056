use crate::backend::BackendHandle;
use crate::{SynthesisEngine, SynthesisResult};

use super::config::{EngineConfig, ModelFiles};
use super::frontend::{split_sentences, Frontend};
use super::kokoro::KokoroModel;
use super::matcha::MatchaModel;
use super::model::{append_with_crossfade, EngineError, CHUNK_CROSSFADE_SAMPLES};
use super::vits::VitsModel;

/// Longest text piece handed to single- and two-stage models in one run.
const MAX_PIECE_CHARS: usize = 400;

enum Runner {
    Vits(VitsModel),
    Matcha(MatchaModel),
    Kokoro(KokoroModel),
}

/// ONNX synthesis engine for every supported architecture.
///
/// Built from an [`EngineConfig`] once the native runtime is loaded:
///
/// ```rust,no_run
/// use offline_tts::backend::NativeBackend;
/// use offline_tts::engines::onnx::{instantiate, EngineConfig, ModelFiles};
/// use offline_tts::SynthesisEngine;
///
/// let handle = NativeBackend::shared().load()?;
/// let config = EngineConfig {
///     files: ModelFiles::SingleStage {
///         model: "models/mms_eng/model.onnx".into(),
///         tokens: "models/mms_eng/tokens.txt".into(),
///         lexicon: None,
///         phoneme_data_dir: None,
///         dict_dir: None,
///     },
///     espeak_voice: "en".to_string(),
///     sample_rate: 16_000,
///     num_speakers: None,
///     num_threads: None,
/// };
/// let mut engine = instantiate(&handle, &config)?;
/// let result = engine.generate("Hello, world!", 1.0, 0)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct OnnxEngine {
    runner: Runner,
    frontend: Frontend,
    sample_rate: u32,
    num_speakers: Option<usize>,
    backend: BackendHandle,
}

/// Create an engine from `config`. The handle proves the runtime is loaded.
pub fn instantiate(
    handle: &BackendHandle,
    config: &EngineConfig,
) -> Result<OnnxEngine, EngineError> {
    let frontend = Frontend::for_files(&config.files, &config.espeak_voice)?;
    let threads = config.num_threads;

    let runner = match &config.files {
        ModelFiles::SingleStage { model, .. } => Runner::Vits(VitsModel::load(model, threads)?),
        ModelFiles::TwoStageVocoder {
            acoustic_model,
            vocoder,
            ..
        } => Runner::Matcha(MatchaModel::load(acoustic_model, vocoder, threads)?),
        ModelFiles::EmbeddingMultispeaker {
            model,
            voice_embeddings,
            ..
        } => Runner::Kokoro(KokoroModel::load(
            model,
            voice_embeddings,
            frontend.tokens(),
            threads,
        )?),
    };

    log::info!(
        "{} engine ready at {} Hz",
        config.files.architecture(),
        config.sample_rate
    );

    Ok(OnnxEngine {
        runner,
        frontend,
        sample_rate: config.sample_rate,
        num_speakers: config.num_speakers,
        backend: handle.clone(),
    })
}

impl OnnxEngine {
    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    fn generate_piece(
        &mut self,
        text: &str,
        speed: f32,
        speaker: usize,
    ) -> Result<Vec<f32>, EngineError> {
        let encoded = self.frontend.encode_with_tones(text)?;
        if encoded.ids.is_empty() {
            log::warn!("No tokens produced for text: {text:?}");
            return Ok(Vec::new());
        }
        let ids = &encoded.ids;
        match &mut self.runner {
            Runner::Vits(model) => model.generate(ids, &encoded.tones, speed, speaker),
            Runner::Matcha(model) => model.generate(ids, speed, speaker),
            Runner::Kokoro(model) => model.generate(ids, speed, speaker),
        }
    }
}

impl SynthesisEngine for OnnxEngine {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn num_speakers(&self) -> usize {
        match &self.runner {
            Runner::Kokoro(model) => model.num_speakers(),
            Runner::Vits(model) if model.is_multispeaker() => self.num_speakers.unwrap_or(1),
            _ => 1,
        }
    }

    fn generate(
        &mut self,
        text: &str,
        speed: f32,
        speaker: usize,
    ) -> Result<SynthesisResult, EngineError> {
        if let Runner::Vits(model) = &self.runner {
            if speaker > 0 && !model.is_multispeaker() {
                log::debug!("Model has a single speaker, ignoring speaker {speaker}");
            }
        }
        let speaker = speaker.min(self.num_speakers().saturating_sub(1));

        // Embedding models chunk by token count themselves.
        let pieces = match self.runner {
            Runner::Kokoro(_) => vec![text.to_string()],
            _ => split_sentences(text, MAX_PIECE_CHARS),
        };

        let mut samples = Vec::new();
        for piece in &pieces {
            let audio = self.generate_piece(piece, speed, speaker)?;
            if samples.is_empty() {
                samples = audio;
            } else {
                append_with_crossfade(&mut samples, &audio, CHUNK_CROSSFADE_SAMPLES);
            }
        }

        Ok(SynthesisResult {
            samples,
            sample_rate: self.sample_rate,
            word_boundaries: None,
        })
    }
}
