//! Voice selection and synthesis.
//!
//! [`VoiceController`] ties the pieces together for one active voice:
//!
//! ```text
//! Unconfigured → Resolving → Ready ─────────────→ Initialized
//!                          ↘ Acquiring → Ready ↗
//!                                      ↘ Failed → MockReady
//! ```
//!
//! A voice whose files cannot be acquired, or whose engine cannot start
//! because the native runtime is missing, ends in `MockReady`: synthesis
//! still returns a valid WAV holding quiet noise of a plausible length. The
//! reason is available from [`VoiceController::readiness`]. With
//! [`TtsConfig::strict`] set, these cases are errors instead.

use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use crate::acquire::AcquisitionManager;
use crate::assets::{self, ResolvedPaths};
use crate::audio::{to_wav, WAV_HEADER_LEN};
use crate::backend::{EnvironmentCheck, NativeBackend};
use crate::boundary::{boundaries_for, NativeBoundaries, WordBoundary};
use crate::catalog::{ModelCatalog, ModelDescriptor};
use crate::config::TtsConfig;
use crate::engines::onnx::{instantiate, EngineConfig, Rate, SpeedTable};
use crate::error::TtsError;
use crate::SynthesisEngine;

/// Bytes per item yielded by [`AudioChunks`].
pub const STREAM_CHUNK_BYTES: usize = 4096;

/// Placeholder speech length per word in degraded mode.
const MOCK_SECONDS_PER_WORD: f64 = 0.35;

/// Peak amplitude of placeholder noise.
const MOCK_AMPLITUDE: f32 = 0.02;

/// Sample rate used for placeholder audio when no voice is known.
const FALLBACK_SAMPLE_RATE: u32 = 22_050;

/// Lifecycle of the active voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Unconfigured,
    Resolving,
    Acquiring,
    Ready,
    Failed,
    Initialized,
    MockReady,
}

/// Why synthesis is producing placeholder audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    /// No voice has been selected yet.
    NoVoice,
    /// The voice files could not be downloaded or extracted.
    Acquisition(String),
    /// The native runtime is not available on this host.
    Backend(EnvironmentCheck),
    /// The engine could not be created or failed while generating.
    Engine(String),
}

impl std::fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradedReason::NoVoice => f.write_str("no voice selected"),
            DegradedReason::Acquisition(cause) => write!(f, "voice files unavailable: {cause}"),
            DegradedReason::Backend(check) => {
                write!(f, "native backend unavailable: {}", check.issues.join("; "))
            }
            DegradedReason::Engine(cause) => write!(f, "engine failed: {cause}"),
        }
    }
}

/// Whether synthesis runs the real model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Degraded(DegradedReason),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Per-request synthesis options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisOptions {
    pub rate: Rate,
    /// Speaker of a multi-speaker model; clamped to the available range.
    pub speaker: Option<usize>,
    /// Compute word boundaries for [`VoiceController::synthesize_stream`].
    pub use_word_boundary: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            rate: Rate::Medium,
            speaker: None,
            use_word_boundary: true,
        }
    }
}

/// WAV bytes handed out in fixed-size pieces.
#[derive(Debug, Clone)]
pub struct AudioChunks {
    data: Vec<u8>,
    pos: usize,
    chunk_size: usize,
}

impl AudioChunks {
    pub fn new(data: Vec<u8>, chunk_size: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Total size of the stream in bytes.
    pub fn total_len(&self) -> usize {
        self.data.len()
    }
}

impl Iterator for AudioChunks {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.data.len() {
            return None;
        }
        let end = (self.pos + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Some(chunk)
    }
}

struct ActiveVoice {
    descriptor: ModelDescriptor,
    state: VoiceState,
    readiness: Readiness,
    paths: Option<ResolvedPaths>,
    engine: Option<Box<dyn SynthesisEngine + Send>>,
}

impl ActiveVoice {
    fn sample_rate(&self) -> u32 {
        self.engine
            .as_ref()
            .map(|e| e.sample_rate())
            .unwrap_or_else(|| self.descriptor.output_sample_rate())
    }
}

/// Offline synthesis for one active voice at a time.
pub struct VoiceController {
    config: TtsConfig,
    catalog: ModelCatalog,
    acquisition: AcquisitionManager,
    backend: Arc<NativeBackend>,
    voice: Option<ActiveVoice>,
}

impl VoiceController {
    /// Controller with the catalog, downloader and backend named by `config`.
    pub fn new(config: TtsConfig) -> Result<Self, TtsError> {
        let catalog = match &config.catalog_path {
            Some(path) => ModelCatalog::from_file(path)?,
            None => ModelCatalog::embedded()?,
        };
        let backend = config.backend();
        Ok(Self::with_parts(
            config,
            catalog,
            AcquisitionManager::default(),
            backend,
        ))
    }

    /// Controller with explicitly supplied collaborators.
    pub fn with_parts(
        config: TtsConfig,
        catalog: ModelCatalog,
        acquisition: AcquisitionManager,
        backend: Arc<NativeBackend>,
    ) -> Self {
        Self {
            config,
            catalog,
            acquisition,
            backend,
            voice: None,
        }
    }

    pub fn config(&self) -> &TtsConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn voices(&self) -> &[ModelDescriptor] {
        self.catalog.voices()
    }

    pub fn current_voice(&self) -> Option<&ModelDescriptor> {
        self.voice.as_ref().map(|v| &v.descriptor)
    }

    pub fn state(&self) -> VoiceState {
        self.voice
            .as_ref()
            .map(|v| v.state)
            .unwrap_or(VoiceState::Unconfigured)
    }

    pub fn readiness(&self) -> Readiness {
        self.voice
            .as_ref()
            .map(|v| v.readiness.clone())
            .unwrap_or(Readiness::Degraded(DegradedReason::NoVoice))
    }

    /// Resolved file paths of the active voice, once resolution ran.
    pub fn paths(&self) -> Option<&ResolvedPaths> {
        self.voice.as_ref().and_then(|v| v.paths.as_ref())
    }

    /// Fresh probe of the native runtime.
    pub fn environment_check(&self) -> EnvironmentCheck {
        self.backend.probe()
    }

    /// Select a voice and prepare it for synthesis.
    ///
    /// An unknown id is always an error; it touches nothing on disk and
    /// leaves the current voice active. Otherwise the previous engine is
    /// dropped first. Acquisition, runtime and engine
    /// failures degrade the voice to `MockReady` unless strict mode is on.
    pub fn set_voice(&mut self, id: &str) -> Result<(), TtsError> {
        let descriptor = self.catalog.lookup(id)?.clone();
        self.voice = None;

        let root = self.config.storage_root.clone();
        let mut voice = ActiveVoice {
            descriptor,
            state: VoiceState::Resolving,
            readiness: Readiness::Degraded(DegradedReason::NoVoice),
            paths: None,
            engine: None,
        };
        log::info!("Resolving voice '{id}' under {}", root.display());

        let resolved = assets::resolve(&root, &voice.descriptor);
        let paths = if resolved.is_ready {
            resolved
        } else {
            voice.state = VoiceState::Acquiring;
            log::info!(
                "Voice '{id}' is missing {}; acquiring",
                resolved.missing_names().join(", ")
            );
            match self.acquisition.ensure_ready(&root, &voice.descriptor) {
                Ok(paths) => paths,
                Err(e) => {
                    log::warn!("Acquisition of '{id}' failed: {e}");
                    voice.state = VoiceState::Failed;
                    voice.paths = Some(resolved);
                    return self.degrade(voice, DegradedReason::Acquisition(e.to_string()), e.into());
                }
            }
        };
        voice.state = VoiceState::Ready;
        voice.paths = Some(paths.clone());

        let handle = match self.backend.load() {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("{e}");
                let check = e.check().clone();
                return self.degrade(voice, DegradedReason::Backend(check), e.into());
            }
        };

        let engine = EngineConfig::for_descriptor(&paths, &voice.descriptor, self.config.num_threads)
            .and_then(|config| instantiate(&handle, &config));
        match engine {
            Ok(engine) => {
                voice.engine = Some(Box::new(engine));
                voice.state = VoiceState::Initialized;
                voice.readiness = Readiness::Ready;
                log::info!("Voice '{id}' initialized");
                self.voice = Some(voice);
                Ok(())
            }
            Err(e) => {
                log::warn!("Engine for '{id}' failed to start: {e}");
                self.degrade(voice, DegradedReason::Engine(e.to_string()), e.into())
            }
        }
    }

    /// Use an already constructed engine for `id`, skipping resolution.
    ///
    /// Useful for engines built outside the controller.
    pub fn set_engine(
        &mut self,
        id: &str,
        engine: Box<dyn SynthesisEngine + Send>,
    ) -> Result<(), TtsError> {
        let descriptor = self.catalog.lookup(id)?.clone();
        self.voice = Some(ActiveVoice {
            descriptor,
            state: VoiceState::Initialized,
            readiness: Readiness::Ready,
            paths: None,
            engine: Some(engine),
        });
        Ok(())
    }

    fn degrade(
        &mut self,
        mut voice: ActiveVoice,
        reason: DegradedReason,
        error: TtsError,
    ) -> Result<(), TtsError> {
        voice.state = if self.config.strict {
            VoiceState::Failed
        } else {
            VoiceState::MockReady
        };
        voice.readiness = Readiness::Degraded(reason);
        self.voice = Some(voice);
        if self.config.strict {
            Err(error)
        } else {
            log::warn!("Falling back to placeholder audio");
            Ok(())
        }
    }

    /// Initialize the default voice if none is selected.
    ///
    /// Returns true once a voice is selected, including a degraded one.
    pub fn check_readiness(&mut self) -> bool {
        if self.voice.is_some() {
            return true;
        }
        let default_voice = self.config.default_voice.clone();
        match self.set_voice(&default_voice) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Default voice '{default_voice}' is not usable: {e}");
                false
            }
        }
    }

    /// Synthesize `text` into a 16-bit PCM WAV.
    pub fn synthesize(&mut self, text: &str, options: &SynthesisOptions) -> Result<Vec<u8>, TtsError> {
        let (samples, sample_rate, _) = self.render(text, options)?;
        Ok(to_wav(&samples, sample_rate))
    }

    /// Synthesize `text` and return the WAV as a chunk stream plus word
    /// boundaries. Boundaries are empty when `use_word_boundary` is off.
    pub fn synthesize_stream(
        &mut self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<(AudioChunks, Vec<WordBoundary>), TtsError> {
        let (samples, sample_rate, native) = self.render(text, options)?;
        let boundaries = if options.use_word_boundary {
            boundaries_for(text, native.as_ref(), samples.len(), sample_rate)
        } else {
            Vec::new()
        };
        let wav = to_wav(&samples, sample_rate);
        debug_assert_eq!(wav.len(), WAV_HEADER_LEN + samples.len() * 2);
        Ok((AudioChunks::new(wav, STREAM_CHUNK_BYTES), boundaries))
    }

    /// Synthesize `text` into a 16-bit PCM WAV file at `path`.
    pub fn synthesize_to_file(
        &mut self,
        text: &str,
        path: &Path,
        options: &SynthesisOptions,
    ) -> Result<(), TtsError> {
        let wav = self.synthesize(text, options)?;
        std::fs::write(path, wav)?;
        Ok(())
    }

    fn render(
        &mut self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<(Vec<f32>, u32, Option<NativeBoundaries>), TtsError> {
        if self.voice.is_none() {
            let default_voice = self.config.default_voice.clone();
            self.set_voice(&default_voice)?;
        }
        let strict = self.config.strict;
        let Some(voice) = self.voice.as_mut() else {
            return Err(TtsError::Degraded(DegradedReason::NoVoice));
        };
        let speed = self
            .config
            .speeds
            .unwrap_or_else(|| SpeedTable::for_architecture(voice.descriptor.architecture))
            .speed(options.rate);

        if let Some(engine) = voice.engine.as_mut() {
            let speaker = options
                .speaker
                .unwrap_or(0)
                .min(engine.num_speakers().saturating_sub(1));
            match engine.generate(text, speed, speaker) {
                Ok(result) => {
                    voice.readiness = Readiness::Ready;
                    return Ok((result.samples, result.sample_rate, result.word_boundaries));
                }
                Err(e) if strict => return Err(e.into()),
                Err(e) => {
                    log::warn!("Synthesis with '{}' failed: {e}", voice.descriptor.id);
                    voice.readiness = Readiness::Degraded(DegradedReason::Engine(e.to_string()));
                }
            }
        } else if strict {
            return Err(TtsError::Degraded(match &voice.readiness {
                Readiness::Degraded(reason) => reason.clone(),
                Readiness::Ready => DegradedReason::NoVoice,
            }));
        }

        let sample_rate = voice.sample_rate();
        Ok((placeholder_audio(text, speed, sample_rate), sample_rate, None))
    }
}

/// Quiet noise lasting about as long as `text` would take to say.
pub fn placeholder_audio(text: &str, speed: f32, sample_rate: u32) -> Vec<f32> {
    let sample_rate = if sample_rate == 0 {
        FALLBACK_SAMPLE_RATE
    } else {
        sample_rate
    };
    let words = text.split_whitespace().count();
    let speed = if speed.is_finite() && speed > 0.0 {
        f64::from(speed)
    } else {
        1.0
    };
    let seconds = words as f64 * MOCK_SECONDS_PER_WORD / speed;
    let len = (seconds * f64::from(sample_rate)).round() as usize;

    let mut rng = rand::rng();
    (0..len)
        .map(|_| rng.random_range(-MOCK_AMPLITUDE..=MOCK_AMPLITUDE))
        .collect()
}
