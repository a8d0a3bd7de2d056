//! # offline-tts
//!
//! Offline neural text-to-speech: pick a voice from a model catalog, fetch
//! and verify its files, load the ONNX Runtime for the host platform, run the
//! model for its architecture and hand back a 16-bit PCM WAV plus word
//! timings.
//!
//! ## Features
//!
//! - **Model catalog**: Piper, MMS, MeloTTS, Matcha and Kokoro voices
//! - **Asset acquisition**: archived and per-file downloads into a flat voice directory
//! - **Runtime discovery**: the ONNX Runtime library is found and loaded at run time
//! - **Graceful degradation**: without a model or runtime, synthesis still returns
//!   a valid WAV and the reason is reported through [`Readiness`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use offline_tts::{SynthesisOptions, TtsConfig, VoiceController};
//!
//! let mut tts = VoiceController::new(TtsConfig::default())?;
//! tts.set_voice("vits-piper-en_US-amy-low")?;
//!
//! let wav = tts.synthesize("Hello, world!", &SynthesisOptions::default())?;
//! std::fs::write("output.wav", wav)?;
//! println!("{:?}", tts.readiness());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod acquire;
pub mod assets;
pub mod audio;
pub mod backend;
pub mod boundary;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod engines;
pub mod error;

use std::path::Path;

pub use acquire::{AcquisitionError, AcquisitionManager, Downloader, HttpDownloader};
pub use assets::{resolve, AssetKind, ResolvedPaths};
pub use audio::to_wav;
pub use backend::{BackendHandle, EnvironmentCheck, LoadError, NativeBackend, Platform};
pub use boundary::{NativeBoundaries, TimeUnit, WordBoundary};
pub use catalog::{Architecture, CatalogError, ModelCatalog, ModelDescriptor, TextFrontend};
pub use config::{TtsConfig, TtsConfigBuilder};
pub use controller::{
    AudioChunks, DegradedReason, Readiness, SynthesisOptions, VoiceController, VoiceState,
};
pub use engines::onnx::{EngineError, Rate, SpeedTable};
pub use error::TtsError;

/// The result of a synthesis (text-to-speech) operation.
///
/// Contains raw f32 audio samples and the sample rate of the output audio.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio, as reported by the model
    pub sample_rate: u32,
    /// Word timings, when the engine reports them
    pub word_boundaries: Option<NativeBoundaries>,
}

impl SynthesisResult {
    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Encode as 16-bit PCM WAV bytes.
    pub fn to_wav(&self) -> Vec<u8> {
        audio::to_wav(&self.samples, self.sample_rate)
    }
}

/// Common interface for text-to-speech synthesis engines.
///
/// An engine is built for one voice and owns its model sessions. `generate`
/// takes `&mut self`, so one engine never runs two syntheses at once.
pub trait SynthesisEngine {
    /// Output sample rate of the model.
    fn sample_rate(&self) -> u32;

    /// Number of selectable speakers.
    fn num_speakers(&self) -> usize {
        1
    }

    /// Synthesize speech from the given text.
    ///
    /// `speed` is a multiplier where 1.0 is the model's natural pace;
    /// `speaker` selects a voice of a multi-speaker model.
    fn generate(
        &mut self,
        text: &str,
        speed: f32,
        speaker: usize,
    ) -> Result<SynthesisResult, EngineError>;

    /// Synthesize speech from the given text and write to a WAV file.
    ///
    /// Default implementation calls `generate()` then `SynthesisResult::write_wav()`.
    fn synthesize_to_file(
        &mut self,
        text: &str,
        wav_path: &Path,
        speed: f32,
        speaker: usize,
    ) -> Result<(), EngineError> {
        Ok(self.generate(text, speed, speaker)?.write_wav(wav_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ToneEngine;

    impl SynthesisEngine for ToneEngine {
        fn sample_rate(&self) -> u32 {
            8_000
        }

        fn generate(
            &mut self,
            text: &str,
            speed: f32,
            _speaker: usize,
        ) -> Result<SynthesisResult, EngineError> {
            let len = (text.len() as f32 * 100.0 / speed) as usize;
            Ok(SynthesisResult {
                samples: (0..len).map(|i| (i as f32 * 0.05).sin() * 0.5).collect(),
                sample_rate: self.sample_rate(),
                word_boundaries: None,
            })
        }
    }

    #[test]
    fn duration_follows_sample_count() {
        let result = SynthesisResult {
            samples: vec![0.0; 12_000],
            sample_rate: 24_000,
            word_boundaries: None,
        };
        assert_eq!(result.duration_secs(), 0.5);
        assert_eq!(result.to_wav().len(), 44 + 24_000);
    }

    #[test]
    fn synthesize_to_file_writes_float_wav() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out.wav");
        let mut engine = ToneEngine;
        engine.synthesize_to_file("hello", &path, 1.0, 0).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 8_000);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);
        assert_eq!(reader.len(), 500);
        assert_eq!(engine.num_speakers(), 1);
    }
}
