//! ONNX Runtime synthesis engine.
//!
//! One engine type covers the three supported architectures. What differs
//! between them is the session layout and the tensors fed to it:
//!
//! | Architecture | Sessions | Inputs |
//! |---|---|---|
//! | single-stage (Piper, MMS, MeloTTS) | model | tokens, lengths, scales, optional speaker id and tones |
//! | two-stage-vocoder (Matcha) | acoustic model, shared vocoder | tokens, lengths, scales; then mel |
//! | embedding-multispeaker (Kokoro) | model | padded tokens, style vector, speed |
//!
//! Text reaches the models through a [`Frontend`]: espeak-ng phonemes when the
//! voice ships `espeak-ng-data/`, a lexicon when it ships `lexicon.txt`, or
//! raw characters otherwise. Token ids always come from the voice's
//! `tokens.txt`.
//!
//! # System Requirements
//!
//! Voices with phoneme data need **espeak-ng** on PATH:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>

pub mod config;
pub mod engine;
pub mod frontend;
pub mod kokoro;
pub mod lexicon;
pub mod matcha;
pub mod model;
pub mod phonemizer;
pub mod tokens;
pub mod vits;
pub mod voices;

pub use config::{configure, speed_for, EngineConfig, ModelFiles, Rate, SpeedTable};
pub use engine::{instantiate, OnnxEngine};
pub use frontend::Frontend;
pub use model::EngineError;
pub use phonemizer::EspeakConfig;
pub use tokens::TokenTable;
