//! Speech synthesis engines.
//!
//! This module contains the ONNX engine that runs every offline model
//! architecture in the catalog:
//!
//! - `single-stage` - VITS-family models (Piper, MMS, MeloTTS)
//! - `two-stage-vocoder` - Matcha acoustic model plus a shared HiFi-GAN vocoder
//! - `embedding-multispeaker` - Kokoro with per-speaker style vectors
//!
//! Engines need the native runtime loaded by [`crate::backend::NativeBackend`]
//! before they can be instantiated.

pub mod onnx;
