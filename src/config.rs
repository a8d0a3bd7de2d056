//! Controller configuration.
//!
//! Defaults come from the environment:
//!
//! | Variable | Meaning | Fallback |
//! |---|---|---|
//! | `OFFLINE_TTS_MODELS_DIR` | storage root for voice directories | `<data dir>/offline-tts/models` |
//! | `OFFLINE_TTS_RUNTIME_DIR` | directory holding the ONNX Runtime package | `<data dir>/offline-tts/runtime` |
//! | `ORT_DYLIB_PATH` | exact ONNX Runtime library file | package lookup |

use std::path::PathBuf;

use derive_builder::Builder;

use crate::backend::{NativeBackend, DYLIB_PATH_ENV};
use crate::engines::onnx::SpeedTable;

pub const MODELS_DIR_ENV: &str = "OFFLINE_TTS_MODELS_DIR";

/// Voice used when synthesis starts before any `set_voice`.
pub const DEFAULT_VOICE: &str = "vits-piper-en_US-amy-low";

/// Settings for a [`crate::VoiceController`].
///
/// ```
/// use offline_tts::TtsConfigBuilder;
///
/// let config = TtsConfigBuilder::default()
///     .storage_root("/var/lib/tts/models")
///     .default_voice("kokoro-en-v0_19")
///     .strict(true)
///     .num_threads(2usize)
///     .build()
///     .unwrap();
/// assert!(config.strict);
/// assert_eq!(config.num_threads, Some(2));
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(default, setter(into))]
pub struct TtsConfig {
    /// Root of the voice directories and the shared vocoder.
    pub storage_root: PathBuf,
    /// Where to look for the runtime package. `None` reads the environment.
    #[builder(setter(into, strip_option))]
    pub runtime_dir: Option<PathBuf>,
    pub default_voice: String,
    /// Fail instead of degrading to placeholder audio.
    pub strict: bool,
    /// Inference threads. `None` uses the ORT default.
    #[builder(setter(into, strip_option))]
    pub num_threads: Option<usize>,
    /// Catalog JSON to use instead of the embedded one.
    #[builder(setter(into, strip_option))]
    pub catalog_path: Option<PathBuf>,
    /// Rate multipliers for every voice. `None` uses the per-architecture
    /// defaults of [`SpeedTable::for_architecture`].
    #[builder(setter(into, strip_option))]
    pub speeds: Option<SpeedTable>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            runtime_dir: None,
            default_voice: DEFAULT_VOICE.to_string(),
            strict: false,
            num_threads: None,
            catalog_path: None,
            speeds: None,
        }
    }
}

impl TtsConfig {
    /// The native backend this configuration asks for: a private instance
    /// for an explicit runtime directory, otherwise the process-wide one.
    pub fn backend(&self) -> std::sync::Arc<NativeBackend> {
        match &self.runtime_dir {
            Some(dir) => {
                let backend = NativeBackend::new(dir);
                std::sync::Arc::new(match std::env::var_os(DYLIB_PATH_ENV) {
                    Some(path) if !path.is_empty() => backend.with_library(path),
                    _ => backend,
                })
            }
            None => NativeBackend::shared(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    if let Some(dir) = std::env::var_os(MODELS_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .map(|d| d.join("offline-tts").join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}
