use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::assets::{AssetKind, ResolvedPaths};
use crate::catalog::{Architecture, ModelDescriptor};

use super::model::EngineError;

/// Speaking rate requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Rate {
    Slow,
    #[default]
    Medium,
    Fast,
}

impl FromStr for Rate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" | "x-slow" => Ok(Rate::Slow),
            "medium" | "default" => Ok(Rate::Medium),
            "fast" | "x-fast" => Ok(Rate::Fast),
            other => Err(format!("unknown rate '{other}', expected slow, medium or fast")),
        }
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Rate::Slow => "slow",
            Rate::Medium => "medium",
            Rate::Fast => "fast",
        })
    }
}

/// Speed multipliers for the three rates.
///
/// Neural vocoders distort audibly outside a narrow band, so the defaults
/// all sit at or below the model's natural pace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedTable {
    pub slow: f32,
    pub medium: f32,
    pub fast: f32,
}

impl SpeedTable {
    /// Default multipliers for a model of `architecture`. The duration
    /// predictors of two-stage and embedding models tolerate less stretching
    /// than plain VITS.
    pub fn for_architecture(architecture: Architecture) -> Self {
        match architecture {
            Architecture::SingleStage => Self {
                slow: 0.5,
                medium: 0.7,
                fast: 0.9,
            },
            Architecture::TwoStageVocoder => Self {
                slow: 0.6,
                medium: 0.75,
                fast: 0.9,
            },
            Architecture::EmbeddingMultispeaker => Self {
                slow: 0.6,
                medium: 0.8,
                fast: 0.95,
            },
        }
    }

    pub fn speed(&self, rate: Rate) -> f32 {
        match rate {
            Rate::Slow => self.slow,
            Rate::Medium => self.medium,
            Rate::Fast => self.fast,
        }
    }
}

/// Default speed multiplier for `rate` on a model of `architecture`.
pub fn speed_for(rate: Rate, architecture: Architecture) -> f32 {
    SpeedTable::for_architecture(architecture).speed(rate)
}

/// Files an engine is built from, shaped by architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelFiles {
    SingleStage {
        model: PathBuf,
        tokens: PathBuf,
        lexicon: Option<PathBuf>,
        phoneme_data_dir: Option<PathBuf>,
        dict_dir: Option<PathBuf>,
    },
    TwoStageVocoder {
        acoustic_model: PathBuf,
        vocoder: PathBuf,
        tokens: PathBuf,
        phoneme_data_dir: Option<PathBuf>,
    },
    EmbeddingMultispeaker {
        model: PathBuf,
        voice_embeddings: PathBuf,
        tokens: PathBuf,
        phoneme_data_dir: PathBuf,
    },
}

impl ModelFiles {
    pub fn architecture(&self) -> Architecture {
        match self {
            ModelFiles::SingleStage { .. } => Architecture::SingleStage,
            ModelFiles::TwoStageVocoder { .. } => Architecture::TwoStageVocoder,
            ModelFiles::EmbeddingMultispeaker { .. } => Architecture::EmbeddingMultispeaker,
        }
    }

    pub fn tokens(&self) -> &Path {
        match self {
            ModelFiles::SingleStage { tokens, .. }
            | ModelFiles::TwoStageVocoder { tokens, .. }
            | ModelFiles::EmbeddingMultispeaker { tokens, .. } => tokens,
        }
    }

    pub fn phoneme_data_dir(&self) -> Option<&Path> {
        match self {
            ModelFiles::SingleStage { phoneme_data_dir, .. }
            | ModelFiles::TwoStageVocoder { phoneme_data_dir, .. } => phoneme_data_dir.as_deref(),
            ModelFiles::EmbeddingMultispeaker { phoneme_data_dir, .. } => Some(phoneme_data_dir),
        }
    }
}

/// Build the architecture-specific file set from resolved paths.
///
/// Optional extras are taken when the resolver listed them. Required extras
/// that the resolver did not list are a configuration error.
pub fn configure(paths: &ResolvedPaths, architecture: Architecture) -> Result<ModelFiles, EngineError> {
    let optional = |kind| paths.extra(kind).map(Path::to_path_buf);
    let required = |kind: AssetKind| {
        paths.extra(kind).map(Path::to_path_buf).ok_or_else(|| {
            EngineError::Config(format!(
                "{architecture} model at {} needs {}",
                paths.voice_dir.display(),
                kind.file_name()
            ))
        })
    };

    Ok(match architecture {
        Architecture::SingleStage => ModelFiles::SingleStage {
            model: paths.model_path.clone(),
            tokens: paths.tokens_path.clone(),
            lexicon: optional(AssetKind::Lexicon),
            phoneme_data_dir: optional(AssetKind::PhonemeData),
            dict_dir: optional(AssetKind::Dict),
        },
        Architecture::TwoStageVocoder => ModelFiles::TwoStageVocoder {
            acoustic_model: paths.model_path.clone(),
            vocoder: required(AssetKind::Vocoder)?,
            tokens: paths.tokens_path.clone(),
            phoneme_data_dir: optional(AssetKind::PhonemeData),
        },
        Architecture::EmbeddingMultispeaker => ModelFiles::EmbeddingMultispeaker {
            model: paths.model_path.clone(),
            voice_embeddings: required(AssetKind::VoiceEmbeddings)?,
            tokens: paths.tokens_path.clone(),
            phoneme_data_dir: required(AssetKind::PhonemeData)?,
        },
    })
}

/// Everything needed to instantiate an engine for one voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub files: ModelFiles,
    /// espeak-ng voice used when the model has phoneme data.
    pub espeak_voice: String,
    pub sample_rate: u32,
    /// Speakers of a multi-speaker VITS model, when the catalog knows them.
    pub num_speakers: Option<usize>,
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
}

impl EngineConfig {
    pub fn for_descriptor(
        paths: &ResolvedPaths,
        descriptor: &ModelDescriptor,
        num_threads: Option<usize>,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            files: configure(paths, descriptor.architecture)?,
            espeak_voice: descriptor.espeak_voice(),
            sample_rate: descriptor.output_sample_rate(),
            num_speakers: descriptor.num_speakers,
            num_threads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::resolve;
    use crate::assets::tests::descriptor;
    use crate::catalog::TextFrontend;

    #[test]
    fn rates_stay_in_the_conservative_band() {
        for arch in [
            Architecture::SingleStage,
            Architecture::TwoStageVocoder,
            Architecture::EmbeddingMultispeaker,
        ] {
            let slow = speed_for(Rate::Slow, arch);
            let medium = speed_for(Rate::Medium, arch);
            let fast = speed_for(Rate::Fast, arch);
            assert!(0.0 < slow && slow < medium && medium < fast && fast <= 1.0, "{arch:?}");
        }
        assert_eq!(speed_for(Rate::Medium, Architecture::SingleStage), 0.7);
    }

    #[test]
    fn custom_tables_override_the_defaults() {
        let table = SpeedTable {
            slow: 0.9,
            medium: 1.0,
            fast: 1.1,
        };
        assert_eq!(table.speed(Rate::Fast), 1.1);
        assert_eq!(table.speed(Rate::Slow), 0.9);
    }

    #[test]
    fn parses_rates() {
        assert_eq!("Slow".parse::<Rate>(), Ok(Rate::Slow));
        assert_eq!(" fast ".parse::<Rate>(), Ok(Rate::Fast));
        assert_eq!("medium".parse::<Rate>(), Ok(Rate::Medium));
        assert!("warp".parse::<Rate>().is_err());
        assert_eq!(Rate::default().to_string(), "medium");
    }

    #[test]
    fn single_stage_lexicon_model_has_no_phoneme_data() {
        let d = descriptor("zh", Architecture::SingleStage, TextFrontend::LexiconDict, true);
        let paths = resolve(Path::new("/models"), &d);
        let files = configure(&paths, d.architecture).unwrap();
        match files {
            ModelFiles::SingleStage {
                lexicon,
                phoneme_data_dir,
                dict_dir,
                ..
            } => {
                assert_eq!(lexicon, Some(PathBuf::from("/models/zh/lexicon.txt")));
                assert_eq!(dict_dir, Some(PathBuf::from("/models/zh/dict")));
                assert_eq!(phoneme_data_dir, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn two_stage_uses_shared_vocoder() {
        let d = descriptor("matcha", Architecture::TwoStageVocoder, TextFrontend::Espeak, true);
        let paths = resolve(Path::new("/models"), &d);
        let files = configure(&paths, d.architecture).unwrap();
        assert_eq!(
            files,
            ModelFiles::TwoStageVocoder {
                acoustic_model: PathBuf::from("/models/matcha/model.onnx"),
                vocoder: PathBuf::from("/models/hifigan_v2.onnx"),
                tokens: PathBuf::from("/models/matcha/tokens.txt"),
                phoneme_data_dir: Some(PathBuf::from("/models/matcha/espeak-ng-data")),
            }
        );
        assert_eq!(files.architecture(), Architecture::TwoStageVocoder);
    }

    #[test]
    fn embedding_model_requires_voice_embeddings() {
        let d = descriptor("kokoro", Architecture::SingleStage, TextFrontend::Espeak, true);
        let paths = resolve(Path::new("/models"), &d);
        let err = configure(&paths, Architecture::EmbeddingMultispeaker).unwrap_err();
        assert!(err.to_string().contains("voices.bin"));
    }

    #[test]
    fn engine_config_carries_descriptor_rate_and_voice() {
        let mut d = descriptor("kokoro", Architecture::EmbeddingMultispeaker, TextFrontend::Espeak, true);
        d.sample_rate = Some(24_000);
        let paths = resolve(Path::new("/models"), &d);
        let config = EngineConfig::for_descriptor(&paths, &d, Some(2)).unwrap();
        assert_eq!(config.sample_rate, 24_000);
        assert_eq!(config.espeak_voice, "en-us");
        assert_eq!(config.num_threads, Some(2));
        assert_eq!(
            config.files.phoneme_data_dir(),
            Some(Path::new("/models/kokoro/espeak-ng-data"))
        );
    }
}
