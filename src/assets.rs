//! On-disk layout of voice directories and the readiness check.
//!
//! Every voice lives in `<root>/<id>/` with a flat canonical layout. Which
//! files a voice needs is a table lookup on its architecture and text
//! frontend; both the resolver here and the acquisition manager read the
//! same table.
//!
//! ```text
//! <root>/
//! ├── hifigan_v2.onnx          # shared vocoder, two-stage voices only
//! └── <id>/
//!     ├── model.onnx
//!     ├── tokens.txt
//!     ├── lexicon.txt          # lexicon frontends
//!     ├── dict/                # lexicon-dict frontend
//!     ├── espeak-ng-data/      # espeak frontend, embedding models
//!     └── voices.bin           # embedding models
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::catalog::{Architecture, ModelDescriptor, TextFrontend};

pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENS_FILE: &str = "tokens.txt";
pub const LEXICON_FILE: &str = "lexicon.txt";
pub const PHONEME_DATA_DIR: &str = "espeak-ng-data";
pub const DICT_DIR: &str = "dict";
pub const VOICE_EMBEDDINGS_FILE: &str = "voices.bin";
pub const SHARED_VOCODER_FILE: &str = "hifigan_v2.onnx";
pub const SHARED_VOCODER_URL: &str =
    "https://github.com/k2-fsa/sherpa-onnx/releases/download/vocoder-models/hifigan_v2.onnx";

/// One file or directory a voice may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Model,
    Tokens,
    Lexicon,
    Dict,
    PhonemeData,
    VoiceEmbeddings,
    Vocoder,
}

impl AssetKind {
    /// Canonical file or directory name.
    pub fn file_name(self) -> &'static str {
        match self {
            AssetKind::Model => MODEL_FILE,
            AssetKind::Tokens => TOKENS_FILE,
            AssetKind::Lexicon => LEXICON_FILE,
            AssetKind::Dict => DICT_DIR,
            AssetKind::PhonemeData => PHONEME_DATA_DIR,
            AssetKind::VoiceEmbeddings => VOICE_EMBEDDINGS_FILE,
            AssetKind::Vocoder => SHARED_VOCODER_FILE,
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, AssetKind::Dict | AssetKind::PhonemeData)
    }

    /// Shared assets live in the storage root and serve every voice.
    pub fn is_shared(self) -> bool {
        matches!(self, AssetKind::Vocoder)
    }
}

const SINGLE_STAGE_ASSETS: &[AssetKind] = &[AssetKind::Model, AssetKind::Tokens];
const TWO_STAGE_ASSETS: &[AssetKind] = &[AssetKind::Model, AssetKind::Tokens, AssetKind::Vocoder];
const EMBEDDING_ASSETS: &[AssetKind] = &[
    AssetKind::Model,
    AssetKind::Tokens,
    AssetKind::VoiceEmbeddings,
    AssetKind::PhonemeData,
];

/// Assets every model of `architecture` needs, whatever its frontend.
pub fn architecture_assets(architecture: Architecture) -> &'static [AssetKind] {
    match architecture {
        Architecture::SingleStage => SINGLE_STAGE_ASSETS,
        Architecture::TwoStageVocoder => TWO_STAGE_ASSETS,
        Architecture::EmbeddingMultispeaker => EMBEDDING_ASSETS,
    }
}

/// Assets the text frontend needs.
pub fn frontend_assets(frontend: TextFrontend) -> &'static [AssetKind] {
    match frontend {
        TextFrontend::Characters => &[],
        TextFrontend::Espeak => &[AssetKind::PhonemeData],
        TextFrontend::Lexicon => &[AssetKind::Lexicon],
        TextFrontend::LexiconDict => &[AssetKind::Lexicon, AssetKind::Dict],
    }
}

/// Full requirement list for a descriptor, without duplicates.
///
/// Two-stage models never take a lexicon, so lexicon assets from the frontend
/// are dropped for them.
pub fn required_assets(descriptor: &ModelDescriptor) -> Vec<AssetKind> {
    let mut assets = architecture_assets(descriptor.architecture).to_vec();
    for &kind in frontend_assets(descriptor.frontend) {
        if descriptor.architecture == Architecture::TwoStageVocoder
            && matches!(kind, AssetKind::Lexicon | AssetKind::Dict)
        {
            continue;
        }
        if !assets.contains(&kind) {
            assets.push(kind);
        }
    }
    assets
}

pub fn voice_dir(base_dir: &Path, descriptor: &ModelDescriptor) -> PathBuf {
    base_dir.join(&descriptor.id)
}

/// Canonical location of one asset of a voice.
pub fn asset_path(base_dir: &Path, descriptor: &ModelDescriptor, kind: AssetKind) -> PathBuf {
    if kind.is_shared() {
        base_dir.join(kind.file_name())
    } else {
        voice_dir(base_dir, descriptor).join(kind.file_name())
    }
}

/// Paths for one voice and whether all of them are usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub voice_dir: PathBuf,
    pub model_path: PathBuf,
    pub tokens_path: PathBuf,
    /// Architecture- and frontend-specific assets, keyed by kind.
    pub extras: BTreeMap<AssetKind, PathBuf>,
    /// Required assets that are absent or empty.
    pub missing: Vec<AssetKind>,
    pub is_ready: bool,
}

impl ResolvedPaths {
    pub fn extra(&self, kind: AssetKind) -> Option<&Path> {
        self.extras.get(&kind).map(PathBuf::as_path)
    }

    pub fn path_of(&self, kind: AssetKind) -> Option<&Path> {
        match kind {
            AssetKind::Model => Some(&self.model_path),
            AssetKind::Tokens => Some(&self.tokens_path),
            other => self.extra(other),
        }
    }

    /// Names of missing assets, for error messages.
    pub fn missing_names(&self) -> Vec<&'static str> {
        self.missing.iter().map(|k| k.file_name()).collect()
    }
}

/// Compute the expected layout of a voice and check it with stat calls only.
pub fn resolve(base_dir: &Path, descriptor: &ModelDescriptor) -> ResolvedPaths {
    let required = required_assets(descriptor);
    let mut extras = BTreeMap::new();
    let mut missing = Vec::new();

    for &kind in &required {
        let path = asset_path(base_dir, descriptor, kind);
        if !is_present(&path, kind.is_dir()) {
            missing.push(kind);
        }
        if !matches!(kind, AssetKind::Model | AssetKind::Tokens) {
            extras.insert(kind, path);
        }
    }

    ResolvedPaths {
        voice_dir: voice_dir(base_dir, descriptor),
        model_path: asset_path(base_dir, descriptor, AssetKind::Model),
        tokens_path: asset_path(base_dir, descriptor, AssetKind::Tokens),
        extras,
        is_ready: missing.is_empty(),
        missing,
    }
}

/// Files must be non-empty regular files; directories must have an entry.
pub(crate) fn is_present(path: &Path, is_dir: bool) -> bool {
    if is_dir {
        std::fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    } else {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::LanguageTag;

    pub(crate) fn descriptor(
        id: &str,
        architecture: Architecture,
        frontend: TextFrontend,
        compressed: bool,
    ) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            url: format!("https://models.invalid/{id}"),
            architecture,
            frontend,
            compressed,
            sample_rate: None,
            num_speakers: None,
            languages: vec![LanguageTag {
                bcp47: "en-US".to_string(),
                iso639_3: "eng".to_string(),
                display: "English".to_string(),
            }],
            developer: String::new(),
            description: String::new(),
        }
    }

    pub(crate) fn populate(base: &Path, d: &ModelDescriptor) {
        for kind in required_assets(d) {
            let path = asset_path(base, d, kind);
            if kind.is_dir() {
                std::fs::create_dir_all(&path).unwrap();
                std::fs::write(path.join("phontab"), b"data").unwrap();
            } else {
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(&path, b"bytes").unwrap();
            }
        }
    }

    fn all_descriptors() -> Vec<ModelDescriptor> {
        vec![
            descriptor("piper", Architecture::SingleStage, TextFrontend::Espeak, true),
            descriptor("mms", Architecture::SingleStage, TextFrontend::Characters, false),
            descriptor("melo", Architecture::SingleStage, TextFrontend::LexiconDict, true),
            descriptor("matcha", Architecture::TwoStageVocoder, TextFrontend::Espeak, true),
            descriptor("kokoro", Architecture::EmbeddingMultispeaker, TextFrontend::Espeak, true),
        ]
    }

    #[test]
    fn fully_populated_directory_is_ready_for_every_architecture() {
        for d in all_descriptors() {
            let tmp = tempfile::tempdir().unwrap();
            populate(tmp.path(), &d);
            let resolved = resolve(tmp.path(), &d);
            assert!(resolved.is_ready, "{} should be ready: {:?}", d.id, resolved.missing);
            assert_eq!(resolved.voice_dir, tmp.path().join(&d.id));
        }
    }

    #[test]
    fn removing_any_required_asset_flips_readiness() {
        for d in all_descriptors() {
            for kind in required_assets(&d) {
                let tmp = tempfile::tempdir().unwrap();
                populate(tmp.path(), &d);
                let path = asset_path(tmp.path(), &d, kind);
                if kind.is_dir() {
                    std::fs::remove_dir_all(&path).unwrap();
                } else {
                    std::fs::remove_file(&path).unwrap();
                }
                let resolved = resolve(tmp.path(), &d);
                assert!(!resolved.is_ready, "{} without {:?} must not be ready", d.id, kind);
                assert_eq!(resolved.missing, vec![kind]);
            }
        }
    }

    #[test]
    fn empty_files_and_directories_are_not_ready() {
        let d = descriptor("kokoro", Architecture::EmbeddingMultispeaker, TextFrontend::Espeak, true);
        let tmp = tempfile::tempdir().unwrap();
        populate(tmp.path(), &d);

        std::fs::write(asset_path(tmp.path(), &d, AssetKind::VoiceEmbeddings), b"").unwrap();
        let data_dir = asset_path(tmp.path(), &d, AssetKind::PhonemeData);
        std::fs::remove_dir_all(&data_dir).unwrap();
        std::fs::create_dir_all(&data_dir).unwrap();

        let resolved = resolve(tmp.path(), &d);
        assert!(!resolved.is_ready);
        assert_eq!(
            resolved.missing,
            vec![AssetKind::VoiceEmbeddings, AssetKind::PhonemeData]
        );
    }

    #[test]
    fn two_stage_vocoder_is_shared_and_lexicon_is_dropped() {
        let d = descriptor("matcha", Architecture::TwoStageVocoder, TextFrontend::Lexicon, true);
        let required = required_assets(&d);
        assert!(required.contains(&AssetKind::Vocoder));
        assert!(!required.contains(&AssetKind::Lexicon));

        let base = Path::new("/models");
        assert_eq!(
            asset_path(base, &d, AssetKind::Vocoder),
            base.join(SHARED_VOCODER_FILE)
        );
        assert_eq!(
            asset_path(base, &d, AssetKind::Model),
            base.join("matcha").join(MODEL_FILE)
        );
    }

    #[test]
    fn missing_directory_resolves_without_creating_it() {
        let d = descriptor("nothing", Architecture::SingleStage, TextFrontend::Characters, false);
        let tmp = tempfile::tempdir().unwrap();
        let resolved = resolve(tmp.path(), &d);
        assert!(!resolved.is_ready);
        assert_eq!(resolved.missing, vec![AssetKind::Model, AssetKind::Tokens]);
        assert!(!tmp.path().join("nothing").exists());
    }
}
