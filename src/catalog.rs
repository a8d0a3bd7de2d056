//! Static catalog of offline voice models.
//!
//! The catalog ships embedded in the crate (`data/models.json`) and can be
//! replaced with a JSON file of the same shape. Entries are immutable once
//! loaded.

use std::path::Path;

use serde::{Deserialize, Serialize};

const EMBEDDED_CATALOG: &str = include_str!("../data/models.json");

/// Internal structure of an offline speech-synthesis model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Architecture {
    /// Text to waveform in one network (VITS, Piper, MMS).
    SingleStage,
    /// Acoustic model producing a mel spectrogram, then a separate vocoder.
    TwoStageVocoder,
    /// One network conditioned on per-speaker style embeddings (Kokoro).
    EmbeddingMultispeaker,
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Architecture::SingleStage => "single-stage",
            Architecture::TwoStageVocoder => "two-stage-vocoder",
            Architecture::EmbeddingMultispeaker => "embedding-multispeaker",
        })
    }
}

/// How text becomes token ids for a model. This depends on where the model
/// was exported from, not on its network architecture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextFrontend {
    /// Raw characters looked up in the token table.
    Characters,
    /// IPA phonemes produced by espeak-ng from the voice's phoneme data.
    #[default]
    Espeak,
    /// Word to phone-sequence lexicon.
    Lexicon,
    /// Lexicon plus a segmentation dictionary directory.
    LexiconDict,
}

/// A language a model can speak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageTag {
    /// BCP-47 tag, e.g. `en-US`.
    pub bcp47: String,
    /// ISO 639-3 code, e.g. `eng`.
    pub iso639_3: String,
    /// Human-readable name.
    pub display: String,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    /// Archive URL when `compressed`, otherwise a base URL that per-file
    /// names are appended to.
    pub url: String,
    pub architecture: Architecture,
    #[serde(default)]
    pub frontend: TextFrontend,
    pub compressed: bool,
    /// Output rate of the model. Falls back to the architecture's usual rate.
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Speaker count of a multi-speaker single- or two-stage model. Embedding
    /// models count their voice pack instead.
    #[serde(default)]
    pub num_speakers: Option<usize>,
    pub languages: Vec<LanguageTag>,
    #[serde(default)]
    pub developer: String,
    #[serde(default)]
    pub description: String,
}

impl ModelDescriptor {
    pub fn output_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(match self.architecture {
            Architecture::SingleStage | Architecture::TwoStageVocoder => 22_050,
            Architecture::EmbeddingMultispeaker => 24_000,
        })
    }

    /// espeak-ng voice for the model's primary language.
    pub fn espeak_voice(&self) -> String {
        self.languages
            .first()
            .map(|tag| espeak_voice_for(&tag.bcp47))
            .unwrap_or_else(|| "en-us".to_string())
    }

    /// Whether any of the model's languages matches `lang`.
    ///
    /// `lang` may be a BCP-47 tag or prefix (`en`, `en-gb`) or an ISO 639-3
    /// code. Matching is case-insensitive.
    pub fn speaks(&self, lang: &str) -> bool {
        let wanted = lang.to_ascii_lowercase();
        self.languages.iter().any(|tag| {
            let bcp47 = tag.bcp47.to_ascii_lowercase();
            bcp47 == wanted
                || bcp47.starts_with(&format!("{wanted}-"))
                || tag.iso639_3.eq_ignore_ascii_case(&wanted)
        })
    }
}

/// espeak-ng keeps regional voices for a few languages and uses the bare
/// language code for the rest.
fn espeak_voice_for(bcp47: &str) -> String {
    let tag = bcp47.to_ascii_lowercase();
    match tag.as_str() {
        "en-us" | "en-gb" | "pt-br" | "es-419" => tag,
        _ => match tag.split('-').next().unwrap_or("en") {
            "zh" => "cmn".to_string(),
            primary => primary.to_string(),
        },
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("Unknown model id '{0}'")]
    NotFound(String),
    #[error("Invalid model catalog: {0}")]
    Parse(String),
    #[error("I/O error reading catalog: {0}")]
    Io(#[from] std::io::Error),
}

/// Read-only id → descriptor mapping, in catalog order.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// The catalog compiled into the crate.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_json(EMBEDDED_CATALOG)
    }

    /// Load a catalog from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        log::info!("Loading model catalog from {}", path.display());
        Self::from_json(&content)
    }

    /// Parse a catalog from a JSON array of descriptors. Ids must be unique.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let models: Vec<ModelDescriptor> = serde_json::from_str(json)
            .map_err(|e| CatalogError::Parse(format!("Failed to parse JSON: {e}")))?;
        Self::from_models(models)
    }

    pub fn from_models(models: Vec<ModelDescriptor>) -> Result<Self, CatalogError> {
        for (i, model) in models.iter().enumerate() {
            if model.id.is_empty() {
                return Err(CatalogError::Parse(format!("Entry {i} has an empty id")));
            }
            if models[..i].iter().any(|m| m.id == model.id) {
                return Err(CatalogError::Parse(format!("Duplicate id '{}'", model.id)));
            }
        }
        Ok(Self { models })
    }

    pub fn lookup(&self, id: &str) -> Result<&ModelDescriptor, CatalogError> {
        self.models
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn voices(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn voices_for_language(&self, lang: &str) -> Vec<&ModelDescriptor> {
        self.models.iter().filter(|m| m.speaks(lang)).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_parses_and_covers_every_architecture() {
        let catalog = ModelCatalog::embedded().expect("embedded catalog should parse");
        assert!(!catalog.is_empty());
        for arch in [
            Architecture::SingleStage,
            Architecture::TwoStageVocoder,
            Architecture::EmbeddingMultispeaker,
        ] {
            assert!(
                catalog.voices().iter().any(|m| m.architecture == arch),
                "no {arch} model in the embedded catalog"
            );
        }
    }

    #[test]
    fn lookup_unknown_id_names_the_id() {
        let catalog = ModelCatalog::embedded().unwrap();
        let err = catalog.lookup("unknown-id").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(ref id) if id == "unknown-id"));
        assert!(err.to_string().contains("unknown-id"));
    }

    #[test]
    fn filters_by_language_prefix_and_iso_code() {
        let catalog = ModelCatalog::embedded().unwrap();
        let english = catalog.voices_for_language("en");
        assert!(english.iter().any(|m| m.id == "kokoro-en-v0_19"));
        assert!(english.iter().all(|m| m.id != "vits-piper-de_DE-thorsten-medium"));

        let german = catalog.voices_for_language("deu");
        assert_eq!(german.len(), 1);
        assert_eq!(german[0].id, "vits-piper-de_DE-thorsten-medium");

        let british = catalog.voices_for_language("EN-gb");
        assert!(british.iter().any(|m| m.id == "vits-piper-en_GB-alan-medium"));
        assert!(british.iter().all(|m| m.id != "vits-piper-en_US-amy-low"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = r#"[
            {"id": "a", "url": "u", "architecture": "single-stage", "compressed": false, "languages": []},
            {"id": "a", "url": "u", "architecture": "single-stage", "compressed": false, "languages": []}
        ]"#;
        let err = ModelCatalog::from_json(json).unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn frontend_defaults_to_espeak() {
        let json = r#"[{"id": "a", "url": "u", "architecture": "embedding-multispeaker",
                        "compressed": true, "languages": []}]"#;
        let catalog = ModelCatalog::from_json(json).unwrap();
        let model = catalog.lookup("a").unwrap();
        assert_eq!(model.frontend, TextFrontend::Espeak);
        assert_eq!(model.architecture, Architecture::EmbeddingMultispeaker);
        assert!(model.developer.is_empty());
        assert_eq!(model.output_sample_rate(), 24_000);
    }

    #[test]
    fn espeak_voice_keeps_regional_english() {
        let catalog = ModelCatalog::embedded().unwrap();
        assert_eq!(catalog.lookup("vits-piper-en_GB-alan-medium").unwrap().espeak_voice(), "en-gb");
        assert_eq!(catalog.lookup("vits-piper-de_DE-thorsten-medium").unwrap().espeak_voice(), "de");
        assert_eq!(catalog.lookup("vits-melo-tts-zh_en").unwrap().espeak_voice(), "cmn");
        assert_eq!(catalog.lookup("vits-piper-en_US-amy-low").unwrap().output_sample_rate(), 16_000);
    }

    #[test]
    fn speaker_count_is_optional() {
        let catalog = ModelCatalog::embedded().unwrap();
        assert_eq!(
            catalog.lookup("vits-piper-en_US-libritts_r-medium").unwrap().num_speakers,
            Some(904)
        );
        assert_eq!(catalog.lookup("vits-piper-en_US-amy-low").unwrap().num_speakers, None);
    }
}
