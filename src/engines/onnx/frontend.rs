use super::config::ModelFiles;
use super::lexicon::{Lexicon, ToneIds};
use super::model::EngineError;
use super::phonemizer::{phonemize, EspeakConfig};
use super::tokens::TokenTable;

/// How token ids are framed before they reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Piper: `^ _ t1 _ t2 _ ... $`.
    Piper { bos: i64, pad: i64, eos: i64 },
    /// Blank (id 0) before, between and after tokens.
    Interleaved,
    /// Ids as produced; the runner adds its own padding.
    Bare,
}

impl Framing {
    /// Pick the framing from the token table: Piper tables carry `^ _ $`.
    pub fn detect(tokens: &TokenTable) -> Self {
        match (tokens.get("^"), tokens.get("_"), tokens.get("$")) {
            (Some(bos), Some(pad), Some(eos)) => Framing::Piper { bos, pad, eos },
            _ => Framing::Interleaved,
        }
    }

    pub fn apply(self, ids: &[i64]) -> Vec<i64> {
        match self {
            Framing::Piper { bos, pad, eos } => {
                let mut framed = Vec::with_capacity(ids.len() * 2 + 3);
                framed.extend([bos, pad]);
                for &id in ids {
                    framed.extend([id, pad]);
                }
                framed.push(eos);
                framed
            }
            Framing::Interleaved => {
                let mut framed = Vec::with_capacity(ids.len() * 2 + 1);
                framed.push(0);
                for &id in ids {
                    framed.extend([id, 0]);
                }
                framed
            }
            Framing::Bare => ids.to_vec(),
        }
    }

    /// Frame a tone sequence in step with [`Framing::apply`]. Every inserted
    /// position gets tone 0.
    pub fn apply_tones(self, tones: &[i64]) -> Vec<i64> {
        match self {
            Framing::Piper { .. } => Framing::Piper {
                bos: 0,
                pad: 0,
                eos: 0,
            }
            .apply(tones),
            other => other.apply(tones),
        }
    }
}

/// Text to token ids, chosen from the assets a model ships with.
#[derive(Debug, Clone)]
pub enum TextToIds {
    Characters,
    Espeak { config: EspeakConfig, voice: String },
    Lexicon(Lexicon),
}

/// Text frontend of one engine: a conversion plus the model's token table.
#[derive(Debug, Clone)]
pub struct Frontend {
    pub(crate) convert: TextToIds,
    pub(crate) tokens: TokenTable,
    pub(crate) framing: Framing,
}

impl Frontend {
    /// Build the frontend for a model's files.
    ///
    /// A lexicon wins over phoneme data; with neither, characters are looked
    /// up directly. Embedding models are never framed here.
    pub fn for_files(files: &ModelFiles, espeak_voice: &str) -> Result<Self, EngineError> {
        let tokens = TokenTable::load(files.tokens())?;
        let (lexicon, dict_dir) = match files {
            ModelFiles::SingleStage { lexicon, dict_dir, .. } => {
                (lexicon.as_deref(), dict_dir.as_deref())
            }
            _ => (None, None),
        };

        let convert = match (lexicon, files.phoneme_data_dir()) {
            (Some(lexicon), _) => TextToIds::Lexicon(Lexicon::load(lexicon, dict_dir)?),
            (None, Some(data)) => TextToIds::Espeak {
                config: EspeakConfig::with_data(data),
                voice: espeak_voice.to_string(),
            },
            (None, None) => TextToIds::Characters,
        };

        let framing = match files {
            ModelFiles::EmbeddingMultispeaker { .. } => Framing::Bare,
            _ => Framing::detect(&tokens),
        };

        Ok(Self::new(convert, tokens, framing))
    }

    pub fn new(convert: TextToIds, tokens: TokenTable, framing: Framing) -> Self {
        Self {
            convert,
            tokens,
            framing,
        }
    }

    /// Token ids for `text`, without framing.
    pub fn to_ids(&self, text: &str) -> Result<Vec<i64>, EngineError> {
        match &self.convert {
            TextToIds::Characters => Ok(character_ids(text, &self.tokens)),
            TextToIds::Espeak { config, voice } => phonemize(text, voice, &self.tokens, config),
            TextToIds::Lexicon(lexicon) => Ok(lexicon.to_ids(text, &self.tokens)),
        }
    }

    /// Token ids for `text`, framed for the network.
    pub fn encode(&self, text: &str) -> Result<Vec<i64>, EngineError> {
        Ok(self.encode_with_tones(text)?.ids)
    }

    /// Framed token ids plus one tone per id. Only lexicons with tone
    /// columns produce non-zero tones.
    pub fn encode_with_tones(&self, text: &str) -> Result<ToneIds, EngineError> {
        let raw = match &self.convert {
            TextToIds::Lexicon(lexicon) => lexicon.to_tone_ids(text, &self.tokens),
            _ => {
                let ids = self.to_ids(text)?;
                let tones = vec![0; ids.len()];
                ToneIds { ids, tones }
            }
        };
        if raw.ids.is_empty() {
            return Ok(raw);
        }
        Ok(ToneIds {
            ids: self.framing.apply(&raw.ids),
            tones: self.framing.apply_tones(&raw.tones),
        })
    }

    pub fn tokens(&self) -> &TokenTable {
        &self.tokens
    }
}

fn character_ids(text: &str, tokens: &TokenTable) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut last_was_space = true;
    for ch in text.chars() {
        let ch = if ch.is_whitespace() { ' ' } else { ch };
        if ch == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }
        let id = tokens
            .get_char(ch)
            .or_else(|| ch.to_lowercase().next().and_then(|lower| tokens.get_char(lower)));
        match id {
            Some(id) => ids.push(id),
            None => log::debug!("Character {ch:?} has no token, skipping"),
        }
    }
    let space = tokens.get(" ");
    if space.is_some() && ids.last().copied() == space {
        ids.pop();
    }
    ids
}

/// Split text into sentences at terminal punctuation and line breaks,
/// then pack consecutive sentences into pieces of at most `max_chars`.
/// A single sentence longer than `max_chars` stays whole.
pub fn split_sentences(text: &str, max_chars: usize) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch == '\n' || ch == '\r' {
            flush(&mut sentences, &mut current);
            continue;
        }
        current.push(ch);
        if matches!(ch, '.' | '!' | '?' | '。' | '！' | '？' | '…') {
            flush(&mut sentences, &mut current);
        }
    }
    flush(&mut sentences, &mut current);

    let mut pieces: Vec<String> = Vec::new();
    for sentence in sentences {
        match pieces.last_mut() {
            Some(last) if last.chars().count() + 1 + sentence.chars().count() <= max_chars => {
                last.push(' ');
                last.push_str(&sentence);
            }
            _ => pieces.push(sentence),
        }
    }
    pieces
}

fn flush(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}
