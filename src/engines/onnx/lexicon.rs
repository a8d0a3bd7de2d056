use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::model::EngineError;
use super::tokens::TokenTable;

/// Word → phone sequence mapping from a `lexicon.txt`.
///
/// Lines are `word phone phone ...`. MeloTTS lexicons append one tone per
/// phone (`word p1 .. pN t1 .. tN`); those tones are kept alongside the
/// phones. Words are matched case-insensitively. Scripts written without
/// spaces are segmented by greedy longest match over the lexicon words plus
/// any dictionary word list.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: HashMap<String, Entry>,
    segment_words: HashSet<String>,
    max_word_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    phones: Vec<String>,
    /// Empty when the lexicon carries no tones.
    tones: Vec<i64>,
}

impl Entry {
    /// Split the fields after the word into phones and, when the second half
    /// is all integers, tones.
    fn from_fields(mut fields: Vec<&str>) -> Self {
        let half = fields.len() / 2;
        if fields.len() % 2 == 0 && half > 0 {
            let tones: Option<Vec<i64>> = fields[half..].iter().map(|t| t.parse().ok()).collect();
            if let Some(tones) = tones {
                fields.truncate(half);
                return Self {
                    phones: fields.into_iter().map(str::to_string).collect(),
                    tones,
                };
            }
        }
        Self {
            phones: fields.into_iter().map(str::to_string).collect(),
            tones: Vec::new(),
        }
    }
}

/// Token ids with one tone per id. Tones are 0 where the lexicon has none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToneIds {
    pub ids: Vec<i64>,
    pub tones: Vec<i64>,
}

impl ToneIds {
    fn push(&mut self, id: i64, tone: i64) {
        self.ids.push(id);
        self.tones.push(tone);
    }
}

impl Lexicon {
    pub fn load(path: &Path, dict_dir: Option<&Path>) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        let mut lexicon = Self::parse(&content)?;
        if let Some(dir) = dict_dir {
            lexicon.add_dict_dir(dir)?;
        }
        log::info!(
            "Loaded lexicon with {} entries from {}",
            lexicon.entries.len(),
            path.display()
        );
        Ok(lexicon)
    }

    pub fn parse(content: &str) -> Result<Self, EngineError> {
        let mut lexicon = Self::default();
        for (lineno, line) in content.lines().enumerate() {
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let fields: Vec<&str> = fields.collect();
            if fields.is_empty() {
                return Err(EngineError::Lexicon(format!(
                    "line {}: '{word}' has no phones",
                    lineno + 1
                )));
            }
            let word = word.to_lowercase();
            lexicon.note_word(&word);
            lexicon
                .entries
                .entry(word)
                .or_insert_with(|| Entry::from_fields(fields));
        }
        Ok(lexicon)
    }

    /// Add segmentation words from the `*.dict.utf8` files of a dictionary
    /// directory. Only the first column of each line is used.
    pub fn add_dict_dir(&mut self, dir: &Path) -> Result<(), EngineError> {
        let mut files: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(".dict.utf8"))
            })
            .collect();
        files.sort();

        for file in files {
            let content = std::fs::read_to_string(&file)?;
            let before = self.segment_words.len();
            for word in content.lines().filter_map(|l| l.split_whitespace().next()) {
                self.add_segment_word(word);
            }
            log::debug!(
                "Added {} segmentation words from {}",
                self.segment_words.len() - before,
                file.display()
            );
        }
        Ok(())
    }

    pub fn add_segment_word(&mut self, word: &str) {
        let word = word.to_lowercase();
        self.note_word(&word);
        self.segment_words.insert(word);
    }

    pub fn phones(&self, word: &str) -> Option<&[String]> {
        self.entries
            .get(&word.to_lowercase())
            .map(|e| e.phones.as_slice())
    }

    /// Tones of `word`, if the lexicon has them.
    pub fn tones(&self, word: &str) -> Option<&[i64]> {
        self.entries
            .get(&word.to_lowercase())
            .map(|e| e.tones.as_slice())
            .filter(|t| !t.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn note_word(&mut self, word: &str) {
        self.max_word_chars = self.max_word_chars.max(word.chars().count());
    }

    /// Split an unspaced run into known words, longest first. Characters that
    /// start no known word become single-character pieces.
    pub fn segment(&self, run: &str) -> Vec<String> {
        self.segment_by(run, |w| {
            self.entries.contains_key(w) || self.segment_words.contains(w)
        })
    }

    fn segment_by(&self, run: &str, known: impl Fn(&str) -> bool) -> Vec<String> {
        let chars: Vec<char> = run.to_lowercase().chars().collect();
        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let longest = (start + self.max_word_chars.max(1)).min(chars.len());
            let end = (start + 1..=longest)
                .rev()
                .find(|&end| known(&chars[start..end].iter().collect::<String>()))
                .unwrap_or(start + 1);
            pieces.push(chars[start..end].iter().collect());
            start = end;
        }
        pieces
    }

    /// Convert text to token ids.
    ///
    /// Words found in the lexicon contribute their phones; unknown words are
    /// segmented and looked up piecewise. Punctuation and the space symbol
    /// are kept when the token table has them.
    pub fn to_ids(&self, text: &str, tokens: &TokenTable) -> Vec<i64> {
        self.to_tone_ids(text, tokens).ids
    }

    /// Like [`Lexicon::to_ids`], with the tone of every id.
    pub fn to_tone_ids(&self, text: &str, tokens: &TokenTable) -> ToneIds {
        let mut out = ToneIds::default();
        let space = tokens.get(" ");
        for (n, word) in split_words(text).into_iter().enumerate() {
            match word {
                Word::Punct(ch) => {
                    if let Some(id) = tokens.get_char(ch) {
                        out.push(id, 0);
                    }
                }
                Word::Text(word) => {
                    if let Some(space) = space.filter(|_| n > 0) {
                        out.push(space, 0);
                    }
                    self.push_word(&word, tokens, &mut out);
                }
            }
        }
        out
    }

    fn push_word(&self, word: &str, tokens: &TokenTable, out: &mut ToneIds) {
        if self.push_entry(word, tokens, out) {
            return;
        }
        for piece in self.segment(word) {
            if self.push_entry(&piece, tokens, out) {
                continue;
            }
            // Dictionary words often have no entry of their own.
            for sub in self.segment_by(&piece, |w| self.entries.contains_key(w)) {
                if !self.push_entry(&sub, tokens, out) {
                    log::debug!("No lexicon entry for '{sub}', skipping");
                }
            }
        }
    }

    fn push_entry(&self, word: &str, tokens: &TokenTable, out: &mut ToneIds) -> bool {
        let Some(entry) = self.entries.get(&word.to_lowercase()) else {
            return false;
        };
        for (i, phone) in entry.phones.iter().enumerate() {
            if let Some(id) = tokens.get(phone) {
                out.push(id, entry.tones.get(i).copied().unwrap_or(0));
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Word {
    Text(String),
    Punct(char),
}

fn split_words(text: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_whitespace() || is_punct(ch) {
            if !current.is_empty() {
                words.push(Word::Text(std::mem::take(&mut current)));
            }
            if is_punct(ch) {
                words.push(Word::Punct(ch));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push(Word::Text(current));
    }
    words
}

fn is_punct(ch: char) -> bool {
    matches!(
        ch,
        '.' | ',' | '!' | '?' | ';' | ':' | '。' | '，' | '！' | '？' | '；' | '：' | '、'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEXICON: &str = "\
hello h e l o
world w er l d
你 n i3
你好 n i3 h ao3
好 h ao3
世界 sh i4 j ie4
";

    fn tokens() -> TokenTable {
        let symbols = [
            " ", "h", "e", "l", "o", "w", "er", "d", "n", "i3", "ao3", "sh", "i4", "j", "ie4", ",",
        ];
        let content: String = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{s} {i}\n"))
            .collect();
        TokenTable::parse(&content).unwrap()
    }

    #[test]
    fn looks_up_words_case_insensitively() {
        let lexicon = Lexicon::parse(LEXICON).unwrap();
        assert_eq!(lexicon.len(), 6);
        assert_eq!(
            lexicon.phones("Hello").unwrap(),
            &["h", "e", "l", "o"].map(String::from)
        );
        assert!(lexicon.phones("moon").is_none());
    }

    #[test]
    fn rejects_entries_without_phones() {
        assert!(matches!(
            Lexicon::parse("lonely\n"),
            Err(EngineError::Lexicon(_))
        ));
    }

    #[test]
    fn segments_unspaced_text_longest_first() {
        let lexicon = Lexicon::parse(LEXICON).unwrap();
        assert_eq!(lexicon.segment("你好世界"), vec!["你好", "世界"]);
        assert_eq!(lexicon.segment("好你x"), vec!["好", "你", "x"]);
    }

    #[test]
    fn dictionary_words_guide_segmentation() {
        let mut lexicon = Lexicon::parse("ab a b\nc c\nabc x\n").unwrap();
        assert_eq!(lexicon.segment("abcd"), vec!["abc", "d"]);
        lexicon.add_segment_word("abcd");
        assert_eq!(lexicon.segment("abcd"), vec!["abcd"]);
    }

    #[test]
    fn loads_dict_dir_words() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("jieba.dict.utf8"), "世界大战 3 n\n").unwrap();
        std::fs::write(tmp.path().join("stop_words.utf8"), "你好世界\n").unwrap();
        let lexicon_path = tmp.path().join("lexicon.txt");
        std::fs::write(&lexicon_path, LEXICON).unwrap();

        let lexicon = Lexicon::load(&lexicon_path, Some(tmp.path())).unwrap();
        // Segmentation sees the dictionary word; lookup falls back to the
        // lexicon words inside it.
        assert_eq!(lexicon.segment("世界大战"), vec!["世界大战"]);
        assert_eq!(lexicon.segment("你好世界"), vec!["你好", "世界"]);
        assert!(lexicon.phones("世界大战").is_none());
        assert_eq!(lexicon.to_ids("世界大战", &tokens()), vec![11, 12, 13, 14]);
    }

    #[test]
    fn dictionary_words_without_entries_keep_their_characters() {
        let lexicon_text = "世 s1\n界 s2\n大 s3\n战 s4\n";
        let table = TokenTable::parse(" 0\ns1 1\ns2 2\ns3 3\ns4 4\n").unwrap();
        let mut lexicon = Lexicon::parse(lexicon_text).unwrap();
        let plain = lexicon.to_ids("世界大战", &table);
        assert_eq!(plain, vec![1, 2, 3, 4]);

        lexicon.add_segment_word("世界大战");
        lexicon.add_segment_word("界大");
        assert_eq!(lexicon.to_ids("世界大战", &table), plain);
    }

    #[test]
    fn melo_lines_split_phones_and_tones() {
        let lexicon = Lexicon::parse("你好 n i h ao 3 3 3 3\nhello hh ah l ow 0 2 0 1\nab a b\n").unwrap();
        assert_eq!(lexicon.phones("你好").unwrap(), &["n", "i", "h", "ao"].map(String::from));
        assert_eq!(lexicon.tones("你好").unwrap(), &[3, 3, 3, 3]);
        assert_eq!(lexicon.phones("ab").unwrap(), &["a", "b"].map(String::from));
        assert!(lexicon.tones("ab").is_none());

        let table = TokenTable::parse("_ 0\n  1\nn 2\ni 3\nh 4\nao 5\nhh 6\nah 7\nl 8\now 9\n").unwrap();
        let out = lexicon.to_tone_ids("你好 hello", &table);
        assert_eq!(out.ids, vec![2, 3, 4, 5, 1, 6, 7, 8, 9]);
        assert_eq!(out.tones, vec![3, 3, 3, 3, 0, 0, 2, 0, 1]);
    }

    #[test]
    fn converts_mixed_text_to_ids() {
        let lexicon = Lexicon::parse(LEXICON).unwrap();
        let table = tokens();
        let ids = lexicon.to_ids("Hello, world 你好世界", &table);
        let expected: Vec<i64> = vec![1, 2, 3, 4, 15, 0, 5, 6, 3, 7, 0, 8, 9, 1, 10, 11, 12, 13, 14];
        assert_eq!(ids, expected);
    }
}
