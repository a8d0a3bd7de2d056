use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::model::EngineError;
use super::tokens::TokenTable;

/// Location of the espeak-ng binary and its phoneme data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EspeakConfig {
    /// `None` runs `espeak-ng` from PATH.
    pub bin_path: Option<PathBuf>,
    /// An `espeak-ng-data` directory. `None` uses the data espeak-ng was
    /// installed with.
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    pub fn with_data(data_path: impl Into<PathBuf>) -> Self {
        Self {
            bin_path: None,
            data_path: Some(data_path.into()),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(
            self.bin_path
                .as_deref()
                .unwrap_or_else(|| std::path::Path::new("espeak-ng")),
        );
        // --path names the directory that contains espeak-ng-data.
        if let Some(parent) = self.data_path.as_deref().and_then(|p| p.parent()) {
            cmd.arg(format!("--path={}", parent.display()));
        }
        cmd
    }
}

/// Convert text to phoneme token IDs via espeak-ng.
///
/// Punctuation is kept as its own token so the model hears the pause;
/// characters that are not in the token table are dropped.
pub fn phonemize(
    text: &str,
    lang: &str,
    tokens: &TokenTable,
    espeak: &EspeakConfig,
) -> Result<Vec<i64>, EngineError> {
    let segments = segment_text(text);
    let words: Vec<&str> = segments
        .iter()
        .filter_map(|segment| match segment {
            Segment::Words(words) => Some(words.as_str()),
            Segment::Punct(_) => None,
        })
        .collect();
    if words.is_empty() {
        return Ok(segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Punct(ch) => tokens.get_char(*ch),
                Segment::Words(_) => None,
            })
            .collect());
    }

    let mut phonemized = phonemize_lines(&words, lang, tokens, espeak)?.into_iter();
    let mut ids = Vec::new();
    for segment in &segments {
        match segment {
            Segment::Words(_) => ids.extend(phonemized.next().unwrap_or_default()),
            Segment::Punct(ch) => ids.extend(tokens.get_char(*ch)),
        }
    }
    Ok(ids)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Words(String),
    Punct(char),
}

/// Split `text` at pause punctuation, collapsing whitespace inside each run
/// of words. Newlines act as full stops.
fn segment_text(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut words = String::new();

    for (idx, ch) in text.char_indices() {
        if let Some(punct) = pause_symbol(ch) {
            if !joins_digits(text, idx, ch) {
                flush(&mut words, &mut segments);
                segments.push(Segment::Punct(punct));
                continue;
            }
        }
        if ch.is_whitespace() {
            if !words.is_empty() && !words.ends_with(' ') {
                words.push(' ');
            }
        } else {
            words.push(ch);
        }
    }
    flush(&mut words, &mut segments);
    segments
}

fn flush(words: &mut String, segments: &mut Vec<Segment>) {
    let trimmed = words.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::Words(trimmed.to_string()));
    }
    words.clear();
}

fn pause_symbol(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

/// A `.` or `,` between two digits belongs to the number ("2.0", "1,000").
fn joins_digits(text: &str, idx: usize, ch: char) -> bool {
    if ch != '.' && ch != ',' {
        return false;
    }
    let before = text[..idx].chars().next_back();
    let after = text[idx + ch.len_utf8()..].chars().next();
    matches!((before, after), (Some(b), Some(a)) if b.is_ascii_digit() && a.is_ascii_digit())
}

/// Phonemize every line with one espeak-ng run, falling back to one run per
/// line when espeak-ng does not answer line for line.
fn phonemize_lines(
    lines: &[&str],
    lang: &str,
    tokens: &TokenTable,
    espeak: &EspeakConfig,
) -> Result<Vec<Vec<i64>>, EngineError> {
    let output = run_espeak(&lines.join("\n"), lang, espeak)?;
    let answered: Vec<&str> = output.lines().collect();
    if answered.len() == lines.len() {
        return Ok(answered.iter().map(|ipa| ipa_to_ids(ipa, tokens)).collect());
    }

    log::debug!(
        "espeak-ng returned {} lines for {} inputs, phonemizing one by one",
        answered.len(),
        lines.len()
    );
    lines
        .iter()
        .map(|line| Ok(ipa_to_ids(&run_espeak(line, lang, espeak)?, tokens)))
        .collect()
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, EngineError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::EspeakNotFound,
            _ => EngineError::Io(e),
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // The last line is under-processed without a terminator.
        stdin.write_all(terminated(input).as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(EngineError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

/// Map IPA output to ids. `_` is espeak-ng's word joiner and is skipped.
fn ipa_to_ids(ipa: &str, tokens: &TokenTable) -> Vec<i64> {
    ipa.lines()
        .map(str::trim)
        .flat_map(str::chars)
        .filter(|&ch| ch != '_')
        .filter_map(|ch| tokens.get_char(ch))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn espeak_available() -> bool {
        Command::new("espeak-ng").arg("--version").output().is_ok()
    }

    fn ipa_tokens() -> TokenTable {
        let symbols = [
            " ", ",", ".", "!", "ə", "m", "ɛ", "ɹ", "ɪ", "k", "æ", "ˈ", "h", "l", "o", "ʊ", "w",
            "ɜ", "d",
        ];
        let content: String = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{s} {i}\n"))
            .collect();
        TokenTable::parse(&content).unwrap()
    }

    #[test]
    fn splits_words_and_punctuation() {
        let parts = segment_text("Hello, world. Testing!");
        assert_eq!(
            parts,
            vec![
                Segment::Words("Hello".to_string()),
                Segment::Punct(','),
                Segment::Words("world".to_string()),
                Segment::Punct('.'),
                Segment::Words("Testing".to_string()),
                Segment::Punct('!'),
            ]
        );
    }

    #[test]
    fn keeps_decimal_and_thousands_separators_inside_text() {
        let parts = segment_text("Version 2.0 reached 1,000 users.");
        assert_eq!(
            parts,
            vec![
                Segment::Words("Version 2.0 reached 1,000 users".to_string()),
                Segment::Punct('.'),
            ]
        );
    }

    #[test]
    fn stdin_payload_is_newline_terminated() {
        assert_eq!(terminated("America"), "America\n");
        assert_eq!(terminated("America\n"), "America\n");
    }

    #[test]
    fn maps_ipa_through_token_table() {
        let tokens = ipa_tokens();
        // 'q' is not in the table.
        assert_eq!(ipa_to_ids("əm_ɛq\n\n", &tokens), vec![4, 5, 6]);
    }

    #[test]
    fn data_path_is_passed_as_parent_directory() {
        let config = EspeakConfig::with_data("/voices/piper/espeak-ng-data");
        let cmd = config.command();
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["--path=/voices/piper".to_string()]);
        assert_eq!(cmd.get_program(), "espeak-ng");
    }

    #[test]
    fn missing_binary_reports_espeak_not_found() {
        let config = EspeakConfig {
            bin_path: Some(PathBuf::from("/nonexistent/espeak-ng")),
            data_path: None,
        };
        let err = run_espeak("hello", "en-us", &config).unwrap_err();
        assert!(matches!(err, EngineError::EspeakNotFound));
    }

    #[test]
    fn phonemize_keeps_terminal_schwa_for_america() {
        if !espeak_available() {
            return;
        }

        let tokens = ipa_tokens();
        let ids = phonemize("America", "en-us", &tokens, &EspeakConfig::default())
            .expect("phonemize should succeed");
        assert_eq!(
            ids.last(),
            tokens.get_char('ə').as_ref(),
            "terminal schwa should be preserved for 'America'"
        );
    }
}
