use std::collections::HashMap;
use std::path::Path;

use super::model::EngineError;

/// Symbol → token id table loaded from a model's `tokens.txt`.
///
/// Each line holds a symbol and its integer id separated by whitespace. The
/// symbol may itself be a space, in which case the line starts with it
/// (`"  3"` maps `" "` to 3).
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    ids: HashMap<String, i64>,
}

impl TokenTable {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        let table = Self::parse(&content)?;
        log::info!("Loaded {} tokens from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn parse(content: &str) -> Result<Self, EngineError> {
        let mut ids = HashMap::new();
        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let (symbol, id) = line
                .rsplit_once([' ', '\t'])
                .ok_or_else(|| EngineError::Tokens(format!("line {}: {line:?}", lineno + 1)))?;
            let id: i64 = id.trim().parse().map_err(|_| {
                EngineError::Tokens(format!("line {}: bad id in {line:?}", lineno + 1))
            })?;
            let symbol = if symbol.is_empty() { " " } else { symbol };
            ids.entry(symbol.to_string()).or_insert(id);
        }
        if ids.is_empty() {
            return Err(EngineError::Tokens("no tokens found".to_string()));
        }
        Ok(Self { ids })
    }

    pub fn get(&self, symbol: &str) -> Option<i64> {
        self.ids.get(symbol).copied()
    }

    pub fn get_char(&self, ch: char) -> Option<i64> {
        let mut buf = [0u8; 4];
        self.get(ch.encode_utf8(&mut buf))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
