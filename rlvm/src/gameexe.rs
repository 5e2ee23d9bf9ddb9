//! The Gameexe configuration-file parser.
//!
//! Grounded on `original_source/src/core/gameexe.cpp`. A Gameexe file is a
//! line-oriented multimap from dotted key to a vector of [`Token`]s. Two
//! line forms are recognised (spec.md §4.3): a strict `#KEY = v1, v2, …`
//! form with its own quirky tokenizer, and a lenient `key = value` form
//! used by newer scenario configs.

use std::collections::BTreeMap;

use rlvm_types::{Error, Result, Token};

/// An ordered multimap from dotted key to a vector of tokens.
///
/// Re-assigning through [`Self::set_int`]/[`Self::set_str`] or a
/// [`GameexeView`] replaces *all* previously stored vectors for that key;
/// parsing duplicate `#KEY = …` lines instead keeps every vector,
/// preserving insertion order, with lookups resolving to the first one
/// (matching `std::multimap`'s semantics as used by the original parser).
#[derive(Debug, Default, Clone)]
pub struct Gameexe {
    /// All stored `(key, values)` pairs in insertion order.
    entries: Vec<(String, Vec<Token>)>,
    /// key -> indices into `entries`, in insertion order.
    index: BTreeMap<String, Vec<usize>>,
}

impl Gameexe {
    /// An empty Gameexe, useful as a base for programmatic configuration.
    pub fn new() -> Self {
        Gameexe::default()
    }

    /// Parse a whole Gameexe file's text.
    pub fn parse(text: &str) -> Self {
        let mut gexe = Gameexe::new();
        for line in text.lines() {
            gexe.parse_line(line);
        }
        gexe
    }

    fn parse_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        let Some(eq) = trimmed.find('=') else {
            return;
        };

        if let Some(rest) = trimmed.strip_prefix('#') {
            // rest = "KEY = v1, v2" ; recompute the '=' relative to rest.
            let Some(eq) = rest.find('=') else { return };
            let key = rest[..eq].trim().to_string();
            let value = rest[eq + 1..].trim();
            let tokens = tokenize_hash_value(value);
            self.push(key, tokens);
            return;
        }

        let key = trimmed[..eq].trim().to_string();
        let value = trimmed[eq + 1..].trim();
        if key.is_empty() {
            return;
        }
        if value.is_empty() {
            self.push(key, Vec::new());
            return;
        }
        let tokens = value
            .split(',')
            .map(|piece| classify_lenient_token(piece.trim()))
            .collect();
        self.push(key, tokens);
    }

    fn push(&mut self, key: String, tokens: Vec<Token>) {
        let idx = self.entries.len();
        self.index.entry(key.clone()).or_default().push(idx);
        self.entries.push((key, tokens));
    }

    /// Replace every stored vector for `key` with a single integer value.
    pub fn set_int(&mut self, key: &str, value: i32) {
        self.erase(key);
        self.push(key.to_string(), vec![Token::int(value)]);
    }

    /// Replace every stored vector for `key` with a single string value.
    pub fn set_str(&mut self, key: &str, value: impl Into<String>) {
        self.erase(key);
        self.push(key.to_string(), vec![Token::string(value)]);
    }

    fn erase(&mut self, key: &str) {
        if let Some(indices) = self.index.remove(key) {
            let doomed: std::collections::HashSet<usize> = indices.into_iter().collect();
            let mut kept = Vec::with_capacity(self.entries.len());
            for (i, entry) in self.entries.drain(..).enumerate() {
                if !doomed.contains(&i) {
                    kept.push(entry);
                }
            }
            self.entries = kept;
            self.reindex();
        }
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, (key, _)) in self.entries.iter().enumerate() {
            self.index.entry(key.clone()).or_default().push(i);
        }
    }

    /// Whether any entry exists for `key`.
    pub fn exists(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// A chainable view over `key`, joining `parts` with `.`.
    pub fn get<'g>(&'g self, parts: &[&str]) -> GameexeView<'g> {
        let key = parts.join(".");
        GameexeView { gexe: self, key }
    }

    /// All entries whose key starts with `prefix`, in stored order.
    pub fn filter<'g>(&'g self, prefix: &str) -> impl Iterator<Item = GameexeView<'g>> + 'g {
        let prefix = prefix.to_string();
        self.entries
            .iter()
            .filter(move |(k, _)| k.starts_with(&prefix))
            .map(move |(k, _)| GameexeView {
                gexe: self,
                key: k.clone(),
            })
    }
}

/// A chainable lookup over one dotted key.
pub struct GameexeView<'g> {
    gexe: &'g Gameexe,
    key: String,
}

impl<'g> GameexeView<'g> {
    fn first_values(&self) -> Option<&'g Vec<Token>> {
        let idx = *self.gexe.index.get(&self.key)?.first()?;
        Some(&self.gexe.entries[idx].1)
    }

    /// The dotted key this view addresses.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this key has any stored entry.
    pub fn exists(&self) -> bool {
        self.gexe.exists(&self.key)
    }

    /// The key split on `.`.
    pub fn key_parts(&self) -> Vec<&str> {
        self.key.split('.').collect()
    }

    /// The first token's integer value.
    pub fn as_int(&self) -> Result<i32> {
        self.at(0).map(|t| t.to_int())
    }

    /// The first token's integer value, or `default` if the key is
    /// missing.
    pub fn as_int_or(&self, default: i32) -> i32 {
        self.as_int().unwrap_or(default)
    }

    /// The first token's string value.
    pub fn as_str(&self) -> Result<String> {
        self.at(0).map(|t| t.to_string_value())
    }

    /// The first token's string value, or `default` if the key is
    /// missing.
    pub fn as_str_or(&self, default: &str) -> String {
        self.as_str().unwrap_or_else(|_| default.to_string())
    }

    /// All tokens' integer values.
    pub fn as_int_vec(&self) -> Result<Vec<i32>> {
        let values = self
            .first_values()
            .ok_or_else(|| Error::NotFound(self.key.clone()))?;
        Ok(values.iter().map(|t| t.to_int()).collect())
    }

    /// The token at `index`.
    pub fn at(&self, index: usize) -> Result<&'g Token> {
        let values = self
            .first_values()
            .ok_or_else(|| Error::NotFound(self.key.clone()))?;
        values
            .get(index)
            .ok_or_else(|| Error::TypeMismatch(self.key.clone()))
    }
}

fn classify_lenient_token(piece: &str) -> Token {
    if piece.len() >= 2 && piece.starts_with('"') && piece.ends_with('"') {
        return Token::string(piece[1..piece.len() - 1].to_string());
    }
    match piece.parse::<i32>() {
        Ok(v) => Token::int(v),
        Err(_) => Token::string(piece.to_string()),
    }
}

/// The quirky tokenizer used only inside `#`-prefixed values
/// (`gameexe_token_extractor` in the original). A `-` directly following a
/// digit ends the current numeric run rather than starting a negative
/// number — this reproduces the DSTRACK-range quirk spec.md calls out.
fn tokenize_hash_value(value: &str) -> Vec<Token> {
    let chars: Vec<char> = value.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let is_num = |c: char| c == '-' || c.is_ascii_digit();
    let is_data = |c: char| c == '"' || is_num(c);

    while i < chars.len() {
        while i < chars.len() && !is_data(chars[i]) {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        if chars[i] == '"' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            tokens.push(Token::string(chars[start..i].iter().collect::<String>()));
            i += 1; // consume closing quote
        } else {
            let start = i;
            let mut last_char = '\0';
            while i < chars.len() {
                let c = chars[i];
                if c == '-' {
                    if last_char.is_ascii_digit() {
                        i += 1; // separator, not part of any token
                        break;
                    } else {
                        i += 1;
                    }
                } else if is_num(c) {
                    i += 1;
                } else {
                    break;
                }
                last_char = c;
            }
            let text: String = chars[start..i].iter().collect();
            let text = text.trim_end_matches('-');
            if text == "-" || text.is_empty() {
                // bare separator: dropped entirely, matching the original.
            } else {
                let value = parse_leading_int(text);
                tokens.push(Token::int(value));
            }
        }
    }

    tokens
}

/// Parse the longest valid leading integer out of `text`, matching the
/// original's `catch (...) { asint = 0; }` fallback on total failure.
fn parse_leading_int(text: &str) -> i32 {
    if let Ok(v) = text.parse::<i32>() {
        return v;
    }
    let mut end = text.len();
    while end > 0 {
        if let Ok(v) = text[..end].parse::<i32>() {
            return v;
        }
        end -= 1;
    }
    tracing::warn!(token = text, "could not parse Gameexe int token, using 0");
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_prefixed_chaining_round_trips() {
        // spec.md §8 scenario 2.
        let mut g = Gameexe::parse(
            "#IMAGINE.ONE=1\n#IMAGINE.TWO=2\n#IMAGINE.THREE=3",
        );
        assert_eq!(g.get(&["IMAGINE", "ONE"]).as_int().unwrap(), 1);
        g.set_int("IMAGINE.FOUR", 10);
        assert_eq!(g.get(&["IMAGINE", "FOUR"]).as_int().unwrap(), 10);
    }

    #[test]
    fn duplicate_keys_preserve_all_vectors_in_order() {
        let g = Gameexe::parse("#A.B=1\n#A.B=2\n");
        assert_eq!(g.get(&["A", "B"]).as_int().unwrap(), 1);
    }

    #[test]
    fn lenient_line_without_hash_parses_commas() {
        let g = Gameexe::parse("window.attr = 1, 2, \"hello\"");
        let v = g.get(&["window", "attr"]).as_int_vec().unwrap();
        assert_eq!(&v[..2], &[1, 2]);
        assert_eq!(g.get(&["window", "attr"]).at(2).unwrap().to_string_value(), "hello");
    }

    #[test]
    fn dstrack_dash_quirk_separates_without_negating() {
        // "10-20" inside a #-value should tokenize as two ints, 10 and 20,
        // not as 10 followed by -20.
        let g = Gameexe::parse("#DSTRACK=10-20,\"voice\"");
        let ints = g.get(&["DSTRACK"]).at(0).unwrap().to_int();
        assert_eq!(ints, 10);
        assert_eq!(g.get(&["DSTRACK"]).at(1).unwrap().to_int(), 20);
    }

    #[test]
    fn bare_dash_token_is_dropped() {
        let g = Gameexe::parse("#RANGE=1, -, 2");
        let vals = g.get(&["RANGE"]).as_int_vec().unwrap();
        assert_eq!(vals, vec![1, 2]);
    }

    #[test]
    fn missing_key_errors_with_key_name() {
        let g = Gameexe::new();
        match g.get(&["NOPE"]).as_int() {
            Err(Error::NotFound(k)) => assert_eq!(k, "NOPE"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn filter_is_deterministic_by_stored_order() {
        let g = Gameexe::parse("#WINDOW.001.ATTR=1\n#WINDOW.000.ATTR=2\n");
        let keys: Vec<_> = g.filter("WINDOW").map(|v| v.key().to_string()).collect();
        assert_eq!(keys, vec!["WINDOW.001.ATTR", "WINDOW.000.ATTR"]);
    }
}
