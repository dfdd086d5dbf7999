//! Text normalization shared by file names and extracted content.

use crate::stopwords::StopwordSet;
use jieba_rs::Jieba;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{P}\p{S}]").unwrap());
static HAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{Han}").unwrap());
static JIEBA: Lazy<Jieba> = Lazy::new(Jieba::new);

#[derive(Debug, Clone)]
pub struct Normalizer {
    stopwords: Arc<StopwordSet>,
    max_chars: usize,
}

impl Normalizer {
    pub fn new(stopwords: Arc<StopwordSet>, max_chars: usize) -> Self {
        Self {
            stopwords,
            max_chars,
        }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Lowercased tokens with punctuation deleted, Chinese runs segmented
    /// into words, and stopwords removed.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let stripped = PUNCTUATION.replace_all(&lowered, "");
        stripped
            .split_whitespace()
            .flat_map(segment)
            .filter(|t| !self.stopwords.contains(t))
            .map(str::to_string)
            .collect()
    }

    pub fn normalize(&self, text: &str) -> String {
        self.fit(self.tokens(text))
    }

    /// Normalized basename; the fallback signal every file has.
    pub fn file_signal(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.normalize(&name)
    }

    /// File name tokens first, then body tokens, within the budget.
    pub fn document_signal(&self, path: &Path, body: &str) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut tokens = self.tokens(&name);
        tokens.extend(self.tokens(body));
        self.fit(tokens)
    }

    /// Joins whole tokens until the character budget is spent.
    fn fit(&self, tokens: Vec<String>) -> String {
        let mut out = String::new();
        let mut used = 0usize;
        for token in tokens {
            let len = token.chars().count();
            let sep = usize::from(!out.is_empty());
            if used + sep + len <= self.max_chars {
                if sep == 1 {
                    out.push(' ');
                }
                out.push_str(&token);
                used += sep + len;
                continue;
            }
            if out.is_empty() {
                // A single token longer than the budget is cut, unless the cut
                // leaves a stopword behind.
                let cut: String = token.chars().take(self.max_chars).collect();
                if !self.stopwords.contains(&cut) {
                    out = cut;
                }
            }
            break;
        }
        out
    }
}

/// Whitespace carries no word boundaries inside Chinese text.
fn segment(token: &str) -> Vec<&str> {
    if !HAN.is_match(token) {
        return vec![token];
    }
    JIEBA
        .cut(token, false)
        .into_iter()
        .filter(|w| !w.trim().is_empty())
        .collect()
}
