//! Unicode-aware tokenizer with stemming for BM25.
//!
//! Text preprocessing for lexical matching of reports:
//! - Unicode word segmentation
//! - Case folding
//! - English stemming
//! - Stop word removal (keeps SQL/boolean keywords)
//! - Minimum token length filtering

use std::collections::{BTreeMap, HashSet};

use bincode::{Decode, Encode};
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Tokenizer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct TokenizerConfig {
    /// Apply English stemming to tokens.
    pub stemming: bool,
    /// Remove common stop words.
    pub remove_stopwords: bool,
    /// Minimum token length to include.
    pub min_token_length: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            stemming: true,
            remove_stopwords: true,
            min_token_length: 2,
        }
    }
}

/// Unicode-aware tokenizer with optional stemming.
pub struct Tokenizer {
    config: TokenizerConfig,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<&'static str>,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("config", &self.config)
            .finish()
    }
}

impl Tokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        let stemmer = config
            .stemming
            .then(|| Stemmer::create(Algorithm::English));

        Self {
            config,
            stemmer,
            stopwords: Self::default_stopwords(),
        }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Tokenize text into processed tokens, in order of appearance.
    ///
    /// Tokens with no letters are kept only when they contain a digit, so
    /// port numbers, versions and CVE ids still match.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .filter_map(|word| self.process_token(word))
            .collect()
    }

    /// Term counts, sorted by term.
    pub fn term_counts(&self, text: &str) -> BTreeMap<String, usize> {
        let mut tf = BTreeMap::new();
        for token in self.tokenize(text) {
            *tf.entry(token).or_insert(0) += 1;
        }
        tf
    }

    fn process_token(&self, word: &str) -> Option<String> {
        let lower = word.to_lowercase();

        if !lower.chars().any(|c| c.is_alphanumeric()) {
            return None;
        }

        if lower.chars().count() < self.config.min_token_length {
            return None;
        }

        if self.config.remove_stopwords && self.stopwords.contains(lower.as_str()) {
            return None;
        }

        let token = match &self.stemmer {
            Some(stemmer) if lower.chars().any(|c| c.is_alphabetic()) => {
                stemmer.stem(&lower).to_string()
            }
            _ => lower,
        };

        // some stems fall under the minimum
        if token.chars().count() < self.config.min_token_length {
            return None;
        }

        Some(token)
    }

    /// English stop words for report text.
    ///
    /// `or`, `and`, `not`, `union`, `select`, `where`, `from` and friends are
    /// deliberately absent: they carry signal inside injection payloads.
    fn default_stopwords() -> HashSet<&'static str> {
        [
            // Articles
            "a", "an", "the", // Prepositions
            "in", "on", "at", "to", "of", "with", "by", "as", "into", "through", "during",
            "before", "after", "above", "below", "between", "under", "over", "out", "up", "down",
            "off", // Conjunctions
            "but", "nor", "so", "yet", // Pronouns
            "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us", "them", "my",
            "your", "his", "its", "our", "their", "this", "that", "these", "those", "which", "who",
            "whom", "whose", "what", "how", "why", // Common verbs
            "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "having",
            "does", "did", "doing", "will", "would", "could", "should", "may", "might", "must",
            "shall", "can", // Other common words
            "no", "yes", "any", "both", "each", "few", "more", "most", "some", "such", "than",
            "too", "very", "just", "also", "only", "own", "same", "then", "there", "here", "now",
            "about", "whether",
        ]
        .into_iter()
        .collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(TokenizerConfig::default())
    }
}
