use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strsim::{jaro_winkler, normalized_levenshtein};

/// String similarity metric used to rank candidate names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Scorer {
    /// Insertion/deletion ratio: `1 - indel / (len_a + len_b)`
    #[default]
    #[value(alias = "indel")]
    Ratio,
    /// Normalized Levenshtein ratio
    Levenshtein,
    JaroWinkler,
}

/// Fuzzy matcher for dictionary names
#[derive(Debug, Clone, Default)]
pub struct NameMatcher {
    pub scorer: Scorer,
    /// Lowercase and drop punctuation before comparing
    pub normalize: bool,
}

impl NameMatcher {
    pub fn new(scorer: Scorer) -> Self {
        Self {
            scorer,
            normalize: false,
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    /// Lowercase, turn non-alphanumerics into spaces and collapse whitespace
    pub fn normalize_string(&self, s: &str) -> String {
        if !self.normalize {
            return s.to_string();
        }

        let spaced: String = s
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        spaced.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Similarity between two strings on a 0-100 scale (higher = more similar)
    pub fn similarity(&self, s1: &str, s2: &str) -> f64 {
        let a = self.normalize_string(s1);
        let b = self.normalize_string(s2);

        let ratio = match self.scorer {
            Scorer::Ratio => rapidfuzz::fuzz::ratio(a.chars(), b.chars()),
            Scorer::Levenshtein => normalized_levenshtein(&a, &b),
            Scorer::JaroWinkler => jaro_winkler(&a, &b),
        };

        ratio * 100.0
    }

    /// Find the best scoring candidate.
    ///
    /// Ties keep the earliest candidate, so a stable candidate order gives a stable answer.
    /// Returns `None` when there are no candidates.
    pub fn find_best_match<'a, I>(&self, query: &str, candidates: I) -> Option<(&'a str, f64)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, f64)> = None;

        for candidate in candidates {
            let score = self.similarity(query, candidate);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((candidate, score)),
            }
        }

        best
    }
}
