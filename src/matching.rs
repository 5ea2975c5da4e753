//! Matching ROI names across two independently authored
//! naming schemes (e.g. the names drawn in this system vs.
//! the names used in a Thermal Studio export).
//!
//! Names are paired one-to-one in three passes, each pass
//! only considering names left unpaired by the previous:
//!
//! 1. exact match, ignoring case and surrounding spaces;
//! 2. equality after [normalization](NameMatcher::normalize):
//!    diacritics stripped, punctuation dropped, laterality
//!    words mapped to `left` / `right` (so `Joelho Dir`
//!    equals `joelho direito`);
//! 3. fuzzy: normalized Levenshtein similarity at or above
//!    the acceptance threshold. Names whose laterality
//!    disagrees are never paired. Best scores are assigned
//!    first; ties go to the earlier reference name, then to
//!    the earlier system name.
//!
//! Names left over on either side are reported, never
//! guessed.

use serde_derive::*;
use tracing::debug;

use crate::error::{Error, Result};

const LEFT: &str = "left";
const RIGHT: &str = "right";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum similarity (inclusive, in `(0, 1]`) for a
    /// fuzzy pairing.
    pub acceptance_threshold: f64,
    pub left_tokens: Vec<String>,
    pub right_tokens: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let tokens = |t: &[&str]| t.iter().map(|s| s.to_string()).collect();
        MatcherConfig {
            acceptance_threshold: 0.8,
            left_tokens: tokens(&["esq", "esquerdo", "esquerda", "left", "e", "l"]),
            right_tokens: tokens(&["dir", "direito", "direita", "right", "d", "r"]),
        }
    }
}

impl MatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.acceptance_threshold > 0. && self.acceptance_threshold <= 1.) {
            return Err(Error::InvalidInput(format!(
                "acceptance threshold must be in (0, 1], got {}",
                self.acceptance_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Normalized,
    Fuzzy,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub reference: String,
    pub system: String,
    /// Position of `reference` in the reference slice. Names
    /// may repeat, so callers look entries up by position.
    pub reference_index: usize,
    pub system_index: usize,
    pub kind: MatchKind,
    /// `1.0` for exact and normalized matches.
    pub score: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct NameMatches {
    /// Pairs, in reference order.
    pub pairs: Vec<NameMatch>,
    pub unmatched_reference: Vec<String>,
    pub unmatched_system: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NameMatcher {
    config: MatcherConfig,
}

impl NameMatcher {
    pub fn new(config: MatcherConfig) -> Result<Self> {
        config.validate()?;
        Ok(NameMatcher { config })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Canonical form of a name used by the second and third
    /// passes.
    pub fn normalize(&self, name: &str) -> String {
        let folded: String = name
            .to_lowercase()
            .chars()
            .filter(|c| !is_combining_mark(*c))
            .map(fold_diacritic)
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        folded
            .split_whitespace()
            .map(|token| {
                if self.config.left_tokens.iter().any(|t| t == token) {
                    LEFT
                } else if self.config.right_tokens.iter().any(|t| t == token) {
                    RIGHT
                } else {
                    token
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn match_names<S, R>(&self, system: &[S], reference: &[R]) -> NameMatches
    where
        S: AsRef<str>,
        R: AsRef<str>,
    {
        let system: Vec<&str> = system.iter().map(|s| s.as_ref()).collect();
        let reference: Vec<&str> = reference.iter().map(|s| s.as_ref()).collect();

        let mut taken = vec![false; system.len()];
        let mut matched: Vec<Option<(usize, MatchKind, f64)>> = vec![None; reference.len()];

        let exact = |s: &str| s.trim().to_lowercase();
        self.pair_equal(&system, &reference, &mut taken, &mut matched, MatchKind::Exact, exact);
        let normalized = |s: &str| self.normalize(s);
        self.pair_equal(
            &system,
            &reference,
            &mut taken,
            &mut matched,
            MatchKind::Normalized,
            normalized,
        );
        self.pair_fuzzy(&system, &reference, &mut taken, &mut matched);

        let mut result = NameMatches::default();
        for (i, m) in matched.iter().enumerate() {
            match *m {
                Some((j, kind, score)) => {
                    debug!(reference = reference[i], system = system[j], ?kind, score, "matched ROI name");
                    result.pairs.push(NameMatch {
                        reference: reference[i].to_string(),
                        system: system[j].to_string(),
                        reference_index: i,
                        system_index: j,
                        kind,
                        score,
                    })
                }
                None => result.unmatched_reference.push(reference[i].to_string()),
            }
        }
        result.unmatched_system = system
            .iter()
            .zip(&taken)
            .filter(|(_, taken)| !**taken)
            .map(|(s, _)| s.to_string())
            .collect();
        result
    }

    fn pair_equal<F>(
        &self,
        system: &[&str],
        reference: &[&str],
        taken: &mut [bool],
        matched: &mut [Option<(usize, MatchKind, f64)>],
        kind: MatchKind,
        key: F,
    ) where
        F: Fn(&str) -> String,
    {
        let system_keys: Vec<String> = system.iter().map(|s| key(s)).collect();
        for (i, r) in reference.iter().enumerate() {
            if matched[i].is_some() {
                continue;
            }
            let r = key(r);
            let found = system_keys
                .iter()
                .enumerate()
                .find(|(j, s)| !taken[*j] && **s == r)
                .map(|(j, _)| j);
            if let Some(j) = found {
                taken[j] = true;
                matched[i] = Some((j, kind, 1.));
            }
        }
    }

    fn pair_fuzzy(
        &self,
        system: &[&str],
        reference: &[&str],
        taken: &mut [bool],
        matched: &mut [Option<(usize, MatchKind, f64)>],
    ) {
        let system_keys: Vec<String> = system.iter().map(|s| self.normalize(s)).collect();
        let mut candidates = vec![];
        for (i, r) in reference.iter().enumerate() {
            if matched[i].is_some() {
                continue;
            }
            let r = self.normalize(r);
            for (j, s) in system_keys.iter().enumerate() {
                if taken[j] || laterality_conflict(&r, s) {
                    continue;
                }
                let score = similarity(&r, s);
                // inclusive threshold, tolerant to rounding of the ratio
                if score + 1e-9 >= self.config.acceptance_threshold {
                    candidates.push((score, i, j));
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });
        for (score, i, j) in candidates {
            if matched[i].is_none() && !taken[j] {
                taken[j] = true;
                matched[i] = Some((j, MatchKind::Fuzzy, score));
            }
        }
    }
}

fn side(normalized: &str) -> Option<&'static str> {
    let left = normalized.split(' ').any(|t| t == LEFT);
    let right = normalized.split(' ').any(|t| t == RIGHT);
    match (left, right) {
        (true, false) => Some(LEFT),
        (false, true) => Some(RIGHT),
        _ => None,
    }
}

fn laterality_conflict(a: &str, b: &str) -> bool {
    matches!((side(a), side(b)), (Some(x), Some(y)) if x != y)
}

/// `1 - levenshtein(a, b) / max(len(a), len(b))`, over chars.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.;
    }
    1. - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + if ca == cb { 0 } else { 1 };
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn is_combining_mark(c: char) -> bool {
    ('\u{300}'..='\u{36f}').contains(&c)
}

fn fold_diacritic(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'č' => 'c',
        'ď' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => 'e',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => 'i',
        'ł' | 'ľ' => 'l',
        'ñ' | 'ń' | 'ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => 'o',
        'ř' => 'r',
        'ś' | 'š' | 'ş' => 's',
        'ť' | 'ţ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => 'u',
        'ý' | 'ÿ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> NameMatcher {
        NameMatcher::default()
    }

    #[test]
    fn normalization() {
        let m = matcher();
        assert_eq!(m.normalize("Joelho Dir"), "joelho right");
        assert_eq!(m.normalize("  JOELHO   Direito "), "joelho right");
        assert_eq!(m.normalize("Trapézio Esq."), "trapezio left");
        assert_eq!(m.normalize("Segunda Costela Esquerda"), "segunda costela left");
        assert_eq!(m.normalize("Trape\u{301}zio E"), "trapezio left");
        assert_eq!(m.normalize("Epicôndilo-Lateral_D"), "epicondilo lateral right");
    }

    #[test]
    fn laterality_variant_pairs() {
        let result = matcher().match_names(&["Joelho Dir"], &["Joelho Direito"]);
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].system, "Joelho Dir");
        assert_eq!(result.pairs[0].reference, "Joelho Direito");
        assert_eq!(result.pairs[0].kind, MatchKind::Normalized);
        assert!(result.unmatched_reference.is_empty());
        assert!(result.unmatched_system.is_empty());
    }

    #[test]
    fn exact_match_wins_over_normalized() {
        let result = matcher().match_names(
            &["joelho dir", "Joelho Direito"],
            &["JOELHO DIREITO"],
        );
        assert_eq!(result.pairs[0].system, "Joelho Direito");
        assert_eq!(result.pairs[0].kind, MatchKind::Exact);
        assert_eq!(result.unmatched_system, vec!["joelho dir"]);
    }

    #[test]
    fn one_to_one() {
        let result = matcher().match_names(
            &["Ombro Esq"],
            &["Ombro Esquerdo", "Ombro Esquerda"],
        );
        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].reference, "Ombro Esquerdo");
        assert_eq!(result.unmatched_reference, vec!["Ombro Esquerda"]);
    }

    #[test]
    fn repeated_names_report_positions() {
        let result = matcher().match_names(&["Bx1", "bx1"], &["Bx1", "Bx1"]);
        assert_eq!(result.pairs.len(), 2);
        assert_eq!((result.pairs[0].reference_index, result.pairs[0].system_index), (0, 0));
        assert_eq!((result.pairs[1].reference_index, result.pairs[1].system_index), (1, 1));
    }

    #[test]
    fn opposite_sides_never_pair() {
        let result = matcher().match_names(&["Joelho Esquerdo"], &["Joelho Direito"]);
        assert!(result.pairs.is_empty());
        assert_eq!(result.unmatched_reference, vec!["Joelho Direito"]);
        assert_eq!(result.unmatched_system, vec!["Joelho Esquerdo"]);
    }

    #[test]
    fn fuzzy_accepts_typos() {
        let result = matcher().match_names(
            &["Epicondylo Lateral Esq", "Gluteo Dir"],
            &["Epicôndilo Lateral Esquerdo", "Glúteo Direito"],
        );
        assert_eq!(result.pairs.len(), 2);
        assert_eq!(result.pairs[0].kind, MatchKind::Fuzzy);
        assert_eq!(result.pairs[0].system, "Epicondylo Lateral Esq");
        assert!(result.pairs[0].score > 0.9);
        assert_eq!(result.pairs[1].kind, MatchKind::Normalized);
    }

    #[test]
    fn fuzzy_threshold_is_inclusive() {
        // 10 chars, 2 substitutions: similarity exactly 0.8
        let at = matcher().match_names(&["abcdefghxy"], &["abcdefghij"]);
        assert_eq!(at.pairs.len(), 1);
        assert_eq!(at.pairs[0].kind, MatchKind::Fuzzy);

        // 3 substitutions: 0.7, left unmatched
        let below = matcher().match_names(&["abcdefgxyz"], &["abcdefghij"]);
        assert!(below.pairs.is_empty());
        assert_eq!(below.unmatched_reference, vec!["abcdefghij"]);
        assert_eq!(below.unmatched_system, vec!["abcdefgxyz"]);
    }

    #[test]
    fn fuzzy_prefers_best_score() {
        let result = matcher().match_names(
            &["Trocanter Maoir Esq", "Trocanter Maior Esqq"],
            &["Trocanter Maior Esquerdo"],
        );
        // both clear the threshold; the closer one wins
        assert_eq!(result.pairs[0].system, "Trocanter Maoir Esq");
        assert_eq!(result.unmatched_system, vec!["Trocanter Maior Esqq"]);
    }

    #[test]
    fn unrelated_names_stay_unmatched() {
        let result = matcher().match_names(&["Joelho Esquerdo"], &["Tornozelo Esquerdo"]);
        assert!(result.pairs.is_empty());
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity("", ""), 1.);
        assert_eq!(similarity("abc", "abc"), 1.);
        assert_eq!(similarity("abc", "xyz"), 0.);
        assert_eq!(levenshtein(&['k', 'i', 't', 't', 'e', 'n'], &['s', 'i', 't', 't', 'i', 'n', 'g']), 3);
    }

    #[test]
    fn config_validation() {
        let mut config = MatcherConfig::default();
        config.acceptance_threshold = 0.;
        assert!(NameMatcher::new(config).is_err());
    }
}
