//! Token and sequence similarity primitives.

use std::collections::{BTreeSet, HashMap};

/// Words dropped during tokenization
pub const STOP_WORDS: [&str; 14] = [
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Ordered token set
pub type TokenSet = BTreeSet<String>;

fn is_separator(c: char) -> bool {
    c == '-' || c == '_' || c.is_whitespace()
}

/// Lowercase `text` and split it on runs of `-`, `_` and whitespace,
/// dropping stop words and empty pieces. Selector punctuation stays attached
/// to its token, so `#login-btn` yields `#login` and `btn`.
#[must_use]
pub fn tokenize(text: &str) -> TokenSet {
    text.to_lowercase()
        .split(is_separator)
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity. Two empty sets are identical.
#[must_use]
pub fn jaccard(a: &TokenSet, b: &TokenSet) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Jaccard similarity of the token sets of two strings
#[must_use]
pub fn token_similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

/// Ratcliff/Obershelp similarity: `2 * matches / (len(a) + len(b))`.
///
/// Matches are found by recursively taking the longest common block and
/// repeating on both sides of it. Two empty strings score 1.0.
#[must_use]
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut b_index: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, ch) in b.iter().enumerate() {
        b_index.entry(*ch).or_default().push(j);
    }

    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, size) = longest_match(a, &b_index, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            queue.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`, earliest in `a`
/// on ties.
fn longest_match(
    a: &[char],
    b_index: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // run lengths of matches ending at b[j], for the previous row of a
    let mut lengths: HashMap<usize, usize> = HashMap::new();
    for (i, ch) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_lengths = HashMap::new();
        if let Some(positions) = b_index.get(ch) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j
                    .checked_sub(1)
                    .and_then(|prev| lengths.get(&prev))
                    .copied()
                    .unwrap_or(0)
                    + 1;
                next_lengths.insert(j, k);
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        lengths = next_lengths;
    }
    (best_i, best_j, best_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(items: &[&str]) -> TokenSet {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_tokenize_splits_and_drops_stop_words() {
        assert_eq!(tokenize("Login-Btn_primary  the"), set(&["login", "btn", "primary"]));
        assert_eq!(tokenize("#login-btn"), set(&["#login", "btn"]));
        assert_eq!(tokenize("#submit-form .btn"), set(&["#submit", "form", ".btn"]));
        assert_eq!(tokenize("Username:"), set(&["username:"]));
        assert!(tokenize("  - _ ").is_empty());
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&set(&[]), &set(&[])), 1.0);
        assert_eq!(jaccard(&set(&["a1"]), &set(&[])), 0.0);
        assert!((jaccard(&set(&["login", "btn"]), &set(&["login"])) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sequence_ratio_known_values() {
        assert_eq!(sequence_ratio("", ""), 1.0);
        assert_eq!(sequence_ratio("abc", ""), 0.0);
        assert_eq!(sequence_ratio("login", "login"), 1.0);
        // difflib.SequenceMatcher(None, "abcd", "bcde").ratio() == 0.75
        assert!((sequence_ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
        // "Submit" vs "Submit Order": 2*6/18
        assert!((sequence_ratio("Submit", "Submit Order") - 12.0 / 18.0).abs() < 1e-9);
    }

    mod proptest_tests {
        use super::*;

        proptest! {
            #[test]
            fn sequence_ratio_bounded_and_symmetric_on_identity(a in "[a-z ]{0,24}", b in "[a-z ]{0,24}") {
                let r = sequence_ratio(&a, &b);
                prop_assert!((0.0..=1.0).contains(&r));
                prop_assert_eq!(sequence_ratio(&a, &a), 1.0);
            }

            #[test]
            fn jaccard_bounded(a in "[a-z_ -]{0,30}", b in "[a-z_ -]{0,30}") {
                let j = token_similarity(&a, &b);
                prop_assert!((0.0..=1.0).contains(&j));
                prop_assert_eq!(token_similarity(&a, &a), 1.0);
            }
        }
    }
}
