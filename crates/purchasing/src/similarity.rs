//! Fuzzy description similarity (Sørensen–Dice over character bigrams).

use std::collections::HashMap;

fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

fn bigrams(s: &str) -> HashMap<(char, char), usize> {
    let chars: Vec<char> = s.chars().collect();
    let mut counts = HashMap::new();
    for pair in chars.windows(2) {
        *counts.entry((pair[0], pair[1])).or_insert(0) += 1;
    }
    counts
}

/// Similarity in [0, 1]; 1.0 for identical text after normalization.
pub fn description_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return if a.is_empty() { 0.0 } else { 1.0 };
    }
    if a.chars().count() < 2 || b.chars().count() < 2 {
        return 0.0;
    }

    let ba = bigrams(&a);
    let bb = bigrams(&b);
    let total: usize = ba.values().sum::<usize>() + bb.values().sum::<usize>();
    let shared: usize = ba
        .iter()
        .map(|(k, n)| (*n).min(bb.get(k).copied().unwrap_or(0)))
        .sum();

    (2 * shared) as f64 / total as f64
}
