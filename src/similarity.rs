use crate::models::NormalizedRecord;

/// Containment floor: a short caption fully contained in a longer repost
/// counts as a near-duplicate even when the ratio alone is low.
pub const SUBSTRING_FLOOR: f64 = 0.9;

/// Sequence-matcher style ratio `2 * M / (|a| + |b|)` over chars, where `M`
/// is the longest common subsequence length, raised to at least
/// [`SUBSTRING_FLOOR`] when one text contains the other.
///
/// Symmetric, `1.0` for identical non-empty input, `0.0` when either side is
/// empty.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let ca: Vec<char> = a.chars().collect();
    let cb: Vec<char> = b.chars().collect();
    let matches = lcs_len(&ca, &cb);
    let ratio = 2.0 * matches as f64 / (ca.len() + cb.len()) as f64;

    if a.contains(b) || b.contains(a) {
        ratio.max(SUBSTRING_FLOOR)
    } else {
        ratio
    }
}

pub fn record_similarity(a: &NormalizedRecord, b: &NormalizedRecord) -> f64 {
    similarity(&a.comparison_text, &b.comparison_text)
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    // keep the shorter side as the row to bound memory
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];
    for &x in long {
        for (j, &y) in short.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}
