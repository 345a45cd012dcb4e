//! Ratcliff/Obershelp string similarity.
//!
//! Player handles typed by league admins and the handles reported by the game
//! client differ by case, clan tags, punctuation and typos, so names are
//! compared by the ratio of matching characters rather than by equality.

/// Similarity ratio in `[0.0, 1.0]`: `2 * matches / (len(a) + len(b))`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

/// Case-insensitive [`similarity`].
pub fn similarity_ignore_case(a: &str, b: &str) -> f64 {
    similarity(&a.to_uppercase(), &b.to_uppercase())
}

/// Best candidate scoring at least `cutoff`, compared case-insensitively.
pub fn closest_match<'a, I>(word: &str, candidates: I, cutoff: f64) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let ratio = similarity_ignore_case(word, candidate);
        if ratio < cutoff {
            continue;
        }
        if best.map_or(true, |(_, r)| ratio > r) {
            best = Some((candidate, ratio));
        }
    }
    best.map(|(c, _)| c)
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, k) = longest_match(a, b);
    if k == 0 {
        return 0;
    }
    k + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + k..], &b[j + k..])
}

/// Longest common substring as `(start_a, start_b, len)`, earliest in `a` on ties.
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            let k = cur[j + 1];
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}
