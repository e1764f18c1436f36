//! Segment-wise key expression matching.
//!
//! `matches` and `intersects` are computed bottom-up over `(left index, right
//! index)` tables, so their cost is `O(len(left) * len(right))` no matter how
//! many `**` segments a pattern carries. `includes` walks the right pattern
//! while tracking every set of left positions a key could have reached.

use super::{Key, KeyPattern, DOUBLE_WILD, SINGLE_WILD};
use std::collections::BTreeSet;

/// Does `pattern` match the concrete `key`?
pub fn matches(pattern: &KeyPattern, key: &Key) -> bool {
    let pattern: Vec<&str> = pattern.segments().collect();
    let key: Vec<&str> = key.segments().collect();
    match_segments(&pattern, &key)
}

/// Do the two patterns share at least one key?
pub fn intersects(left: &KeyPattern, right: &KeyPattern) -> bool {
    let left: Vec<&str> = left.segments().collect();
    let right: Vec<&str> = right.segments().collect();
    intersect_segments(&left, &right)
}

/// Is every key matched by `right` also matched by `left`?
///
/// Keys are taken as segment sequences, the empty one included, so `**` is
/// not included in `*/**`.
pub fn includes(left: &KeyPattern, right: &KeyPattern) -> bool {
    let left: Vec<&str> = left.segments().collect();
    let right: Vec<&str> = right.segments().collect();
    include_segments(&left, &right)
}

/// Match already-split segments. `*` consumes exactly one key segment, `**`
/// zero or more.
///
/// An empty key only matches an empty pattern or one made of `**` segments.
pub fn match_segments(pattern: &[&str], key: &[&str]) -> bool {
    let k = key.len();

    // `next[j]`: does pattern[i + 1..] match key[j..]
    let mut next = vec![false; k + 1];
    next[k] = true;
    let mut cur = vec![false; k + 1];

    for seg in pattern.iter().rev() {
        for j in (0..=k).rev() {
            cur[j] = if *seg == DOUBLE_WILD {
                next[j] || (j < k && cur[j + 1])
            } else {
                j < k && (*seg == SINGLE_WILD || *seg == key[j]) && next[j + 1]
            };
        }
        std::mem::swap(&mut next, &mut cur);
    }

    next[0]
}

fn intersect_segments(left: &[&str], right: &[&str]) -> bool {
    let (l, r) = (left.len(), right.len());
    let mut table = Table::new(l, r);
    table.set(l, r, true);

    for i in (0..=l).rev() {
        for j in (0..=r).rev() {
            if i == l && j == r {
                continue;
            }
            let value = if i < l && left[i] == DOUBLE_WILD {
                table.get(i + 1, j) || (j < r && table.get(i, j + 1))
            } else if j < r && right[j] == DOUBLE_WILD {
                table.get(i, j + 1) || (i < l && table.get(i + 1, j))
            } else if i < l && j < r {
                segments_intersect(left[i], right[j]) && table.get(i + 1, j + 1)
            } else {
                false
            };
            table.set(i, j, value);
        }
    }

    table.get(0, 0)
}

fn include_segments(left: &[&str], right: &[&str]) -> bool {
    // Only the literals of `left` can steer it; any other segment behaves
    // like `None`.
    let mut alphabet: Vec<Option<&str>> = left
        .iter()
        .filter(|seg| **seg != SINGLE_WILD && **seg != DOUBLE_WILD)
        .map(|seg| Some(*seg))
        .collect();
    alphabet.sort_unstable();
    alphabet.dedup();
    alphabet.push(None);

    let mut frontier = BTreeSet::new();
    frontier.insert(close_positions(left, vec![0]));

    for seg in right {
        frontier = if *seg == DOUBLE_WILD {
            let mut seen = frontier.clone();
            let mut pending: Vec<Vec<usize>> = frontier.into_iter().collect();
            while let Some(positions) = pending.pop() {
                for symbol in &alphabet {
                    let next = step_positions(left, &positions, *symbol);
                    if seen.insert(next.clone()) {
                        pending.push(next);
                    }
                }
            }
            seen
        } else if *seg == SINGLE_WILD {
            frontier
                .iter()
                .flat_map(|positions| {
                    alphabet
                        .iter()
                        .map(move |symbol| step_positions(left, positions, *symbol))
                })
                .collect()
        } else {
            frontier
                .iter()
                .map(|positions| step_positions(left, positions, Some(*seg)))
                .collect()
        };

        // Some key prefix already fell off `left`, and `right` can always be
        // completed from here.
        if frontier.iter().any(|positions| positions.is_empty()) {
            return false;
        }
    }

    frontier
        .iter()
        .all(|positions| positions.last() == Some(&left.len()))
}

/// Advance sorted `left` positions over one key segment. `None` stands for a
/// segment equal to no literal in `left`.
fn step_positions(left: &[&str], positions: &[usize], symbol: Option<&str>) -> Vec<usize> {
    let mut next = Vec::new();
    for &i in positions {
        if i == left.len() {
            continue;
        }
        if left[i] == DOUBLE_WILD {
            next.push(i);
        } else if left[i] == SINGLE_WILD || Some(left[i]) == symbol {
            next.push(i + 1);
        }
    }
    close_positions(left, next)
}

/// Add the positions reachable by letting `**` absorb nothing, then sort.
fn close_positions(left: &[&str], mut positions: Vec<usize>) -> Vec<usize> {
    let mut i = 0;
    while i < positions.len() {
        let p = positions[i];
        if p < left.len() && left[p] == DOUBLE_WILD && !positions.contains(&(p + 1)) {
            positions.push(p + 1);
        }
        i += 1;
    }
    positions.sort_unstable();
    positions.dedup();
    positions
}

fn segments_intersect(a: &str, b: &str) -> bool {
    a == b || a == SINGLE_WILD || b == SINGLE_WILD
}

/// Dense `(l + 1) x (r + 1)` boolean table.
struct Table {
    cols: usize,
    cells: Vec<bool>,
}

impl Table {
    fn new(l: usize, r: usize) -> Self {
        Self {
            cols: r + 1,
            cells: vec![false; (l + 1) * (r + 1)],
        }
    }

    fn get(&self, i: usize, j: usize) -> bool {
        self.cells[i * self.cols + j]
    }

    fn set(&mut self, i: usize, j: usize, value: bool) {
        self.cells[i * self.cols + j] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> KeyPattern {
        KeyPattern::new(s).unwrap()
    }

    fn key(s: &str) -> Key {
        Key::new(s).unwrap()
    }

    #[test]
    fn test_single_wildcard() {
        assert!(matches(&pat("a/*/c"), &key("a/b/c")));
        assert!(!matches(&pat("a/*/c"), &key("a/b/b/c")));
        assert!(!matches(&pat("a/*/c"), &key("a/c")));
    }

    #[test]
    fn test_double_wildcard() {
        assert!(matches(&pat("a/**"), &key("a/b/c/d")));
        assert!(matches(&pat("a/**"), &key("a")));
        assert!(matches(&pat("a/**/d"), &key("a/d")));
        assert!(matches(&pat("a/**/d"), &key("a/b/c/d")));
        assert!(!matches(&pat("a/**/d"), &key("a/b/c")));
        assert!(matches(&pat("**"), &key("anything/at/all")));
    }

    #[test]
    fn test_literal_match() {
        assert!(matches(&pat("demo/example/put"), &key("demo/example/put")));
        assert!(!matches(&pat("demo/example/put"), &key("demo/example")));
        assert!(!matches(&pat("demo/example"), &key("demo/example/put")));
    }

    #[test]
    fn test_empty_segment_lists() {
        assert!(match_segments(&[], &[]));
        assert!(match_segments(&["**"], &[]));
        assert!(match_segments(&["**", "**"], &[]));
        assert!(!match_segments(&["*"], &[]));
        assert!(!match_segments(&[], &["a"]));
    }

    #[test]
    fn test_many_double_wildcards_stay_fast() {
        let pattern: Vec<&str> = std::iter::repeat(["**", "a"]).take(40).flatten().collect();
        let key: Vec<&str> = std::iter::repeat("a").take(39).chain(["b"]).collect();
        assert!(!match_segments(&pattern, &key));
    }

    #[test]
    fn test_intersects() {
        assert!(intersects(&pat("a/*"), &pat("*/b")));
        assert!(intersects(&pat("a/**"), &pat("**/z")));
        assert!(intersects(&pat("a/b"), &pat("a/b")));
        assert!(!intersects(&pat("a/*"), &pat("b/*")));
        assert!(!intersects(&pat("a/*/c"), &pat("a/b")));
        assert!(intersects(&pat("**"), &pat("x/y/z")));
    }

    #[test]
    fn test_includes() {
        assert!(includes(&pat("a/**"), &pat("a/b/c")));
        assert!(includes(&pat("a/**"), &pat("a/*/c")));
        assert!(includes(&pat("a/*"), &pat("a/b")));
        assert!(includes(&pat("*/**"), &pat("**/*")));
        assert!(includes(&pat("**/b/**"), &pat("**/b/**")));
        assert!(!includes(&pat("a/*"), &pat("a/**")));
        assert!(!includes(&pat("a/b"), &pat("a/*")));
        assert!(!includes(&pat("a/*/c"), &pat("a/c")));
    }

    #[test]
    fn test_includes_wildcard_runs() {
        assert!(includes(&pat("*/**"), &pat("**/a")));
        assert!(includes(&pat("*/**"), &pat("**/a/a")));
        assert!(includes(&pat("**/a"), &pat("*/**/a")));
        assert!(includes(&pat("**"), &pat("**")));
        assert!(!includes(&pat("*/**"), &pat("**")));
        assert!(!includes(&pat("a/**"), &pat("**/a")));
        assert!(!includes(&pat("**/a/*"), &pat("**/a")));
    }
}
