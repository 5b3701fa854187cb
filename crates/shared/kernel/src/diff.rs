//! Sequence comparison in the style of the classic "gestalt pattern matching"
//! algorithm: longest common blocks first, then recurse on both sides.
//!
//! The WebSocket protocol uses [`close_matches`] to suggest command names.

use fxhash::FxHashMap;
use serde::Serialize;
use std::hash::Hash;

/// A run of `size` equal elements at `a[a..a + size]` and `b[b..b + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Match {
    pub a: usize,
    pub b: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// Turns `a[i1..i2]` into `b[j1..j2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Opcode {
    pub tag: Tag,
    pub i1: usize,
    pub i2: usize,
    pub j1: usize,
    pub j2: usize,
}

impl Opcode {
    const fn new(tag: Tag, i1: usize, i2: usize, j1: usize, j2: usize) -> Self {
        Self { tag, i1, i2, j1, j2 }
    }
}

/// Compares two sequences of hashable elements.
#[derive(Debug)]
pub struct SequenceMatcher<'a, T: Eq + Hash> {
    a: &'a [T],
    b: &'a [T],
    b2j: FxHashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    #[must_use]
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: FxHashMap<&'a T, Vec<usize>> = FxHashMap::default();
        for (j, item) in b.iter().enumerate() {
            b2j.entry(item).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    /// Longest matching block in `a[alo..ahi]` and `b[blo..bhi]`.
    ///
    /// Ties go to the block starting earliest in `a`, then earliest in `b`.
    #[must_use]
    pub fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> Match {
        let mut best = Match { a: alo, b: blo, size: 0 };
        let mut j2len: FxHashMap<usize, usize> = FxHashMap::default();

        for i in alo..ahi {
            let mut next: FxHashMap<usize, usize> = FxHashMap::default();
            if let Some(indices) = self.b2j.get(&self.a[i]) {
                for &j in indices {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j.checked_sub(1).and_then(|p| j2len.get(&p)).copied().unwrap_or(0) + 1;
                    next.insert(j, k);
                    if k > best.size {
                        best = Match { a: i + 1 - k, b: j + 1 - k, size: k };
                    }
                }
            }
            j2len = next;
        }
        best
    }

    /// Non-overlapping matching blocks in increasing order, adjacent blocks merged,
    /// terminated by a zero-sized sentinel at `(a.len(), b.len())`.
    #[must_use]
    pub fn matching_blocks(&self) -> Vec<Match> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let m = self.find_longest_match(alo, ahi, blo, bhi);
            if m.size > 0 {
                if alo < m.a && blo < m.b {
                    queue.push((alo, m.a, blo, m.b));
                }
                if m.a + m.size < ahi && m.b + m.size < bhi {
                    queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
                }
                blocks.push(m);
            }
        }
        blocks.sort_by_key(|m| (m.a, m.b));

        let mut merged: Vec<Match> = Vec::with_capacity(blocks.len() + 1);
        for m in blocks {
            match merged.last_mut() {
                Some(last) if last.a + last.size == m.a && last.b + last.size == m.b => {
                    last.size += m.size;
                },
                _ => merged.push(m),
            }
        }
        merged.push(Match { a: la, b: lb, size: 0 });
        merged
    }

    /// Edit script turning `a` into `b`.
    #[must_use]
    pub fn opcodes(&self) -> Vec<Opcode> {
        let (mut i, mut j) = (0, 0);
        let mut codes = Vec::new();

        for m in self.matching_blocks() {
            let tag = match (i < m.a, j < m.b) {
                (true, true) => Some(Tag::Replace),
                (true, false) => Some(Tag::Delete),
                (false, true) => Some(Tag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                codes.push(Opcode::new(tag, i, m.a, j, m.b));
            }
            i = m.a + m.size;
            j = m.b + m.size;
            if m.size > 0 {
                codes.push(Opcode::new(Tag::Equal, m.a, i, m.b, j));
            }
        }
        codes
    }

    /// Opcodes split into hunks with up to `context` equal elements around each change.
    #[must_use]
    pub fn grouped_opcodes(&self, context: usize) -> Vec<Vec<Opcode>> {
        let mut codes = self.opcodes();
        if codes.is_empty() {
            codes.push(Opcode::new(Tag::Equal, 0, 1, 0, 1));
        }
        if let Some(first) = codes.first_mut()
            && first.tag == Tag::Equal
        {
            first.i1 = first.i1.max(first.i2.saturating_sub(context));
            first.j1 = first.j1.max(first.j2.saturating_sub(context));
        }
        if let Some(last) = codes.last_mut()
            && last.tag == Tag::Equal
        {
            last.i2 = last.i2.min(last.i1 + context);
            last.j2 = last.j2.min(last.j1 + context);
        }

        let span = context * 2;
        let mut groups = Vec::new();
        let mut group = Vec::new();
        for mut code in codes {
            if code.tag == Tag::Equal && code.i2 - code.i1 > span {
                group.push(Opcode::new(
                    Tag::Equal,
                    code.i1,
                    code.i2.min(code.i1 + context),
                    code.j1,
                    code.j2.min(code.j1 + context),
                ));
                groups.push(std::mem::take(&mut group));
                code.i1 = code.i1.max(code.i2.saturating_sub(context));
                code.j1 = code.j1.max(code.j2.saturating_sub(context));
            }
            group.push(code);
        }
        if !group.is_empty() && !(group.len() == 1 && group[0].tag == Tag::Equal) {
            groups.push(group);
        }
        groups
    }

    /// Similarity in `[0, 1]`: `2 * matches / (len(a) + len(b))`; 1.0 for two empty inputs.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        let matches: usize = self.matching_blocks().iter().map(|m| m.size).sum();
        calculate_ratio(matches, self.a.len() + self.b.len())
    }

    /// Upper bound on [`ratio`](Self::ratio) from element counts alone.
    #[must_use]
    pub fn quick_ratio(&self) -> f64 {
        let mut available: FxHashMap<&T, usize> = FxHashMap::default();
        for item in self.b {
            *available.entry(item).or_default() += 1;
        }
        let mut matches = 0;
        for item in self.a {
            if let Some(n) = available.get_mut(item)
                && *n > 0
            {
                *n -= 1;
                matches += 1;
            }
        }
        calculate_ratio(matches, self.a.len() + self.b.len())
    }

    /// Cheapest bound: only the lengths are compared.
    #[must_use]
    pub fn real_quick_ratio(&self) -> f64 {
        let (la, lb) = (self.a.len(), self.b.len());
        calculate_ratio(la.min(lb), la + lb)
    }
}

#[allow(clippy::cast_precision_loss)]
fn calculate_ratio(matches: usize, length: usize) -> f64 {
    if length == 0 { 1.0 } else { 2.0 * matches as f64 / length as f64 }
}

/// Line-based unified diff (`---`/`+++` header, `@@` hunks), without trailing newlines.
///
/// Returns an empty vector when the inputs are equal.
#[must_use]
pub fn unified_diff(
    a: &[&str],
    b: &[&str],
    from_file: &str,
    to_file: &str,
    context: usize,
) -> Vec<String> {
    let matcher = SequenceMatcher::new(a, b);
    let mut out = Vec::new();

    for group in matcher.grouped_opcodes(context) {
        if out.is_empty() {
            out.push(format!("--- {from_file}"));
            out.push(format!("+++ {to_file}"));
        }
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        out.push(format!(
            "@@ -{} +{} @@",
            unified_range(first.i1, last.i2),
            unified_range(first.j1, last.j2)
        ));

        for code in &group {
            if code.tag == Tag::Equal {
                out.extend(a[code.i1..code.i2].iter().map(|line| format!(" {line}")));
                continue;
            }
            if matches!(code.tag, Tag::Replace | Tag::Delete) {
                out.extend(a[code.i1..code.i2].iter().map(|line| format!("-{line}")));
            }
            if matches!(code.tag, Tag::Replace | Tag::Insert) {
                out.extend(b[code.j1..code.j2].iter().map(|line| format!("+{line}")));
            }
        }
    }
    out
}

fn unified_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    match length {
        1 => format!("{}", start + 1),
        0 => format!("{start},0"),
        _ => format!("{},{length}", start + 1),
    }
}

/// Line-by-line delta: `"  "` unchanged, `"- "` only in `a`, `"+ "` only in `b`.
#[must_use]
pub fn ndiff(a: &[&str], b: &[&str]) -> Vec<String> {
    let matcher = SequenceMatcher::new(a, b);
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    for code in matcher.opcodes() {
        match code.tag {
            Tag::Equal => out.extend(a[code.i1..code.i2].iter().map(|l| format!("  {l}"))),
            Tag::Delete => out.extend(a[code.i1..code.i2].iter().map(|l| format!("- {l}"))),
            Tag::Insert => out.extend(b[code.j1..code.j2].iter().map(|l| format!("+ {l}"))),
            Tag::Replace => {
                out.extend(a[code.i1..code.i2].iter().map(|l| format!("- {l}")));
                out.extend(b[code.j1..code.j2].iter().map(|l| format!("+ {l}")));
            },
        }
    }
    out
}

/// Up to `n` candidates whose character similarity to `word` is at least `cutoff`,
/// best first. Equal scores keep the candidates' original order.
#[must_use]
pub fn close_matches<'c>(word: &str, candidates: &[&'c str], n: usize, cutoff: f64) -> Vec<&'c str> {
    if n == 0 {
        return Vec::new();
    }
    let cutoff = cutoff.clamp(0.0, 1.0);
    let target: Vec<char> = word.chars().collect();

    let mut scored: Vec<(f64, usize, &'c str)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            let chars: Vec<char> = candidate.chars().collect();
            let matcher = SequenceMatcher::new(&chars, &target);
            if matcher.real_quick_ratio() < cutoff || matcher.quick_ratio() < cutoff {
                return None;
            }
            let score = matcher.ratio();
            (score >= cutoff).then_some((score, index, *candidate))
        })
        .collect();

    scored.sort_by(|x, y| y.0.total_cmp(&x.0).then(x.1.cmp(&y.1)));
    scored.into_iter().take(n).map(|(_, _, candidate)| candidate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn longest_match_prefers_earliest() {
        let (a, b) = (chars(" abcd"), chars("abcd abcd"));
        let m = SequenceMatcher::new(&a, &b).find_longest_match(0, 5, 0, 9);
        assert_eq!(m, Match { a: 0, b: 4, size: 5 });
    }

    #[test]
    fn matching_blocks_end_with_sentinel() {
        let (a, b) = (chars("abxcd"), chars("abcd"));
        let blocks = SequenceMatcher::new(&a, &b).matching_blocks();
        assert_eq!(
            blocks,
            vec![
                Match { a: 0, b: 0, size: 2 },
                Match { a: 3, b: 2, size: 2 },
                Match { a: 5, b: 4, size: 0 },
            ]
        );
    }

    #[test]
    fn opcodes_describe_the_edit() {
        let (a, b) = (chars("qabxcd"), chars("abycdf"));
        let tags: Vec<Tag> = SequenceMatcher::new(&a, &b).opcodes().iter().map(|o| o.tag).collect();
        assert_eq!(
            tags,
            vec![Tag::Delete, Tag::Equal, Tag::Replace, Tag::Equal, Tag::Insert]
        );
    }

    #[test]
    fn ratios() {
        let (a, b) = (chars("abcd"), chars("bcde"));
        let m = SequenceMatcher::new(&a, &b);
        assert!((m.ratio() - 0.75).abs() < f64::EPSILON);
        assert!(m.quick_ratio() >= m.ratio());
        assert!(m.real_quick_ratio() >= m.quick_ratio());

        let empty: Vec<char> = Vec::new();
        assert!((SequenceMatcher::new(&empty, &empty).ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unified_diff_format() {
        let a = ["one", "two", "three", "four"];
        let b = ["zero", "one", "tree", "four"];
        let diff = unified_diff(&a, &b, "before", "after", 3);
        assert_eq!(
            diff,
            vec![
                "--- before", "+++ after", "@@ -1,4 +1,4 @@", "+zero", " one", "-two",
                "-three", "+tree", " four",
            ]
        );
        assert!(unified_diff(&a, &a, "x", "y", 3).is_empty());
    }

    #[test]
    fn unified_diff_splits_distant_hunks() {
        let a: Vec<String> = (0..20).map(|i| format!("line{i}")).collect();
        let mut b = a.clone();
        b[1] = "changed".into();
        b[18] = "changed".into();
        let (a, b): (Vec<&str>, Vec<&str>) =
            (a.iter().map(String::as_str).collect(), b.iter().map(String::as_str).collect());

        let diff = unified_diff(&a, &b, "a", "b", 1);
        let hunks: Vec<&String> = diff.iter().filter(|l| l.starts_with("@@")).collect();
        assert_eq!(hunks, vec!["@@ -1,3 +1,3 @@", "@@ -18,3 +18,3 @@"]);
    }

    #[test]
    fn ndiff_marks_lines() {
        let diff = ndiff(&["a", "b", "c"], &["a", "x", "c", "d"]);
        assert_eq!(diff, vec!["  a", "- b", "+ x", "  c", "+ d"]);
    }

    #[test]
    fn close_matches_ranks_candidates() {
        let words = ["ape", "apple", "peach", "puppy"];
        assert_eq!(close_matches("appel", &words, 3, 0.6), vec!["apple", "ape"]);
        assert!(close_matches("zzz", &words, 3, 0.6).is_empty());
        assert!(close_matches("apple", &words, 0, 0.0).is_empty());

        let commands = ["device.list", "device.add", "config.get", "ping"];
        assert_eq!(close_matches("device.lst", &commands, 1, 0.6), vec!["device.list"]);
    }

    proptest! {
        #[test]
        fn opcodes_rebuild_b(a in "[abc]{0,24}", b in "[abc]{0,24}") {
            let (a, b) = (chars(&a), chars(&b));
            let m = SequenceMatcher::new(&a, &b);
            let mut rebuilt = Vec::new();
            for code in m.opcodes() {
                match code.tag {
                    Tag::Equal => rebuilt.extend_from_slice(&a[code.i1..code.i2]),
                    Tag::Replace | Tag::Insert => rebuilt.extend_from_slice(&b[code.j1..code.j2]),
                    Tag::Delete => {},
                }
            }
            prop_assert_eq!(rebuilt, b);
        }

        #[test]
        fn ratio_bounds(a in "[a-e]{0,32}", b in "[a-e]{0,32}") {
            let (a, b) = (chars(&a), chars(&b));
            let m = SequenceMatcher::new(&a, &b);
            let ratio = m.ratio();
            prop_assert!((0.0..=1.0).contains(&ratio));
            prop_assert!(m.quick_ratio() + 1e-12 >= ratio);
            prop_assert!(m.real_quick_ratio() + 1e-12 >= m.quick_ratio());
        }
    }
}
