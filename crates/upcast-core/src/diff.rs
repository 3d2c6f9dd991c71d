//! Change extraction and unified diffs between an item's input and output

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Context lines around each hunk.
const CONTEXT: usize = 3;

/// Above this many cells the LCS table is skipped and the differing middle is
/// emitted as one replacement.
const LCS_CELL_LIMIT: usize = 4_000_000;

static DOTTED_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)+)\s*\(")
        .expect("dotted call pattern is valid")
});

/// Describes what a transformation changed, for reporting.
pub trait ChangeExtractor: Send + Sync {
    /// Human-readable diff between two versions.
    fn diff(&self, old: &str, new: &str, name: &str) -> String;

    /// Short descriptions of semantic changes.
    fn extract_changes(&self, old: &str, new: &str) -> Vec<String>;
}

/// Default extractor: unified line diff plus import and dotted-call changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineChangeExtractor;

impl ChangeExtractor for LineChangeExtractor {
    fn diff(&self, old: &str, new: &str, name: &str) -> String {
        unified_diff(old, new, name)
    }

    fn extract_changes(&self, old: &str, new: &str) -> Vec<String> {
        let mut changes = Vec::new();

        let old_imports = import_lines(old);
        let new_imports = import_lines(new);
        for removed in old_imports.difference(&new_imports) {
            changes.push(format!("Removed import: {}", removed));
        }
        for added in new_imports.difference(&old_imports) {
            changes.push(format!("Added import: {}", added));
        }

        let old_calls = dotted_calls(old);
        let new_calls = dotted_calls(new);
        for removed in old_calls.difference(&new_calls) {
            changes.push(format!("Removed call: {}", removed));
        }
        for added in new_calls.difference(&old_calls) {
            changes.push(format!("Added call: {}", added));
        }

        changes
    }
}

fn import_lines(source: &str) -> BTreeSet<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|l| {
            l.starts_with("import ")
                || (l.starts_with("from ") && l.contains(" import "))
                || l.starts_with("use ")
                || l.starts_with("#include")
        })
        .map(str::to_string)
        .collect()
}

fn dotted_calls(source: &str) -> BTreeSet<String> {
    DOTTED_CALL
        .captures_iter(source)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct Op<'a> {
    tag: Tag,
    /// Position in the old text (for inserts: where the insert lands).
    old: usize,
    new: usize,
    text: &'a str,
}

/// Unified diff of two texts with three lines of context. Empty when equal.
pub fn unified_diff(old: &str, new: &str, name: &str) -> String {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    let ops = diff_ops(&a, &b);
    if ops.iter().all(|op| op.tag == Tag::Equal) {
        return String::new();
    }

    let mut out = format!("--- a/{}\n+++ b/{}\n", name, name);
    for (start, end) in hunk_ranges(&ops) {
        let hunk = &ops[start..end];
        let old_count = hunk.iter().filter(|op| op.tag != Tag::Insert).count();
        let new_count = hunk.iter().filter(|op| op.tag != Tag::Delete).count();
        let old_start = if old_count == 0 { hunk[0].old } else { hunk[0].old + 1 };
        let new_start = if new_count == 0 { hunk[0].new } else { hunk[0].new + 1 };
        out.push_str(&format!(
            "@@ -{},{} +{},{} @@\n",
            old_start, old_count, new_start, new_count
        ));
        for op in hunk {
            let marker = match op.tag {
                Tag::Equal => ' ',
                Tag::Delete => '-',
                Tag::Insert => '+',
            };
            out.push(marker);
            out.push_str(op.text);
            out.push('\n');
        }
    }
    out
}

fn diff_ops<'a>(a: &[&'a str], b: &[&'a str]) -> Vec<Op<'a>> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut ops = Vec::with_capacity(a.len().max(b.len()));
    for i in 0..prefix {
        ops.push(Op { tag: Tag::Equal, old: i, new: i, text: a[i] });
    }

    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];
    if a_mid.len().saturating_mul(b_mid.len()) <= LCS_CELL_LIMIT {
        middle_lcs(a_mid, b_mid, prefix, &mut ops);
    } else {
        for (i, text) in a_mid.iter().copied().enumerate() {
            ops.push(Op { tag: Tag::Delete, old: prefix + i, new: prefix, text });
        }
        for (j, text) in b_mid.iter().copied().enumerate() {
            ops.push(Op { tag: Tag::Insert, old: prefix + a_mid.len(), new: prefix + j, text });
        }
    }

    let old_tail = a.len() - suffix;
    let new_tail = b.len() - suffix;
    for k in 0..suffix {
        ops.push(Op { tag: Tag::Equal, old: old_tail + k, new: new_tail + k, text: a[old_tail + k] });
    }
    ops
}

fn middle_lcs<'a>(a: &[&'a str], b: &[&'a str], offset: usize, ops: &mut Vec<Op<'a>>) {
    let (n, m) = (a.len(), b.len());
    // table[i][j] = LCS length of a[i..] and b[j..]
    let mut table = vec![0u32; (n + 1) * (m + 1)];
    let at = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[at(i, j)] = if a[i] == b[j] {
                table[at(i + 1, j + 1)] + 1
            } else {
                table[at(i + 1, j)].max(table[at(i, j + 1)])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && a[i] == b[j] {
            ops.push(Op { tag: Tag::Equal, old: offset + i, new: offset + j, text: a[i] });
            i += 1;
            j += 1;
        } else if i < n && (j == m || table[at(i + 1, j)] >= table[at(i, j + 1)]) {
            ops.push(Op { tag: Tag::Delete, old: offset + i, new: offset + j, text: a[i] });
            i += 1;
        } else {
            ops.push(Op { tag: Tag::Insert, old: offset + i, new: offset + j, text: b[j] });
            j += 1;
        }
    }
}

/// Op index ranges of each hunk: changed ops plus surrounding context, with
/// hunks closer than twice the context merged.
fn hunk_ranges(ops: &[Op<'_>]) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (idx, op) in ops.iter().enumerate() {
        if op.tag == Tag::Equal {
            continue;
        }
        let start = idx.saturating_sub(CONTEXT);
        let end = (idx + 1 + CONTEXT).min(ops.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => ranges.push((start, end)),
        }
    }
    ranges
}
