//! Dirty detection against snapshots, and a line diff for highlighting edits.

use std::collections::HashMap;
use std::ops::Range;

use crate::model::{Config, Host};

/// Whether `current` differs from `original` in patterns, directives or text.
pub fn host_is_dirty(current: &Host, original: &Host) -> bool {
    let mut current_patterns: Vec<&String> = current.patterns().iter().collect();
    let mut original_patterns: Vec<&String> = original.patterns().iter().collect();
    current_patterns.sort();
    original_patterns.sort();
    if current_patterns != original_patterns {
        return true;
    }

    if current.options().len() != original.options().len() {
        return true;
    }

    if option_map(current) != option_map(original) {
        return true;
    }

    let strip = |line: &String| line.trim_end_matches('\n').to_string();
    let current_raw: Vec<String> = current.raw_lines().iter().map(strip).collect();
    let original_raw: Vec<String> = original.raw_lines().iter().map(strip).collect();
    current_raw != original_raw
}

fn option_map(host: &Host) -> HashMap<String, &str> {
    host.options()
        .iter()
        .map(|option| (option.key().to_lowercase(), option.value()))
        .collect()
}

/// Any host dirty, preamble changed, or hosts added, removed or reordered.
pub fn config_is_dirty(config: &Config) -> bool {
    let snapshot = config.snapshot();
    if config.preamble() != snapshot.preamble.as_slice() {
        return true;
    }
    if config.hosts().len() != snapshot.hosts.len() {
        return true;
    }
    config
        .hosts()
        .iter()
        .zip(&snapshot.hosts)
        .any(|(current, original)| host_is_dirty(current, original))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// `old[old]` became `new[new]`, in the manner described by `tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub old: Range<usize>,
    pub new: Range<usize>,
}

/// How a line of the new text should be highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMark {
    Added,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Delete,
    Insert,
}

/// Longest-common-subsequence line diff producing grouped opcodes that
/// cover both sequences completely.
pub fn diff<A: AsRef<str>, B: AsRef<str>>(old: &[A], new: &[B]) -> Vec<Opcode> {
    let same = |i: usize, j: usize| old[i].as_ref() == new[j].as_ref();

    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && same(prefix, prefix) {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && same(old.len() - 1 - suffix, new.len() - 1 - suffix)
    {
        suffix += 1;
    }

    let rows = old.len() - prefix - suffix;
    let cols = new.len() - prefix - suffix;
    let width = cols + 1;
    // lengths[i * width + j]: LCS length of old[prefix + i..] and new[prefix + j..]
    let mut lengths = vec![0u32; (rows + 1) * width];
    for i in (0..rows).rev() {
        for j in (0..cols).rev() {
            lengths[i * width + j] = if same(prefix + i, prefix + j) {
                lengths[(i + 1) * width + j + 1] + 1
            } else {
                lengths[(i + 1) * width + j].max(lengths[i * width + j + 1])
            };
        }
    }

    let mut steps = vec![Step::Keep; prefix];
    let (mut i, mut j) = (0, 0);
    while i < rows && j < cols {
        if same(prefix + i, prefix + j) {
            steps.push(Step::Keep);
            i += 1;
            j += 1;
        } else if lengths[(i + 1) * width + j] >= lengths[i * width + j + 1] {
            steps.push(Step::Delete);
            i += 1;
        } else {
            steps.push(Step::Insert);
            j += 1;
        }
    }
    steps.extend(std::iter::repeat_n(Step::Delete, rows - i));
    steps.extend(std::iter::repeat_n(Step::Insert, cols - j));
    steps.extend(std::iter::repeat_n(Step::Keep, suffix));

    group_steps(&steps)
}

fn group_steps(steps: &[Step]) -> Vec<Opcode> {
    let mut opcodes = Vec::new();
    let (mut i, mut j) = (0, 0);
    let mut idx = 0;
    while idx < steps.len() {
        let (start_i, start_j) = (i, j);
        if steps[idx] == Step::Keep {
            while idx < steps.len() && steps[idx] == Step::Keep {
                i += 1;
                j += 1;
                idx += 1;
            }
            opcodes.push(Opcode {
                tag: OpTag::Equal,
                old: start_i..i,
                new: start_j..j,
            });
            continue;
        }
        while idx < steps.len() && steps[idx] != Step::Keep {
            match steps[idx] {
                Step::Delete => i += 1,
                Step::Insert => j += 1,
                Step::Keep => {}
            }
            idx += 1;
        }
        let tag = match (i > start_i, j > start_j) {
            (true, true) => OpTag::Replace,
            (true, false) => OpTag::Delete,
            _ => OpTag::Insert,
        };
        opcodes.push(Opcode {
            tag,
            old: start_i..i,
            new: start_j..j,
        });
    }
    opcodes
}

/// New-side lines to highlight: inserted lines are `Added`, replaced ones
/// `Changed`. Deletions have no new-side line and are not reported.
pub fn line_marks(opcodes: &[Opcode]) -> Vec<(usize, LineMark)> {
    let mut marks = Vec::new();
    for opcode in opcodes {
        let mark = match opcode.tag {
            OpTag::Insert => LineMark::Added,
            OpTag::Replace => LineMark::Changed,
            OpTag::Equal | OpTag::Delete => continue,
        };
        marks.extend(opcode.new.clone().map(|line| (line, mark)));
    }
    marks
}
