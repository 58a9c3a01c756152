use similar::{Algorithm, ChangeTag, TextDiff};
use std::fmt;

use super::normalizer::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChange {
    Added,
    Removed,
}

/// One changed content line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub change: LineChange,
    pub text: String,
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.change {
            LineChange::Added => '+',
            LineChange::Removed => '-',
        };
        write!(f, "{}{}", marker, self.text)
    }
}

/// Bounded list of changed lines between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDiff {
    pub lines: Vec<DiffLine>,
    /// Displayable changed lines before the cap was applied
    pub total_changes: usize,
    pub truncated: bool,
}

impl ContentDiff {
    /// No displayable line survived filtering.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn rendered(&self) -> Vec<String> {
        self.lines.iter().map(DiffLine::to_string).collect()
    }
}

pub struct ContentDiffer {
    max_lines: usize,
}

impl ContentDiffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
        }
    }

    pub fn has_content_changed(&self, prior: &Fingerprint, current: &Fingerprint) -> bool {
        prior != current
    }

    /// Changed lines from `old_content` to `new_content`, in unified-diff
    /// order, blank lines dropped, capped at `max_lines`.
    pub fn diff_content(&self, old_content: &str, new_content: &str) -> ContentDiff {
        let old_lines: Vec<&str> = old_content.lines().collect();
        let new_lines: Vec<&str> = new_content.lines().collect();
        let diff = TextDiff::configure()
            .algorithm(Algorithm::Myers)
            .diff_slices(&old_lines, &new_lines);

        let mut result = ContentDiff::default();

        for change in diff.iter_all_changes() {
            let kind = match change.tag() {
                ChangeTag::Insert => LineChange::Added,
                ChangeTag::Delete => LineChange::Removed,
                ChangeTag::Equal => continue,
            };

            let text = change.value();
            if text.trim().is_empty() {
                continue;
            }

            result.total_changes += 1;
            if result.lines.len() < self.max_lines {
                result.lines.push(DiffLine {
                    change: kind,
                    text: text.to_string(),
                });
            }
        }

        result.truncated = result.total_changes > result.lines.len();
        result
    }
}
