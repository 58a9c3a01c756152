use chrono::NaiveDate;

use super::differ::ContentDiff;

const NO_DIFF_MARKER: &str = "(diff too large or unusual to display)";
const FOOTER: &str = "(This message was sent automatically.)";

/// Why a successfully fetched URL is not reported as changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    /// Fingerprint matches the stored one
    Identical,
    /// No snapshot existed before this run
    FirstSeen,
    /// Fingerprint moved but the previous text is gone, so nothing to diff
    PriorTextMissing,
}

/// Per-URL result of one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Unchanged(UnchangedReason),
    Changed(ContentDiff),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct UrlOutcome {
    pub url: String,
    pub outcome: Outcome,
}

/// Everything one pass observed, in input order
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub outcomes: Vec<UrlOutcome>,
    /// Per-URL diff cap, shown in the body header
    pub max_lines: usize,
}

impl RunReport {
    pub fn new(max_lines: usize) -> Self {
        Self {
            outcomes: Vec::new(),
            max_lines,
        }
    }

    pub fn push(&mut self, url: impl Into<String>, outcome: Outcome) {
        self.outcomes.push(UrlOutcome {
            url: url.into(),
            outcome,
        });
    }

    pub fn changed(&self) -> impl Iterator<Item = (&str, &ContentDiff)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Changed(diff) => Some((o.url.as_str(), diff)),
            _ => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            Outcome::Failed(message) => Some((o.url.as_str(), message.as_str())),
            _ => None,
        })
    }

    pub fn changed_count(&self) -> usize {
        self.changed().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// A notification is due when anything changed or failed.
    pub fn needs_notification(&self) -> bool {
        self.changed_count() > 0 || self.failed_count() > 0
    }

    pub fn subject(&self, prefix: &str, date: NaiveDate) -> String {
        format!(
            "{} {}: {} changed, {} failed",
            prefix,
            date.format("%Y-%m-%d"),
            self.changed_count(),
            self.failed_count()
        )
    }

    pub fn body(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        if self.changed_count() > 0 {
            lines.push(format!(
                "== Updated pages (+added / -removed, up to {} lines) ==",
                self.max_lines
            ));
            lines.push(String::new());

            for (url, diff) in self.changed() {
                lines.push(url.to_string());
                if diff.is_empty() {
                    lines.push(NO_DIFF_MARKER.to_string());
                } else {
                    lines.extend(diff.rendered());
                    if diff.truncated {
                        lines.push(format!(
                            "(... {} more changed line(s) not shown)",
                            diff.total_changes - diff.lines.len()
                        ));
                    }
                }
                lines.push(String::new());
            }
        }

        if self.failed_count() > 0 {
            lines.push("== Fetch errors (site blocking or temporary outage) ==".to_string());
            for (url, message) in self.failed() {
                lines.push(format!("- {} : {}", url, message));
            }
            lines.push(String::new());
        }

        lines.push(FOOTER.to_string());
        lines.join("\n")
    }
}
