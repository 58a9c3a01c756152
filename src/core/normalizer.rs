//! HTML to comparison-friendly plain text.

use scraper::Html;
use sha2::{Digest, Sha256};
use std::fmt;

/// Elements whose text is behaviour or layout rather than readable content.
const EXCLUDED_ELEMENTS: [&str; 5] = ["script", "style", "noscript", "svg", "canvas"];

/// SHA-256 of a normalized text, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap a digest read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters, for log lines and status output.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce markup to trimmed, non-empty lines of visible text in document
/// order, joined with `\n`.
pub fn normalize_html(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut lines: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| EXCLUDED_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }

        lines.extend(
            text.split(is_line_break)
                .map(str::trim)
                .filter(|line| !line.is_empty()),
        );
    }

    lines.join("\n")
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0b}' | '\u{0c}' | '\u{1c}' | '\u{1d}' | '\u{1e}' | '\u{85}'
            | '\u{2028}' | '\u{2029}'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title> Subsidy programs </title>
  <style>body { color: red; }</style>
  <script>var tracking = Date.now();</script>
</head>
<body>
  <!-- build 1234 -->
  <h1>Programs</h1>
  <ul>
    <li>Program A: <b>open</b></li>
    <li>Program B:   closed   </li>
  </ul>
  <noscript>Please enable JavaScript</noscript>
  <svg><text>chart label</text></svg>
  <canvas>fallback drawing</canvas>
  <p>Line one<br>Line two</p>
</body>
</html>"#;

    #[test]
    fn test_extracts_visible_text_lines() {
        let text = normalize_html(PAGE);
        assert_eq!(
            text,
            "Subsidy programs\nPrograms\nProgram A:\nopen\nProgram B:   closed\nLine one\nLine two"
        );
    }

    #[test]
    fn test_excluded_elements_do_not_leak() {
        let text = normalize_html(PAGE);
        for hidden in ["tracking", "color: red", "enable JavaScript", "chart label", "fallback drawing", "build 1234"] {
            assert!(!text.contains(hidden), "{hidden:?} leaked into {text:?}");
        }
    }

    #[test]
    fn test_formatting_noise_does_not_change_output() {
        let compact = "<html><body><p>Program A: open</p><p>Deadline: May</p></body></html>";
        let spread = "<html>\n  <body>\n\n    <p>\n      Program A: open\n    </p>\n\t<p>Deadline: May   </p>\n  </body>\n</html>\n";
        assert_eq!(normalize_html(compact), normalize_html(spread));
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let first = normalize_html(PAGE);
        let second = normalize_html(PAGE);
        assert_eq!(first, second);
        assert_eq!(Fingerprint::of(&first), Fingerprint::of(&second));
    }

    #[test]
    fn test_script_change_keeps_fingerprint() {
        let before = "<html><body><p>Hello</p><script>var t = 1;</script></body></html>";
        let after = "<html><body><p>Hello</p><script>var t = 2;</script></body></html>";
        assert_eq!(
            Fingerprint::of(&normalize_html(before)),
            Fingerprint::of(&normalize_html(after))
        );
    }

    #[test]
    fn test_full_width_spaces_are_trimmed() {
        let text = normalize_html("<p>\u{3000}募集中\u{3000}</p><p>\u{a0}</p>");
        assert_eq!(text, "募集中");
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let fp = Fingerprint::of("");
        assert_eq!(
            fp.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(fp.short(), "e3b0c44298fc");
        assert_ne!(Fingerprint::of("Program A: open"), Fingerprint::of("Program A: closed"));
    }

    #[test]
    fn test_short_tolerates_malformed_stored_hashes() {
        assert_eq!(Fingerprint::from_hex("abc").short(), "abc");
        // byte 12 falls inside a two-byte character
        let odd = Fingerprint::from_hex("aéééééééé");
        assert_eq!(odd.short(), "aéééééééé");
    }

    #[test]
    fn test_empty_document_normalizes_to_empty_text() {
        assert_eq!(normalize_html(""), "");
    }
}
