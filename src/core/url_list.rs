use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

use crate::error::{PagewatchError, Result};

/// Read the watched URLs from a newline-delimited file.
pub fn load_url_list(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PagewatchError::UrlList(format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(parse_url_list(&content))
}

/// Parse URL list content. Blank lines and `#` comments are skipped, and a
/// URL listed twice is only kept at its first position.
pub fn parse_url_list(content: &str) -> Vec<String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !seen.insert(line) {
            warn!("Duplicate URL in list ignored: {}", line);
            continue;
        }
        urls.push(line.to_string());
    }

    urls
}
