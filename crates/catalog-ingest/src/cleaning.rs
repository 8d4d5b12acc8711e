use std::sync::LazyLock;

use regex::Regex;

/// C0 controls and DEL, minus tab, newline and carriage return.
static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("control character pattern is valid")
});

const BOM: char = '\u{FEFF}';

/// Clean one header or data cell. Returns `None` when nothing is left.
///
/// Strips a leading byte-order mark, decodes HTML entities, removes control
/// characters and trims surrounding whitespace.
pub fn clean_cell(raw: &str) -> Option<String> {
    let without_bom = raw.strip_prefix(BOM).unwrap_or(raw);
    let decoded = html_escape::decode_html_entities(without_bom);
    let stripped = CONTROL_CHARS.replace_all(&decoded, "");
    let trimmed = stripped.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bom_and_whitespace() {
        assert_eq!(clean_cell("\u{FEFF}  unique_key "), Some("unique_key".to_string()));
    }

    #[test]
    fn decodes_entities() {
        assert_eq!(
            clean_cell("Tom &amp; Jerry&#39;s &quot;Tee&quot;"),
            Some("Tom & Jerry's \"Tee\"".to_string())
        );
    }

    #[test]
    fn removes_control_characters_but_keeps_inner_newlines() {
        assert_eq!(clean_cell("ab\x00c\x07d\x7F"), Some("abcd".to_string()));
        assert_eq!(clean_cell("line one\nline two"), Some("line one\nline two".to_string()));
    }

    #[test]
    fn blank_cells_are_absent() {
        assert_eq!(clean_cell(""), None);
        assert_eq!(clean_cell("   \t "), None);
        assert_eq!(clean_cell("\u{FEFF}"), None);
        assert_eq!(clean_cell("\x01\x02"), None);
    }
}
