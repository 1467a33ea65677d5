//! Field escaping shared by journal lines and wire tokens.
//!
//! Escapes cover the field separator, the backslash itself, and embedded
//! newlines (a journal record is one line; a wire token is one line of the
//! request payload). Decoding is a two-state scanner, never ad hoc index
//! juggling.

/// Separates fields within one journal line.
pub const FIELD_SEPARATOR: char = '|';

/// Lines starting with this are comments and skipped by replay.
pub const COMMENT_MARKER: char = '#';

const ESCAPE: char = '\\';

/// Escape one field for a journal line or wire token.
pub fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            FIELD_SEPARATOR => {
                out.push(ESCAPE);
                out.push(FIELD_SEPARATOR);
            }
            other => out.push(other),
        }
    }
    out
}

/// Escape a value for human-readable responses (`GET`/`TREE` output):
/// embedded newlines and backslashes become visible escapes so one value
/// stays on one line.
pub fn display_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            ESCAPE => {
                out.push(ESCAPE);
                out.push(ESCAPE);
            }
            other => out.push(other),
        }
    }
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    Escaped,
}

/// Split a journal line on unescaped separators, resolving escapes.
///
/// Quirks kept from the on-disk format: a separator while the current field
/// is still empty is taken literally, and an unknown escape preserves both
/// the backslash and the following character.
pub fn split_fields(line: &str) -> Vec<String> {
    scan(line, Some(FIELD_SEPARATOR))
}

/// Resolve escapes in a single token without splitting.
pub fn unescape(token: &str) -> String {
    scan(token, None).pop().unwrap_or_default()
}

fn scan(input: &str, separator: Option<char>) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut state = ScanState::Normal;
    for c in input.chars() {
        match state {
            ScanState::Normal => {
                if c == ESCAPE {
                    state = ScanState::Escaped;
                } else if separator == Some(c) {
                    if current.is_empty() {
                        current.push(c);
                    } else {
                        fields.push(std::mem::take(&mut current));
                    }
                } else {
                    current.push(c);
                }
            }
            ScanState::Escaped => {
                match c {
                    'n' => current.push('\n'),
                    ESCAPE => current.push(ESCAPE),
                    FIELD_SEPARATOR => current.push(FIELD_SEPARATOR),
                    other => {
                        current.push(ESCAPE);
                        current.push(other);
                    }
                }
                state = ScanState::Normal;
            }
        }
    }
    if !current.is_empty() {
        fields.push(current);
    }
    fields
}
