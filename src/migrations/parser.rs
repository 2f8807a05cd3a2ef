//! Annotated SQL script parser
//!
//! Sections of a migration script are annotated with a special comment
//! starting with `-- +waymark` to mark whether the statements that follow
//! belong to the Up or Down migration. All statements after a directive are
//! grouped together until the next directive. A `NO TRANSACTION` modifier
//! on the directive line disables the default wrap-in-one-transaction
//! behavior for that direction's statement group.
//!
//! Statements are split on semicolons at the top level; semicolons inside
//! single-quoted, double-quoted or dollar-quoted literals and inside line
//! comments are not treated as boundaries.

use super::definitions::Direction;
use crate::error::{MigrateError, MigrateResult};

/// Directive marker token; a convention of the script format
pub const ANNOTATION_MARKER: &str = "-- +waymark";

const NO_TRANSACTION_MODIFIER: &str = "NO TRANSACTION";

/// One direction's executable view of a script
#[derive(Debug, Clone)]
pub struct ParsedScript {
    /// Ordered statements for the requested direction; empty is a legal
    /// no-op migration
    pub statements: Vec<String>,
    /// Whether the statement group should run in one transaction
    pub use_transaction: bool,
}

fn malformed(name: &str, reason: impl Into<String>) -> MigrateError {
    MigrateError::MalformedScript {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Parse one script's text into the requested direction's statement group
pub fn parse(name: &str, text: &str, direction: Direction) -> MigrateResult<ParsedScript> {
    let mut up_text = String::new();
    let mut down_text = String::new();
    let mut up_no_tx = false;
    let mut down_no_tx = false;
    let mut section: Option<Direction> = None;
    let mut saw_directive = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(ANNOTATION_MARKER) {
            saw_directive = true;
            match rest.trim() {
                "Up" => section = Some(Direction::Up),
                "Down" => section = Some(Direction::Down),
                other if other == format!("Up {}", NO_TRANSACTION_MODIFIER) => {
                    section = Some(Direction::Up);
                    up_no_tx = true;
                }
                other if other == format!("Down {}", NO_TRANSACTION_MODIFIER) => {
                    section = Some(Direction::Down);
                    down_no_tx = true;
                }
                other => {
                    return Err(malformed(name, format!("unknown annotation '{}'", other)));
                }
            }
            continue;
        }

        match section {
            Some(Direction::Up) => {
                up_text.push_str(line);
                up_text.push('\n');
            }
            Some(Direction::Down) => {
                down_text.push_str(line);
                down_text.push('\n');
            }
            None => {
                if !trimmed.is_empty() && !trimmed.starts_with("--") {
                    return Err(malformed(
                        name,
                        "statement outside of any Up/Down annotation",
                    ));
                }
            }
        }
    }

    if !saw_directive {
        return Err(malformed(name, "no Up/Down annotations found"));
    }

    let (section_text, no_tx) = match direction {
        Direction::Up => (up_text, up_no_tx),
        Direction::Down => (down_text, down_no_tx),
    };

    Ok(ParsedScript {
        statements: split_statements(name, &section_text)?,
        use_transaction: !no_tx,
    })
}

enum SplitState {
    Normal,
    SingleQuote,
    DoubleQuote,
    LineComment,
    DollarQuote(String),
}

/// Split a statement group on top-level semicolons
fn split_statements(name: &str, text: &str) -> MigrateResult<Vec<String>> {
    let chars: Vec<char> = text.chars().collect();
    let mut statements = Vec::new();
    let mut buf = String::new();
    let mut state = SplitState::Normal;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match &state {
            SplitState::Normal => match c {
                '\'' => {
                    state = SplitState::SingleQuote;
                    buf.push(c);
                }
                '"' => {
                    state = SplitState::DoubleQuote;
                    buf.push(c);
                }
                '-' if chars.get(i + 1) == Some(&'-') => {
                    state = SplitState::LineComment;
                    buf.push(c);
                }
                '$' => {
                    if let Some(tag) = read_dollar_tag(&chars, i) {
                        buf.push_str(&tag);
                        i += tag.chars().count();
                        state = SplitState::DollarQuote(tag);
                        continue;
                    }
                    buf.push(c);
                }
                ';' => {
                    buf.push(c);
                    let stmt = buf.trim();
                    if stmt != ";" {
                        statements.push(stmt.to_string());
                    }
                    buf.clear();
                }
                _ => buf.push(c),
            },
            SplitState::SingleQuote => {
                buf.push(c);
                if c == '\'' {
                    // doubled quote is an escaped quote, not a terminator
                    if chars.get(i + 1) == Some(&'\'') {
                        buf.push('\'');
                        i += 1;
                    } else {
                        state = SplitState::Normal;
                    }
                }
            }
            SplitState::DoubleQuote => {
                buf.push(c);
                if c == '"' {
                    state = SplitState::Normal;
                }
            }
            SplitState::LineComment => {
                buf.push(c);
                if c == '\n' {
                    state = SplitState::Normal;
                }
            }
            SplitState::DollarQuote(tag) => {
                if c == '$' && tag_matches_at(&chars, i, tag) {
                    let advance = tag.chars().count();
                    buf.push_str(tag);
                    i += advance;
                    state = SplitState::Normal;
                    continue;
                }
                buf.push(c);
            }
        }
        i += 1;
    }

    match state {
        SplitState::SingleQuote | SplitState::DoubleQuote | SplitState::DollarQuote(_) => {
            return Err(malformed(name, "unterminated quoted literal"));
        }
        _ => {}
    }

    let leftover_sql = buf.lines().any(|line| {
        let t = line.trim();
        !t.is_empty() && !t.starts_with("--")
    });
    if leftover_sql {
        return Err(malformed(
            name,
            "unfinished SQL query: missing a semicolon?",
        ));
    }

    Ok(statements)
}

/// Try to read a dollar-quote opener (`$$` or `$tag$`) starting at `start`
fn read_dollar_tag(chars: &[char], start: usize) -> Option<String> {
    let mut j = start + 1;
    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if j < chars.len() && chars[j] == '$' {
        Some(chars[start..=j].iter().collect())
    } else {
        None
    }
}

fn tag_matches_at(chars: &[char], start: usize, tag: &str) -> bool {
    let tag_chars: Vec<char> = tag.chars().collect();
    chars.len() >= start + tag_chars.len() && chars[start..start + tag_chars.len()] == tag_chars[..]
}
