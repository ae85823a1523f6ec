//! Quote-aware statement splitter
//!
//! Splits raw batch text on `;` that sit outside single-quoted,
//! double-quoted and backtick-quoted runs and outside `--` and `/* */`
//! comments. Inside a quoted run a backslash takes the following character
//! literally, matching the lexer, so an escaped quote never closes the run.
//! Comments stay in the statement text they belong to.

use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    None,
    Single,
    Double,
    Backtick,
    LineComment,
    BlockComment,
}

impl ScanState {
    fn opening(ch: char) -> Option<Self> {
        match ch {
            '\'' => Some(ScanState::Single),
            '"' => Some(ScanState::Double),
            '`' => Some(ScanState::Backtick),
            _ => None,
        }
    }

    fn closes_with(&self, ch: char) -> bool {
        matches!(
            (self, ch),
            (ScanState::Single, '\'') | (ScanState::Double, '"') | (ScanState::Backtick, '`')
        )
    }

    #[cfg(test)]
    fn in_quote(&self) -> bool {
        matches!(self, ScanState::Single | ScanState::Double | ScanState::Backtick)
    }
}

fn next_is(chars: &mut Peekable<CharIndices<'_>>, want: char) -> bool {
    chars.peek().is_some_and(|&(_, c)| c == want)
}

/// Walk `text`, calling `on_separator` with the byte offset of every
/// statement-ending `;`. Returns the state at end of input.
fn scan(text: &str, mut on_separator: impl FnMut(usize)) -> ScanState {
    let mut state = ScanState::None;
    let mut chars = text.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        state = match state {
            ScanState::None => match ch {
                ';' => {
                    on_separator(offset);
                    ScanState::None
                }
                '-' if next_is(&mut chars, '-') => {
                    chars.next();
                    ScanState::LineComment
                }
                '/' if next_is(&mut chars, '*') => {
                    chars.next();
                    ScanState::BlockComment
                }
                _ => ScanState::opening(ch).unwrap_or(ScanState::None),
            },
            ScanState::LineComment if ch == '\n' => ScanState::None,
            ScanState::BlockComment if ch == '*' && next_is(&mut chars, '/') => {
                chars.next();
                ScanState::None
            }
            ScanState::LineComment | ScanState::BlockComment => state,
            _ if ch == '\\' => {
                chars.next();
                state
            }
            _ if state.closes_with(ch) => ScanState::None,
            _ => state,
        };
    }
    state
}

/// Split `text` into trimmed, non-empty statements in source order.
///
/// The terminating semicolon is not part of a statement; a final statement
/// without one is still returned.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut segment_start = 0;
    scan(text, |offset| {
        push_trimmed(&mut statements, &text[segment_start..offset]);
        segment_start = offset + 1;
    });
    push_trimmed(&mut statements, &text[segment_start..]);
    statements
}

fn push_trimmed(out: &mut Vec<String>, segment: &str) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}
