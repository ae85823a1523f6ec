//! SQL syntax highlighting
//!
//! Turns raw SQL text into HTML: every lexer token becomes a
//! `<span class="sql-<kind>">` with its text escaped, whitespace is emitted
//! as escaped text. Since the lexer never fails, neither does highlighting;
//! malformed input comes out as `sql-unknown` spans.

use super::lexer::tokenize;
use super::token::TokenKind;
use serde::Serialize;

/// One classified run of source text, for renderers that build their own
/// markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightSpan {
    pub class: &'static str,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Token spans covering the whole input in order.
pub fn highlight_spans(sql: &str) -> Vec<HighlightSpan> {
    tokenize(sql)
        .into_iter()
        .map(|token| HighlightSpan {
            class: token.kind.class_name(),
            text: token.text,
            start: token.start,
            end: token.end,
        })
        .collect()
}

/// HTML-safe markup for `sql`. Input must be raw SQL text, not the output
/// of an earlier call.
pub fn highlight(sql: &str) -> String {
    let mut html = String::with_capacity(sql.len() * 2);
    for token in tokenize(sql) {
        if token.kind == TokenKind::Whitespace {
            escape_into(&mut html, &token.text);
            continue;
        }
        html.push_str("<span class=\"sql-");
        html.push_str(token.kind.class_name());
        html.push_str("\">");
        escape_into(&mut html, &token.text);
        html.push_str("</span>");
    }
    html
}

/// Escape HTML entities
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    escape_into(&mut out, text);
    out
}

fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
}
