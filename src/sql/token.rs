/// Token types for the SQL lexer
use phf::phf_map;
use serde::Serialize;

// Perfect hash map for O(1) keyword lookup (keys are lowercase)
static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "select" => Keyword::Select,
    "from" => Keyword::From,
    "where" => Keyword::Where,
    "insert" => Keyword::Insert,
    "into" => Keyword::Into,
    "values" => Keyword::Values,
    "update" => Keyword::Update,
    "set" => Keyword::Set,
    "delete" => Keyword::Delete,
    "create" => Keyword::Create,
    "table" => Keyword::Table,
    "index" => Keyword::Index,
    "unique" => Keyword::Unique,
    "drop" => Keyword::Drop,
    "if" => Keyword::If,
    "exists" => Keyword::Exists,
    "and" => Keyword::And,
    "or" => Keyword::Or,
    "not" => Keyword::Not,
    "like" => Keyword::Like,
    "in" => Keyword::In,
    "between" => Keyword::Between,
    "is" => Keyword::Is,
    "null" => Keyword::Null,
    "as" => Keyword::As,
    "order" => Keyword::Order,
    "by" => Keyword::By,
    "asc" => Keyword::Asc,
    "desc" => Keyword::Desc,
    "limit" => Keyword::Limit,
    "offset" => Keyword::Offset,
    "distinct" => Keyword::Distinct,
    "primary" => Keyword::Primary,
    "key" => Keyword::Key,
    "default" => Keyword::Default,
    "on" => Keyword::On,
    "show" => Keyword::Show,
    "tables" => Keyword::Tables,
    "describe" => Keyword::Describe,
    "true" => Keyword::True,
    "false" => Keyword::False,
    "join" => Keyword::Join,
    "inner" => Keyword::Inner,
    "left" => Keyword::Left,
    "group" => Keyword::Group,
    "having" => Keyword::Having,
    "integer" => Keyword::Integer,
    "int" => Keyword::Integer,
    "bigint" => Keyword::Integer,
    "smallint" => Keyword::Integer,
    "text" => Keyword::Text,
    "varchar" => Keyword::Text,
    "char" => Keyword::Text,
    "string" => Keyword::Text,
    "real" => Keyword::Real,
    "float" => Keyword::Real,
    "double" => Keyword::Real,
    "numeric" => Keyword::Real,
    "decimal" => Keyword::Real,
    "boolean" => Keyword::Boolean,
    "bool" => Keyword::Boolean,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Keyword {
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Create,
    Table,
    Index,
    Unique,
    Drop,
    If,
    Exists,
    And,
    Or,
    Not,
    Like,
    In,
    Between,
    Is,
    Null,
    As,
    Order,
    By,
    Asc,
    Desc,
    Limit,
    Offset,
    Distinct,
    Primary,
    Key,
    Default,
    On,
    Show,
    Tables,
    Describe,
    True,
    False,
    // Recognized for highlighting; the parser rejects them with a clear message
    Join,
    Inner,
    Left,
    Group,
    Having,

    // Data types
    Integer,
    Text,
    Real,
    Boolean,
}

impl Keyword {
    /// Case-insensitive keyword lookup
    pub fn lookup(word: &str) -> Option<Self> {
        if word.len() > 8 {
            return None;
        }
        let lowercase = word.to_ascii_lowercase();
        KEYWORDS.get(lowercase.as_str()).copied()
    }

    /// Keywords that may still be used as table or column names.
    pub fn is_reserved(&self) -> bool {
        !matches!(
            self,
            Keyword::Integer
                | Keyword::Text
                | Keyword::Real
                | Keyword::Boolean
                | Keyword::Key
                | Keyword::Tables
                | Keyword::Offset
                | Keyword::If
                | Keyword::Exists
                | Keyword::Show
                | Keyword::Describe
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Keyword(Keyword),
    Identifier,
    String,
    Number,
    Operator,
    Punctuation,
    Whitespace,
    Comment,
    Unknown,
}

impl TokenKind {
    /// Lowercase class name, also used as the highlighter's CSS suffix.
    pub fn class_name(&self) -> &'static str {
        match self {
            TokenKind::Keyword(_) => "keyword",
            TokenKind::Identifier => "identifier",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Operator => "operator",
            TokenKind::Punctuation => "punctuation",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
            TokenKind::Unknown => "unknown",
        }
    }

    /// Whitespace and comments carry no meaning for the parser.
    pub fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }
}

/// A classified slice of the source text. Offsets are byte offsets,
/// `end` exclusive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            start,
            end,
        }
    }

    pub fn keyword(&self) -> Option<Keyword> {
        match self.kind {
            TokenKind::Keyword(kw) => Some(kw),
            _ => None,
        }
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.keyword() == Some(keyword)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punctuation && self.text == p
    }

    /// Content of a string literal with its quotes removed and escapes
    /// resolved (`\n`, `\t`, `\\`, `\'`, doubled quotes).
    pub fn string_value(&self) -> Option<String> {
        if self.kind != TokenKind::String {
            return None;
        }
        Some(unquote(&self.text))
    }

    /// Identifier name, stripping backticks when quoted.
    pub fn identifier_name(&self) -> Option<String> {
        match self.kind {
            TokenKind::Identifier if self.text.starts_with('`') => Some(unquote(&self.text)),
            TokenKind::Identifier => Some(self.text.clone()),
            _ => None,
        }
    }
}

fn unquote(raw: &str) -> String {
    let mut chars = raw.chars();
    let quote = match chars.next() {
        Some(q) => q,
        None => return String::new(),
    };
    let inner: Vec<char> = chars.collect();
    let body = match inner.split_last() {
        Some((last, body)) if *last == quote => body,
        _ => &inner[..],
    };

    let mut value = String::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let ch = body[i];
        if ch == '\\' && i + 1 < body.len() {
            value.push(match body[i + 1] {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                c => c,
            });
            i += 2;
        } else if ch == quote && i + 1 < body.len() && body[i + 1] == quote {
            value.push(quote);
            i += 2;
        } else {
            value.push(ch);
            i += 1;
        }
    }
    value
}
