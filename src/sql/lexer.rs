/// SQL Lexer - converts SQL text into classified tokens
///
/// Every character of the input lands in exactly one token, whitespace and
/// comments included, so concatenating the token texts reproduces the input.
/// The lexer never fails: anything it cannot classify (a stray `#`, an
/// unterminated string) becomes an `Unknown` token for the parser to reject.
use super::token::{Keyword, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            position: 0,
        }
    }

    /// Tokenize the whole input.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token() {
            tokens.push(token);
        }
        tokens
    }

    pub fn next_token(&mut self) -> Option<Token> {
        if self.is_eof() {
            return None;
        }

        let start = self.position;
        let ch = self.current_char();

        let kind = match ch {
            c if c.is_whitespace() => {
                self.advance_while(|c| c.is_whitespace());
                TokenKind::Whitespace
            }
            '-' if self.peek_char() == Some('-') => {
                self.advance_while(|c| c != '\n');
                TokenKind::Comment
            }
            '/' if self.peek_char() == Some('*') => self.read_block_comment(),
            '\'' | '"' => self.read_quoted(ch, TokenKind::String),
            '`' => self.read_quoted(ch, TokenKind::Identifier),
            '0'..='9' => self.read_number(),
            '.' if self.peek_char().is_some_and(|c| c.is_ascii_digit()) => self.read_number(),
            c if c.is_alphabetic() || c == '_' => self.read_word(start),
            '=' | '+' | '-' | '*' | '/' | '%' => {
                self.advance();
                TokenKind::Operator
            }
            '<' => {
                self.advance();
                if matches!(self.peek_current(), Some('=') | Some('>')) {
                    self.advance();
                }
                TokenKind::Operator
            }
            '>' => {
                self.advance();
                if self.peek_current() == Some('=') {
                    self.advance();
                }
                TokenKind::Operator
            }
            '!' => {
                self.advance();
                if self.peek_current() == Some('=') {
                    self.advance();
                    TokenKind::Operator
                } else {
                    TokenKind::Unknown
                }
            }
            '|' => {
                self.advance();
                if self.peek_current() == Some('|') {
                    self.advance();
                    TokenKind::Operator
                } else {
                    TokenKind::Unknown
                }
            }
            '(' | ')' | ',' | ';' | '.' => {
                self.advance();
                TokenKind::Punctuation
            }
            _ => {
                self.advance();
                TokenKind::Unknown
            }
        };

        let start_byte = self.byte_offset(start);
        let end_byte = self.byte_offset(self.position);
        Some(Token::new(
            kind,
            &self.input[start_byte..end_byte],
            start_byte,
            end_byte,
        ))
    }

    fn byte_offset(&self, position: usize) -> usize {
        self.chars
            .get(position)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.input.len())
    }

    fn current_char(&self) -> char {
        self.chars[self.position].1
    }

    fn peek_current(&self) -> Option<char> {
        self.chars.get(self.position).map(|(_, c)| *c)
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.position + 1).map(|(_, c)| *c)
    }

    fn advance(&mut self) {
        if !self.is_eof() {
            self.position += 1;
        }
    }

    fn advance_while(&mut self, pred: impl Fn(char) -> bool) {
        while !self.is_eof() && pred(self.current_char()) {
            self.advance();
        }
    }

    fn is_eof(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn read_block_comment(&mut self) -> TokenKind {
        self.advance(); // '/'
        self.advance(); // '*'
        while !self.is_eof() {
            if self.current_char() == '*' && self.peek_char() == Some('/') {
                self.advance();
                self.advance();
                return TokenKind::Comment;
            }
            self.advance();
        }
        TokenKind::Unknown
    }

    /// Quoted run: strings (`'`, `"`) and backtick identifiers. A backslash
    /// escapes the next character and a doubled quote stands for itself.
    fn read_quoted(&mut self, quote: char, kind: TokenKind) -> TokenKind {
        self.advance(); // opening quote
        while !self.is_eof() {
            let ch = self.current_char();
            if ch == '\\' {
                self.advance();
                self.advance();
                continue;
            }
            if ch == quote {
                self.advance();
                if self.peek_current() == Some(quote) {
                    self.advance();
                    continue;
                }
                return kind;
            }
            self.advance();
        }
        TokenKind::Unknown
    }

    fn read_number(&mut self) -> TokenKind {
        self.advance_while(|c| c.is_ascii_digit());
        if self.peek_current() == Some('.') {
            self.advance();
            self.advance_while(|c| c.is_ascii_digit());
        }

        // Scientific notation (1.5e10); only consumed when digits follow
        if matches!(self.peek_current(), Some('e') | Some('E')) {
            let mark = self.position;
            self.advance();
            if matches!(self.peek_current(), Some('+') | Some('-')) {
                self.advance();
            }
            if self.peek_current().is_some_and(|c| c.is_ascii_digit()) {
                self.advance_while(|c| c.is_ascii_digit());
            } else {
                self.position = mark;
            }
        }
        TokenKind::Number
    }

    fn read_word(&mut self, start: usize) -> TokenKind {
        self.advance_while(|c| c.is_alphanumeric() || c == '_' || c == '$');
        let word = &self.input[self.byte_offset(start)..self.byte_offset(self.position)];
        match Keyword::lookup(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier,
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Tokenize `sql`, keeping whitespace and comments.
pub fn tokenize(sql: &str) -> Vec<Token> {
    Lexer::new(sql).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn significant(sql: &str) -> Vec<Token> {
        tokenize(sql)
            .into_iter()
            .filter(|t| !t.kind.is_trivia())
            .collect()
    }

    #[test]
    fn test_lexer_simple_select() {
        let tokens = significant("SELECT * FROM users");
        assert_eq!(tokens.len(), 4);
        assert!(tokens[0].is_keyword(Keyword::Select));
        assert!(tokens[1].is_operator("*"));
        assert!(tokens[2].is_keyword(Keyword::From));
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_tokens_cover_every_character() {
        let sql = "SELECT a, 'x;y' -- note\nFROM t /* c */ WHERE b >= 1.5e3;";
        let tokens = tokenize(sql);
        let rebuilt: String = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(rebuilt, sql);

        let mut expected_start = 0;
        for token in &tokens {
            assert_eq!(token.start, expected_start);
            assert_eq!(&sql[token.start..token.end], token.text);
            expected_start = token.end;
        }
        assert_eq!(expected_start, sql.len());
    }

    #[test]
    fn test_lexer_operators() {
        let tokens = significant("= != <> < > <= >= + - * / % ||");
        let ops: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            ops,
            vec!["=", "!=", "<>", "<", ">", "<=", ">=", "+", "-", "*", "/", "%", "||"]
        );
        assert!(tokens.iter().all(|t| t.kind == TokenKind::Operator));
    }

    #[test]
    fn test_escaped_quote_does_not_terminate() {
        let tokens = significant(r"'it\'s a test' x");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].text, r"'it\'s a test'");
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_unterminated_string_is_unknown() {
        let tokens = significant("SELECT 'abc");
        assert_eq!(tokens[1].kind, TokenKind::Unknown);
        assert_eq!(tokens[1].text, "'abc");

        let tokens = significant("/* never closed");
        assert_eq!(tokens[0].kind, TokenKind::Unknown);
    }

    #[test]
    fn test_comments_are_tokens() {
        let tokens = tokenize("SELECT 1 -- trailing");
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Comment);
        assert_eq!(tokens.last().unwrap().text, "-- trailing");
    }

    #[test]
    fn test_quoted_identifiers_and_doubled_quotes() {
        let tokens = significant("`my table` 'it''s'");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].identifier_name().unwrap(), "my table");
        assert_eq!(tokens[1].kind, TokenKind::String);
        assert_eq!(tokens[1].string_value().unwrap(), "it's");
    }

    #[test]
    fn test_unknown_characters_and_unicode() {
        let tokens = significant("SELECT # FROM café");
        assert_eq!(tokens[1].kind, TokenKind::Unknown);
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
        assert_eq!(tokens[3].text, "café");
    }

    #[test]
    fn test_number_forms() {
        let tokens = significant("42 3.14 .5 1e3 2e");
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(&kinds[..4], &[TokenKind::Number; 4]);
        // "2e" lexes as number 2 followed by identifier e
        assert_eq!(tokens[4].text, "2");
        assert_eq!(tokens[5].text, "e");
    }

    #[test]
    fn test_lexer_is_restartable() {
        let sql = "SELECT 1";
        let first: Vec<Token> = Lexer::new(sql).collect();
        let second = tokenize(sql);
        assert_eq!(first, second);
    }
}
