use std::rc::Rc;

use crate::span::SourceSpan;

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub struct Scanner {
    pub source: Rc<str>,
    pub start: usize,
    pub current: usize,
    pub line: usize,
}

impl Scanner {
    pub fn new(source: Rc<str>) -> Scanner {
        Scanner {
            source,
            start: 0,
            current: 0,
            line: 1,
        }
    }

    pub fn token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.current;

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        match self.advance() {
            c if c.is_ascii_digit() => self.number(),
            c if is_alpha(c) => self.identifier(),
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            ';' => self.make_token(TokenKind::SemiColon),
            ',' => self.make_token(TokenKind::Comma),
            '.' => self.make_token(TokenKind::Dot),
            '-' => self.make_token(TokenKind::Minus),
            '+' => self.make_token(TokenKind::Plus),
            '/' => self.make_token(TokenKind::Slash),
            '*' => self.make_token(TokenKind::Star),
            '!' => self.token_if_match('=', TokenKind::BangEqual, TokenKind::Bang),
            '=' => self.token_if_match('=', TokenKind::EqualEqual, TokenKind::Equal),
            '<' => self.token_if_match('=', TokenKind::LessEqual, TokenKind::Less),
            '>' => self.token_if_match('=', TokenKind::GreaterEqual, TokenKind::Greater),
            '"' => self.string(),
            _ => self.error_token("Unexpected character."),
        }
    }

    fn identifier(&mut self) -> Token {
        while is_alpha(self.peek()) || self.peek().is_ascii_digit() {
            self.advance();
        }

        self.make_token(self.identifier_kind())
    }

    fn identifier_kind(&self) -> TokenKind {
        match self.get_char(self.start) {
            'a' => self.check_keyword(1, "nd", TokenKind::And),
            'c' => self.check_keyword(1, "lass", TokenKind::Class),
            'e' => self.check_keyword(1, "lse", TokenKind::Else),
            'f' => {
                if self.current - self.start > 1 {
                    match self.get_char(self.start + 1) {
                        'a' => self.check_keyword(2, "lse", TokenKind::False),
                        'o' => self.check_keyword(2, "r", TokenKind::For),
                        'u' => self.check_keyword(2, "n", TokenKind::Fun),
                        _ => TokenKind::Identifier,
                    }
                } else {
                    TokenKind::Identifier
                }
            }
            'i' => self.check_keyword(1, "f", TokenKind::If),
            'n' => self.check_keyword(1, "ull", TokenKind::Null),
            'o' => self.check_keyword(1, "r", TokenKind::Or),
            'r' => self.check_keyword(1, "eturn", TokenKind::Return),
            't' => {
                if self.current - self.start > 1 {
                    match self.get_char(self.start + 1) {
                        'h' => self.check_keyword(2, "is", TokenKind::This),
                        'r' => self.check_keyword(2, "ue", TokenKind::True),
                        _ => TokenKind::Identifier,
                    }
                } else {
                    TokenKind::Identifier
                }
            }
            'v' => self.check_keyword(1, "ar", TokenKind::Var),
            'w' => self.check_keyword(1, "hile", TokenKind::While),
            _ => TokenKind::Identifier,
        }
    }

    fn check_keyword(&self, offset: usize, rest: &str, kind: TokenKind) -> TokenKind {
        if self.current - self.start != offset + rest.len() {
            return TokenKind::Identifier;
        }

        let s = self.start + offset;
        if &self.source[s..s + rest.len()] == rest {
            kind
        } else {
            TokenKind::Identifier
        }
    }

    fn number(&mut self) -> Token {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        self.make_token(TokenKind::Number)
    }

    fn string(&mut self) -> Token {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            return self.error_token("Unterminated string.");
        }

        self.advance();
        self.make_token(TokenKind::String)
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                ' ' | '\r' | '\t' => {
                    self.advance();
                }
                '\n' => {
                    self.line += 1;
                    self.advance();
                }
                '/' => {
                    if self.peek_next() != '/' {
                        return;
                    }

                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                _ => {
                    return;
                }
            }
        }
    }

    fn peek_next(&self) -> char {
        self.get_char(self.current + 1)
    }

    fn peek(&self) -> char {
        self.get_char(self.current)
    }

    fn token_if_match(
        &mut self,
        expected: char,
        if_present: TokenKind,
        if_absent: TokenKind,
    ) -> Token {
        if self.match_char(expected) {
            self.make_token(if_present)
        } else {
            self.make_token(if_absent)
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.get_char(self.current) != expected {
            false
        } else {
            self.current += 1;
            true
        }
    }

    fn get_char(&self, i: usize) -> char {
        if i >= self.source.len() {
            '\0'
        } else {
            self.source.as_bytes()[i] as char
        }
    }

    fn advance(&mut self) -> char {
        self.current += 1;
        self.get_char(self.current - 1)
    }

    fn is_at_end(&self) -> bool {
        self.current == self.source.len()
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token {
            kind,
            line: self.line,
            span: SourceSpan::new(self.source.clone(), self.start, self.current),
        }
    }

    fn error_token(&self, message: &'static str) -> Token {
        Token {
            kind: TokenKind::Error,
            line: self.line,
            span: SourceSpan::detached(message),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub span: SourceSpan,
}

impl Token {
    pub fn text(&self) -> &str {
        self.span.as_str()
    }

    pub fn lexeme_eq(&self, other: &Token) -> bool {
        self.span == other.span
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    SemiColon,
    Slash,
    Star,

    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    Identifier,
    String,
    Number,

    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Null,
    Or,
    Return,
    This,
    True,
    Var,
    While,

    Error,
    Eof,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_single_token() {
        for (s, kind) in [
            ("1", TokenKind::Number),
            ("1.2", TokenKind::Number),
            ("\"abc\"", TokenKind::String),
            ("tru", TokenKind::Identifier),
            ("truth", TokenKind::Identifier),
            ("nullify", TokenKind::Identifier),
            ("andx", TokenKind::Identifier),
            ("t", TokenKind::Identifier),
            ("(", TokenKind::LeftParen),
            (")", TokenKind::RightParen),
            ("[", TokenKind::LeftBracket),
            ("]", TokenKind::RightBracket),
            ("{", TokenKind::LeftBrace),
            ("}", TokenKind::RightBrace),
            (",", TokenKind::Comma),
            (".", TokenKind::Dot),
            ("-", TokenKind::Minus),
            ("+", TokenKind::Plus),
            (";", TokenKind::SemiColon),
            ("/", TokenKind::Slash),
            ("*", TokenKind::Star),
            ("!", TokenKind::Bang),
            ("!=", TokenKind::BangEqual),
            ("=", TokenKind::Equal),
            ("==", TokenKind::EqualEqual),
            (">", TokenKind::Greater),
            (">=", TokenKind::GreaterEqual),
            ("<", TokenKind::Less),
            ("<=", TokenKind::LessEqual),
            ("and", TokenKind::And),
            ("class", TokenKind::Class),
            ("else", TokenKind::Else),
            ("false", TokenKind::False),
            ("for", TokenKind::For),
            ("fun", TokenKind::Fun),
            ("if", TokenKind::If),
            ("null", TokenKind::Null),
            ("or", TokenKind::Or),
            ("return", TokenKind::Return),
            ("this", TokenKind::This),
            ("true", TokenKind::True),
            ("var", TokenKind::Var),
            ("while", TokenKind::While),
        ] {
            let mut scanner = Scanner::new(s.into());
            let token = scanner.token();

            assert_eq!(s, token.text());
            assert_eq!(token.kind, kind);
        }
    }

    #[test]
    fn line_counting_spans_comments_and_strings() {
        let mut scanner = Scanner::new("// nothing here\n1\n\"two\nlines\"".into());

        let number = scanner.token();
        assert_eq!(number.kind, TokenKind::Number);
        assert_eq!(number.line, 2);

        let string = scanner.token();
        assert_eq!(string.kind, TokenKind::String);
        assert_eq!(string.line, 4);

        assert_eq!(scanner.token().kind, TokenKind::Eof);
    }

    #[test]
    fn eof_repeats_once_input_is_exhausted() {
        let mut scanner = Scanner::new("1".into());
        scanner.token();

        assert_eq!(scanner.token().kind, TokenKind::Eof);
        assert_eq!(scanner.token().kind, TokenKind::Eof);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new("\"oops".into());
        let token = scanner.token();

        assert_eq!(token.kind, TokenKind::Error);
        assert_eq!(token.text(), "Unterminated string.");
    }
}
