// File: src/lexer.rs
//
// Scanner for Carblang source text. Produces a flat token stream with the
// lexeme, literal payload and line number the parser and error reporter
// need. Strings are byte sequences; no escape processing is performed.

use ahash::AHashMap;
use once_cell::sync::Lazy;

use crate::errors::CarbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One- or two-character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Class,
    Else,
    False,
    Function,
    For,
    If,
    Null,
    Or,
    Print,
    PrintLn,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    Eof,
}

/// Literal payload carried by `Number` and `String` tokens
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
}

static KEYWORDS: Lazy<AHashMap<&'static str, TokenType>> = Lazy::new(|| {
    let mut map = AHashMap::new();
    map.insert("and", TokenType::And);
    map.insert("class", TokenType::Class);
    map.insert("else", TokenType::Else);
    map.insert("false", TokenType::False);
    map.insert("for", TokenType::For);
    map.insert("function", TokenType::Function);
    map.insert("if", TokenType::If);
    map.insert("null", TokenType::Null);
    map.insert("or", TokenType::Or);
    map.insert("print", TokenType::Print);
    map.insert("println", TokenType::PrintLn);
    map.insert("return", TokenType::Return);
    map.insert("super", TokenType::Super);
    map.insert("this", TokenType::This);
    map.insert("true", TokenType::True);
    map.insert("var", TokenType::Var);
    map.insert("while", TokenType::While);
    map
});

pub struct Scanner<'a> {
    src: &'a [u8],
    tokens: Vec<Token>,
    errors: Vec<CarbError>,
    start: usize,
    current: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            src: source.as_bytes(),
            tokens: Vec::new(),
            errors: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
        }
    }

    /// Scans the whole source. Lexical errors do not stop the scan; every
    /// error found is returned alongside the tokens so the driver can report
    /// all of them in one pass.
    pub fn scan_tokens(mut self) -> (Vec<Token>, Vec<CarbError>) {
        while !self.at_end() {
            self.start = self.current;
            self.scan_single_token();
        }
        self.tokens.push(Token {
            token_type: TokenType::Eof,
            lexeme: String::new(),
            literal: None,
            line: self.line,
        });
        (self.tokens, self.errors)
    }

    fn scan_single_token(&mut self) {
        let c = self.advance();
        match c {
            b'(' => self.add_token(TokenType::LeftParen),
            b')' => self.add_token(TokenType::RightParen),
            b'{' => self.add_token(TokenType::LeftBrace),
            b'}' => self.add_token(TokenType::RightBrace),
            b'[' => self.add_token(TokenType::LeftBracket),
            b']' => self.add_token(TokenType::RightBracket),
            b',' => self.add_token(TokenType::Comma),
            b'.' => self.add_token(TokenType::Dot),
            b'-' => self.add_token(TokenType::Minus),
            b'+' => self.add_token(TokenType::Plus),
            b';' => self.add_token(TokenType::Semicolon),
            b'*' => self.add_token(TokenType::Star),
            b'!' => {
                let token = if self.match_byte(b'=') { TokenType::BangEqual } else { TokenType::Bang };
                self.add_token(token);
            }
            b'=' => {
                let token =
                    if self.match_byte(b'=') { TokenType::EqualEqual } else { TokenType::Equal };
                self.add_token(token);
            }
            b'<' => {
                let token = if self.match_byte(b'=') { TokenType::LessEqual } else { TokenType::Less };
                self.add_token(token);
            }
            b'>' => {
                let token =
                    if self.match_byte(b'=') { TokenType::GreaterEqual } else { TokenType::Greater };
                self.add_token(token);
            }
            b'/' => {
                if self.match_byte(b'/') {
                    // Line comment
                    while self.peek() != b'\n' && !self.at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            b' ' | b'\r' | b'\t' => {}
            b'\n' => self.line += 1,
            b'"' => self.string(),
            _ => {
                if c.is_ascii_digit() {
                    self.number();
                } else if is_alpha(c) {
                    self.identifier();
                } else {
                    self.errors.push(CarbError::parse(
                        "Unexpected character.",
                        self.line,
                        String::from_utf8_lossy(&self.src[self.start..self.current]),
                    ));
                }
            }
        }
    }

    fn identifier(&mut self) {
        while is_alpha_numeric(self.peek()) {
            self.advance();
        }
        let text = self.lexeme_text();
        let token_type = KEYWORDS.get(text.as_str()).copied().unwrap_or(TokenType::Identifier);
        self.add_token(token_type);
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        let text = self.lexeme_text();
        // The digit grammar above only produces valid f64 text
        let value: f64 = text.parse().unwrap_or(0.0);
        self.add_literal_token(TokenType::Number, Literal::Number(value));
    }

    fn string(&mut self) {
        while self.peek() != b'"' && !self.at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.at_end() {
            self.errors.push(CarbError::parse_at_end("Unterminated string", self.line));
            return;
        }

        // Consume the closing quote
        self.advance();

        let value =
            String::from_utf8_lossy(&self.src[self.start + 1..self.current - 1]).into_owned();
        self.add_literal_token(TokenType::String, Literal::Str(value));
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.at_end() || self.src[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn peek(&self) -> u8 {
        if self.at_end() {
            b'\0'
        } else {
            self.src[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.src.len() {
            b'\0'
        } else {
            self.src[self.current + 1]
        }
    }

    fn at_end(&self) -> bool {
        self.current >= self.src.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.src[self.current];
        self.current += 1;
        c
    }

    fn lexeme_text(&self) -> String {
        String::from_utf8_lossy(&self.src[self.start..self.current]).into_owned()
    }

    fn add_token(&mut self, token_type: TokenType) {
        let lexeme = self.lexeme_text();
        self.tokens.push(Token { token_type, lexeme, literal: None, line: self.line });
    }

    fn add_literal_token(&mut self, token_type: TokenType, literal: Literal) {
        let lexeme = self.lexeme_text();
        self.tokens.push(Token { token_type, lexeme, literal: Some(literal), line: self.line });
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_alpha_numeric(c: u8) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

/// Convenience wrapper used by the driver and tests
pub fn scan(source: &str) -> (Vec<Token>, Vec<CarbError>) {
    Scanner::new(source).scan_tokens()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        let (tokens, errors) = scan(source);
        assert!(errors.is_empty(), "unexpected scan errors: {:?}", errors);
        tokens.into_iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn scans_operators_and_delimiters() {
        assert_eq!(
            types("( ) { } [ ] , . - + ; / *"),
            vec![
                TokenType::LeftParen,
                TokenType::RightParen,
                TokenType::LeftBrace,
                TokenType::RightBrace,
                TokenType::LeftBracket,
                TokenType::RightBracket,
                TokenType::Comma,
                TokenType::Dot,
                TokenType::Minus,
                TokenType::Plus,
                TokenType::Semicolon,
                TokenType::Slash,
                TokenType::Star,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn scans_two_character_operators() {
        assert_eq!(
            types("! != = == < <= > >="),
            vec![
                TokenType::Bang,
                TokenType::BangEqual,
                TokenType::Equal,
                TokenType::EqualEqual,
                TokenType::Less,
                TokenType::LessEqual,
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn scans_number_literals() {
        let (tokens, _) = scan("12 3.5");
        assert_eq!(tokens[0].literal, Some(Literal::Number(12.0)));
        assert_eq!(tokens[1].literal, Some(Literal::Number(3.5)));
    }

    #[test]
    fn scans_string_literals_without_quotes() {
        let (tokens, _) = scan("\"hello world\"");
        assert_eq!(tokens[0].literal, Some(Literal::Str("hello world".to_string())));
        assert_eq!(tokens[0].lexeme, "\"hello world\"");
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert_eq!(
            types("var x while function println"),
            vec![
                TokenType::Var,
                TokenType::Identifier,
                TokenType::While,
                TokenType::Function,
                TokenType::PrintLn,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            types("1 // the rest is ignored ;;;\n2"),
            vec![TokenType::Number, TokenType::Number, TokenType::Eof]
        );
        let (tokens, _) = scan("// only a comment");
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn tracks_line_numbers_through_newlines() {
        let (tokens, _) = scan("1\n2\n\n3");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[2].line, 4);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (_, errors) = scan("\"oops");
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unexpected_character_is_an_error_but_scanning_continues() {
        let (tokens, errors) = scan("@ 1");
        assert_eq!(errors.len(), 1);
        assert_eq!(tokens[0].token_type, TokenType::Number);
    }
}
