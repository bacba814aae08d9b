use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use tracing::trace;

use crate::error::ErrorSink;
use crate::treewalk::expr::LiteralValue;

static KEYWORDS: Lazy<HashMap<&'static str, TokenType>> = Lazy::new(|| {
    HashMap::from([
        ("and", TokenType::And),
        ("break", TokenType::Break),
        ("class", TokenType::Class),
        ("continue", TokenType::Continue),
        ("else", TokenType::Else),
        ("false", TokenType::False),
        ("for", TokenType::For),
        ("fun", TokenType::Fun),
        ("if", TokenType::If),
        ("nil", TokenType::Nil),
        ("or", TokenType::Or),
        ("parent", TokenType::Parent),
        ("print", TokenType::Print),
        ("return", TokenType::Return),
        ("store", TokenType::Store),
        ("this", TokenType::This),
        ("true", TokenType::True),
        ("while", TokenType::While),
    ])
});

/// Scan the whole source into tokens. The result always ends with an EOF token, even
/// when errors were reported along the way.
pub fn scan_tokens(code: &str, errors: &mut ErrorSink) -> Vec<Token> {
    let mut scanner = Scanner {
        chars: code.chars().collect(),
        cursor_begin: 0,
        cursor_end: 0,
        line: 1,
        tokens: Vec::new(),
    };

    while !scanner.at_end() {
        scanner.cursor_begin = scanner.cursor_end;
        scanner.scan_token(errors);
    }

    scanner.tokens.push(Token {
        token_type: TokenType::EOF,
        lexeme: String::new(),
        literal: None,
        line: scanner.line,
    });

    trace!(count = scanner.tokens.len(), "scanned tokens");
    scanner.tokens
}

struct Scanner {
    chars: Vec<char>,
    cursor_begin: usize,
    cursor_end: usize,
    line: u32,
    tokens: Vec<Token>,
}

impl Scanner {
    fn scan_token(&mut self, errors: &mut ErrorSink) {
        let current = self.advance();

        match current {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),
            '?' => self.add_token(TokenType::Question),
            ':' => self.add_token(TokenType::Colon),
            '!' => self.add_either('=', TokenType::BangEqual, TokenType::Bang),
            '=' => self.add_either('=', TokenType::EqualEqual, TokenType::Equal),
            '<' => self.add_either('=', TokenType::LessEqual, TokenType::Less),
            '>' => self.add_either('=', TokenType::GreaterEqual, TokenType::Greater),
            '/' => {
                if self.advance_if_match('/') {
                    while self.peek() != '\n' && !self.at_end() {
                        self.advance();
                    }
                } else if self.advance_if_match('*') {
                    self.block_comment(errors);
                } else {
                    self.add_token(TokenType::Slash);
                }
            }
            ' ' | '\r' | '\t' => {}
            '\n' => self.line += 1,
            '"' => self.string(errors),
            c if c.is_ascii_digit() => self.number(),
            c if is_alpha(c) => self.identifier(),
            _ => errors.error(self.line, "Unexpected character."),
        }
    }

    // comments don't nest, the first "*/" closes the comment
    fn block_comment(&mut self, errors: &mut ErrorSink) {
        while !(self.peek() == '*' && self.peek_next() == '/') {
            if self.at_end() {
                errors.error(self.line, "Unterminated comment.");
                return;
            }
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        // the closing "*/"
        self.advance();
        self.advance();
    }

    fn string(&mut self, errors: &mut ErrorSink) {
        while self.peek() != '"' && !self.at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.at_end() {
            errors.error(self.line, "Unterminated string.");
            return;
        }

        // the closing quote
        self.advance();

        let value: String = self.chars[self.cursor_begin + 1..self.cursor_end - 1].iter().collect();
        self.add_literal(TokenType::String, LiteralValue::String(value));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // a fractional part needs at least one digit after the '.'
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text = self.lexeme();
        // digits with at most one '.' between them always parse
        let value = text.parse::<f64>().unwrap_or_default();
        self.add_literal(TokenType::Number, LiteralValue::Number(value));
    }

    fn identifier(&mut self) {
        while is_alphanumeric(self.peek()) {
            self.advance();
        }

        let text = self.lexeme();
        let token_type = KEYWORDS.get(text.as_str()).copied().unwrap_or(TokenType::Identifier);
        self.add_token(token_type);
    }

    fn at_end(&self) -> bool {
        self.cursor_end >= self.chars.len()
    }

    fn advance(&mut self) -> char {
        let current = self.chars[self.cursor_end];
        self.cursor_end += 1;
        current
    }

    fn advance_if_match(&mut self, expected: char) -> bool {
        if self.at_end() || self.chars[self.cursor_end] != expected {
            return false;
        }
        self.cursor_end += 1;
        true
    }

    fn peek(&self) -> char {
        self.chars.get(self.cursor_end).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.chars.get(self.cursor_end + 1).copied().unwrap_or('\0')
    }

    fn lexeme(&self) -> String {
        self.chars[self.cursor_begin..self.cursor_end].iter().collect()
    }

    fn add_either(&mut self, second: char, matched: TokenType, single: TokenType) {
        let token_type = if self.advance_if_match(second) { matched } else { single };
        self.add_token(token_type);
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.push_token(token_type, None);
    }

    fn add_literal(&mut self, token_type: TokenType, literal: LiteralValue) {
        self.push_token(token_type, Some(literal));
    }

    fn push_token(&mut self, token_type: TokenType, literal: Option<LiteralValue>) {
        let lexeme = self.lexeme();
        self.tokens.push(Token {
            token_type,
            lexeme,
            literal,
            line: self.line,
        });
    }
}

fn is_alpha(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_alphanumeric(c: char) -> bool {
    is_alpha(c) || c.is_ascii_digit()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub literal: Option<LiteralValue>,
    pub line: u32,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.literal {
            Some(literal) => write!(f, "{:?}({})", self.token_type, literal),
            None => write!(f, "{:?}", self.token_type),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    Question,
    Colon,

    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals.
    Identifier,
    String,
    Number,

    // Keywords.
    And,
    Break,
    Class,
    Continue,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Parent,
    Print,
    Return,
    Store,
    This,
    True,
    While,

    EOF,
}
