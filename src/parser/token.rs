use std::fmt::{Display, Formatter};

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Open,
    Close,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Arrow,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Word(w) => write!(f, "\"{w}\""),
            Self::Open => f.write_str("'{'"),
            Self::Close => f.write_str("'}'"),
            Self::LBracket => f.write_str("'['"),
            Self::RBracket => f.write_str("']'"),
            Self::Comma => f.write_str("','"),
            Self::Colon => f.write_str("':'"),
            Self::Arrow => f.write_str("'==>'"),
        }
    }
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | ',')
}

/// Splits one command into tokens, each paired with its line relative to
/// the start of the command.
fn tokenize(text: &str) -> Vec<(Token, usize)> {
    let mut chars = text.chars().peekable();
    let mut line = 0;
    let mut tokens = Vec::new();

    while let Some(c) = chars.next() {
        let token = match c {
            '\n' => {
                line += 1;
                continue;
            }
            c if c.is_whitespace() => continue,
            '{' => Token::Open,
            '}' => Token::Close,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            c => {
                let mut word = String::from(c);
                while let Some(c) = chars.next_if(|c| !is_delimiter(*c)) {
                    word.push(c);
                }
                push_word(&mut tokens, &word, line);
                continue;
            }
        };
        tokens.push((token, line));
    }

    tokens
}

/// Splits `==>` and label colons out of a run of non-delimiters.
fn push_word(tokens: &mut Vec<(Token, usize)>, word: &str, line: usize) {
    if word.is_empty() {
        return;
    }

    if let Some((before, after)) = word.split_once("==>") {
        push_word(tokens, before, line);
        tokens.push((Token::Arrow, line));
        push_word(tokens, after, line);
        return;
    }

    // IPv6 addresses always carry more than one colon
    match word.split_once(':') {
        Some((before, after)) if !after.contains(':') => {
            push_word(tokens, before, line);
            tokens.push((Token::Colon, line));
            push_word(tokens, after, line);
        }
        _ => tokens.push((Token::Word(word.to_string()), line)),
    }
}

/// Walks the tokens of one command and builds errors that point at the
/// physical script line of the token being looked at.
pub struct Cursor {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    first_line: usize,
}

impl Cursor {
    pub fn new(text: &str, first_line: usize) -> Self {
        Self {
            tokens: tokenize(text),
            pos: 0,
            first_line,
        }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(t, _)| t)
    }

    pub fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    /// Line of the next token, or of the last one once everything is consumed.
    pub fn line(&self) -> usize {
        let offset = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(_, l)| *l);
        self.first_line + offset
    }

    pub fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::malformed(self.line(), message)
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        match self.peek() {
            Some(t) => self.error(format!("expected {expected}, found {t}")),
            None => self.error(format!("expected {expected}, found end of command")),
        }
    }

    pub fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, token: &Token, expected: &str) -> crate::error::Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    pub fn expect_word(&mut self, expected: &str) -> crate::error::Result<String> {
        match self.peek_word() {
            Some(w) => {
                let w = w.to_string();
                self.pos += 1;
                Ok(w)
            }
            None => Err(self.unexpected(expected)),
        }
    }

    pub fn peek_word(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Word(w)) => Some(w),
            _ => None,
        }
    }

    pub fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek_word()
            .map_or(false, |w| w.eq_ignore_ascii_case(keyword))
    }

    pub fn expect_end(&self, construct: &str) -> crate::error::Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(self.error(format!("unexpected {t} after {construct}"))),
        }
    }
}
