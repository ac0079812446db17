//! Indentation-aware lexer
//!
//! Produces a flat token stream in which block structure is explicit:
//! `Indent`/`Dedent` tokens are synthesized from a stack of indentation
//! widths (tabs and spaces both count one column), and `Newline` separates
//! logical lines. Blank and comment-only lines produce no tokens at all.

mod token;

pub use token::{Keyword, Token, TokenKind};

use crate::error::{CompileError, Result};

/// Tokenize source code
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
    at_line_start: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            indents: vec![0],
            tokens: Vec::new(),
            at_line_start: true,
        }
    }

    fn cur(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 2).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token::new(kind, self.line));
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while self.cur().is_some() {
            if self.at_line_start {
                self.handle_line_start()?;
                if self.cur().is_none() {
                    break;
                }
                continue;
            }

            let c = match self.cur() {
                Some(c) => c,
                None => break,
            };

            match c {
                ' ' | '\t' | '\r' => self.bump(),
                '\n' => {
                    self.push(TokenKind::Newline);
                    self.bump();
                    self.line += 1;
                    self.at_line_start = true;
                }
                '#' => self.skip_comment(),
                '(' => {
                    self.push(TokenKind::LParen);
                    self.bump();
                }
                ')' => {
                    self.push(TokenKind::RParen);
                    self.bump();
                }
                '[' => {
                    self.push(TokenKind::LBracket);
                    self.bump();
                }
                ']' => {
                    self.push(TokenKind::RBracket);
                    self.bump();
                }
                '{' => {
                    self.push(TokenKind::LBrace);
                    self.bump();
                }
                '}' => {
                    self.push(TokenKind::RBrace);
                    self.bump();
                }
                ':' => {
                    self.push(TokenKind::Colon);
                    self.bump();
                }
                ',' => {
                    self.push(TokenKind::Comma);
                    self.bump();
                }
                ';' => {
                    self.push(TokenKind::Semicolon);
                    self.bump();
                }
                '.' => {
                    self.push(TokenKind::Dot);
                    self.bump();
                }
                '+' => {
                    self.push(TokenKind::Plus);
                    self.bump();
                }
                '-' => {
                    self.push(TokenKind::Minus);
                    self.bump();
                }
                '*' => {
                    self.push(TokenKind::Star);
                    self.bump();
                }
                '/' => {
                    self.push(TokenKind::Slash);
                    self.bump();
                }
                '%' => {
                    self.push(TokenKind::Percent);
                    self.bump();
                }
                '^' => {
                    self.push(TokenKind::Caret);
                    self.bump();
                }
                '!' => {
                    if self.peek() == Some('=') {
                        self.push(TokenKind::NotEq);
                        self.bump();
                        self.bump();
                    } else {
                        self.push(TokenKind::Bang);
                        self.bump();
                    }
                }
                '=' => {
                    if self.peek() == Some('=') {
                        self.push(TokenKind::Eq);
                        self.bump();
                        self.bump();
                    } else {
                        self.push(TokenKind::Assign);
                        self.bump();
                    }
                }
                '<' => {
                    if self.peek() == Some('=') {
                        self.push(TokenKind::LtEq);
                        self.bump();
                        self.bump();
                    } else {
                        self.push(TokenKind::Lt);
                        self.bump();
                    }
                }
                '>' => {
                    if self.peek() == Some('=') {
                        self.push(TokenKind::GtEq);
                        self.bump();
                        self.bump();
                    } else {
                        self.push(TokenKind::Gt);
                        self.bump();
                    }
                }
                '"' => self.read_string()?,
                c if c.is_ascii_digit() => self.read_number(),
                c if c.is_ascii_alphabetic() || c == '_' => self.read_word(),
                other => {
                    return Err(CompileError::lexer(
                        format!("Unexpected character '{other}'."),
                        self.line,
                    ));
                }
            }
        }

        // Close any open blocks before EOF
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent);
        }
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    /// Measure indentation at the start of a logical line.
    ///
    /// Blank and comment-only lines are consumed without emitting anything.
    fn handle_line_start(&mut self) -> Result<()> {
        loop {
            let mut width = 0;
            while matches!(self.cur(), Some(' ') | Some('\t')) {
                width += 1;
                self.bump();
            }
            if self.cur() == Some('\r') {
                self.bump();
            }
            match self.cur() {
                None => return Ok(()),
                Some('\n') => {
                    // blank line
                    self.bump();
                    self.line += 1;
                }
                Some('#') => {
                    self.skip_comment();
                    // A block comment can end mid-line with content after it
                    if !matches!(self.cur(), Some('\n') | None) {
                        self.emit_indentation(width)?;
                        self.at_line_start = false;
                        return Ok(());
                    }
                }
                Some(_) => {
                    self.emit_indentation(width)?;
                    self.at_line_start = false;
                    return Ok(());
                }
            }
        }
    }

    fn emit_indentation(&mut self, width: usize) -> Result<()> {
        let top = *self.indents.last().unwrap_or(&0);
        if width > top {
            self.indents.push(width);
            self.push(TokenKind::Indent);
        } else if width < top {
            while width < *self.indents.last().unwrap_or(&0) {
                self.indents.pop();
                self.push(TokenKind::Dedent);
            }
            if *self.indents.last().unwrap_or(&0) != width {
                return Err(CompileError::lexer(
                    "Inconsistent indentation.".to_string(),
                    self.line,
                ));
            }
        }
        Ok(())
    }

    /// Skip a `#` comment: single-line, or block delimited by `###`
    fn skip_comment(&mut self) {
        if self.peek() == Some('#') && self.peek2() == Some('#') {
            self.bump();
            self.bump();
            self.bump();
            loop {
                match self.cur() {
                    None => return,
                    Some('#') if self.peek() == Some('#') && self.peek2() == Some('#') => {
                        self.bump();
                        self.bump();
                        self.bump();
                        return;
                    }
                    Some('\n') => {
                        self.line += 1;
                        self.bump();
                    }
                    Some(_) => self.bump(),
                }
            }
        }
        while !matches!(self.cur(), Some('\n') | None) {
            self.bump();
        }
    }

    fn read_string(&mut self) -> Result<()> {
        let start_line = self.line;
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.cur() {
                None => {
                    return Err(CompileError::lexer("Unterminated string.", start_line));
                }
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    match self.cur() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('r') => text.push('\r'),
                        Some('\\') => text.push('\\'),
                        Some('"') => text.push('"'),
                        // Unknown escapes yield the character itself
                        Some(other) => text.push(other),
                        None => {
                            return Err(CompileError::lexer("Unterminated string.", start_line));
                        }
                    }
                    self.bump();
                }
                Some('\n') => {
                    text.push('\n');
                    self.line += 1;
                    self.bump();
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        self.tokens
            .push(Token::new(TokenKind::Str(text), start_line));
        Ok(())
    }

    fn read_number(&mut self) {
        let mut text = String::new();
        while let Some(c) = self.cur() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let mut is_float = false;
        if self.cur() == Some('.') && self.peek().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.cur() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if is_float {
            self.push(TokenKind::Float(text));
        } else {
            self.push(TokenKind::Int(text));
        }
    }

    fn read_word(&mut self) {
        let mut word = String::new();
        while let Some(c) = self.cur() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match Keyword::from_word(&word) {
            Some(kw) => self.push(TokenKind::Keyword(kw)),
            None => self.push(TokenKind::Ident(word)),
        }
    }
}
