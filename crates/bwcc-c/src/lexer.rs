//! Character-level scanner.
//!
//! Tokens are produced on demand: the parser pulls one at a time, so scope
//! changes triggered by `{` and `}` are visible to the very next identifier
//! lookup. Operators use longest match; keywords are matched as identifiers
//! and reclassified through the keyword table.

use std::rc::Rc;

use crate::env::ScopeHooks;
use crate::error::ParseError;
use crate::span::Coord;
use crate::token::{Punct, Token, TokenKind, KEYWORDS};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    file: Rc<str>,
    hooks: Rc<dyn ScopeHooks>,
}

impl Lexer {
    pub fn new(source: &str, file: Rc<str>, hooks: Rc<dyn ScopeHooks>) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            file,
            hooks,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn coord(&self) -> Coord {
        Coord::new(Rc::clone(&self.file), self.line, self.column)
    }

    fn text_from(&self, start: usize) -> String {
        self.chars[start..self.pos].iter().collect()
    }

    fn error(&mut self, message: impl Into<String>, coord: Coord, restart: usize) -> ParseError {
        // Skip one character past the offending position so a caller that
        // chose to continue would make progress.
        self.pos = restart + 1;
        ParseError::new(message, coord)
    }

    /// Next token, or `Eof` once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Token, ParseError> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\n') | Some('\r') => {
                    self.bump();
                }
                _ => break,
            }
        }

        let coord = self.coord();
        let start = self.pos;

        let c = match self.peek() {
            Some(c) => c,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    coord,
                })
            }
        };

        let token = if c.is_ascii_alphabetic() || c == '_' {
            self.identifier(coord, start)
        } else if c.is_ascii_digit() {
            self.number(coord, start)?
        } else if c == '.' && self.peek_at(1).map_or(false, |d| d.is_ascii_digit()) {
            self.float_from_dot(coord, start)?
        } else if c == '\'' {
            self.char_constant(coord, start)?
        } else if c == '"' {
            self.string_literal(coord, start)?
        } else {
            self.punct(coord, start)?
        };

        log::trace!("token {:?} {:?}", token.kind, token.text);
        Ok(token)
    }

    fn identifier(&mut self, coord: Coord, start: usize) -> Token {
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let text = self.text_from(start);
        let kind = match KEYWORDS.get(text.as_str()) {
            Some(&kw) => TokenKind::Keyword(kw),
            None if self.hooks.is_typeid(&text) => TokenKind::TypeId,
            None => TokenKind::Id,
        };
        Token { kind, text, coord }
    }

    /// Decimal integer or floating constant starting with a digit.
    fn number(&mut self, coord: Coord, start: usize) -> Result<Token, ParseError> {
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.bump();
        }
        match self.peek() {
            Some('.') => {
                self.bump();
                while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    self.bump();
                }
                self.float_tail(coord, start)
            }
            Some('e') | Some('E') if self.exponent_follows() => self.float_tail(coord, start),
            _ => {
                // Integer suffix characters are collected greedily here;
                // their validity is judged when the constant node is built.
                while matches!(self.peek(), Some('u') | Some('U') | Some('l') | Some('L')) {
                    self.bump();
                }
                Ok(Token {
                    kind: TokenKind::IntConst,
                    text: self.text_from(start),
                    coord,
                })
            }
        }
    }

    /// `.5`, `.5e3` and friends.
    fn float_from_dot(&mut self, coord: Coord, start: usize) -> Result<Token, ParseError> {
        self.bump(); // the dot
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.bump();
        }
        self.float_tail(coord, start)
    }

    /// Optional exponent and single-letter suffix after the mantissa.
    fn float_tail(&mut self, coord: Coord, start: usize) -> Result<Token, ParseError> {
        if self.exponent_follows() {
            self.bump(); // e / E
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            while self.peek().map_or(false, |c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('f') | Some('F') | Some('l') | Some('L')) {
            self.bump();
        }
        Ok(Token {
            kind: TokenKind::FloatConst,
            text: self.text_from(start),
            coord,
        })
    }

    /// True when the current `e`/`E` begins a well-formed exponent. A bare
    /// `123e` leaves the `e` to be lexed as an identifier.
    fn exponent_follows(&self) -> bool {
        if !matches!(self.peek(), Some('e') | Some('E')) {
            return false;
        }
        match self.peek_at(1) {
            Some('+') | Some('-') => self.peek_at(2).map_or(false, |c| c.is_ascii_digit()),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }

    /// Exactly one plain character between single quotes.
    fn char_constant(&mut self, coord: Coord, start: usize) -> Result<Token, ParseError> {
        self.bump(); // opening quote
        match self.peek() {
            Some('\'') => Err(self.error("ill-formed character constant ''", coord, start)),
            Some(c) if c != '\\' && c != '\n' => {
                self.bump();
                if self.peek() == Some('\'') {
                    self.bump();
                    Ok(Token {
                        kind: TokenKind::CharConst,
                        text: self.text_from(start),
                        coord,
                    })
                } else {
                    Err(self.error("illegal character '''", coord, start))
                }
            }
            _ => Err(self.error("illegal character '''", coord, start)),
        }
    }

    /// Anything up to the next `"`. Escapes are not interpreted; the only
    /// later rewrite turns embedded newlines into the two characters `\n`.
    fn string_literal(&mut self, coord: Coord, start: usize) -> Result<Token, ParseError> {
        self.bump(); // opening quote
        loop {
            match self.bump() {
                Some('"') => {
                    return Ok(Token {
                        kind: TokenKind::StringLiteral,
                        text: self.text_from(start),
                        coord,
                    })
                }
                Some(_) => {}
                None => return Err(self.error("unterminated string literal", coord, start)),
            }
        }
    }

    fn punct(&mut self, coord: Coord, start: usize) -> Result<Token, ParseError> {
        use Punct::*;
        let c = self.bump().unwrap();
        let punct = match c {
            '+' => match self.peek() {
                Some('+') => self.two(PlusPlus),
                Some('=') => self.two(PlusEq),
                _ => Plus,
            },
            '-' => match self.peek() {
                Some('-') => self.two(MinusMinus),
                Some('=') => self.two(MinusEq),
                Some('>') => self.two(Arrow),
                _ => Minus,
            },
            '*' => match self.peek() {
                Some('=') => self.two(StarEq),
                _ => Star,
            },
            '/' => match self.peek() {
                Some('=') => self.two(SlashEq),
                _ => Slash,
            },
            '%' => match self.peek() {
                Some('=') => self.two(PercentEq),
                _ => Percent,
            },
            '<' => match (self.peek(), self.peek_at(1)) {
                (Some('<'), Some('=')) => self.three(ShlEq),
                (Some('<'), _) => self.two(Shl),
                (Some('='), _) => self.two(Le),
                _ => Lt,
            },
            '>' => match (self.peek(), self.peek_at(1)) {
                (Some('>'), Some('=')) => self.three(ShrEq),
                (Some('>'), _) => self.two(Shr),
                (Some('='), _) => self.two(Ge),
                _ => Gt,
            },
            '=' => match self.peek() {
                Some('=') => self.two(EqEq),
                _ => Eq,
            },
            '!' => match self.peek() {
                Some('=') => self.two(Ne),
                _ => Bang,
            },
            '&' => match self.peek() {
                Some('&') => self.two(AmpAmp),
                Some('=') => self.two(AmpEq),
                _ => Amp,
            },
            '|' => match self.peek() {
                Some('|') => self.two(PipePipe),
                Some('=') => self.two(PipeEq),
                _ => Pipe,
            },
            '^' => match self.peek() {
                Some('=') => self.two(CaretEq),
                _ => Caret,
            },
            '~' => Tilde,
            '?' => Question,
            ':' => Colon,
            ';' => Semi,
            ',' => Comma,
            '.' => Dot,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '{' => {
                self.hooks.on_lbrace();
                LBrace
            }
            '}' => {
                self.hooks.on_rbrace();
                RBrace
            }
            other => {
                return Err(self.error(format!("illegal character '{}'", other), coord, start));
            }
        };
        Ok(Token {
            kind: TokenKind::Punct(punct),
            text: self.text_from(start),
            coord,
        })
    }

    fn two(&mut self, p: Punct) -> Punct {
        self.bump();
        p
    }

    fn three(&mut self, p: Punct) -> Punct {
        self.bump();
        self.bump();
        p
    }
}
