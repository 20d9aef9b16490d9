use thiserror::Error;

use crate::span::Coord;

/// Any failure while turning source text into an AST.
///
/// Lexical, syntactic and in-parser semantic errors all surface through this
/// one type; the first error aborts the parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{coord}: {message}")]
pub struct ParseError {
    pub message: String,
    pub coord: Coord,
}

impl ParseError {
    pub fn new(message: impl Into<String>, coord: Coord) -> ParseError {
        ParseError {
            message: message.into(),
            coord,
        }
    }
}
