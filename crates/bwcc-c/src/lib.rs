//! Lightweight parser for a teaching subset of C.
//!
//! The crate turns source text into a typed abstract syntax tree. Lexing and
//! parsing are interleaved: the parser pulls tokens one at a time, and the
//! lexer consults the parser's scope stack to classify identifiers that were
//! bound by `typedef`. See [`parse`] for the entry point.
//!
//! ```
//! let ast = bwcc_c::parse("int main() { return 0; }", "demo.c").unwrap();
//! assert_eq!(ast.node.ext.len(), 1);
//! ```

pub mod ast;
pub mod env;
mod error;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod span;
pub mod token;


pub use crate::error::ParseError;
pub use crate::parser::Parser;
pub use crate::span::{Coord, Node};

/// Parse a translation unit. `filename` only labels diagnostics and node
/// coordinates; it is not opened.
pub fn parse(source: &str, filename: &str) -> Result<Node<ast::FileAST>, ParseError> {
    Parser::new(source, filename).parse()
}
