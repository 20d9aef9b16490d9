//! BWCC: a pedagogical compiler for a subset of C.
//!
//! The pipeline is strictly phase-ordered: source text is parsed into an
//! AST (the `bwcc-c` crate), the AST is translated into a linear stream of
//! quadruples plus symbol and constant tables, and the stream is rendered
//! as 32-bit x86 assembly ready for a system toolchain. Each phase owns its
//! output; the first error anywhere halts the pipeline.
//!
//! ```
//! let out = bwcc::compile("int main(){ int a = 7; return a; }", "demo.c").unwrap();
//! assert!(out.assembly.contains("_main:"));
//! ```

pub mod asm;
pub mod ir;
pub mod translator;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use crate::asm::{AssembleError, Assembler};
pub use crate::ir::Quad;
pub use crate::translator::{Tables, TranslateError, Translator};
pub use bwcc_c::{parse, ast, Coord, Node, ParseError};

/// Any failure along the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
}

/// Assembly text plus the intermediate byproducts that produced it.
#[derive(Debug)]
pub struct CompileOutput {
    pub assembly: String,
    pub codes: Vec<Quad>,
    pub tables: Tables,
}

/// Translate a parsed unit into quadruples and finalized layout tables.
pub fn translate(ast: &Node<ast::FileAST>) -> Result<(Vec<Quad>, Tables), TranslateError> {
    let mut translator = Translator::new();
    translator.visit(ast)?;
    let tables = translator.get_tables();
    Ok((translator.into_codes(), tables))
}

/// Render a quadruple stream as an assembly file.
pub fn assemble(codes: &[Quad], tables: &Tables, filename: &str) -> Result<String, AssembleError> {
    Assembler::new(tables).assemble(codes, filename)
}

/// Full pipeline: parse, translate, assemble.
pub fn compile(source: &str, filename: &str) -> Result<CompileOutput, Error> {
    let ast = parse(source, filename)?;
    let (codes, tables) = translate(&ast)?;
    let assembly = assemble(&codes, &tables, filename)?;
    Ok(CompileOutput {
        assembly,
        codes,
        tables,
    })
}
