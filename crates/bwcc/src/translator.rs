//! AST to quadruple translation.
//!
//! A tree walk with one arm per AST variant. Alongside the instruction
//! stream the translator keeps a per-function symbol table (parameters,
//! user locals and compiler temporaries, in insertion order) and a
//! translation-unit-wide table of interned string constants. Counters for
//! temporaries, labels and constants belong to one translator instance, so
//! a fresh instance compiles from a clean slate.

use indexmap::IndexMap;
use thiserror::Error;

use bwcc_c::ast::*;
use bwcc_c::{Coord, Node};

use crate::ir::Quad;

pub const WORD_SIZE: i64 = 4;

/// Stack width of the scalar types the backend can place.
pub fn type_width(name: &str) -> Option<i64> {
    match name {
        "int" => Some(4),
        "char" => Some(1),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("{coord}: {construct} is not supported by the code generator")]
    Unsupported { construct: String, coord: Coord },
    #[error("{coord}: unknown type '{name}'")]
    UnknownType { name: String, coord: Coord },
    #[error("{coord}: loop or branch condition must be a comparison")]
    BadCondition { coord: Coord },
}

fn unsupported(construct: &str, coord: &Coord) -> TranslateError {
    TranslateError::Unsupported {
        construct: construct.to_string(),
        coord: coord.clone(),
    }
}

/// Per-function symbols before layout: name to scalar type name, plus the
/// running stack requirement in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncEntry {
    pub symbols: IndexMap<String, String>,
    pub stacksize: i64,
}

/// Finalized layout: symbol offsets from `%esp` and the 16-byte-aligned
/// frame size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncLayout {
    pub symbols: IndexMap<String, i64>,
    pub stacksize: i64,
}

/// Everything the assembler needs besides the instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    /// String contents (quotes stripped, newlines escaped) to the defining
    /// function and the ordinal that names the `LC<n>` label.
    pub constant_table: IndexMap<String, (String, usize)>,
    pub symbol_table: IndexMap<String, FuncLayout>,
}

pub struct Translator {
    codes: Vec<Quad>,
    symbol_table: IndexMap<String, FuncEntry>,
    constant_table: IndexMap<String, (String, usize)>,
    constant_count: usize,
    temp_count: usize,
    label_count: usize,
    cur_func: Option<String>,
}

impl Translator {
    pub fn new() -> Translator {
        Translator {
            codes: Vec::new(),
            symbol_table: IndexMap::new(),
            constant_table: IndexMap::new(),
            constant_count: 0,
            temp_count: 0,
            label_count: 0,
            cur_func: None,
        }
    }

    pub fn codes(&self) -> &[Quad] {
        &self.codes
    }

    pub fn into_codes(self) -> Vec<Quad> {
        self.codes
    }

    /// Raw (pre-layout) symbol entries, keyed by function.
    pub fn symbol_entries(&self) -> &IndexMap<String, FuncEntry> {
        &self.symbol_table
    }

    /// Translate every function definition in the unit. Other external
    /// declarations carry no code.
    pub fn visit(&mut self, ast: &Node<FileAST>) -> Result<(), TranslateError> {
        for ext in &ast.node.ext {
            if let ExternalDeclaration::FuncDef(f) = &ext.node {
                self.visit_func_def(f)?;
            }
        }
        Ok(())
    }

    /// Compute the final stack layout: round each function's requirement up
    /// to 16 bytes, then walk the symbols in recorded order assigning
    /// offsets below the frame top, keeping every offset word-aligned.
    pub fn get_tables(&self) -> Tables {
        let mut symbol_table = IndexMap::new();
        for (func, entry) in &self.symbol_table {
            let aligned = (entry.stacksize + 15) / 16 * 16;
            let mut offset = aligned;
            let mut symbols = IndexMap::new();
            for (name, ty) in &entry.symbols {
                let width = type_width(ty).expect("only scalar types are recorded");
                offset -= width;
                offset = offset.div_euclid(WORD_SIZE) * WORD_SIZE;
                symbols.insert(name.clone(), offset);
            }
            symbol_table.insert(
                func.clone(),
                FuncLayout {
                    symbols,
                    stacksize: aligned,
                },
            );
        }
        Tables {
            constant_table: self.constant_table.clone(),
            symbol_table,
        }
    }

    // Emission helpers

    fn emit(&mut self, op: &str, arg1: Option<String>, arg2: Option<String>, result: Option<String>) {
        let quad = Quad::new(op, arg1, arg2, result);
        log::trace!("emit {}", quad);
        self.codes.push(quad);
    }

    fn emit_label(&mut self, label: &str) {
        self.emit("label", None, None, Some(label.to_string()));
    }

    fn emit_jump(&mut self, target: &str) {
        self.emit("j", None, None, Some(target.to_string()));
    }

    /// Conditional branch: fall to `ltrue` when `cond` holds, `lfalse`
    /// otherwise. Only relational comparisons have a jump form.
    fn emit_branch(
        &mut self,
        cond: &Node<Expr>,
        ltrue: &str,
        lfalse: &str,
    ) -> Result<(), TranslateError> {
        match &cond.node {
            Expr::BinaryOp(b) if matches!(b.op.as_str(), ">" | "<" | "==" | ">=" | "<=" | "!=") => {
                let left = self.visit_expr(&b.left)?;
                let right = self.visit_expr(&b.right)?;
                self.emit(
                    &format!("j{}", b.op),
                    Some(left),
                    Some(right),
                    Some(ltrue.to_string()),
                );
                self.emit_jump(lfalse);
                Ok(())
            }
            _ => Err(TranslateError::BadCondition {
                coord: cond.coord.clone(),
            }),
        }
    }

    fn newtemp(&mut self) -> String {
        self.temp_count += 1;
        let name = format!("T{}", self.temp_count);
        let entry = self.cur_entry();
        entry.symbols.insert(name.clone(), "int".to_string());
        entry.stacksize += 4;
        name
    }

    fn newlabel(&mut self) -> String {
        self.label_count += 1;
        format!("L{}", self.label_count)
    }

    fn cur_entry(&mut self) -> &mut FuncEntry {
        let func = self
            .cur_func
            .as_ref()
            .expect("statements are only visited inside a function");
        self.symbol_table
            .get_mut(func)
            .expect("an entry is created on function entry")
    }

    // Declarations

    fn visit_func_def(&mut self, f: &Node<FuncDef>) -> Result<(), TranslateError> {
        let name = match &f.node.decl.node.name {
            Some(name) => name.clone(),
            None => return Err(unsupported("unnamed function definition", &f.coord)),
        };
        log::debug!("translating function '{}'", name);
        self.emit("func", None, None, Some(name.clone()));
        self.cur_func = Some(name.clone());
        self.symbol_table.insert(name, FuncEntry::default());
        self.visit_decl(&f.node.decl)?;
        if f.node.param_decls.is_some() {
            return Err(unsupported("old-style parameter declarations", &f.coord));
        }
        self.visit_statement(&f.node.body)?;
        self.emit("endfunc", None, None, None);
        self.cur_func = None;
        Ok(())
    }

    fn visit_decl(&mut self, d: &Node<Decl>) -> Result<(), TranslateError> {
        match &d.node.ty.node {
            Type::TypeDecl(td) => {
                let ty_name = scalar_type_name(td, &d.coord)?;
                let width = type_width(&ty_name).ok_or_else(|| TranslateError::UnknownType {
                    name: ty_name.clone(),
                    coord: d.coord.clone(),
                })?;
                let name = match &d.node.name {
                    Some(name) => name.clone(),
                    None => return Err(unsupported("unnamed declaration", &d.coord)),
                };
                let entry = self.cur_entry();
                entry.symbols.insert(name.clone(), ty_name);
                entry.stacksize += width;
                if let Some(init) = &d.node.init {
                    let value = self.visit_expr(init)?;
                    self.emit("=", Some(value), None, Some(name));
                }
                Ok(())
            }
            Type::Func(_) => self.visit_func_decl(&d.node.ty),
            Type::Ptr(_) => Err(unsupported("pointer declaration", &d.coord)),
            Type::Array(_) => Err(unsupported("array declaration", &d.coord)),
        }
    }

    /// Record the parameters of the function being entered. Parameters join
    /// the symbol table but reserve no extra stack of their own.
    fn visit_func_decl(&mut self, ty: &Node<Type>) -> Result<(), TranslateError> {
        let func = match &ty.node {
            Type::Func(f) => f,
            _ => return Err(unsupported("declarator", &ty.coord)),
        };
        if let Some(args) = &func.args {
            for param in &args.node.params {
                match &param.node {
                    Param::Decl(d) => {
                        let td = match &d.node.ty.node {
                            Type::TypeDecl(td) => td,
                            _ => {
                                return Err(unsupported(
                                    "non-scalar parameter",
                                    &param.coord,
                                ))
                            }
                        };
                        let ty_name = scalar_type_name(td, &param.coord)?;
                        if type_width(&ty_name).is_none() {
                            return Err(TranslateError::UnknownType {
                                name: ty_name,
                                coord: param.coord.clone(),
                            });
                        }
                        let name = match &d.node.name {
                            Some(name) => name.clone(),
                            None => {
                                return Err(unsupported("unnamed parameter", &param.coord))
                            }
                        };
                        self.cur_entry().symbols.insert(name, ty_name);
                    }
                    Param::Id(_) => {
                        return Err(unsupported("old-style parameter list", &param.coord))
                    }
                }
            }
        }
        Ok(())
    }

    // Statements

    fn visit_statement(&mut self, s: &Node<Statement>) -> Result<(), TranslateError> {
        match &s.node {
            Statement::Compound(c) => {
                for item in &c.block_items {
                    match &item.node {
                        BlockItem::Decl(d) => self.visit_decl(d)?,
                        // A typedef introduces no code.
                        BlockItem::Typedef(_) => {}
                        BlockItem::Statement(s) => self.visit_statement(s)?,
                    }
                }
                Ok(())
            }
            Statement::If(i) => self.visit_if(i),
            Statement::While(w) => self.visit_while(w),
            Statement::DoWhile(d) => self.visit_do_while(d),
            Statement::For(f) => self.visit_for(f),
            Statement::Return(value) => {
                let result = match value {
                    Some(e) => Some(self.visit_expr(e)?),
                    None => None,
                };
                self.emit("return", None, None, result);
                Ok(())
            }
            Statement::Empty => Ok(()),
            Statement::Expr(e) => {
                self.visit_expr(e)?;
                Ok(())
            }
            Statement::Break => Err(unsupported("break statement", &s.coord)),
            Statement::Continue => Err(unsupported("continue statement", &s.coord)),
        }
    }

    fn visit_if(&mut self, i: &If) -> Result<(), TranslateError> {
        let truelabel = self.newlabel();
        let falselabel = if i.iffalse.is_some() {
            Some(self.newlabel())
        } else {
            None
        };
        let endlabel = self.newlabel();

        self.emit_branch(&i.cond, &truelabel, falselabel.as_deref().unwrap_or(&endlabel))?;
        self.emit_label(&truelabel);
        self.visit_statement(&i.iftrue)?;
        self.emit_jump(&endlabel);
        if let Some(iffalse) = &i.iffalse {
            let falselabel = falselabel.expect("allocated when an else branch exists");
            self.emit_label(&falselabel);
            self.visit_statement(iffalse)?;
        }
        self.emit_label(&endlabel);
        Ok(())
    }

    fn visit_while(&mut self, w: &While) -> Result<(), TranslateError> {
        let beginlabel = self.newlabel();
        let truelabel = self.newlabel();
        let falselabel = self.newlabel();

        self.emit_label(&beginlabel);
        self.emit_branch(&w.cond, &truelabel, &falselabel)?;
        self.emit_label(&truelabel);
        self.visit_statement(&w.stmt)?;
        self.emit_jump(&beginlabel);
        self.emit_label(&falselabel);
        Ok(())
    }

    /// The While template rotated to start at the body label: run the body,
    /// then branch back while the condition holds.
    fn visit_do_while(&mut self, d: &DoWhile) -> Result<(), TranslateError> {
        let beginlabel = self.newlabel();
        let endlabel = self.newlabel();

        self.emit_label(&beginlabel);
        self.visit_statement(&d.stmt)?;
        self.emit_branch(&d.cond, &beginlabel, &endlabel)?;
        self.emit_label(&endlabel);
        Ok(())
    }

    fn visit_for(&mut self, f: &For) -> Result<(), TranslateError> {
        let beginlabel = self.newlabel();
        let truelabel = self.newlabel();
        let falselabel = self.newlabel();

        match &f.init {
            Some(init) => match &init.node {
                ForInit::DeclList(dl) => {
                    for d in &dl.decls {
                        self.visit_decl(d)?;
                    }
                }
                ForInit::Expr(e) => {
                    self.visit_expr(e)?;
                }
            },
            None => {}
        }
        self.emit_label(&beginlabel);
        let cond = match &f.cond {
            Some(cond) => cond,
            None => {
                return Err(TranslateError::BadCondition {
                    coord: f.stmt.coord.clone(),
                })
            }
        };
        self.emit_branch(cond, &truelabel, &falselabel)?;
        self.emit_label(&truelabel);
        self.visit_statement(&f.stmt)?;
        if let Some(next) = &f.next {
            self.visit_expr(next)?;
        }
        self.emit_jump(&beginlabel);
        self.emit_label(&falselabel);
        Ok(())
    }

    // Expressions. Each visit returns the operand token naming the value: a
    // symbol, a literal, an `LC<n>` constant label, or a `_callee` marker
    // for a value still in the return register.

    fn visit_expr(&mut self, e: &Node<Expr>) -> Result<String, TranslateError> {
        match &e.node {
            Expr::Constant(c) => Ok(self.visit_constant(c)),
            Expr::Id(i) => Ok(i.name.clone()),
            Expr::BinaryOp(b) => {
                let temp = self.newtemp();
                let left = self.visit_expr(&b.left)?;
                let right = self.visit_expr(&b.right)?;
                self.emit(&b.op, Some(left), Some(right), Some(temp.clone()));
                Ok(temp)
            }
            Expr::UnaryOp(u) => self.visit_unary(u, &e.coord),
            Expr::Assignment(a) => self.visit_assignment(a, &e.coord),
            Expr::FuncCall(c) => self.visit_call(c, &e.coord),
            Expr::Ternary(_) => Err(unsupported("conditional expression", &e.coord)),
            Expr::ArrayRef(_) => Err(unsupported("array subscript", &e.coord)),
            Expr::StructRef(_) => Err(unsupported("member access", &e.coord)),
            Expr::ExprList(_) => Err(unsupported("comma expression", &e.coord)),
            Expr::InitList(_) => Err(unsupported("initializer list", &e.coord)),
        }
    }

    fn visit_constant(&mut self, c: &Constant) -> String {
        if c.ty == "string" {
            // Quotes are stripped; what remains is the interning key.
            let text = c.value[1..c.value.len() - 1].to_string();
            if !self.constant_table.contains_key(&text) {
                let func = self.cur_func.clone().unwrap_or_default();
                self.constant_table
                    .insert(text.clone(), (func, self.constant_count));
                self.constant_count += 1;
            }
            let ordinal = self.constant_table[&text].1;
            format!("LC{}", ordinal)
        } else {
            c.value.clone()
        }
    }

    fn visit_unary(&mut self, u: &UnaryOp, coord: &Coord) -> Result<String, TranslateError> {
        let operand = self.visit_expr(&u.expr)?;
        match u.op.as_str() {
            "+" => Ok(operand),
            "-" => {
                if !operand.is_empty() && operand.chars().all(|c| c.is_ascii_digit()) {
                    Ok(format!("-{}", operand))
                } else {
                    let temp = self.newtemp();
                    self.emit(
                        "-",
                        Some("0".to_string()),
                        Some(operand),
                        Some(temp.clone()),
                    );
                    Ok(temp)
                }
            }
            "++" | "--" | "p++" | "p--" => {
                let temp = self.newtemp();
                // The trailing character is the arithmetic to perform.
                let op = &u.op[u.op.len() - 1..];
                self.emit(
                    op,
                    Some(operand.clone()),
                    Some("1".to_string()),
                    Some(temp.clone()),
                );
                self.emit("=", Some(temp.clone()), None, Some(operand.clone()));
                if u.op.starts_with('p') {
                    Ok(operand)
                } else {
                    Ok(temp)
                }
            }
            op => Err(unsupported(&format!("unary operator '{}'", op), coord)),
        }
    }

    fn visit_assignment(&mut self, a: &Assignment, coord: &Coord) -> Result<String, TranslateError> {
        if a.op != "=" {
            return Err(unsupported(
                &format!("compound assignment '{}'", a.op),
                coord,
            ));
        }
        let lvalue = match &a.lvalue.node {
            Expr::Id(i) => i.name.clone(),
            _ => return Err(unsupported("assignment target", &a.lvalue.coord)),
        };
        let rvalue = self.visit_expr(&a.rvalue)?;
        self.emit("=", Some(rvalue), None, Some(lvalue.clone()));
        Ok(lvalue)
    }

    /// Arguments are pushed in reverse source order; each `param` quad
    /// carries the zero-based reverse index and the total argument count,
    /// from which the assembler computes the outgoing stack slot.
    fn visit_call(&mut self, c: &FuncCall, coord: &Coord) -> Result<String, TranslateError> {
        let callee = match &c.name.node {
            Expr::Id(i) => i.name.clone(),
            _ => return Err(unsupported("indirect call", coord)),
        };
        if let Some(args) = &c.args {
            let total = args.node.exprs.len();
            for (i, arg) in args.node.exprs.iter().rev().enumerate() {
                let value = self.visit_expr(arg)?;
                self.emit(
                    "param",
                    Some(i.to_string()),
                    Some(value),
                    Some(total.to_string()),
                );
                self.cur_entry().stacksize += WORD_SIZE;
            }
        }
        self.emit("call", None, None, Some(callee.clone()));
        Ok(format!("_{}", callee))
    }
}

impl Default for Translator {
    fn default() -> Translator {
        Translator::new()
    }
}

/// Innermost type name of a scalar declaration: the first word of the
/// terminal `IdentifierType`.
fn scalar_type_name(td: &TypeDecl, coord: &Coord) -> Result<String, TranslateError> {
    match &td.base {
        Some(base) => match &base.node {
            BaseType::Identifier(i) => match i.names.first() {
                Some(name) => Ok(name.clone()),
                None => Err(unsupported("empty type specifier", coord)),
            },
            BaseType::Struct(_) => Err(unsupported("struct-typed declaration", coord)),
            BaseType::Enum(_) => Err(unsupported("enum-typed declaration", coord)),
        },
        None => Err(unsupported("untyped declaration", coord)),
    }
}
