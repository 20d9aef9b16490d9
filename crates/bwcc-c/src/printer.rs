//! Render a parsed AST back to C source text.
//!
//! The output is meant to reparse to a structurally equal tree, so operator
//! expressions are parenthesized conservatively (parentheses leave no trace
//! in the AST) and sub-statements are never wrapped in braces the source
//! did not have.

use crate::ast::*;
use crate::span::Node;

/// Pretty-print a whole translation unit.
pub fn print(ast: &Node<FileAST>) -> String {
    let mut p = Printer::default();
    for ext in &ast.node.ext {
        match &ext.node {
            ExternalDeclaration::Decl(d) => {
                let s = decl_string(&d.node);
                p.line(&format!("{};", s));
            }
            ExternalDeclaration::Typedef(t) => p.line(&format!("{};", typedef_string(&t.node))),
            ExternalDeclaration::FuncDef(f) => p.func_def(&f.node),
        }
    }
    p.out
}

#[derive(Default)]
struct Printer {
    out: String,
    indent: usize,
}

impl Printer {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn func_def(&mut self, f: &FuncDef) {
        self.line(&decl_string(&f.decl.node));
        if let Some(param_decls) = &f.param_decls {
            for d in param_decls {
                self.line(&format!("{};", decl_string(&d.node)));
            }
        }
        self.statement(&f.body.node);
    }

    fn statement(&mut self, s: &Statement) {
        match s {
            Statement::Compound(c) => {
                self.line("{");
                self.indent += 1;
                for item in &c.block_items {
                    match &item.node {
                        BlockItem::Decl(d) => self.line(&format!("{};", decl_string(&d.node))),
                        BlockItem::Typedef(t) => {
                            self.line(&format!("{};", typedef_string(&t.node)))
                        }
                        BlockItem::Statement(s) => self.statement(&s.node),
                    }
                }
                self.indent -= 1;
                self.line("}");
            }
            Statement::If(i) => {
                self.line(&format!("if ({})", expr_string(&i.cond.node)));
                self.substatement(&i.iftrue.node);
                if let Some(e) = &i.iffalse {
                    self.line("else");
                    self.substatement(&e.node);
                }
            }
            Statement::While(w) => {
                self.line(&format!("while ({})", expr_string(&w.cond.node)));
                self.substatement(&w.stmt.node);
            }
            Statement::DoWhile(d) => {
                self.line("do");
                self.substatement(&d.stmt.node);
                self.line(&format!("while ({});", expr_string(&d.cond.node)));
            }
            Statement::For(f) => {
                let init = match &f.init {
                    None => String::new(),
                    Some(i) => match &i.node {
                        ForInit::Expr(e) => expr_string(&e.node),
                        ForInit::DeclList(dl) => decl_list_string(dl),
                    },
                };
                let cond = f
                    .cond
                    .as_ref()
                    .map(|e| expr_string(&e.node))
                    .unwrap_or_default();
                let next = f
                    .next
                    .as_ref()
                    .map(|e| expr_string(&e.node))
                    .unwrap_or_default();
                self.line(&format!("for ({}; {}; {})", init, cond, next));
                self.substatement(&f.stmt.node);
            }
            Statement::Break => self.line("break;"),
            Statement::Continue => self.line("continue;"),
            Statement::Return(None) => self.line("return;"),
            Statement::Return(Some(e)) => self.line(&format!("return {};", expr_string(&e.node))),
            Statement::Empty => self.line(";"),
            Statement::Expr(e) => self.line(&format!("{};", expr_string(&e.node))),
        }
    }

    /// Body of a control statement: compound statements print their own
    /// braces, anything else is just indented.
    fn substatement(&mut self, s: &Statement) {
        if matches!(s, Statement::Compound(_)) {
            self.statement(s);
        } else {
            self.indent += 1;
            self.statement(s);
            self.indent -= 1;
        }
    }
}

fn decl_string(d: &Decl) -> String {
    let mut parts: Vec<String> = Vec::new();
    parts.extend(d.storage.iter().cloned());
    parts.extend(d.funcspec.iter().cloned());
    parts.push(type_string(&d.ty.node));
    let mut s = parts.join(" ");
    if let Some(init) = &d.init {
        s = format!("{} = {}", s, expr_string(&init.node));
    }
    s
}

fn typedef_string(t: &Typedef) -> String {
    let mut parts: Vec<String> = t.storage.clone();
    parts.push(type_string(&t.ty.node));
    parts.join(" ")
}

/// A `for` initializer's declarations: the first in full, the rest by name.
fn decl_list_string(dl: &DeclList) -> String {
    let mut s = String::new();
    for (i, d) in dl.decls.iter().enumerate() {
        if i == 0 {
            s.push_str(&decl_string(&d.node));
        } else {
            s.push_str(", ");
            s.push_str(d.node.name.as_deref().unwrap_or(""));
            if let Some(init) = &d.node.init {
                s.push_str(&format!(" = {}", expr_string(&init.node)));
            }
        }
    }
    s
}

/// Re-render a declarator chain. Modifiers apply to the name from the
/// outermost chain node inward, mirroring how the chain was built; a
/// pointer applied before an array or function suffix needs parentheses.
fn type_string(ty: &Type) -> String {
    let mut modifiers: Vec<&Type> = Vec::new();
    let mut cur = ty;
    let td = loop {
        match cur {
            Type::TypeDecl(td) => break td,
            other => {
                modifiers.push(other);
                match other.modifier_inner().and_then(|i| i.as_deref()) {
                    Some(inner) => cur = &inner.node,
                    None => return String::new(),
                }
            }
        }
    };

    let mut s = String::new();
    if !td.quals.is_empty() {
        s.push_str(&td.quals.join(" "));
        s.push(' ');
    }
    s.push_str(&base_type_string(&td.base));

    let mut nstr = td.declname.clone().unwrap_or_default();
    let mut prev_ptr = false;
    for m in &modifiers {
        match m {
            Type::Ptr(p) => {
                let quals = if p.quals.is_empty() {
                    String::new()
                } else {
                    format!("{} ", p.quals.join(" "))
                };
                nstr = format!("*{}{}", quals, nstr);
                prev_ptr = true;
            }
            Type::Array(a) => {
                if prev_ptr {
                    nstr = format!("({})", nstr);
                }
                let quals = if a.dim_quals.is_empty() {
                    String::new()
                } else {
                    format!("{} ", a.dim_quals.join(" "))
                };
                let dim = a
                    .dim
                    .as_ref()
                    .map(|d| expr_string(&d.node))
                    .unwrap_or_default();
                nstr = format!("{}[{}{}]", nstr, quals, dim);
                prev_ptr = false;
            }
            Type::Func(f) => {
                if prev_ptr {
                    nstr = format!("({})", nstr);
                }
                nstr = format!("{}({})", nstr, params_string(&f.args));
                prev_ptr = false;
            }
            Type::TypeDecl(_) => unreachable!("the walk above stops at the TypeDecl"),
        }
    }
    if !nstr.is_empty() {
        s.push(' ');
        s.push_str(&nstr);
    }
    s
}

fn base_type_string(base: &Option<Node<BaseType>>) -> String {
    match base {
        None => String::new(),
        Some(b) => match &b.node {
            BaseType::Identifier(i) => i.names.join(" "),
            BaseType::Struct(s) => struct_string(s),
            BaseType::Enum(e) => enum_string(e),
        },
    }
}

fn struct_string(s: &StructType) -> String {
    let mut out = String::from("struct");
    if let Some(name) = &s.name {
        out.push(' ');
        out.push_str(name);
    }
    if let Some(decls) = &s.decls {
        out.push_str(" { ");
        for d in decls {
            out.push_str(&decl_string(&d.node));
            out.push_str("; ");
        }
        out.push('}');
    }
    out
}

fn enum_string(e: &EnumType) -> String {
    let mut out = String::from("enum");
    if let Some(name) = &e.name {
        out.push(' ');
        out.push_str(name);
    }
    if let Some(values) = &e.values {
        out.push_str(" { ");
        let items: Vec<String> = values
            .node
            .enumerators
            .iter()
            .map(|en| match &en.node.value {
                Some(v) => format!("{} = {}", en.node.name, expr_string(&v.node)),
                None => en.node.name.clone(),
            })
            .collect();
        out.push_str(&items.join(", "));
        out.push_str(" }");
    }
    out
}

fn params_string(args: &Option<Node<ParamList>>) -> String {
    match args {
        None => String::new(),
        Some(list) => {
            let items: Vec<String> = list
                .node
                .params
                .iter()
                .map(|p| match &p.node {
                    Param::Decl(d) => decl_string(&d.node),
                    Param::Id(i) => i.node.name.clone(),
                })
                .collect();
            items.join(", ")
        }
    }
}

fn expr_string(e: &Expr) -> String {
    match e {
        Expr::Constant(c) => c.value.clone(),
        Expr::Id(i) => i.name.clone(),
        Expr::BinaryOp(b) => format!(
            "({} {} {})",
            expr_string(&b.left.node),
            b.op,
            expr_string(&b.right.node)
        ),
        Expr::UnaryOp(u) => {
            let operand = expr_string(&u.expr.node);
            if let Some(op) = u.op.strip_prefix('p') {
                format!("{}{}", operand, op)
            } else if matches!(u.expr.node, Expr::UnaryOp(_)) {
                // `+ +a` must not fuse into `++a`.
                format!("{}({})", u.op, operand)
            } else {
                format!("{}{}", u.op, operand)
            }
        }
        Expr::Ternary(t) => format!(
            "({} ? {} : {})",
            expr_string(&t.cond.node),
            expr_string(&t.iftrue.node),
            expr_string(&t.iffalse.node)
        ),
        Expr::Assignment(a) => format!(
            "({} {} {})",
            expr_string(&a.lvalue.node),
            a.op,
            expr_string(&a.rvalue.node)
        ),
        Expr::FuncCall(c) => {
            let args = match &c.args {
                None => String::new(),
                Some(list) => {
                    let items: Vec<String> =
                        list.node.exprs.iter().map(|e| expr_string(&e.node)).collect();
                    items.join(", ")
                }
            };
            format!("{}({})", expr_string(&c.name.node), args)
        }
        Expr::ArrayRef(a) => format!(
            "{}[{}]",
            expr_string(&a.name.node),
            expr_string(&a.subscript.node)
        ),
        Expr::StructRef(s) => format!(
            "{}{}{}",
            expr_string(&s.name.node),
            s.kind,
            s.field.node.name
        ),
        Expr::ExprList(l) => {
            let items: Vec<String> = l.exprs.iter().map(|e| expr_string(&e.node)).collect();
            format!("({})", items.join(", "))
        }
        Expr::InitList(l) => {
            let items: Vec<String> = l.exprs.iter().map(|e| expr_string(&e.node)).collect();
            format!("{{{}}}", items.join(", "))
        }
    }
}
