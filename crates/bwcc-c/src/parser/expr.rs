//! Expression grammar: assignment → conditional → binary → cast → unary →
//! postfix → primary, with the binary tier handled by precedence climbing
//! over the table in [`binary_level`].

use super::{expected, Parser};
use crate::ast::*;
use crate::error::ParseError;
use crate::span::Node;
use crate::token::{Punct, Token, TokenKind};

/// Binding strength of a binary operator, increasing. All levels are
/// left-associative.
fn binary_level(p: Punct) -> Option<u8> {
    use Punct::*;
    Some(match p {
        PipePipe => 1,
        AmpAmp => 2,
        Pipe => 3,
        Caret => 4,
        Amp => 5,
        EqEq | Ne => 6,
        Lt | Le | Gt | Ge => 7,
        Shl | Shr => 8,
        Plus | Minus => 9,
        Star | Slash | Percent => 10,
        _ => return None,
    })
}

/// The assignment operator demands a unary expression on its left; this is
/// the structural equivalent of that grammar restriction.
fn is_unary_expr(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Id(_)
            | Expr::Constant(_)
            | Expr::UnaryOp(_)
            | Expr::FuncCall(_)
            | Expr::ArrayRef(_)
            | Expr::StructRef(_)
    )
}

impl Parser {
    /// Full expression: one assignment expression, or several joined by the
    /// comma operator.
    pub(crate) fn expression(&mut self) -> Result<Node<Expr>, ParseError> {
        let first = self.assignment_expression()?;
        if !self.peek()?.is_punct(Punct::Comma) {
            return Ok(first);
        }
        let coord = first.coord.clone();
        let mut exprs = vec![first];
        while self.eat(Punct::Comma)? {
            exprs.push(self.assignment_expression()?);
        }
        Ok(Node::new(Expr::ExprList(ExprList { exprs }), coord))
    }

    pub(crate) fn assignment_expression(&mut self) -> Result<Node<Expr>, ParseError> {
        let left = self.conditional_expression()?;
        let tok = self.peek()?.clone();
        if let TokenKind::Punct(p) = tok.kind {
            if p.is_assignment_op() {
                if !is_unary_expr(&left.node) {
                    return Err(ParseError::new(
                        format!("syntax error before {}", tok),
                        tok.coord,
                    ));
                }
                self.bump()?;
                let rvalue = self.assignment_expression()?;
                let coord = left.coord.clone();
                return Ok(Node::new(
                    Expr::Assignment(Assignment {
                        op: tok.text,
                        lvalue: Box::new(left),
                        rvalue: Box::new(rvalue),
                    }),
                    coord,
                ));
            }
        }
        Ok(left)
    }

    pub(crate) fn conditional_expression(&mut self) -> Result<Node<Expr>, ParseError> {
        let cond = self.binary_expression(1)?;
        if !self.peek()?.is_punct(Punct::Question) {
            return Ok(cond);
        }
        self.bump()?;
        let iftrue = self.expression()?;
        self.expect(Punct::Colon)?;
        let iffalse = self.conditional_expression()?;
        let coord = cond.coord.clone();
        Ok(Node::new(
            Expr::Ternary(TernaryOp {
                cond: Box::new(cond),
                iftrue: Box::new(iftrue),
                iffalse: Box::new(iffalse),
            }),
            coord,
        ))
    }

    fn binary_expression(&mut self, min_level: u8) -> Result<Node<Expr>, ParseError> {
        let mut left = self.cast_expression()?;
        loop {
            let (level, op) = match self.peek()?.kind {
                TokenKind::Punct(p) => match binary_level(p) {
                    Some(level) if level >= min_level => (level, p.as_str()),
                    _ => break,
                },
                _ => break,
            };
            self.bump()?;
            let right = self.binary_expression(level + 1)?;
            let coord = left.coord.clone();
            left = Node::new(
                Expr::BinaryOp(BinaryOp {
                    op: op.to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                }),
                coord,
            );
        }
        Ok(left)
    }

    /// Casts are not part of the subset; the tier exists so prefix `++`
    /// keeps the standard's operand distinction.
    fn cast_expression(&mut self) -> Result<Node<Expr>, ParseError> {
        self.unary_expression()
    }

    fn unary_expression(&mut self) -> Result<Node<Expr>, ParseError> {
        let tok = self.peek()?.clone();
        match tok.kind {
            TokenKind::Punct(Punct::PlusPlus) | TokenKind::Punct(Punct::MinusMinus) => {
                self.bump()?;
                let operand = self.unary_expression()?;
                let coord = operand.coord.clone();
                Ok(Node::new(
                    Expr::UnaryOp(UnaryOp {
                        op: tok.text,
                        expr: Box::new(operand),
                    }),
                    coord,
                ))
            }
            TokenKind::Punct(p)
                if matches!(
                    p,
                    Punct::Amp | Punct::Star | Punct::Plus | Punct::Minus | Punct::Tilde
                        | Punct::Bang
                ) =>
            {
                self.bump()?;
                let operand = self.cast_expression()?;
                let coord = operand.coord.clone();
                Ok(Node::new(
                    Expr::UnaryOp(UnaryOp {
                        op: tok.text,
                        expr: Box::new(operand),
                    }),
                    coord,
                ))
            }
            _ => self.postfix_expression(),
        }
    }

    fn postfix_expression(&mut self) -> Result<Node<Expr>, ParseError> {
        let mut expr = self.primary_expression()?;
        loop {
            let tok = self.peek()?.clone();
            match tok.kind {
                TokenKind::Punct(Punct::LBracket) => {
                    self.bump()?;
                    let subscript = self.expression()?;
                    self.expect(Punct::RBracket)?;
                    let coord = expr.coord.clone();
                    expr = Node::new(
                        Expr::ArrayRef(ArrayRef {
                            name: Box::new(expr),
                            subscript: Box::new(subscript),
                        }),
                        coord,
                    );
                }
                TokenKind::Punct(Punct::LParen) => {
                    self.bump()?;
                    let args = if self.peek()?.is_punct(Punct::RParen) {
                        None
                    } else {
                        Some(self.argument_expression_list()?)
                    };
                    self.expect(Punct::RParen)?;
                    let coord = expr.coord.clone();
                    expr = Node::new(
                        Expr::FuncCall(FuncCall {
                            name: Box::new(expr),
                            args,
                        }),
                        coord,
                    );
                }
                TokenKind::Punct(Punct::Dot) | TokenKind::Punct(Punct::Arrow) => {
                    self.bump()?;
                    let field = self.identifier()?;
                    let coord = expr.coord.clone();
                    expr = Node::new(
                        Expr::StructRef(StructRef {
                            name: Box::new(expr),
                            kind: tok.text,
                            field,
                        }),
                        coord,
                    );
                }
                TokenKind::Punct(Punct::PlusPlus) | TokenKind::Punct(Punct::MinusMinus) => {
                    self.bump()?;
                    let coord = expr.coord.clone();
                    // The p prefix marks the postfix forms apart from the
                    // prefix ones.
                    expr = Node::new(
                        Expr::UnaryOp(UnaryOp {
                            op: format!("p{}", tok.text),
                            expr: Box::new(expr),
                        }),
                        coord,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn argument_expression_list(&mut self) -> Result<Node<ExprList>, ParseError> {
        let first = self.assignment_expression()?;
        let coord = first.coord.clone();
        let mut exprs = vec![first];
        while self.eat(Punct::Comma)? {
            exprs.push(self.assignment_expression()?);
        }
        Ok(Node::new(ExprList { exprs }, coord))
    }

    fn primary_expression(&mut self) -> Result<Node<Expr>, ParseError> {
        let tok = self.peek()?.clone();
        match tok.kind {
            TokenKind::Id => {
                self.bump()?;
                Ok(Node::new(
                    Expr::Id(Identifier { name: tok.text }),
                    tok.coord,
                ))
            }
            TokenKind::IntConst => {
                self.bump()?;
                int_constant(tok)
            }
            TokenKind::FloatConst => {
                self.bump()?;
                Ok(float_constant(tok))
            }
            TokenKind::CharConst => {
                self.bump()?;
                Ok(Node::new(
                    Expr::Constant(Constant {
                        ty: "char".to_string(),
                        value: tok.text,
                    }),
                    tok.coord,
                ))
            }
            TokenKind::StringLiteral => {
                self.bump()?;
                Ok(string_constant(tok))
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump()?;
                let e = self.expression()?;
                self.expect(Punct::RParen)?;
                Ok(e)
            }
            _ => Err(expected(&tok, "an expression")),
        }
    }

    pub(crate) fn identifier(&mut self) -> Result<Node<Identifier>, ParseError> {
        let tok = self.bump()?;
        if tok.kind != TokenKind::Id {
            return Err(expected(&tok, "an identifier"));
        }
        Ok(Node::new(Identifier { name: tok.text }, tok.coord))
    }
}

/// Classify an integer literal from its suffix. At most one `u` and two
/// same-case `l` are accepted; the type collects the matching words.
fn int_constant(tok: Token) -> Result<Node<Expr>, ParseError> {
    let suffix: &str = tok.text.trim_start_matches(|c: char| c.is_ascii_digit());
    let u_count = suffix.chars().filter(|c| c.eq_ignore_ascii_case(&'u')).count();
    let l_count = suffix.chars().filter(|c| c.eq_ignore_ascii_case(&'l')).count();
    if u_count > 1 {
        return Err(ParseError::new(
            "integer constant has more than one 'u' suffix",
            tok.coord,
        ));
    }
    if l_count > 2 {
        return Err(ParseError::new(
            "integer constant has more than two 'l' suffixes",
            tok.coord,
        ));
    }
    if l_count == 2 && suffix.contains('l') && suffix.contains('L') {
        return Err(ParseError::new(
            "integer constant mixes 'l' and 'L' in its suffix",
            tok.coord,
        ));
    }
    let mut ty = String::new();
    for _ in 0..u_count {
        ty.push_str("unsigned ");
    }
    for _ in 0..l_count {
        ty.push_str("long ");
    }
    ty.push_str("int");
    Ok(Node::new(
        Expr::Constant(Constant {
            ty,
            value: tok.text,
        }),
        tok.coord,
    ))
}

fn float_constant(tok: Token) -> Node<Expr> {
    let ty = match tok.text.chars().last() {
        Some('f') | Some('F') => "float",
        Some('l') | Some('L') => "long double",
        _ => "double",
    };
    Node::new(
        Expr::Constant(Constant {
            ty: ty.to_string(),
            value: tok.text,
        }),
        tok.coord,
    )
}

/// String constants keep their quotes; embedded newlines become the two
/// characters `\n` so the text can be re-emitted on one line.
fn string_constant(tok: Token) -> Node<Expr> {
    Node::new(
        Expr::Constant(Constant {
            ty: "string".to_string(),
            value: tok.text.replace('\n', "\\n"),
        }),
        tok.coord,
    )
}
