//! Recursive-descent parser for the C subset.
//!
//! Tokens are pulled from the lexer one at a time with a single token of
//! lookahead, so the scope events the lexer fires on `{` and `}` stay in
//! step with declaration processing. Names are registered in the scope
//! environment as soon as a declaration's `;` is consumed and before the
//! next token is fetched; that ordering is what lets a typedef name affect
//! the classification of the very next identifier.

mod expr;

use std::rc::Rc;

use crate::ast::*;
use crate::env::{Env, NameKind, ScopeHooks};
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::span::{Coord, Node};
use crate::token::{Keyword, Punct, Token, TokenKind};

pub struct Parser {
    lexer: Lexer,
    env: Rc<Env>,
    lookahead: Option<Token>,
    file: Rc<str>,
}

/// Specifier bundle shared by every declarator of one declaration.
#[derive(Debug, Default)]
struct DeclSpecs {
    quals: Vec<String>,
    storage: Vec<String>,
    types: Vec<Node<BaseType>>,
    funcspec: Vec<String>,
}

/// Declarator plus optional initializer, before fixup.
struct InitDeclarator {
    decl: Node<Type>,
    init: Option<Node<Expr>>,
}

/// Result of building one declarator: plain declaration or typedef.
enum Declaration {
    Decl(Node<Decl>),
    Typedef(Node<Typedef>),
}

impl Parser {
    pub fn new(source: &str, filename: &str) -> Parser {
        let env = Rc::new(Env::new());
        let hooks: Rc<dyn ScopeHooks> = Rc::clone(&env) as Rc<dyn ScopeHooks>;
        let file: Rc<str> = Rc::from(filename);
        Parser {
            lexer: Lexer::new(source, Rc::clone(&file), hooks),
            env,
            lookahead: None,
            file,
        }
    }

    pub fn parse(mut self) -> Result<Node<FileAST>, ParseError> {
        self.translation_unit()
    }

    // Token plumbing

    fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token()?);
        }
        Ok(self.lookahead.as_ref().unwrap())
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        match self.lookahead.take() {
            Some(tok) => Ok(tok),
            None => self.lexer.next_token(),
        }
    }

    fn eat(&mut self, p: Punct) -> Result<bool, ParseError> {
        if self.peek()?.is_punct(p) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, p: Punct) -> Result<Token, ParseError> {
        let tok = self.bump()?;
        if tok.is_punct(p) {
            Ok(tok)
        } else {
            Err(expected(&tok, &format!("'{}'", p.as_str())))
        }
    }

    fn expect_keyword(&mut self, k: Keyword) -> Result<Token, ParseError> {
        let tok = self.bump()?;
        if tok.is_keyword(k) {
            Ok(tok)
        } else {
            Err(expected(&tok, &format!("'{}'", k.as_str())))
        }
    }

    // Scope registration

    fn declare(&self, name: &str, kind: NameKind, coord: &Coord) -> Result<(), ParseError> {
        self.env.declare(name, kind).map_err(|_| {
            let (old, new) = match kind {
                NameKind::Typedef => ("an identifier", "a type"),
                NameKind::Identifier => ("a type", "an identifier"),
            };
            ParseError::new(
                format!(
                    "'{}' was declared as {} in this scope and cannot be redeclared as {}",
                    name, old, new
                ),
                coord.clone(),
            )
        })
    }

    // Translation unit

    fn translation_unit(&mut self) -> Result<Node<FileAST>, ParseError> {
        let mut ext = Vec::new();
        while self.peek()?.kind != TokenKind::Eof {
            ext.extend(self.external_declaration()?);
        }
        let coord = Coord::new(Rc::clone(&self.file), 1, 1);
        Ok(Node::new(FileAST { ext }, coord))
    }

    /// Either a function definition or a declaration; both start with
    /// declaration specifiers and a declarator, so the decision is made on
    /// the token that follows the declarator.
    fn external_declaration(&mut self) -> Result<Vec<Node<ExternalDeclaration>>, ParseError> {
        let specs = self.declaration_specifiers()?;
        let declarator = self.declarator()?;

        let tok = self.peek()?;
        if tok.is_punct(Punct::Eq) || tok.is_punct(Punct::Comma) || tok.is_punct(Punct::Semi) {
            let decls = self.finish_declaration(specs, declarator)?;
            return Ok(decls
                .into_iter()
                .map(|d| match d {
                    Declaration::Decl(d) => {
                        let coord = d.coord.clone();
                        Node::new(ExternalDeclaration::Decl(d), coord)
                    }
                    Declaration::Typedef(t) => {
                        let coord = t.coord.clone();
                        Node::new(ExternalDeclaration::Typedef(t), coord)
                    }
                })
                .collect());
        }

        // Function definition, possibly preceded by old-style parameter
        // declarations.
        let mut param_decls = Vec::new();
        while self.is_declaration_start()? {
            for d in self.declaration()? {
                match d {
                    Declaration::Decl(d) => param_decls.push(d),
                    Declaration::Typedef(t) => {
                        return Err(ParseError::new(
                            "typedef is not allowed in a parameter declaration list",
                            t.coord,
                        ))
                    }
                }
            }
        }
        if !self.peek()?.is_punct(Punct::LBrace) {
            let tok = self.bump()?;
            return Err(expected(&tok, "'{'"));
        }
        let body = self.compound_statement()?;
        let fdef = self.build_function_definition(specs, declarator, param_decls, body)?;
        Ok(vec![fdef])
    }

    fn build_function_definition(
        &mut self,
        specs: DeclSpecs,
        declarator: Node<Type>,
        param_decls: Vec<Node<Decl>>,
        body: Node<Statement>,
    ) -> Result<Node<ExternalDeclaration>, ParseError> {
        if specs.storage.iter().any(|s| s == "typedef") {
            return Err(ParseError::new(
                "function definition declared 'typedef'",
                declarator.coord.clone(),
            ));
        }
        let built = self.build_declarations(
            specs,
            vec![InitDeclarator {
                decl: declarator,
                init: None,
            }],
            true,
        )?;
        let decl = match built.into_iter().next() {
            Some(Declaration::Decl(d)) => d,
            _ => unreachable!("typedef storage was rejected above"),
        };
        log::debug!(
            "parsed function definition '{}'",
            decl.node.name.as_deref().unwrap_or("?")
        );
        let coord = decl.coord.clone();
        let param_decls = if param_decls.is_empty() {
            None
        } else {
            Some(param_decls)
        };
        Ok(Node::new(
            ExternalDeclaration::FuncDef(Node::new(
                FuncDef {
                    decl,
                    param_decls,
                    body,
                },
                coord.clone(),
            )),
            coord,
        ))
    }

    // Declarations

    fn is_declaration_start(&mut self) -> Result<bool, ParseError> {
        use Keyword::*;
        Ok(match self.peek()?.kind {
            TokenKind::Keyword(k) => matches!(
                k,
                Auto | Register
                    | Static
                    | Extern
                    | Typedef
                    | Const
                    | Volatile
                    | Void
                    | Char
                    | Short
                    | Int
                    | Long
                    | Float
                    | Double
                    | Signed
                    | Unsigned
                    | Struct
                    | Enum
            ),
            TokenKind::TypeId => true,
            _ => false,
        })
    }

    fn declaration(&mut self) -> Result<Vec<Declaration>, ParseError> {
        let specs = self.declaration_specifiers()?;
        let first = self.declarator()?;
        self.finish_declaration(specs, first)
    }

    /// Remaining init declarators, the terminating `;`, then fixup and scope
    /// registration. Nothing is read past the semicolon here: the names must
    /// be bound before the next token is classified.
    fn finish_declaration(
        &mut self,
        specs: DeclSpecs,
        first: Node<Type>,
    ) -> Result<Vec<Declaration>, ParseError> {
        let mut decls = Vec::new();
        let init = if self.eat(Punct::Eq)? {
            Some(self.initializer()?)
        } else {
            None
        };
        decls.push(InitDeclarator { decl: first, init });
        while self.eat(Punct::Comma)? {
            let declarator = self.declarator()?;
            let init = if self.eat(Punct::Eq)? {
                Some(self.initializer()?)
            } else {
                None
            };
            decls.push(InitDeclarator {
                decl: declarator,
                init,
            });
        }
        self.expect(Punct::Semi)?;
        self.build_declarations(specs, decls, true)
    }

    /// At least one storage class, qualifier or type specifier. A typedef
    /// name acts as a type specifier only while no other type specifier has
    /// been seen, so `int T;` can reuse the name `T`.
    fn declaration_specifiers(&mut self) -> Result<DeclSpecs, ParseError> {
        use Keyword::*;
        let mut specs = DeclSpecs::default();
        let mut any = false;
        loop {
            let tok = self.peek()?.clone();
            match tok.kind {
                TokenKind::Keyword(k) => match k {
                    Auto | Register | Static | Extern | Typedef => {
                        self.bump()?;
                        specs.storage.push(tok.text);
                    }
                    Const | Volatile => {
                        self.bump()?;
                        specs.quals.push(tok.text);
                    }
                    Void | Char | Short | Int | Long | Float | Double | Signed | Unsigned => {
                        self.bump()?;
                        specs.types.push(Node::new(
                            BaseType::Identifier(IdentifierType {
                                names: vec![tok.text],
                            }),
                            tok.coord,
                        ));
                    }
                    Struct => specs.types.push(self.struct_specifier()?),
                    Enum => specs.types.push(self.enum_specifier()?),
                    _ => break,
                },
                TokenKind::TypeId if specs.types.is_empty() => {
                    self.bump()?;
                    specs.types.push(Node::new(
                        BaseType::Identifier(IdentifierType {
                            names: vec![tok.text],
                        }),
                        tok.coord,
                    ));
                }
                _ => break,
            }
            any = true;
        }
        if !any {
            let tok = self.peek()?.clone();
            return Err(expected(&tok, "declaration specifiers"));
        }
        Ok(specs)
    }

    fn type_qualifier_list_opt(&mut self) -> Result<Vec<String>, ParseError> {
        let mut quals = Vec::new();
        loop {
            let tok = self.peek()?;
            if tok.is_keyword(Keyword::Const) || tok.is_keyword(Keyword::Volatile) {
                quals.push(self.bump()?.text);
            } else {
                return Ok(quals);
            }
        }
    }

    fn type_qualifier_list(&mut self) -> Result<Vec<String>, ParseError> {
        let quals = self.type_qualifier_list_opt()?;
        if quals.is_empty() {
            let tok = self.peek()?.clone();
            return Err(expected(&tok, "type qualifiers"));
        }
        Ok(quals)
    }

    /// Run fixup over each declarator and wrap the results, registering the
    /// declared names when `register` is set.
    fn build_declarations(
        &mut self,
        specs: DeclSpecs,
        decls: Vec<InitDeclarator>,
        register: bool,
    ) -> Result<Vec<Declaration>, ParseError> {
        let is_typedef = specs.storage.iter().any(|s| s == "typedef");
        let mut out = Vec::new();
        for d in decls {
            let coord = d.decl.coord.clone();
            let mut ty = d.decl;
            let name = self.fix_decl_name_type(&mut ty, &specs.quals, specs.types.clone(), &coord)?;
            if register {
                if let Some(name) = &name {
                    let kind = if is_typedef {
                        NameKind::Typedef
                    } else {
                        NameKind::Identifier
                    };
                    self.declare(name, kind, &coord)?;
                }
            }
            if is_typedef {
                out.push(Declaration::Typedef(Node::new(
                    Typedef {
                        name,
                        quals: specs.quals.clone(),
                        storage: specs.storage.clone(),
                        ty,
                    },
                    coord,
                )));
            } else {
                out.push(Declaration::Decl(Node::new(
                    Decl {
                        name,
                        quals: specs.quals.clone(),
                        storage: specs.storage.clone(),
                        funcspec: specs.funcspec.clone(),
                        ty,
                        init: d.init.map(Box::new),
                    },
                    coord,
                )));
            }
        }
        Ok(out)
    }

    /// The base type is recognized at the outermost level of a declaration
    /// while the declared name sits in the innermost `TypeDecl`; this pulls
    /// the name out and pushes the type in.
    fn fix_decl_name_type(
        &mut self,
        ty: &mut Node<Type>,
        quals: &[String],
        types: Vec<Node<BaseType>>,
        decl_coord: &Coord,
    ) -> Result<Option<String>, ParseError> {
        let head_is_func = matches!(ty.node, Type::Func(_));
        let td = terminal_type_decl_mut(ty);
        td.quals = quals.to_vec();
        let name = td.declname.clone();

        if let Some(pos) = types
            .iter()
            .position(|t| !matches!(t.node, BaseType::Identifier(_)))
        {
            if types.len() > 1 {
                return Err(ParseError::new(
                    "invalid combination of type specifiers",
                    types[pos].coord.clone(),
                ));
            }
            td.base = types.into_iter().next();
            return Ok(name);
        }

        if types.is_empty() {
            if head_is_func {
                // A function declared with no type specifier returns int.
                td.base = Some(Node::new(
                    BaseType::Identifier(IdentifierType {
                        names: vec!["int".to_string()],
                    }),
                    decl_coord.clone(),
                ));
            } else {
                return Err(ParseError::new(
                    "declaration is missing a type specifier",
                    decl_coord.clone(),
                ));
            }
        } else {
            let coord = types[0].coord.clone();
            let names = types
                .into_iter()
                .flat_map(|t| match t.node {
                    BaseType::Identifier(id) => id.names,
                    _ => unreachable!("non-identifier specifiers were handled above"),
                })
                .collect();
            td.base = Some(Node::new(
                BaseType::Identifier(IdentifierType { names }),
                coord,
            ));
        }
        Ok(name)
    }

    // Declarators

    fn declarator(&mut self) -> Result<Node<Type>, ParseError> {
        if self.peek()?.is_punct(Punct::Star) {
            let ptr = self.pointer()?;
            let direct = self.direct_declarator()?;
            Ok(type_modify(direct, ptr))
        } else {
            self.direct_declarator()
        }
    }

    /// One or more `*`, each with optional qualifiers. The first `*` binds
    /// innermost: `char * const * p` is a pointer to a const pointer.
    fn pointer(&mut self) -> Result<Node<Type>, ParseError> {
        let mut head: Option<Node<Type>> = None;
        while self.peek()?.is_punct(Punct::Star) {
            let star = self.bump()?;
            let quals = self.type_qualifier_list_opt()?;
            let mut nested = Node::new(Type::Ptr(PtrDecl { quals, inner: None }), star.coord);
            if let Some(prev) = head.take() {
                match &mut nested.node {
                    Type::Ptr(p) => p.inner = Some(Box::new(prev)),
                    _ => unreachable!(),
                }
            }
            head = Some(nested);
        }
        Ok(head.expect("pointer() is only called at a '*'"))
    }

    fn direct_declarator(&mut self) -> Result<Node<Type>, ParseError> {
        let tok = self.peek()?.clone();
        let mut decl = match tok.kind {
            // TYPEID is accepted here too: an inner `int T;` rebinds a name
            // that an outer scope made a typedef.
            TokenKind::Id | TokenKind::TypeId => {
                self.bump()?;
                Node::new(
                    Type::TypeDecl(TypeDecl {
                        declname: Some(tok.text),
                        quals: Vec::new(),
                        base: None,
                    }),
                    tok.coord,
                )
            }
            TokenKind::Punct(Punct::LParen) => {
                self.bump()?;
                let inner = self.declarator()?;
                self.expect(Punct::RParen)?;
                inner
            }
            _ => return Err(expected(&tok, "a declarator")),
        };

        loop {
            if self.peek()?.is_punct(Punct::LBracket) {
                self.bump()?;
                let arr = self.array_suffix(decl.coord.clone())?;
                decl = type_modify(decl, arr);
            } else if self.peek()?.is_punct(Punct::LParen) {
                self.bump()?;
                let args = self.function_params()?;
                self.expect(Punct::RParen)?;
                let func = Node::new(Type::Func(FuncDecl { args, inner: None }), decl.coord.clone());
                // When the body of a definition follows, the `{` has already
                // been lexed by this peek and its scope opened; parameter
                // names land in that scope and shadow outer typedefs.
                if self.peek()?.is_punct(Punct::LBrace) {
                    if let Type::Func(f) = &func.node {
                        if let Some(args) = &f.args {
                            for param in &args.node.params {
                                if let Some(name) = param.node.name() {
                                    self.declare(name, NameKind::Identifier, &param.coord)?;
                                }
                            }
                        }
                    }
                }
                decl = type_modify(decl, func);
            } else {
                break;
            }
        }
        Ok(decl)
    }

    /// Array declarator suffix; the opening `[` is already consumed.
    fn array_suffix(&mut self, coord: Coord) -> Result<Node<Type>, ParseError> {
        let make = |dim: Option<Node<Expr>>, dim_quals: Vec<String>, coord: Coord| {
            Node::new(
                Type::Array(ArrayDecl {
                    inner: None,
                    dim: dim.map(Box::new),
                    dim_quals,
                }),
                coord,
            )
        };

        if self.peek()?.is_keyword(Keyword::Static) {
            self.bump()?;
            let mut quals = self.type_qualifier_list()?;
            let dim = self.assignment_expression()?;
            quals.push("static".to_string());
            self.expect(Punct::RBracket)?;
            return Ok(make(Some(dim), quals, coord));
        }

        let quals = self.type_qualifier_list_opt()?;
        if !quals.is_empty() && self.peek()?.is_keyword(Keyword::Static) {
            self.bump()?;
            let dim = self.assignment_expression()?;
            let mut quals = quals;
            quals.push("static".to_string());
            self.expect(Punct::RBracket)?;
            return Ok(make(Some(dim), quals, coord));
        }

        let dim = if self.peek()?.is_punct(Punct::RBracket) {
            None
        } else {
            Some(self.assignment_expression()?)
        };
        self.expect(Punct::RBracket)?;
        Ok(make(dim, quals, coord))
    }

    /// Contents of a function declarator's parentheses: empty, an old-style
    /// identifier list, or a parameter type list.
    fn function_params(&mut self) -> Result<Option<Node<ParamList>>, ParseError> {
        let tok = self.peek()?.clone();
        match tok.kind {
            TokenKind::Punct(Punct::RParen) => Ok(None),
            TokenKind::Id => {
                let mut params = Vec::new();
                loop {
                    let t = self.bump()?;
                    if t.kind != TokenKind::Id {
                        return Err(expected(&t, "a parameter name"));
                    }
                    let coord = t.coord.clone();
                    params.push(Node::new(
                        Param::Id(Node::new(Identifier { name: t.text }, t.coord)),
                        coord,
                    ));
                    if !self.eat(Punct::Comma)? {
                        break;
                    }
                }
                let coord = params[0].coord.clone();
                Ok(Some(Node::new(ParamList { params }, coord)))
            }
            _ => {
                let mut params = Vec::new();
                loop {
                    params.push(self.parameter_declaration()?);
                    if !self.eat(Punct::Comma)? {
                        break;
                    }
                }
                let coord = params[0].coord.clone();
                Ok(Some(Node::new(ParamList { params }, coord)))
            }
        }
    }

    fn parameter_declaration(&mut self) -> Result<Node<Param>, ParseError> {
        let first_coord = self.peek()?.coord.clone();
        let mut specs = self.declaration_specifiers()?;
        if specs.types.is_empty() {
            // Parameters default to int.
            specs.types.push(Node::new(
                BaseType::Identifier(IdentifierType {
                    names: vec!["int".to_string()],
                }),
                first_coord,
            ));
        }
        let declarator = self.declarator()?;
        let built = self.build_declarations(
            specs,
            vec![InitDeclarator {
                decl: declarator,
                init: None,
            }],
            false,
        )?;
        match built.into_iter().next() {
            Some(Declaration::Decl(d)) => {
                let coord = d.coord.clone();
                Ok(Node::new(Param::Decl(d), coord))
            }
            Some(Declaration::Typedef(t)) => Err(ParseError::new(
                "typedef is not allowed in a parameter declaration",
                t.coord,
            )),
            None => unreachable!("one declarator was supplied"),
        }
    }

    // Struct and enum specifiers

    fn struct_specifier(&mut self) -> Result<Node<BaseType>, ParseError> {
        let kw = self.expect_keyword(Keyword::Struct)?;
        let name = if self.peek()?.kind == TokenKind::Id {
            Some(self.bump()?.text)
        } else {
            None
        };
        let decls = if self.peek()?.is_punct(Punct::LBrace) {
            self.bump()?;
            let mut fields = Vec::new();
            while !self.peek()?.is_punct(Punct::RBrace) {
                fields.extend(self.struct_declaration()?);
            }
            self.expect(Punct::RBrace)?;
            Some(fields)
        } else {
            if name.is_none() {
                let tok = self.peek()?.clone();
                return Err(expected(&tok, "a struct name or '{'"));
            }
            None
        };
        Ok(Node::new(
            BaseType::Struct(StructType { name, decls }),
            kw.coord,
        ))
    }

    /// One member declaration: specifier-qualifier list and declarators, no
    /// storage classes and no bitfields.
    fn struct_declaration(&mut self) -> Result<Vec<Node<Decl>>, ParseError> {
        let specs = self.declaration_specifiers()?;
        if let Some(storage) = specs.storage.first() {
            let tok = self.peek()?.coord.clone();
            return Err(ParseError::new(
                format!("'{}' is not allowed in a struct member declaration", storage),
                tok,
            ));
        }
        let mut decls = Vec::new();
        loop {
            let declarator = self.declarator()?;
            decls.push(InitDeclarator {
                decl: declarator,
                init: None,
            });
            if !self.eat(Punct::Comma)? {
                break;
            }
        }
        self.expect(Punct::Semi)?;
        let built = self.build_declarations(specs, decls, false)?;
        Ok(built
            .into_iter()
            .map(|d| match d {
                Declaration::Decl(d) => d,
                Declaration::Typedef(_) => unreachable!("storage classes were rejected above"),
            })
            .collect())
    }

    fn enum_specifier(&mut self) -> Result<Node<BaseType>, ParseError> {
        let kw = self.expect_keyword(Keyword::Enum)?;
        let name = if self.peek()?.kind == TokenKind::Id {
            Some(self.bump()?.text)
        } else {
            None
        };
        let values = if self.peek()?.is_punct(Punct::LBrace) {
            self.bump()?;
            let list = self.enumerator_list()?;
            self.expect(Punct::RBrace)?;
            Some(list)
        } else {
            if name.is_none() {
                let tok = self.peek()?.clone();
                return Err(expected(&tok, "an enum name or '{'"));
            }
            None
        };
        Ok(Node::new(
            BaseType::Enum(EnumType { name, values }),
            kw.coord,
        ))
    }

    fn enumerator_list(&mut self) -> Result<Node<EnumeratorList>, ParseError> {
        let mut enumerators = vec![self.enumerator()?];
        while self.eat(Punct::Comma)? {
            // A trailing comma before the closing brace is allowed.
            if self.peek()?.is_punct(Punct::RBrace) {
                break;
            }
            enumerators.push(self.enumerator()?);
        }
        let coord = enumerators[0].coord.clone();
        Ok(Node::new(EnumeratorList { enumerators }, coord))
    }

    fn enumerator(&mut self) -> Result<Node<Enumerator>, ParseError> {
        let tok = self.bump()?;
        if tok.kind != TokenKind::Id {
            return Err(expected(&tok, "an enumerator name"));
        }
        let value = if self.eat(Punct::Eq)? {
            Some(Box::new(self.conditional_expression()?))
        } else {
            None
        };
        // Enumerators claim their name in the current scope immediately, so
        // a later typedef of the same name is caught.
        self.declare(&tok.text, NameKind::Identifier, &tok.coord)?;
        Ok(Node::new(
            Enumerator {
                name: tok.text,
                value,
            },
            tok.coord,
        ))
    }

    // Statements

    fn statement(&mut self) -> Result<Node<Statement>, ParseError> {
        let tok = self.peek()?.clone();
        match tok.kind {
            TokenKind::Punct(Punct::LBrace) => self.compound_statement(),
            TokenKind::Keyword(Keyword::If) => self.if_statement(),
            TokenKind::Keyword(Keyword::While) => self.while_statement(),
            TokenKind::Keyword(Keyword::Do) => self.do_while_statement(),
            TokenKind::Keyword(Keyword::For) => self.for_statement(),
            TokenKind::Keyword(Keyword::Break) => {
                self.bump()?;
                self.expect(Punct::Semi)?;
                Ok(Node::new(Statement::Break, tok.coord))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.bump()?;
                self.expect(Punct::Semi)?;
                Ok(Node::new(Statement::Continue, tok.coord))
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.bump()?;
                let value = if self.peek()?.is_punct(Punct::Semi) {
                    None
                } else {
                    Some(Box::new(self.expression()?))
                };
                self.expect(Punct::Semi)?;
                Ok(Node::new(Statement::Return(value), tok.coord))
            }
            _ => self.expression_statement(),
        }
    }

    fn expression_statement(&mut self) -> Result<Node<Statement>, ParseError> {
        if self.peek()?.is_punct(Punct::Semi) {
            let semi = self.bump()?;
            return Ok(Node::new(Statement::Empty, semi.coord));
        }
        let e = self.expression()?;
        self.expect(Punct::Semi)?;
        let coord = e.coord.clone();
        Ok(Node::new(Statement::Expr(Box::new(e)), coord))
    }

    fn compound_statement(&mut self) -> Result<Node<Statement>, ParseError> {
        // The scope for this block was pushed when the `{` was lexed.
        let lbrace = self.expect(Punct::LBrace)?;
        let mut items = Vec::new();
        loop {
            let tok = self.peek()?;
            if tok.is_punct(Punct::RBrace) {
                break;
            }
            if tok.kind == TokenKind::Eof {
                let tok = tok.clone();
                return Err(expected(&tok, "'}'"));
            }
            if self.is_declaration_start()? {
                for d in self.declaration()? {
                    items.push(match d {
                        Declaration::Decl(d) => {
                            let coord = d.coord.clone();
                            Node::new(BlockItem::Decl(d), coord)
                        }
                        Declaration::Typedef(t) => {
                            let coord = t.coord.clone();
                            Node::new(BlockItem::Typedef(t), coord)
                        }
                    });
                }
            } else {
                let s = self.statement()?;
                let coord = s.coord.clone();
                items.push(Node::new(BlockItem::Statement(s), coord));
            }
        }
        self.expect(Punct::RBrace)?;
        Ok(Node::new(
            Statement::Compound(Compound { block_items: items }),
            lbrace.coord,
        ))
    }

    fn if_statement(&mut self) -> Result<Node<Statement>, ParseError> {
        let kw = self.expect_keyword(Keyword::If)?;
        self.expect(Punct::LParen)?;
        let cond = self.expression()?;
        self.expect(Punct::RParen)?;
        let iftrue = self.statement()?;
        let iffalse = if self.peek()?.is_keyword(Keyword::Else) {
            self.bump()?;
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Node::new(
            Statement::If(If {
                cond: Box::new(cond),
                iftrue: Box::new(iftrue),
                iffalse,
            }),
            kw.coord,
        ))
    }

    fn while_statement(&mut self) -> Result<Node<Statement>, ParseError> {
        let kw = self.expect_keyword(Keyword::While)?;
        self.expect(Punct::LParen)?;
        let cond = self.expression()?;
        self.expect(Punct::RParen)?;
        let stmt = self.statement()?;
        Ok(Node::new(
            Statement::While(While {
                cond: Box::new(cond),
                stmt: Box::new(stmt),
            }),
            kw.coord,
        ))
    }

    fn do_while_statement(&mut self) -> Result<Node<Statement>, ParseError> {
        let kw = self.expect_keyword(Keyword::Do)?;
        let stmt = self.statement()?;
        self.expect_keyword(Keyword::While)?;
        self.expect(Punct::LParen)?;
        let cond = self.expression()?;
        self.expect(Punct::RParen)?;
        self.expect(Punct::Semi)?;
        Ok(Node::new(
            Statement::DoWhile(DoWhile {
                cond: Box::new(cond),
                stmt: Box::new(stmt),
            }),
            kw.coord,
        ))
    }

    fn for_statement(&mut self) -> Result<Node<Statement>, ParseError> {
        let kw = self.expect_keyword(Keyword::For)?;
        self.expect(Punct::LParen)?;

        let init = if self.peek()?.is_punct(Punct::Semi) {
            self.bump()?;
            None
        } else if self.is_declaration_start()? {
            // The declaration consumes its own semicolon; the loop variable
            // is registered in the enclosing scope.
            let mut decls = Vec::new();
            for d in self.declaration()? {
                match d {
                    Declaration::Decl(d) => decls.push(d),
                    Declaration::Typedef(t) => {
                        return Err(ParseError::new(
                            "typedef is not allowed in a for initializer",
                            t.coord,
                        ))
                    }
                }
            }
            Some(Node::new(
                ForInit::DeclList(DeclList { decls }),
                kw.coord.clone(),
            ))
        } else {
            let e = self.expression()?;
            self.expect(Punct::Semi)?;
            let coord = e.coord.clone();
            Some(Node::new(ForInit::Expr(Box::new(e)), coord))
        };

        let cond = if self.peek()?.is_punct(Punct::Semi) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.expect(Punct::Semi)?;

        let next = if self.peek()?.is_punct(Punct::RParen) {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.expect(Punct::RParen)?;

        let stmt = self.statement()?;
        Ok(Node::new(
            Statement::For(For {
                init,
                cond,
                next,
                stmt: Box::new(stmt),
            }),
            kw.coord,
        ))
    }

    fn initializer(&mut self) -> Result<Node<Expr>, ParseError> {
        if !self.peek()?.is_punct(Punct::LBrace) {
            return self.assignment_expression();
        }
        let lbrace = self.bump()?;
        if self.eat(Punct::RBrace)? {
            return Ok(Node::new(
                Expr::InitList(InitList { exprs: Vec::new() }),
                lbrace.coord,
            ));
        }
        let mut exprs = vec![self.initializer()?];
        while self.eat(Punct::Comma)? {
            if self.peek()?.is_punct(Punct::RBrace) {
                break;
            }
            exprs.push(self.initializer()?);
        }
        self.expect(Punct::RBrace)?;
        let coord = exprs[0].coord.clone();
        Ok(Node::new(Expr::InitList(InitList { exprs }), coord))
    }
}

/// "expected X before 'tok'" with the offending coordinate.
fn expected(tok: &Token, what: &str) -> ParseError {
    let message = match tok.kind {
        TokenKind::Eof => format!("expected {} before end of input", what),
        _ => format!("expected {} before {}", what, tok),
    };
    ParseError::new(message, tok.coord.clone())
}

/// Insert `modifier` between the modifiers already wrapping `decl` and its
/// terminal `TypeDecl`, so the modifier closest to the name stays innermost.
fn type_modify(decl: Node<Type>, mut modifier: Node<Type>) -> Node<Type> {
    if decl.node.is_type_decl() {
        *modifier_tail(&mut modifier)
            .node
            .modifier_inner_mut()
            .expect("a modifier chain never ends in a TypeDecl") = Some(Box::new(decl));
        modifier
    } else {
        let mut decl = decl;
        let tail = decl_tail(&mut decl);
        let type_decl_link = tail
            .node
            .modifier_inner_mut()
            .expect("decl_tail returns a modifier node")
            .take();
        *modifier_tail(&mut modifier)
            .node
            .modifier_inner_mut()
            .expect("a modifier chain never ends in a TypeDecl") = type_decl_link;
        *tail
            .node
            .modifier_inner_mut()
            .expect("decl_tail returns a modifier node") = Some(Box::new(modifier));
        decl
    }
}

/// Deepest node of a modifier chain (its inner link is still empty).
fn modifier_tail(node: &mut Node<Type>) -> &mut Node<Type> {
    let descend = matches!(node.node.modifier_inner(), Some(Some(_)));
    if !descend {
        return node;
    }
    match node.node.modifier_inner_mut() {
        Some(inner) => modifier_tail(inner.as_deref_mut().unwrap()),
        None => unreachable!(),
    }
}

/// Node of a declarator chain whose inner link is the terminal `TypeDecl`.
fn decl_tail(node: &mut Node<Type>) -> &mut Node<Type> {
    let descend = match node.node.modifier_inner() {
        Some(Some(inner)) => !inner.node.is_type_decl(),
        _ => false,
    };
    if !descend {
        return node;
    }
    match node.node.modifier_inner_mut() {
        Some(inner) => decl_tail(inner.as_deref_mut().unwrap()),
        None => unreachable!(),
    }
}

/// Mutable access to the terminal `TypeDecl` of a declarator chain.
fn terminal_type_decl_mut(ty: &mut Node<Type>) -> &mut TypeDecl {
    if ty.node.is_type_decl() {
        match &mut ty.node {
            Type::TypeDecl(td) => return td,
            _ => unreachable!(),
        }
    }
    match ty.node.modifier_inner_mut() {
        Some(inner) => terminal_type_decl_mut(
            inner
                .as_deref_mut()
                .expect("every declarator chain ends in a TypeDecl"),
        ),
        None => unreachable!(),
    }
}
