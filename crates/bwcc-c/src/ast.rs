//! Abstract syntax tree
//!
//! Types in this module represent the pieces a program in the supported C
//! subset can contain. Declared types are stored as *chains*: zero or more
//! modifier nodes ([`PtrDecl`], [`ArrayDecl`], [`FuncDecl`]) wrapping a
//! terminal [`TypeDecl`] that carries the declared name and the base type.
//! Read outermost-first, the chain spells out the declared type ("pointer to
//! array of int").
//!
//! Operators are stored as their literal source spelling (`"+"`, `"<="`);
//! postfix increment and decrement are distinguished from their prefix forms
//! by a `p` prefix (`"p++"`, `"p--"`).

use crate::span::Node;

/// Variable, function and other names that are not type names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub name: String,
}

// Declared types

/// One link of a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Terminal of every chain; carries the declared name.
    TypeDecl(TypeDecl),
    /// `* quals …`
    Ptr(PtrDecl),
    /// `… [dim]`
    Array(ArrayDecl),
    /// `… (parameters)`
    Func(FuncDecl),
}

impl Type {
    /// The inner link of a modifier node. `None` is returned for the
    /// terminal [`TypeDecl`], whose successor is a base type instead.
    pub fn modifier_inner(&self) -> Option<&Option<Box<Node<Type>>>> {
        match self {
            Type::TypeDecl(_) => None,
            Type::Ptr(p) => Some(&p.inner),
            Type::Array(a) => Some(&a.inner),
            Type::Func(f) => Some(&f.inner),
        }
    }

    pub fn modifier_inner_mut(&mut self) -> Option<&mut Option<Box<Node<Type>>>> {
        match self {
            Type::TypeDecl(_) => None,
            Type::Ptr(p) => Some(&mut p.inner),
            Type::Array(a) => Some(&mut a.inner),
            Type::Func(f) => Some(&mut f.inner),
        }
    }

    pub fn is_type_decl(&self) -> bool {
        matches!(self, Type::TypeDecl(_))
    }

    /// Terminal `TypeDecl` of the chain headed by `self`.
    pub fn type_decl(&self) -> Option<&TypeDecl> {
        let mut cur = self;
        loop {
            match cur {
                Type::TypeDecl(td) => return Some(td),
                _ => match cur.modifier_inner()?.as_deref() {
                    Some(next) => cur = &next.node,
                    None => return None,
                },
            }
        }
    }
}

/// End of a declarator chain: the declared name, its qualifiers, and the
/// base type the modifiers apply to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDecl {
    pub declname: Option<String>,
    pub quals: Vec<String>,
    pub base: Option<Node<BaseType>>,
}

/// What a `TypeDecl` ultimately names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    Identifier(IdentifierType),
    Struct(StructType),
    Enum(EnumType),
}

/// A base type spelled with one or more words: `int`, `unsigned long`, or a
/// typedef name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentifierType {
    pub names: Vec<String>,
}

/// Pointer modifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PtrDecl {
    pub quals: Vec<String>,
    pub inner: Option<Box<Node<Type>>>,
}

/// Array modifier with an optional dimension expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayDecl {
    pub inner: Option<Box<Node<Type>>>,
    pub dim: Option<Box<Node<Expr>>>,
    pub dim_quals: Vec<String>,
}

/// Function modifier carrying the parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncDecl {
    pub args: Option<Node<ParamList>>,
    pub inner: Option<Box<Node<Type>>>,
}

/// `struct identifier { … }`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: Option<String>,
    /// Field declarations when the body is present.
    pub decls: Option<Vec<Node<Decl>>>,
}

/// `enum identifier { … }`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub name: Option<String>,
    pub values: Option<Node<EnumeratorList>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumeratorList {
    pub enumerators: Vec<Node<Enumerator>>,
}

/// Single constant inside an `enum` definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Enumerator {
    pub name: String,
    pub value: Option<Box<Node<Expr>>>,
}

/// One function parameter: a full declaration, or a bare name in an
/// old-style identifier list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    Decl(Node<Decl>),
    Id(Node<Identifier>),
}

impl Param {
    pub fn name(&self) -> Option<&str> {
        match self {
            Param::Decl(d) => d.node.name.as_deref(),
            Param::Id(i) => Some(&i.node.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamList {
    pub params: Vec<Node<Param>>,
}

// Declarations

/// Variable, field, parameter or function declaration.
///
/// `ty` heads the declarator chain; after declaration fixup its terminal
/// `TypeDecl` carries the same name as `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decl {
    pub name: Option<String>,
    pub quals: Vec<String>,
    pub storage: Vec<String>,
    pub funcspec: Vec<String>,
    pub ty: Node<Type>,
    pub init: Option<Box<Node<Expr>>>,
}

/// `typedef` declaration; the declared name becomes a type name in the
/// current scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Typedef {
    pub name: Option<String>,
    pub quals: Vec<String>,
    pub storage: Vec<String>,
    pub ty: Node<Type>,
}

/// Function definition: its declaration, optional old-style parameter
/// declarations, and the body compound statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncDef {
    pub decl: Node<Decl>,
    pub param_decls: Option<Vec<Node<Decl>>>,
    pub body: Node<Statement>,
}

/// Top-level elements of a source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalDeclaration {
    Decl(Node<Decl>),
    Typedef(Node<Typedef>),
    FuncDef(Node<FuncDef>),
}

/// Entire translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileAST {
    pub ext: Vec<Node<ExternalDeclaration>>,
}

// Statements

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Statement {
    Compound(Compound),
    If(If),
    While(While),
    DoWhile(DoWhile),
    For(For),
    Break,
    Continue,
    Return(Option<Box<Node<Expr>>>),
    /// A lone `;`.
    Empty,
    /// Expression statement; the expression stands in directly.
    Expr(Box<Node<Expr>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Compound {
    pub block_items: Vec<Node<BlockItem>>,
}

/// Element of a compound statement. Multi-declarator declarations are
/// flattened into consecutive items.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockItem {
    Decl(Node<Decl>),
    Typedef(Node<Typedef>),
    Statement(Node<Statement>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct If {
    pub cond: Box<Node<Expr>>,
    pub iftrue: Box<Node<Statement>>,
    pub iffalse: Option<Box<Node<Statement>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct While {
    pub cond: Box<Node<Expr>>,
    pub stmt: Box<Node<Statement>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DoWhile {
    pub cond: Box<Node<Expr>>,
    pub stmt: Box<Node<Statement>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct For {
    pub init: Option<Node<ForInit>>,
    pub cond: Option<Box<Node<Expr>>>,
    pub next: Option<Box<Node<Expr>>>,
    pub stmt: Box<Node<Statement>>,
}

/// First clause of a `for` statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ForInit {
    Expr(Box<Node<Expr>>),
    DeclList(DeclList),
}

/// Declarations introduced by a `for` initializer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclList {
    pub decls: Vec<Node<Decl>>,
}

// Expressions

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Constant(Constant),
    Id(Identifier),
    BinaryOp(BinaryOp),
    UnaryOp(UnaryOp),
    Ternary(TernaryOp),
    Assignment(Assignment),
    FuncCall(FuncCall),
    ArrayRef(ArrayRef),
    StructRef(StructRef),
    /// Comma expression.
    ExprList(ExprList),
    /// Brace-enclosed initializer.
    InitList(InitList),
}

/// Literal constant. `ty` is the literal's classified type (`"int"`,
/// `"unsigned long int"`, `"char"`, `"double"`, `"string"`, …); `value`
/// keeps the source spelling, quotes included for characters and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    pub ty: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryOp {
    pub op: String,
    pub left: Box<Node<Expr>>,
    pub right: Box<Node<Expr>>,
}

/// Prefix operators keep their source spelling; postfix `++`/`--` are
/// encoded `"p++"` / `"p--"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnaryOp {
    pub op: String,
    pub expr: Box<Node<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TernaryOp {
    pub cond: Box<Node<Expr>>,
    pub iftrue: Box<Node<Expr>>,
    pub iffalse: Box<Node<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Assignment {
    pub op: String,
    pub lvalue: Box<Node<Expr>>,
    pub rvalue: Box<Node<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncCall {
    pub name: Box<Node<Expr>>,
    pub args: Option<Node<ExprList>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArrayRef {
    pub name: Box<Node<Expr>>,
    pub subscript: Box<Node<Expr>>,
}

/// Member access through `.` or `->`; `kind` stores the operator text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructRef {
    pub name: Box<Node<Expr>>,
    pub kind: String,
    pub field: Node<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExprList {
    pub exprs: Vec<Node<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitList {
    pub exprs: Vec<Node<Expr>>,
}
