//! Elaborated syntax trees.
//!
//! Trees live in an [`Ast`] arena and refer to each other by [`TreeId`]. Every
//! tree carries the static type the elaborator assigned to it (statements are
//! typed `void`) together with its source range.
use std::ops::Index;

use la_arena::{Arena, Idx};
use text_size::TextRange;

use crate::member::{FieldRef, MethodRef};
use crate::types::{PrimitiveKind, Type};

pub type TreeId = Idx<Tree>;
pub type LocalId = Idx<LocalVar>;

#[derive(Debug, Default, Clone)]
pub struct Ast {
    pub(crate) trees: Arena<Tree>,
    pub(crate) locals: Arena<LocalVar>,
}

impl Ast {
    pub fn tree(&self, id: TreeId) -> &Tree {
        &self.trees[id]
    }

    pub fn kind(&self, id: TreeId) -> &TreeKind {
        &self.trees[id].kind
    }

    pub fn type_of(&self, id: TreeId) -> &Type {
        &self.trees[id].ty
    }

    pub fn local(&self, id: LocalId) -> &LocalVar {
        &self.locals[id]
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Strips any number of enclosing parentheses.
    pub fn skip_parens(&self, mut id: TreeId) -> TreeId {
        while let TreeKind::Parenthesized(inner) = self.kind(id) {
            id = *inner;
        }
        id
    }
}

impl Index<TreeId> for Ast {
    type Output = Tree;

    fn index(&self, id: TreeId) -> &Tree {
        &self.trees[id]
    }
}

impl Index<LocalId> for Ast {
    type Output = LocalVar;

    fn index(&self, id: LocalId) -> &LocalVar {
        &self.locals[id]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub kind: TreeKind,
    pub ty: Type,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Local,
    Parameter,
    ExceptionParameter,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVar {
    pub name: Box<str>,
    pub ty: Type,
    pub kind: LocalKind,
}

#[derive(Debug, Clone, PartialEq, is_macro::Is)]
pub enum TreeKind {
    MethodDecl(MethodDecl),
    ClassDecl(ClassDecl),
    VariableDecl(VariableDecl),

    Block(Vec<TreeId>),
    Empty,
    ExprStmt(TreeId),
    #[is(name = "if_stmt")]
    If(If),
    #[is(name = "while_stmt")]
    While(While),
    DoWhile(DoWhile),
    #[is(name = "for_stmt")]
    For(For),
    ForEach(ForEach),
    Labeled(Labeled),
    #[is(name = "break_stmt")]
    Break(Option<Box<str>>),
    #[is(name = "continue_stmt")]
    Continue(Option<Box<str>>),
    #[is(name = "return_stmt")]
    Return(Option<TreeId>),
    Throw(TreeId),
    #[is(name = "try_stmt")]
    Try(Try),
    Switch(Switch),
    Synchronized(Synchronized),
    Assert(Assert),

    Literal(Literal),
    Ident(Symbol),
    MemberSelect(MemberSelect),
    MethodCall(MethodCall),
    NewClass(NewClass),
    NewArray(NewArray),
    ArrayAccess(ArrayAccess),
    Assign(Assign),
    CompoundAssign(CompoundAssign),
    Binary(Binary),
    Unary(Unary),
    Conditional(Conditional),
    InstanceOf(InstanceOf),
    TypeCast(TypeCast),
    Parenthesized(TreeId),

    PrimitiveType(PrimitiveKind),
    ArrayType(TreeId),
    ParameterizedType(ParameterizedType),

    Lambda(TreeId),
    MemberReference(TreeId),
    Erroneous,
}

impl TreeKind {
    /// A short human-readable name for diagnostics.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MethodDecl(_) => "method declaration",
            Self::ClassDecl(_) => "class declaration",
            Self::VariableDecl(_) => "variable declaration",
            Self::Block(_) => "block",
            Self::Empty => "empty statement",
            Self::ExprStmt(_) => "expression statement",
            Self::If(_) => "if statement",
            Self::While(_) => "while loop",
            Self::DoWhile(_) => "do-while loop",
            Self::For(_) => "for loop",
            Self::ForEach(_) => "enhanced for loop",
            Self::Labeled(_) => "labeled statement",
            Self::Break(_) => "break",
            Self::Continue(_) => "continue",
            Self::Return(_) => "return",
            Self::Throw(_) => "throw",
            Self::Try(_) => "try statement",
            Self::Switch(_) => "switch statement",
            Self::Synchronized(_) => "synchronized statement",
            Self::Assert(_) => "assert statement",
            Self::Literal(_) => "literal",
            Self::Ident(_) => "identifier",
            Self::MemberSelect(_) => "member select",
            Self::MethodCall(_) => "method invocation",
            Self::NewClass(_) => "object creation",
            Self::NewArray(_) => "array creation",
            Self::ArrayAccess(_) => "array access",
            Self::Assign(_) => "assignment",
            Self::CompoundAssign(_) => "compound assignment",
            Self::Binary(_) => "binary expression",
            Self::Unary(_) => "unary expression",
            Self::Conditional(_) => "conditional expression",
            Self::InstanceOf(_) => "instanceof",
            Self::TypeCast(_) => "type cast",
            Self::Parenthesized(_) => "parenthesized expression",
            Self::PrimitiveType(_) => "primitive type",
            Self::ArrayType(_) => "array type",
            Self::ParameterizedType(_) => "parameterized type",
            Self::Lambda(_) => "lambda expression",
            Self::MemberReference(_) => "member reference",
            Self::Erroneous => "erroneous tree",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: Box<str>,
    /// Parameter declarations, each a [`TreeKind::VariableDecl`].
    pub params: Vec<TreeId>,
    pub return_type: Type,
    pub body: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Box<str>,
    pub members: Vec<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub local: LocalId,
    pub init: Option<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    pub condition: TreeId,
    pub then_stmt: TreeId,
    pub else_stmt: Option<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub condition: TreeId,
    pub body: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoWhile {
    pub body: TreeId,
    pub condition: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct For {
    pub init: Vec<TreeId>,
    /// `None` for `for (;;)`.
    pub condition: Option<TreeId>,
    pub update: Vec<TreeId>,
    pub body: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEach {
    /// The loop variable, a [`TreeKind::VariableDecl`] without initializer.
    pub variable: TreeId,
    pub iterable: TreeId,
    pub body: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Labeled {
    pub label: Box<str>,
    pub body: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Try {
    pub block: TreeId,
    pub catches: Vec<Catch>,
    pub finally: Option<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    /// The exception parameter; its type may be a [`Type::Union`].
    pub parameter: TreeId,
    pub body: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub selector: TreeId,
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// `None` for `default`.
    pub expr: Option<TreeId>,
    pub body: Vec<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Synchronized {
    pub lock: TreeId,
    pub body: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assert {
    pub condition: TreeId,
    pub detail: Option<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Box<str>),
    Null,
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Char(value) => write!(f, "'{}'", value.escape_default()),
            Self::Int(value) => write!(f, "{value}"),
            Self::Long(value) => write!(f, "{value}L"),
            Self::Float(value) => write!(f, "{value:?}f"),
            Self::Double(value) => write!(f, "{value:?}"),
            Self::String(value) => write!(f, "\"{}\"", value.escape_default()),
            Self::Null => f.write_str("null"),
        }
    }
}

/// What a bare identifier resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Local(LocalId),
    /// A field accessed without an explicit receiver.
    Field(FieldRef),
    /// A class name; the class is the tree's type.
    Class,
    Package(Box<str>),
    This,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSelect {
    pub receiver: TreeId,
    pub member: Member,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Field(FieldRef),
    /// A nested class or a class in a package; the class is the tree's type.
    Class,
    Package(Box<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    /// `None` when the method is called without an explicit receiver.
    pub receiver: Option<TreeId>,
    pub method: MethodRef,
    pub args: Vec<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClass {
    /// The outer instance for `outer.new Inner()`.
    pub enclosing: Option<TreeId>,
    /// The class being instantiated.
    pub class: TreeId,
    pub constructor: MethodRef,
    pub args: Vec<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewArray {
    pub dimensions: Vec<TreeId>,
    pub initializers: Vec<TreeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayAccess {
    pub array: TreeId,
    pub index: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: TreeId,
    pub value: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompoundAssign {
    pub op: BinaryOp,
    pub target: TreeId,
    pub value: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub op: BinaryOp,
    pub lhs: TreeId,
    pub rhs: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unary {
    pub op: UnaryOp,
    pub operand: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub condition: TreeId,
    pub then_expr: TreeId,
    pub else_expr: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceOf {
    pub expr: TreeId,
    /// The type tree being tested against.
    pub class: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeCast {
    pub class: TreeId,
    pub expr: TreeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedType {
    pub base: TreeId,
    pub args: Vec<TreeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    UShr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    /// Conditional and, `&&`.
    And,
    /// Conditional or, `||`.
    Or,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::UShr => ">>>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    pub const fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Shr | Self::UShr)
    }

    pub const fn is_relational(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    pub const fn is_bitwise(self) -> bool {
        matches!(self, Self::BitAnd | Self::BitOr | Self::BitXor)
    }

    pub const fn is_short_circuit(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
    Not,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

impl UnaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::BitNot => "~",
            Self::Not => "!",
            Self::PreIncrement | Self::PostIncrement => "++",
            Self::PreDecrement | Self::PostDecrement => "--",
        }
    }

    pub const fn is_increment_or_decrement(self) -> bool {
        matches!(
            self,
            Self::PreIncrement | Self::PreDecrement | Self::PostIncrement | Self::PostDecrement
        )
    }

    pub const fn is_postfix(self) -> bool {
        matches!(self, Self::PostIncrement | Self::PostDecrement)
    }
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
