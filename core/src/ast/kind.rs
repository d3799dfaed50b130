//! file: core/src/ast/kind.rs
//! description: AST node kind definitions and operator enums.
//!
//! Defines `AstNodeKind` along with the operator enums and the declaration
//! payloads (`FunctionDecl`, `ClassDecl`, ...). The parser hands the engine a
//! tree of these; every variant documents its child shape through its fields.
//!
use serde::{Deserialize, Serialize};

use super::node::AstNode;

/// Represents binary operators in the AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,          // +
    Sub,          // -
    Mul,          // *
    Div,          // /
    Mod,          // %
    Pow,          // **
    Concat,       // .
    BitAnd,       // &
    BitOr,        // |
    BitXor,       // ^
    Shl,          // <<
    Shr,          // >>
    Eq,           // ==
    Ne,           // !=
    Identical,    // ===
    NotIdentical, // !==
    Lt,           // <
    Le,           // <=
    Gt,           // >
    Ge,           // >=
    Spaceship,    // <=>
    And,          // && / and
    Or,           // || / or
    Xor,          // xor
    Coalesce,     // ??
}

/// Represents unary operators in the AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,    // !
    Minus,  // -
    Plus,   // +
    BitNot, // ~
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncDecOperator {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    Int,
    Float,
    String,
    Bool,
    Array,
    Object,
    Unset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MagicConstKind {
    Line,
    File,
    Dir,
    Function,
    Class,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClassKind {
    #[default]
    Class,
    Interface,
    Trait,
}

/// A declared type: one or more names (a union), optionally nullable.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeName {
    pub names: Vec<String>,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub type_hint: Option<TypeName>,
    #[serde(default)]
    pub default: Option<Box<AstNode>>,
    #[serde(default)]
    pub by_ref: bool,
    #[serde(default)]
    pub variadic: bool,
    /// Constructor property promotion.
    #[serde(default)]
    pub promote: Option<Visibility>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub value: AstNode,
    #[serde(default)]
    pub unpack: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayItem {
    #[serde(default)]
    pub key: Option<AstNode>,
    pub value: AstNode,
    #[serde(default)]
    pub by_ref: bool,
    #[serde(default)]
    pub unpack: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub types: Vec<String>,
    #[serde(default)]
    pub var: Option<String>,
    pub body: Box<AstNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    /// `None` marks the `default` arm.
    pub conditions: Option<Vec<AstNode>>,
    pub body: AstNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// `None` marks `default:`.
    pub test: Option<AstNode>,
    pub body: Vec<AstNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosureUse {
    pub name: String,
    #[serde(default)]
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticVarItem {
    pub name: String,
    #[serde(default)]
    pub default: Option<AstNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<AstNode>,
    #[serde(default)]
    pub by_ref_return: bool,
    #[serde(default)]
    pub return_type: Option<TypeName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassConstDecl {
    pub name: String,
    pub value: AstNode,
    #[serde(default)]
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    #[serde(default)]
    pub default: Option<AstNode>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub type_hint: Option<TypeName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub func: FunctionDecl,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub constants: Vec<ClassConstDecl>,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum AstNodeKind {
    Script { body: Vec<AstNode> },
    Block { statements: Vec<AstNode> },
    Nop,

    // statements
    Echo { args: Vec<AstNode> },
    InlineHtml { value: String },
    ExprStmt { expr: Box<AstNode> },
    If { condition: Box<AstNode>, then_branch: Box<AstNode>, else_branch: Option<Box<AstNode>> },
    While { condition: Box<AstNode>, body: Box<AstNode> },
    DoWhile { body: Box<AstNode>, condition: Box<AstNode> },
    For { init: Vec<AstNode>, condition: Vec<AstNode>, step: Vec<AstNode>, body: Box<AstNode> },
    Foreach {
        subject: Box<AstNode>,
        key: Option<Box<AstNode>>,
        value: Box<AstNode>,
        by_ref: bool,
        body: Box<AstNode>,
    },
    Switch { subject: Box<AstNode>, cases: Vec<SwitchCase> },
    Break { depth: u32 },
    Continue { depth: u32 },
    Return { value: Option<Box<AstNode>> },
    Global { names: Vec<String> },
    StaticVar { vars: Vec<StaticVarItem> },
    Unset { targets: Vec<AstNode> },
    Try { body: Box<AstNode>, catches: Vec<CatchClause>, finally: Option<Box<AstNode>> },
    FunctionDecl(FunctionDecl),
    ClassDecl(ClassDecl),
    ConstDecl { name: String, value: Box<AstNode> },

    // expressions
    Variable { name: String },
    VariableVariable { name: Box<AstNode> },
    Integer { value: i64 },
    Float { value: f64 },
    String { value: String },
    Bool { value: bool },
    Null,
    Interpolated { parts: Vec<AstNode> },
    ArrayLiteral { items: Vec<ArrayItem> },
    List { items: Vec<Option<ArrayItem>> },
    Assign { target: Box<AstNode>, value: Box<AstNode> },
    AssignRef { target: Box<AstNode>, value: Box<AstNode> },
    CompoundAssign { op: BinaryOperator, target: Box<AstNode>, value: Box<AstNode> },
    BinaryOp { left: Box<AstNode>, op: BinaryOperator, right: Box<AstNode> },
    UnaryOp { op: UnaryOperator, expr: Box<AstNode> },
    IncDec { op: IncDecOperator, target: Box<AstNode> },
    /// `then` is `None` for the short `a ?: b` form.
    Ternary { condition: Box<AstNode>, then: Option<Box<AstNode>>, otherwise: Box<AstNode> },
    /// A `Name` callee is a direct function call; anything else is evaluated
    /// to a callable value.
    Call { callee: Box<AstNode>, args: Vec<Argument> },
    /// Bare identifier: a constant fetch, or a class/function name where the
    /// parent node expects one.
    Name { name: String },
    PropertyFetch { object: Box<AstNode>, property: Box<AstNode>, nullsafe: bool },
    MethodCall { object: Box<AstNode>, method: Box<AstNode>, args: Vec<Argument>, nullsafe: bool },
    StaticCall { class: Box<AstNode>, method: String, args: Vec<Argument> },
    StaticPropertyFetch { class: Box<AstNode>, property: String },
    ClassConstFetch { class: Box<AstNode>, name: String },
    New { class: Box<AstNode>, args: Vec<Argument> },
    /// `index` is `None` for the append form `$a[]`.
    Index { base: Box<AstNode>, index: Option<Box<AstNode>> },
    Closure {
        params: Vec<Param>,
        uses: Vec<ClosureUse>,
        body: Vec<AstNode>,
        by_ref_return: bool,
        is_static: bool,
    },
    ArrowFn { params: Vec<Param>, body: Box<AstNode>, is_static: bool },
    Isset { targets: Vec<AstNode> },
    Empty { expr: Box<AstNode> },
    Cast { cast: CastKind, expr: Box<AstNode> },
    Instanceof { expr: Box<AstNode>, class: Box<AstNode> },
    Clone { expr: Box<AstNode> },
    Print { expr: Box<AstNode> },
    Exit { value: Option<Box<AstNode>> },
    Throw { expr: Box<AstNode> },
    Match { subject: Box<AstNode>, arms: Vec<MatchArm> },
    Yield { key: Option<Box<AstNode>>, value: Option<Box<AstNode>> },
    YieldFrom { expr: Box<AstNode> },
    /// `call` is a Call/MethodCall/StaticCall node, or any callable value.
    Spawn { call: Box<AstNode> },
    Await { expr: Box<AstNode> },
    MagicConst { magic: MagicConstKind },
}

impl AstNodeKind {
    pub fn is_expression(&self) -> bool {
        !matches!(
            self,
            AstNodeKind::Script { .. }
                | AstNodeKind::Block { .. }
                | AstNodeKind::Nop
                | AstNodeKind::Echo { .. }
                | AstNodeKind::InlineHtml { .. }
                | AstNodeKind::ExprStmt { .. }
                | AstNodeKind::If { .. }
                | AstNodeKind::While { .. }
                | AstNodeKind::DoWhile { .. }
                | AstNodeKind::For { .. }
                | AstNodeKind::Foreach { .. }
                | AstNodeKind::Switch { .. }
                | AstNodeKind::Break { .. }
                | AstNodeKind::Continue { .. }
                | AstNodeKind::Return { .. }
                | AstNodeKind::Global { .. }
                | AstNodeKind::StaticVar { .. }
                | AstNodeKind::Unset { .. }
                | AstNodeKind::Try { .. }
                | AstNodeKind::FunctionDecl(_)
                | AstNodeKind::ClassDecl(_)
                | AstNodeKind::ConstDecl { .. }
        )
    }

    /// Literal scalar nodes that can be folded into the constant pool.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            AstNodeKind::Integer { .. }
                | AstNodeKind::Float { .. }
                | AstNodeKind::String { .. }
                | AstNodeKind::Bool { .. }
                | AstNodeKind::Null
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AstNodeKind::Script { .. } => "Script",
            AstNodeKind::Block { .. } => "Block",
            AstNodeKind::Nop => "Nop",
            AstNodeKind::Echo { .. } => "Echo",
            AstNodeKind::InlineHtml { .. } => "InlineHtml",
            AstNodeKind::ExprStmt { .. } => "ExprStmt",
            AstNodeKind::If { .. } => "If",
            AstNodeKind::While { .. } => "While",
            AstNodeKind::DoWhile { .. } => "DoWhile",
            AstNodeKind::For { .. } => "For",
            AstNodeKind::Foreach { .. } => "Foreach",
            AstNodeKind::Switch { .. } => "Switch",
            AstNodeKind::Break { .. } => "Break",
            AstNodeKind::Continue { .. } => "Continue",
            AstNodeKind::Return { .. } => "Return",
            AstNodeKind::Global { .. } => "Global",
            AstNodeKind::StaticVar { .. } => "StaticVar",
            AstNodeKind::Unset { .. } => "Unset",
            AstNodeKind::Try { .. } => "Try",
            AstNodeKind::FunctionDecl(_) => "FunctionDecl",
            AstNodeKind::ClassDecl(_) => "ClassDecl",
            AstNodeKind::ConstDecl { .. } => "ConstDecl",
            AstNodeKind::Variable { .. } => "Variable",
            AstNodeKind::VariableVariable { .. } => "VariableVariable",
            AstNodeKind::Integer { .. } => "Integer",
            AstNodeKind::Float { .. } => "Float",
            AstNodeKind::String { .. } => "String",
            AstNodeKind::Bool { .. } => "Bool",
            AstNodeKind::Null => "Null",
            AstNodeKind::Interpolated { .. } => "Interpolated",
            AstNodeKind::ArrayLiteral { .. } => "ArrayLiteral",
            AstNodeKind::List { .. } => "List",
            AstNodeKind::Assign { .. } => "Assign",
            AstNodeKind::AssignRef { .. } => "AssignRef",
            AstNodeKind::CompoundAssign { .. } => "CompoundAssign",
            AstNodeKind::BinaryOp { .. } => "BinaryOp",
            AstNodeKind::UnaryOp { .. } => "UnaryOp",
            AstNodeKind::IncDec { .. } => "IncDec",
            AstNodeKind::Ternary { .. } => "Ternary",
            AstNodeKind::Call { .. } => "Call",
            AstNodeKind::Name { .. } => "Name",
            AstNodeKind::PropertyFetch { .. } => "PropertyFetch",
            AstNodeKind::MethodCall { .. } => "MethodCall",
            AstNodeKind::StaticCall { .. } => "StaticCall",
            AstNodeKind::StaticPropertyFetch { .. } => "StaticPropertyFetch",
            AstNodeKind::ClassConstFetch { .. } => "ClassConstFetch",
            AstNodeKind::New { .. } => "New",
            AstNodeKind::Index { .. } => "Index",
            AstNodeKind::Closure { .. } => "Closure",
            AstNodeKind::ArrowFn { .. } => "ArrowFn",
            AstNodeKind::Isset { .. } => "Isset",
            AstNodeKind::Empty { .. } => "Empty",
            AstNodeKind::Cast { .. } => "Cast",
            AstNodeKind::Instanceof { .. } => "Instanceof",
            AstNodeKind::Clone { .. } => "Clone",
            AstNodeKind::Print { .. } => "Print",
            AstNodeKind::Exit { .. } => "Exit",
            AstNodeKind::Throw { .. } => "Throw",
            AstNodeKind::Match { .. } => "Match",
            AstNodeKind::Yield { .. } => "Yield",
            AstNodeKind::YieldFrom { .. } => "YieldFrom",
            AstNodeKind::Spawn { .. } => "Spawn",
            AstNodeKind::Await { .. } => "Await",
            AstNodeKind::MagicConst { .. } => "MagicConst",
        }
    }
}

use std::fmt;

impl fmt::Display for AstNodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
