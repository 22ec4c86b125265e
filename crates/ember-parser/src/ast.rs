//! AST node definitions (§3 data model). Every node lives in a single
//! [`ember_core::Arena`] owned by the translation unit and is addressed by
//! [`NodeId`]; parent back-references are wired up after parsing by the
//! transform driver (C7), never during parsing itself.

use bitflags::bitflags;
use ember_core::NodeId;

use crate::scope::ScopeId;

bitflags! {
    /// Modifiers accepted on `var`/`const` (§4.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VarModifiers: u8 {
        const DEPRECATED = 1 << 0;
        const PROTECT = 1 << 1;
        const EQUALS = 1 << 2;
    }

    /// Modifiers accepted on `func` (§4.5). `PARALLEL` and `NOPARALLEL`
    /// are mutually exclusive, enforced by the statement parser rather
    /// than by this type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FuncModifiers: u8 {
        const PARALLEL = 1 << 0;
        const NOPARALLEL = 1 << 1;
        const DEPRECATED = 1 << 2;
    }

    /// Modifiers accepted on `class` (§4.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClassModifiers: u8 {
        const DEPRECATED = 1 << 0;
    }
}

/// Binary operators, ordered so that `precedence()` can be a straight
/// table lookup. Higher number binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// `a.b` — attribute access by identifier.
    AttributeByIdentifier,
    /// `a(b, c)` — call; right operand is a synthesized argument list.
    Call,
    /// `a[b]` — index by arbitrary expression.
    IndexByExpression,
}

impl BinOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Equal | BinOp::NotEqual => 3,
            BinOp::Less | BinOp::LessEqual | BinOp::Greater | BinOp::GreaterEqual => 4,
            BinOp::Add | BinOp::Subtract => 5,
            BinOp::Multiply | BinOp::Divide | BinOp::Modulo => 6,
            BinOp::AttributeByIdentifier | BinOp::Call | BinOp::IndexByExpression => 7,
        }
    }

    /// Whether an l-value built from this operator can itself be a
    /// left-hand side of assignment (§4.5 l-value check).
    pub fn is_lvalue_capable(self) -> bool {
        matches!(
            self,
            BinOp::AttributeByIdentifier | BinOp::Call | BinOp::IndexByExpression
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    None,
}

/// One argument slot in an [`ArgList`]: positional arguments have
/// `name = None`; either form may carry a default-value expression.
#[derive(Debug, Clone)]
pub struct Arg {
    pub name: Option<String>,
    pub default: Option<NodeId>,
}

/// Two parallel arrays in spirit, kept as one `Vec<Arg>` here since Rust
/// makes the parallel-array encoding from the original C unnecessary.
#[derive(Debug, Clone, Default)]
pub struct ArgList {
    pub args: Vec<Arg>,
    /// `unpack` only ever marks a call site's last positional argument
    /// (see [`CallArgs`]); a parameter list always leaves this `false`.
    pub unpack_last_positional: bool,
}

#[derive(Debug, Clone)]
pub struct VarDef {
    pub name: String,
    pub modifiers: VarModifiers,
    pub is_const: bool,
    pub initializer: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: String,
    pub params: ArgList,
    pub body: Vec<NodeId>,
    pub modifiers: FuncModifiers,
    pub scope: ScopeId,
    /// Placeholder for the bytecode-emitter-assigned function id; the
    /// emitter itself is out of scope.
    pub bytecode_func_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    /// Identifier or dotted identifier chain naming the base class.
    pub base_chain: Option<Vec<String>>,
    pub modifiers: ClassModifiers,
    pub scope: ScopeId,
    pub vars: Vec<NodeId>,
    pub funcs: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct IfBranch {
    pub condition: Option<NodeId>,
    pub body: Vec<NodeId>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    /// First entry is the `if` branch (condition always `Some`); later
    /// entries are `elseif` branches; a trailing entry with
    /// `condition: None` is the `else` branch.
    pub branches: Vec<IfBranch>,
}

#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub condition: NodeId,
    pub body: Vec<NodeId>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct ForStmt {
    pub iterator_name: String,
    pub iterable: NodeId,
    pub body: Vec<NodeId>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct WithClause {
    pub expr: NodeId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct WithStmt {
    pub clauses: Vec<WithClause>,
    pub body: Vec<NodeId>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct RescueClause {
    pub exception_types: Vec<NodeId>,
    pub bound_name: Option<String>,
    pub body: Vec<NodeId>,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct DoStmt {
    pub body: Vec<NodeId>,
    pub body_scope: ScopeId,
    pub rescue: Option<RescueClause>,
    pub finally_body: Option<Vec<NodeId>>,
    pub finally_scope: Option<ScopeId>,
}

#[derive(Debug, Clone)]
pub struct ImportStmt {
    pub element_path: Vec<String>,
    pub from_lib: Option<String>,
    pub declared_name: String,
}

/// Disambiguated container-literal shapes (§4.4).
#[derive(Debug, Clone)]
pub enum ContainerKind {
    List,
    /// Component values in canonical order; `labeled` records whether the
    /// source used letter labels (`x`/`y`/`z`/`w`) rather than numeric
    /// (`1`/`2`/`3`/`4`) ones.
    Vector { labeled: bool },
    Map,
    Set,
}

#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: NodeId,
    pub value: NodeId,
}

#[derive(Debug, Clone)]
pub struct ContainerCtor {
    pub kind: ContainerKind,
    pub list_elements: Vec<NodeId>,
    pub map_entries: Vec<MapEntry>,
}

#[derive(Debug, Clone)]
pub struct GivenExpr {
    pub condition: NodeId,
    pub then_branch: NodeId,
    pub else_branch: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct InlineFuncDef {
    pub params: ArgList,
    /// Single synthesized return statement wrapping the body expression.
    pub body: NodeId,
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: BinOp,
    pub left: NodeId,
    pub right: NodeId,
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub op: UnOp,
    pub operand: NodeId,
}

#[derive(Debug, Clone)]
pub struct CallArgs {
    pub positional: Vec<NodeId>,
    pub keyword: Vec<(String, NodeId)>,
    /// Set when the call marks its last positional argument with
    /// `unpack`, spreading it into the callee's remaining parameters.
    pub unpack_last_positional: bool,
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: NodeId,
    pub args: CallArgs,
    pub is_async: bool,
}

/// The tagged union from §3: "expression node" is used loosely there to
/// mean "any AST node", statements included.
#[derive(Debug, Clone)]
pub enum NodeKind {
    IdentifierRef(String),
    Literal(Literal),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Call(CallExpr),
    InlineFuncDef(InlineFuncDef),
    FuncDef(FuncDef),
    ClassDef(ClassDef),
    VarDef(VarDef),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    With(WithStmt),
    Do(DoStmt),
    Return(Option<NodeId>),
    Raise(NodeId),
    Await(NodeId),
    Async(NodeId),
    Break,
    Continue,
    Import(ImportStmt),
    Container(ContainerCtor),
    Given(GivenExpr),
    /// An inline expression that is itself a complete statement (a bare
    /// call, for instance).
    ExprStatement(NodeId),
    /// `lhs OP= rhs`.
    Assignment { op: AssignOp, lhs: NodeId, rhs: NodeId },
}

/// One AST node: its kind plus the bookkeeping every node carries
/// regardless of kind (§3: "every node carries its source line and
/// column, the index of the token it starts at, a parent back reference
/// … and a per-node storage slot for later passes").
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: NodeKind,
    pub line: u32,
    pub column: u32,
    pub token_index: usize,
    /// Wired up by the transform driver (C7), not by the parser.
    pub parent: Option<NodeId>,
    /// Opaque storage for later passes (type inference, codegen); the
    /// parser never reads it.
    pub later_pass_slot: Option<u64>,
}

impl AstNode {
    pub fn new(kind: NodeKind, line: u32, column: u32, token_index: usize) -> Self {
        AstNode {
            kind,
            line,
            column,
            token_index,
            parent: None,
            later_pass_slot: None,
        }
    }

    /// True for the node kinds the l-value check (§4.5) accepts as a
    /// terminal: a bare identifier reference. Compound l-values are
    /// checked recursively by the statement parser, not here.
    pub fn is_identifier_ref(&self) -> bool {
        matches!(self.kind, NodeKind::IdentifierRef(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_operator_precedence_is_attribute_call_index_tightest() {
        assert!(BinOp::Call.precedence() > BinOp::Multiply.precedence());
        assert!(BinOp::Multiply.precedence() > BinOp::Add.precedence());
        assert!(BinOp::Add.precedence() > BinOp::And.precedence());
        assert!(BinOp::And.precedence() > BinOp::Or.precedence());
    }

    #[test]
    fn only_attribute_call_index_are_lvalue_capable() {
        assert!(BinOp::AttributeByIdentifier.is_lvalue_capable());
        assert!(BinOp::Call.is_lvalue_capable());
        assert!(BinOp::IndexByExpression.is_lvalue_capable());
        assert!(!BinOp::Add.is_lvalue_capable());
        assert!(!BinOp::Equal.is_lvalue_capable());
    }

    #[test]
    fn func_modifiers_are_independent_bits() {
        let m = FuncModifiers::PARALLEL | FuncModifiers::DEPRECATED;
        assert!(m.contains(FuncModifiers::PARALLEL));
        assert!(!m.contains(FuncModifiers::NOPARALLEL));
    }
}
