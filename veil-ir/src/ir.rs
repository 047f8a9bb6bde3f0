#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use miette::SourceSpan;

pub type Span = SourceSpan;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcId(pub u32);

impl LocalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
    Bool,
    Array { elem: Box<Type>, len: u64 },
}

impl Type {
    pub fn array(elem: Type, len: u64) -> Type {
        Type::Array {
            elem: Box::new(elem),
            len,
        }
    }

    /// Storage size in bytes. Arrays are element size times length with no
    /// padding or alignment applied (a known limitation of this model).
    pub fn byte_size(&self) -> u64 {
        match self {
            Type::Int => 8,
            Type::Bool => 1,
            Type::Array { elem, len } => elem.byte_size() * len,
        }
    }

    /// Element type of an array, `None` for scalar types.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    /// Static length of an array, `None` for scalar types.
    pub fn length(&self) -> Option<u64> {
        match self {
            Type::Array { len, .. } => Some(*len),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Bool => write!(f, "Bool"),
            Type::Array { elem, len } => write!(f, "[{elem}; {len}]"),
        }
    }
}

/// A declared variable or one of its incarnations.
///
/// Variables are immutable value records: a new version of a variable is
/// always a freshly constructed record, never an in-place update. Identity
/// is the globally unique `global` id; `qualified_name` disambiguates
/// shadowing across nested scopes.
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub qualified_name: String,
    pub ty: Type,
    pub global: GlobalId,
    pub local: LocalId,
    pub by_ref: bool,
    pub param_index: Option<u32>,
    pub proc: ProcId,
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.global == other.global
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.global.hash(state);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    And,
    Or,
    Implies,

    /// Array element read.
    Select,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TernaryOp {
    /// Functional array update: yields a new array value, never mutates.
    Store,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    IntLit(i64),
    BoolLit(bool),
    Var(Variable),
    Unary {
        op: UnaryOp,
        ty: Type,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        ty: Type,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        op: TernaryOp,
        ty: Type,
        first: Box<Expr>,
        second: Box<Expr>,
        third: Box<Expr>,
    },
}

impl Expr {
    pub fn int(value: i64, span: Span) -> Expr {
        Expr {
            span,
            kind: ExprKind::IntLit(value),
        }
    }

    pub fn bool(value: bool, span: Span) -> Expr {
        Expr {
            span,
            kind: ExprKind::BoolLit(value),
        }
    }

    pub fn var(var: Variable, span: Span) -> Expr {
        Expr {
            span,
            kind: ExprKind::Var(var),
        }
    }

    pub fn unary(op: UnaryOp, ty: Type, operand: Expr, span: Span) -> Expr {
        Expr {
            span,
            kind: ExprKind::Unary {
                op,
                ty,
                operand: Box::new(operand),
            },
        }
    }

    pub fn not(operand: Expr, span: Span) -> Expr {
        Expr::unary(UnaryOp::Not, Type::Bool, operand, span)
    }

    pub fn binary(op: BinOp, ty: Type, left: Expr, right: Expr, span: Span) -> Expr {
        Expr {
            span,
            kind: ExprKind::Binary {
                op,
                ty,
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// Array element read; `elem_ty` is the static type of the element.
    pub fn select(base: Expr, index: Expr, elem_ty: Type, span: Span) -> Expr {
        Expr::binary(BinOp::Select, elem_ty, base, index, span)
    }

    /// Functional array update; `array_ty` is the type of the updated array.
    pub fn store(base: Expr, index: Expr, value: Expr, array_ty: Type, span: Span) -> Expr {
        Expr {
            span,
            kind: ExprKind::Ternary {
                op: TernaryOp::Store,
                ty: array_ty,
                first: Box::new(base),
                second: Box::new(index),
                third: Box::new(value),
            },
        }
    }

    pub fn and(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::binary(BinOp::And, Type::Bool, left, right, span)
    }

    pub fn le(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::binary(BinOp::Le, Type::Bool, left, right, span)
    }

    pub fn lt(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::binary(BinOp::Lt, Type::Bool, left, right, span)
    }

    pub fn implies(left: Expr, right: Expr, span: Span) -> Expr {
        Expr::binary(BinOp::Implies, Type::Bool, left, right, span)
    }

    /// Static result type of the node. Compound nodes carry it; literals
    /// and variable references derive it.
    pub fn ty(&self) -> Type {
        match &self.kind {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::Var(v) => v.ty.clone(),
            ExprKind::Unary { ty, .. } => ty.clone(),
            ExprKind::Binary { ty, .. } => ty.clone(),
            ExprKind::Ternary { ty, .. } => ty.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign(AssignStmt),
    Assert(AssertStmt),
    Assume(AssumeStmt),
    If(IfStmt),
    RepeatUntil(RepeatUntilStmt),
    Call(CallStmt),
    ArrayStore(ArrayStoreStmt),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssignStmt {
    pub span: Span,
    pub target: Variable,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssertStmt {
    pub span: Span,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssumeStmt {
    pub span: Span,
    pub expr: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub span: Span,
    pub cond: Expr,
    pub then_body: Vec<Stmt>,
    pub else_body: Vec<Stmt>,
}

/// Post-condition loop: the body runs at least once and the exit condition
/// is tested at the bottom. The invariant must hold on entry and be
/// re-established by every iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct RepeatUntilStmt {
    pub span: Span,
    pub invariant: Expr,
    pub body: Vec<Stmt>,
    pub cond: Expr,
}

/// Call of a procedure through its signature only; callee bodies are never
/// traversed by this layer.
#[derive(Clone, Debug, PartialEq)]
pub struct CallStmt {
    pub span: Span,
    pub outs: Vec<Variable>,
    pub callee: Signature,
    pub args: Vec<Expr>,
}

/// In-place array write `base[index] := value`; `base` is either a plain
/// variable or a nested select chain ending in one.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayStoreStmt {
    pub span: Span,
    pub base: Expr,
    pub index: Expr,
    pub value: Expr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub name: String,
    pub qualified_name: String,
    pub params: Vec<Variable>,
    pub id: ProcId,
    pub depth: u32,
    /// Lookup-only relation to the enclosing procedure, not ownership.
    pub parent: Option<ProcId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Procedure {
    pub sig: Signature,
    pub body: Vec<Stmt>,
    /// Flat variable array, indexed by `LocalId`.
    pub vars: Vec<Variable>,
    /// Offsets into `vars` marking which slice becomes visible at each
    /// nesting level.
    pub scope_offsets: Vec<usize>,
    pub global_to_local: HashMap<GlobalId, LocalId>,
    /// True when the body contains no calls. Consumed downstream; carries
    /// no behavior here.
    pub is_leaf: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub procs: Vec<Procedure>,
    pub globals: Vec<Variable>,
}

impl Program {
    /// Largest global id in use anywhere in the program, if any variable
    /// exists at all.
    pub fn max_global_id(&self) -> Option<GlobalId> {
        self.globals
            .iter()
            .chain(self.procs.iter().flat_map(|p| p.vars.iter()))
            .map(|v| v.global)
            .max()
    }
}
