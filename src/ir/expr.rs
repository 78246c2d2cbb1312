// SPDX-License-Identifier: BSD-3-Clause
use serde::{Deserialize, Serialize};

use super::symbol::SymbolId;
use super::types::TypeId;

#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ExprId(pub u32);

impl ExprId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ExprId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
        }
    }

    pub fn fold(self, l: i64, r: i64) -> Option<i64> {
        match self {
            BinOp::Add => l.checked_add(r),
            BinOp::Sub => l.checked_sub(r),
            BinOp::Mul => l.checked_mul(r),
            BinOp::Div => l.checked_div(r),
            BinOp::Rem => l.checked_rem(r),
            BinOp::Shl => u32::try_from(r).ok().and_then(|r| l.checked_shl(r)),
            BinOp::Shr => u32::try_from(r).ok().and_then(|r| l.checked_shr(r)),
            BinOp::And => Some(l & r),
            BinOp::Or => Some(l | r),
            BinOp::Xor => Some(l ^ r),
        }
    }
}

/// Comparison operators. The `U*` variants are the unsigned forms.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ULt,
    ULe,
    UGt,
    UGe,
}

impl CmpOp {
    /// The operator that holds when the operands are swapped.
    pub fn flip(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            CmpOp::ULt => CmpOp::UGt,
            CmpOp::ULe => CmpOp::UGe,
            CmpOp::UGt => CmpOp::ULt,
            CmpOp::UGe => CmpOp::ULe,
        }
    }

    /// The operator that holds on the false edge of a branch.
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::ULt => CmpOp::UGe,
            CmpOp::ULe => CmpOp::UGt,
            CmpOp::UGt => CmpOp::ULe,
            CmpOp::UGe => CmpOp::ULt,
        }
    }

    pub fn fold(self, l: i64, r: i64) -> bool {
        match self {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
            CmpOp::ULt => (l as u64) < (r as u64),
            CmpOp::ULe => (l as u64) <= (r as u64),
            CmpOp::UGt => (l as u64) > (r as u64),
            CmpOp::UGe => (l as u64) >= (r as u64),
        }
    }

    #[inline]
    pub fn is_less(self) -> bool {
        matches!(self, CmpOp::Lt | CmpOp::Le | CmpOp::ULt | CmpOp::ULe)
    }

    #[inline]
    pub fn is_greater(self) -> bool {
        matches!(self, CmpOp::Gt | CmpOp::Ge | CmpOp::UGt | CmpOp::UGe)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::ULt => "<u",
            CmpOp::ULe => "<=u",
            CmpOp::UGt => ">u",
            CmpOp::UGe => ">=u",
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOp {
    Inc,
    Dec,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExprKind {
    Value(i64),
    Symbol(SymbolId),
    Sizeof(TypeId),
    Binop {
        op: BinOp,
        left: ExprId,
        right: ExprId,
    },
    Compare {
        op: CmpOp,
        left: ExprId,
        right: ExprId,
    },
    Logical {
        op: LogicalOp,
        left: ExprId,
        right: ExprId,
    },
    /// `compound` is the operator of `op=` forms, `None` for plain `=`.
    Assign {
        compound: Option<BinOp>,
        left: ExprId,
        right: ExprId,
    },
    Call {
        func: String,
        args: Vec<ExprId>,
    },
    Index {
        base: ExprId,
        offset: ExprId,
    },
    Deref(ExprId),
    AddrOf(ExprId),
    /// `base->member` when `deref`, `base.member` otherwise.
    Member {
        base: ExprId,
        deref: bool,
        member: String,
    },
    Cast {
        ty: TypeId,
        inner: ExprId,
    },
    Step {
        op: StepOp,
        post: bool,
        inner: ExprId,
    },
    /// Compiler-generated `({ T temp; temp = init; value })` wrapper.
    StmtExpr {
        temp: SymbolId,
        init: ExprId,
        value: ExprId,
    },
}

impl ExprKind {
    pub fn children(&self) -> Vec<ExprId> {
        match self {
            ExprKind::Value(_) | ExprKind::Symbol(_) | ExprKind::Sizeof(_) => Vec::new(),
            ExprKind::Binop { left, right, .. }
            | ExprKind::Compare { left, right, .. }
            | ExprKind::Logical { left, right, .. }
            | ExprKind::Assign { left, right, .. } => vec![*left, *right],
            ExprKind::Call { args, .. } => args.clone(),
            ExprKind::Index { base, offset } => vec![*base, *offset],
            ExprKind::Deref(e) | ExprKind::AddrOf(e) => vec![*e],
            ExprKind::Member { base, .. } => vec![*base],
            ExprKind::Cast { inner, .. } | ExprKind::Step { inner, .. } => vec![*inner],
            ExprKind::StmtExpr { init, value, .. } => vec![*init, *value],
        }
    }

    /// Rebuilds the node with every child replaced by `f(child)`.
    pub(crate) fn map_children(&self, f: impl Fn(ExprId) -> ExprId) -> ExprKind {
        match self {
            ExprKind::Value(_) | ExprKind::Symbol(_) | ExprKind::Sizeof(_) => self.clone(),
            ExprKind::Binop { op, left, right } => ExprKind::Binop {
                op: *op,
                left: f(*left),
                right: f(*right),
            },
            ExprKind::Compare { op, left, right } => ExprKind::Compare {
                op: *op,
                left: f(*left),
                right: f(*right),
            },
            ExprKind::Logical { op, left, right } => ExprKind::Logical {
                op: *op,
                left: f(*left),
                right: f(*right),
            },
            ExprKind::Assign {
                compound,
                left,
                right,
            } => ExprKind::Assign {
                compound: *compound,
                left: f(*left),
                right: f(*right),
            },
            ExprKind::Call { func, args } => ExprKind::Call {
                func: func.clone(),
                args: args.iter().copied().map(&f).collect(),
            },
            ExprKind::Index { base, offset } => ExprKind::Index {
                base: f(*base),
                offset: f(*offset),
            },
            ExprKind::Deref(e) => ExprKind::Deref(f(*e)),
            ExprKind::AddrOf(e) => ExprKind::AddrOf(f(*e)),
            ExprKind::Member {
                base,
                deref,
                member,
            } => ExprKind::Member {
                base: f(*base),
                deref: *deref,
                member: member.clone(),
            },
            ExprKind::Cast { ty, inner } => ExprKind::Cast {
                ty: *ty,
                inner: f(*inner),
            },
            ExprKind::Step { op, post, inner } => ExprKind::Step {
                op: *op,
                post: *post,
                inner: f(*inner),
            },
            ExprKind::StmtExpr { temp, init, value } => ExprKind::StmtExpr {
                temp: *temp,
                init: f(*init),
                value: f(*value),
            },
        }
    }

    /// Evaluating the node may write memory or call out.
    #[inline]
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            ExprKind::Assign { .. }
                | ExprKind::Call { .. }
                | ExprKind::Step { .. }
                | ExprKind::StmtExpr { .. }
        )
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    /// Declared result type, when the front end knows better than inference
    /// (e.g. the return type of a call).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeId>,
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr { kind, ty: None }
    }
}
