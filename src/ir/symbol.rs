// SPDX-License-Identifier: BSD-3-Clause
use serde::{Deserialize, Serialize};

use super::expr::ExprId;
use super::types::TypeId;

#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SymbolId(pub u32);

impl SymbolId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Storage {
    Local,
    Param,
    /// File-scope `static`.
    Static,
    Global,
}

impl Storage {
    #[inline]
    pub fn is_toplevel(self) -> bool {
        matches!(self, Storage::Static | Storage::Global)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub ty: TypeId,
    pub storage: Storage,
    /// Introduced by the compiler (macro temporaries such as `_res`).
    #[serde(default)]
    pub temporary: bool,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stmt {
    Expr(ExprId),
    If {
        cond: ExprId,
        then: Vec<Stmt>,
        #[serde(default)]
        otherwise: Vec<Stmt>,
    },
    While {
        cond: ExprId,
        body: Vec<Stmt>,
    },
    Return(Option<ExprId>),
    Block(Vec<Stmt>),
}

impl Stmt {
    pub(crate) fn exprs(&self, out: &mut Vec<ExprId>) {
        match self {
            Stmt::Expr(e) => out.push(*e),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                out.push(*cond);
                then.iter().for_each(|s| s.exprs(out));
                otherwise.iter().for_each(|s| s.exprs(out));
            }
            Stmt::While { cond, body } => {
                out.push(*cond);
                body.iter().for_each(|s| s.exprs(out));
            }
            Stmt::Return(e) => out.extend(e),
            Stmt::Block(b) => b.iter().for_each(|s| s.exprs(out)),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    pub params: Vec<SymbolId>,
    pub body: Vec<Stmt>,
}

impl Function {
    /// Position of `sym` among the parameters.
    pub fn param_index(&self, sym: SymbolId) -> Option<usize> {
        self.params.iter().position(|p| *p == sym)
    }
}
