// SPDX-License-Identifier: BSD-3-Clause
//! Path-sensitive walk of one function that drives a set of [`Hooks`].
//!
//! The walk is a single depth-first pass over structured statements. Paths
//! fork at `if` and `while` (and at `&&`/`||`), and are joined where control
//! flow merges. A `while` body is walked once. Unreachable paths are `None`.
//!
//! Per expression, hooks fire after the sub-expressions: the call hook after
//! the arguments, the assignment hook after both sides, then the modification
//! hook for the written place (unless a hook asked to ignore exactly that
//! write), then the oracle learns about the write.

use std::fmt::Display;

use tracing::{trace, trace_span};

use crate::{
    ir::{ExprId, ExprKind, Function, LogicalOp, Stmt, Unit},
    oracle::{Oracle, Values},
    place::Place,
    store::FactStore,
};

/// Returned by a hook that just established a fact through the write `.0`;
/// the modification hook is skipped for that write only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IgnoreWrite(pub ExprId);

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path<S> {
    pub values: Values,
    pub state: S,
}

impl<S> Path<S> {
    #[inline]
    pub fn oracle<'a>(&'a self, unit: &'a Unit) -> Oracle<'a> {
        Oracle::new(unit, &self.values)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Diagnostic {
    pub file: String,
    pub function: String,
    pub expr: ExprId,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}() warn: {}", self.file, self.function, self.message)
    }
}

/// Everything a hook may touch besides the path.
pub struct Cx<'a> {
    pub unit: &'a Unit,
    pub function: &'a Function,
    pub store: &'a mut dyn FactStore,
    pub diagnostics: &'a mut Vec<Diagnostic>,
}

impl Cx<'_> {
    pub fn warn(&mut self, expr: ExprId, message: String) {
        let d = Diagnostic {
            file: self.unit.file().to_string(),
            function: self.function.name.clone(),
            expr,
            message,
        };
        if !self.diagnostics.contains(&d) {
            self.diagnostics.push(d);
        }
    }
}

#[allow(unused_variables)]
pub trait Hooks {
    type State: Clone + Default;

    /// Merges the states of two paths at a join point.
    fn join(&self, unit: &Unit, a: Self::State, b: Self::State) -> Self::State;

    fn function_start(&mut self, cx: &mut Cx<'_>, path: &mut Path<Self::State>) {}

    /// `expr` is an assignment; `outer` is the assignment that consumes the
    /// statement expression `expr` initializes, if any.
    fn assignment(
        &mut self,
        cx: &mut Cx<'_>,
        path: &mut Path<Self::State>,
        expr: ExprId,
        outer: Option<ExprId>,
    ) -> Option<IgnoreWrite> {
        None
    }

    /// `expr` is a call; `assign` is the assignment whose right side it is.
    fn call(
        &mut self,
        cx: &mut Cx<'_>,
        path: &mut Path<Self::State>,
        expr: ExprId,
        assign: Option<ExprId>,
        outer: Option<ExprId>,
    ) -> Option<IgnoreWrite> {
        None
    }

    /// `place` was written by the expression `write`.
    fn modified(
        &mut self,
        cx: &mut Cx<'_>,
        path: &mut Path<Self::State>,
        place: &Place,
        write: ExprId,
    ) {
    }

    /// `expr` is an index or a dereference; `address_only` when its address
    /// is taken and no memory is touched.
    fn access(
        &mut self,
        cx: &mut Cx<'_>,
        path: &mut Path<Self::State>,
        expr: ExprId,
        address_only: bool,
    ) {
    }

    /// `exit` is the join of every path leaving the function.
    fn function_end(&mut self, cx: &mut Cx<'_>, exit: Option<&Path<Self::State>>) {}
}

#[derive(Clone, Copy, Debug, Default)]
struct Ctx {
    assign: Option<ExprId>,
    outer: Option<ExprId>,
    address_only: bool,
}

struct Walker<'h, 'a, H: Hooks> {
    hooks: &'h mut H,
    cx: Cx<'a>,
    returns: Vec<Path<H::State>>,
    /// Writes to skip in the statement being walked.
    pending: Vec<IgnoreWrite>,
}

fn join_paths<H: Hooks>(
    hooks: &H,
    unit: &Unit,
    a: Option<Path<H::State>>,
    b: Option<Path<H::State>>,
) -> Option<Path<H::State>> {
    match (a, b) {
        (None, p) | (p, None) => p,
        (Some(a), Some(b)) => Some(Path {
            values: a.values.join(b.values),
            state: hooks.join(unit, a.state, b.state),
        }),
    }
}

impl<H: Hooks> Walker<'_, '_, H> {
    fn write(
        &mut self,
        path: &mut Path<H::State>,
        target: ExprId,
        write: ExprId,
        value: Option<ExprId>,
    ) {
        let unit = self.cx.unit;
        let Some(place) = Place::of(unit, target) else {
            return;
        };
        if self.pending.contains(&IgnoreWrite(write)) {
            trace!("ignoring write {} to {}", write, place.show(unit));
        } else {
            self.hooks.modified(&mut self.cx, path, &place, write);
        }
        path.values.write(unit, target, &place, value);
    }

    fn expr(&mut self, path: &mut Path<H::State>, e: ExprId, ctx: Ctx) {
        let unit = self.cx.unit;
        match unit.kind(e) {
            ExprKind::Value(_) | ExprKind::Symbol(_) | ExprKind::Sizeof(_) => (),
            ExprKind::Cast { inner, .. } => self.expr(path, *inner, ctx),
            ExprKind::Binop { left, right, .. } | ExprKind::Compare { left, right, .. } => {
                self.expr(path, *left, Ctx::default());
                self.expr(path, *right, Ctx::default());
            }
            ExprKind::Logical { op, left, right } => {
                self.expr(path, *left, Ctx::default());
                let mut rhs = path.clone();
                rhs.values
                    .assume(unit, *left, matches!(op, LogicalOp::And));
                self.expr(&mut rhs, *right, Ctx::default());
                let skipped = std::mem::take(path);
                if let Some(joined) = join_paths(self.hooks, unit, Some(skipped), Some(rhs)) {
                    *path = joined;
                }
            }
            ExprKind::Assign {
                compound,
                left,
                right,
            } => {
                self.expr(path, *left, Ctx::default());
                self.expr(
                    path,
                    *right,
                    Ctx {
                        assign: Some(e),
                        outer: ctx.outer,
                        address_only: false,
                    },
                );
                if let Some(token) = self.hooks.assignment(&mut self.cx, path, e, ctx.outer) {
                    self.pending.push(token);
                }
                let value = if compound.is_none() { Some(*right) } else { None };
                self.write(path, *left, e, value);
            }
            ExprKind::Call { args, .. } => {
                for a in args {
                    self.expr(path, *a, Ctx::default());
                }
                if let Some(token) = self.hooks.call(&mut self.cx, path, e, ctx.assign, ctx.outer)
                {
                    self.pending.push(token);
                }
                for a in args {
                    if let ExprKind::AddrOf(inner) = unit.kind(unit.strip(*a)) {
                        self.write(path, *inner, e, None);
                    }
                }
            }
            ExprKind::Index { base, offset } => {
                self.expr(path, *base, Ctx::default());
                self.expr(path, *offset, Ctx::default());
                self.hooks.access(&mut self.cx, path, e, ctx.address_only);
            }
            ExprKind::Deref(inner) => {
                self.expr(path, *inner, Ctx::default());
                self.hooks.access(&mut self.cx, path, e, ctx.address_only);
            }
            ExprKind::AddrOf(inner) => self.expr(
                path,
                *inner,
                Ctx {
                    address_only: true,
                    ..Ctx::default()
                },
            ),
            ExprKind::Member { base, .. } => self.expr(path, *base, Ctx::default()),
            ExprKind::Step { inner, .. } => {
                self.expr(path, *inner, Ctx::default());
                self.write(path, *inner, e, None);
            }
            ExprKind::StmtExpr { init, value, .. } => {
                self.expr(
                    path,
                    *init,
                    Ctx {
                        outer: ctx.assign,
                        ..Ctx::default()
                    },
                );
                self.expr(path, *value, Ctx::default());
            }
        }
    }

    /// A full expression: write tokens don't outlive it.
    fn full_expr(&mut self, path: &mut Path<H::State>, e: ExprId) {
        self.expr(path, e, Ctx::default());
        self.pending.clear();
    }

    fn branch(
        &mut self,
        path: &Path<H::State>,
        cond: ExprId,
        truth: bool,
        body: &[Stmt],
    ) -> Option<Path<H::State>> {
        let mut p = path.clone();
        p.values.assume(self.cx.unit, cond, truth);
        self.stmts(Some(p), body)
    }

    fn stmt(&mut self, path: Option<Path<H::State>>, s: &Stmt) -> Option<Path<H::State>> {
        let mut path = path?;
        match s {
            Stmt::Expr(e) => {
                self.full_expr(&mut path, *e);
                Some(path)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                self.full_expr(&mut path, *cond);
                let t = self.branch(&path, *cond, true, then);
                let f = self.branch(&path, *cond, false, otherwise);
                join_paths(self.hooks, self.cx.unit, t, f)
            }
            Stmt::While { cond, body } => {
                self.full_expr(&mut path, *cond);
                let after_body = self.branch(&path, *cond, true, body);
                let mut exit = path;
                exit.values.assume(self.cx.unit, *cond, false);
                join_paths(self.hooks, self.cx.unit, Some(exit), after_body)
            }
            Stmt::Return(e) => {
                if let Some(e) = e {
                    self.full_expr(&mut path, *e);
                }
                self.returns.push(path);
                None
            }
            Stmt::Block(b) => self.stmts(Some(path), b),
        }
    }

    fn stmts(&mut self, mut path: Option<Path<H::State>>, body: &[Stmt]) -> Option<Path<H::State>> {
        for s in body {
            if path.is_none() {
                break;
            }
            path = self.stmt(path, s);
        }
        path
    }
}

/// Walks `function`, appending any warnings to `diagnostics`.
pub fn walk<H: Hooks>(
    hooks: &mut H,
    unit: &Unit,
    function: &Function,
    store: &mut dyn FactStore,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let _span = trace_span!("function", name = %function.name).entered();
    let mut walker = Walker {
        hooks,
        cx: Cx {
            unit,
            function,
            store,
            diagnostics,
        },
        returns: Vec::new(),
        pending: Vec::new(),
    };
    let mut entry = Path::default();
    walker.hooks.function_start(&mut walker.cx, &mut entry);
    let fallthrough = walker.stmts(Some(entry), &function.body);
    let returns = std::mem::take(&mut walker.returns);
    let exit = returns.into_iter().fold(fallthrough, |acc, p| {
        join_paths(walker.hooks, unit, acc, Some(p))
    });
    walker.hooks.function_end(&mut walker.cx, exit.as_ref());
}
