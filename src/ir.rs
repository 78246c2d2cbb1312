// SPDX-License-Identifier: BSD-3-Clause
//! Representation of a translation unit that is amenable to analysis.
//!
//! The front end (parser, type checker and constant folder) is not part of
//! this crate; it hands over a [`UnitData`], usually as JSON. [`Unit::new`]
//! checks the data and precomputes what the analysis queries on every hook:
//! a canonical representative for every expression, so that structural
//! equivalence is a comparison of two ids, and a reference expression for
//! every symbol.
//!
//! Expressions are never owned by the analysis. Facts hold [`ExprId`] handles
//! into the unit's arena, valid for as long as the unit is borrowed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

mod builder;
pub use builder::*;
mod error;
pub use error::*;
mod expr;
pub use expr::*;
mod symbol;
pub use symbol::*;
mod types;
pub use types::*;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    pub file: String,
    #[serde(default)]
    pub types: Vec<Type>,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub exprs: Vec<Expr>,
    #[serde(default)]
    pub functions: Vec<Function>,
}

#[derive(Clone, Debug)]
pub struct Unit {
    data: UnitData,
    canonical: Vec<ExprId>,
    symbol_exprs: Vec<ExprId>,
}

// ------------------------------------------------------------------
// Construction

fn check_type(data: &UnitData, t: TypeId, what: &str) -> Result<(), Error> {
    if t.index() < data.types.len() {
        Ok(())
    } else {
        Err(Error(format!("{} refers to missing type {}", what, t.0)))
    }
}

fn check_symbol(data: &UnitData, s: SymbolId, what: &str) -> Result<(), Error> {
    if s.index() < data.symbols.len() {
        Ok(())
    } else {
        Err(Error(format!("{} refers to missing symbol {}", what, s.0)))
    }
}

/// A type that contains itself, other than through a pointer, has no size.
fn check_type_cycles(types: &[Type]) -> Result<(), Error> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Open,
        Done,
    }
    let mut marks = vec![Mark::New; types.len()];
    for root in 0..types.len() {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::Open;
        let mut stack = vec![(root, types[root].contents(), 0)];
        while let Some((t, contents, next)) = stack.last_mut() {
            let Some(child) = contents.get(*next).map(|c| c.index()) else {
                marks[*t] = Mark::Done;
                stack.pop();
                continue;
            };
            *next += 1;
            match marks[child] {
                Mark::Open => {
                    return Err(Error(format!("type {} contains itself", child)));
                }
                Mark::Done => (),
                Mark::New => {
                    marks[child] = Mark::Open;
                    stack.push((child, types[child].contents(), 0));
                }
            }
        }
    }
    Ok(())
}

impl Unit {
    pub fn new(mut data: UnitData) -> Result<Self, Error> {
        for (i, ty) in data.types.iter().enumerate() {
            for child in ty.children() {
                check_type(&data, child, &format!("type {}", i))?;
            }
        }
        check_type_cycles(&data.types)?;
        for (i, sym) in data.symbols.iter().enumerate() {
            check_type(&data, sym.ty, &format!("symbol {} ({})", i, sym.name))?;
        }
        for (i, e) in data.exprs.iter().enumerate() {
            let what = format!("expression {}", i);
            for child in e.kind.children() {
                if child.index() >= i {
                    return Err(Error(format!(
                        "{} refers forward to expression {}",
                        what, child.0
                    )));
                }
            }
            match &e.kind {
                ExprKind::Symbol(s) => check_symbol(&data, *s, &what)?,
                ExprKind::StmtExpr { temp, .. } => check_symbol(&data, *temp, &what)?,
                ExprKind::Sizeof(t) | ExprKind::Cast { ty: t, .. } => {
                    check_type(&data, *t, &what)?
                }
                _ => (),
            }
            if let Some(t) = e.ty {
                check_type(&data, t, &what)?;
            }
        }
        let n_exprs = data.exprs.len();
        for f in &data.functions {
            for p in &f.params {
                check_symbol(&data, *p, &format!("function {}", f.name))?;
                if data.symbols[p.index()].storage != Storage::Param {
                    return Err(Error(format!(
                        "parameter {} of {} is not declared as a parameter",
                        data.symbols[p.index()].name,
                        f.name
                    )));
                }
            }
            let mut used = Vec::new();
            f.body.iter().for_each(|s| s.exprs(&mut used));
            if let Some(bad) = used.iter().find(|e| e.index() >= n_exprs) {
                return Err(Error(format!(
                    "function {} refers to missing expression {}",
                    f.name, bad.0
                )));
            }
        }

        // Every symbol gets a reference expression; interprocedural seeding
        // binds capacities to parameters that may never be mentioned.
        let mut symbol_exprs: Vec<Option<ExprId>> = vec![None; data.symbols.len()];
        for (i, e) in data.exprs.iter().enumerate() {
            if let (ExprKind::Symbol(s), None) = (&e.kind, e.ty) {
                symbol_exprs[s.index()].get_or_insert(ExprId(i as u32));
            }
        }
        let symbol_exprs = symbol_exprs
            .into_iter()
            .enumerate()
            .map(|(s, e)| {
                e.unwrap_or_else(|| {
                    data.exprs
                        .push(Expr::from(ExprKind::Symbol(SymbolId(s as u32))));
                    ExprId((data.exprs.len() - 1) as u32)
                })
            })
            .collect();

        let mut canonical: Vec<ExprId> = Vec::with_capacity(data.exprs.len());
        let mut seen: HashMap<ExprKind, ExprId> = HashMap::with_capacity(data.exprs.len());
        for (i, e) in data.exprs.iter().enumerate() {
            let id = ExprId(i as u32);
            let canon = match &e.kind {
                ExprKind::Cast { inner, .. } => canonical[inner.index()],
                kind if kind.has_side_effects() => id,
                kind => {
                    let key = kind.map_children(|c| canonical[c.index()]);
                    *seen.entry(key).or_insert(id)
                }
            };
            canonical.push(canon);
        }

        Ok(Unit {
            data,
            canonical,
            symbol_exprs,
        })
    }

    pub fn from_json(s: &str) -> Result<Self, Error> {
        let data: UnitData =
            serde_json::from_str(s).map_err(|e| Error(format!("bad JSON: {}", e)))?;
        Unit::new(data)
    }

    #[inline]
    pub fn data(&self) -> &UnitData {
        &self.data
    }
}

// ------------------------------------------------------------------
// Lookups

impl Unit {
    #[inline]
    pub fn file(&self) -> &str {
        &self.data.file
    }

    #[inline]
    pub fn functions(&self) -> &[Function] {
        &self.data.functions
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.data.functions.iter().find(|f| f.name == name)
    }

    #[inline]
    pub fn expr(&self, e: ExprId) -> &Expr {
        &self.data.exprs[e.index()]
    }

    #[inline]
    pub fn kind(&self, e: ExprId) -> &ExprKind {
        &self.data.exprs[e.index()].kind
    }

    #[inline]
    pub fn symbol(&self, s: SymbolId) -> &Symbol {
        &self.data.symbols[s.index()]
    }

    #[inline]
    pub fn ty(&self, t: TypeId) -> &Type {
        &self.data.types[t.index()]
    }

    #[inline]
    pub fn symbol_expr(&self, s: SymbolId) -> ExprId {
        self.symbol_exprs[s.index()]
    }

    /// Removes casts.
    pub fn strip(&self, mut e: ExprId) -> ExprId {
        while let ExprKind::Cast { inner, .. } = self.kind(e) {
            e = *inner;
        }
        e
    }

    #[inline]
    pub fn canonical(&self, e: ExprId) -> ExprId {
        self.canonical[e.index()]
    }

    /// Structural equivalence modulo casts. Expressions with side effects are
    /// only equivalent to themselves.
    #[inline]
    pub fn equiv(&self, a: ExprId, b: ExprId) -> bool {
        self.canonical(a) == self.canonical(b)
    }

    /// The symbol `e` names, if it is a plain variable reference.
    pub fn as_symbol(&self, e: ExprId) -> Option<SymbolId> {
        match self.kind(self.strip(e)) {
            ExprKind::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    /// Argument `n` of the call `e`.
    pub fn call_arg(&self, e: ExprId, n: usize) -> Option<ExprId> {
        match self.kind(self.strip(e)) {
            ExprKind::Call { args, .. } => args.get(n).copied(),
            _ => None,
        }
    }
}

// ------------------------------------------------------------------
// Types

impl Unit {
    pub fn pointee(&self, t: TypeId) -> Option<TypeId> {
        match self.ty(t) {
            Type::Ptr(p) => Some(*p),
            Type::Array { elem, .. } => Some(*elem),
            _ => None,
        }
    }

    pub fn type_bytes(&self, t: TypeId) -> Option<u64> {
        match self.ty(t) {
            Type::Void => None,
            Type::Int { bytes, .. } => Some(*bytes),
            Type::Ptr(_) => Some(POINTER_BYTES),
            Type::Array { elem, len } => match len {
                None | Some(0) => Some(0),
                Some(n) => self.type_bytes(*elem)?.checked_mul(*n),
            },
            Type::Struct { fields, .. } => fields
                .iter()
                .try_fold(0u64, |total, f| total.checked_add(self.type_bytes(f.ty)?)),
        }
    }

    /// Best-effort static type of `e`; `None` for integer arithmetic the
    /// analysis never needs the type of.
    pub fn type_of(&self, e: ExprId) -> Option<TypeId> {
        let expr = self.expr(e);
        if let Some(t) = expr.ty {
            return Some(t);
        }
        match &expr.kind {
            ExprKind::Value(_)
            | ExprKind::Sizeof(_)
            | ExprKind::Compare { .. }
            | ExprKind::Logical { .. }
            | ExprKind::Call { .. }
            | ExprKind::AddrOf(_) => None,
            ExprKind::Symbol(s) => Some(self.symbol(*s).ty),
            ExprKind::Binop { left, right, .. } => {
                let l = self.type_of(*left);
                let r = self.type_of(*right);
                match (l, r) {
                    (Some(l), _) if self.ty(l).is_pointer_like() => Some(l),
                    (_, Some(r)) if self.ty(r).is_pointer_like() => Some(r),
                    (l, _) => l,
                }
            }
            ExprKind::Assign { left, .. } => self.type_of(*left),
            ExprKind::Index { base, .. } => self.type_of(*base).and_then(|t| self.pointee(t)),
            ExprKind::Deref(inner) => self.type_of(*inner).and_then(|t| self.pointee(t)),
            ExprKind::Member {
                base,
                deref,
                member,
            } => {
                let mut t = self.type_of(*base)?;
                if *deref {
                    t = self.pointee(t)?;
                }
                self.ty(t).field(member).map(|f| f.ty)
            }
            ExprKind::Cast { ty, .. } => Some(*ty),
            ExprKind::Step { inner, .. } => self.type_of(*inner),
            ExprKind::StmtExpr { value, .. } => self.type_of(*value),
        }
    }

    #[inline]
    pub fn is_pointer(&self, e: ExprId) -> bool {
        self.type_of(e)
            .map(|t| self.ty(t).is_pointer_like())
            .unwrap_or(false)
    }

    /// Size of the element `e` points at, when `e` is a pointer or array with
    /// a sized element type.
    pub fn bytes_per_element(&self, e: ExprId) -> Option<u64> {
        let t = self.type_of(e)?;
        let elem = self.pointee(t)?;
        self.type_bytes(elem).filter(|b| *b > 0)
    }

    pub fn show_type(&self, t: TypeId) -> String {
        match self.ty(t) {
            Type::Void => "void".to_string(),
            Type::Int { bytes, signed } => {
                let base = match bytes {
                    1 => "char",
                    2 => "short",
                    4 => "int",
                    _ => "long",
                };
                if *signed {
                    base.to_string()
                } else {
                    format!("unsigned {}", base)
                }
            }
            Type::Ptr(p) => format!("{}*", self.show_type(*p)),
            Type::Array { elem, len } => match len {
                Some(n) => format!("{}[{}]", self.show_type(*elem), n),
                None => format!("{}[]", self.show_type(*elem)),
            },
            Type::Struct { name, .. } => {
                format!("struct {}", name.as_deref().unwrap_or("<anonymous>"))
            }
        }
    }
}

// ------------------------------------------------------------------
// Printing

impl Unit {
    /// [`Unit::show`], parenthesized unless `e` binds tighter than any operator.
    pub fn show_operand(&self, e: ExprId) -> String {
        match self.kind(self.strip(e)) {
            ExprKind::Binop { .. }
            | ExprKind::Compare { .. }
            | ExprKind::Logical { .. }
            | ExprKind::Assign { .. } => format!("({})", self.show(e)),
            _ => self.show(e),
        }
    }

    /// C-like rendering used in diagnostics. Casts are not shown.
    pub fn show(&self, e: ExprId) -> String {
        match self.kind(e) {
            ExprKind::Value(v) => v.to_string(),
            ExprKind::Symbol(s) => self.symbol(*s).name.clone(),
            ExprKind::Sizeof(t) => format!("sizeof({})", self.show_type(*t)),
            ExprKind::Binop { op, left, right } => format!(
                "{} {} {}",
                self.show_operand(*left),
                op.symbol(),
                self.show_operand(*right)
            ),
            ExprKind::Compare { op, left, right } => format!(
                "{} {} {}",
                self.show_operand(*left),
                op.symbol(),
                self.show_operand(*right)
            ),
            ExprKind::Logical { op, left, right } => format!(
                "{} {} {}",
                self.show_operand(*left),
                match op {
                    LogicalOp::And => "&&",
                    LogicalOp::Or => "||",
                },
                self.show_operand(*right)
            ),
            ExprKind::Assign {
                compound,
                left,
                right,
            } => format!(
                "{} {}= {}",
                self.show(*left),
                compound.map(BinOp::symbol).unwrap_or(""),
                self.show(*right)
            ),
            ExprKind::Call { func, args } => format!(
                "{}({})",
                func,
                args.iter()
                    .map(|a| self.show(*a))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ExprKind::Index { base, offset } => {
                format!("{}[{}]", self.show_operand(*base), self.show(*offset))
            }
            ExprKind::Deref(inner) => format!("*{}", self.show_operand(*inner)),
            ExprKind::AddrOf(inner) => format!("&{}", self.show_operand(*inner)),
            ExprKind::Member {
                base,
                deref,
                member,
            } => format!(
                "{}{}{}",
                self.show_operand(*base),
                if *deref { "->" } else { "." },
                member
            ),
            ExprKind::Cast { inner, .. } => self.show(*inner),
            ExprKind::Step { op, post, inner } => {
                let op = match op {
                    StepOp::Inc => "++",
                    StepOp::Dec => "--",
                };
                if *post {
                    format!("{}{}", self.show_operand(*inner), op)
                } else {
                    format!("{}{}", op, self.show_operand(*inner))
                }
            }
            ExprKind::StmtExpr { value, .. } => format!("({{...; {}}})", self.show(*value)),
        }
    }
}
