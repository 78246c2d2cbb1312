// SPDX-License-Identifier: BSD-3-Clause
//! Value oracle: constants, defining expressions and known comparisons along
//! the current path.
//!
//! This is deliberately not a range analysis. It answers three questions the
//! capacity tracker needs (what constant is this, what was this variable last
//! set to, and how do these two expressions compare) and nothing else.

use std::collections::BTreeSet;

use ascent::{ascent_run, Lattice};
use rustc_hash::FxHashMap;

use crate::{
    ir::{CmpOp, ExprId, ExprKind, LogicalOp, SymbolId, Unit},
    lattice::IntLattice,
    place::{references, Place},
};

/// `left op right`, over canonical expressions.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Comparison {
    pub left: ExprId,
    pub op: CmpOp,
    pub right: ExprId,
}

/// Per-path oracle state, duplicated at forks and joined at merges.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Values {
    consts: FxHashMap<SymbolId, IntLattice>,
    assigned: FxHashMap<SymbolId, ExprId>,
    comparisons: BTreeSet<Comparison>,
}

impl Values {
    pub fn join(mut self, other: Self) -> Self {
        self.comparisons = self
            .comparisons
            .intersection(&other.comparisons)
            .copied()
            .collect();
        self.consts = self
            .consts
            .into_iter()
            .filter_map(|(s, v)| {
                let joined = v.join(*other.consts.get(&s)?);
                joined.as_constant().map(|_| (s, joined))
            })
            .collect();
        self.assigned
            .retain(|s, e| other.assigned.get(s) == Some(e));
        self
    }

    fn record(&mut self, unit: &Unit, left: ExprId, op: CmpOp, right: ExprId) {
        let (left, right) = (unit.canonical(left), unit.canonical(right));
        if left != right {
            self.comparisons.insert(Comparison { left, op, right });
        }
    }

    /// Narrows the path by the outcome of the branch condition `cond`.
    pub fn assume(&mut self, unit: &Unit, cond: ExprId, truth: bool) {
        match unit.kind(unit.strip(cond)) {
            ExprKind::Compare { op, left, right } => {
                let op = if truth { *op } else { op.negate() };
                self.record(unit, *left, op, *right);
            }
            ExprKind::Logical {
                op: LogicalOp::And,
                left,
                right,
            } if truth => {
                self.assume(unit, *left, true);
                self.assume(unit, *right, true);
            }
            ExprKind::Logical {
                op: LogicalOp::Or,
                left,
                right,
            } if !truth => {
                self.assume(unit, *left, false);
                self.assume(unit, *right, false);
            }
            _ => (),
        }
    }

    /// Forgets what the write to `place` invalidated and, for plain
    /// assignments, records `target == value`.
    pub fn write(&mut self, unit: &Unit, target: ExprId, place: &Place, value: Option<ExprId>) {
        let constant = value.and_then(|v| Oracle::new(unit, self).implied_value(v));
        self.comparisons
            .retain(|c| !references(unit, c.left, place) && !references(unit, c.right, place));
        self.assigned.retain(|_, e| !references(unit, *e, place));
        if let Place::Var(s) = place {
            self.consts.remove(s);
            self.assigned.remove(s);
        }
        let value = match value {
            Some(v) if !references(unit, v, place) => v,
            _ => return,
        };
        self.record(unit, target, CmpOp::Eq, value);
        if let Place::Var(s) = place {
            self.assigned.insert(*s, value);
            if let Some(c) = constant {
                self.consts.insert(*s, IntLattice::constant(c));
            }
        }
    }

    pub fn comparisons(&self) -> impl Iterator<Item = &Comparison> {
        self.comparisons.iter()
    }
}

/// Read-only view of one path, handed to hooks.
#[derive(Clone, Copy, Debug)]
pub struct Oracle<'a> {
    unit: &'a Unit,
    values: &'a Values,
}

impl<'a> Oracle<'a> {
    #[inline]
    pub fn new(unit: &'a Unit, values: &'a Values) -> Self {
        Oracle { unit, values }
    }

    /// Compile-time constant value of `e`.
    pub fn value(&self, e: ExprId) -> Option<i64> {
        match self.unit.kind(e) {
            ExprKind::Value(v) => Some(*v),
            ExprKind::Sizeof(t) => self.unit.type_bytes(*t).and_then(|b| i64::try_from(b).ok()),
            ExprKind::Cast { inner, .. } => self.value(*inner),
            ExprKind::Binop { op, left, right } => op.fold(self.value(*left)?, self.value(*right)?),
            _ => None,
        }
    }

    /// Like [`Oracle::value`], but also uses constants known on this path.
    pub fn implied_value(&self, e: ExprId) -> Option<i64> {
        match self.unit.kind(e) {
            ExprKind::Symbol(s) => self.values.consts.get(s).and_then(IntLattice::as_constant),
            ExprKind::Cast { inner, .. } => self.implied_value(*inner),
            ExprKind::Binop { op, left, right } => {
                op.fold(self.implied_value(*left)?, self.implied_value(*right)?)
            }
            _ => self.value(e),
        }
    }

    /// Follows `a = b; b = <expr>;` chains back to the first non-variable
    /// defining expression.
    pub fn assigned_expr_recurse(&self, e: ExprId) -> Option<ExprId> {
        let mut current = e;
        let mut found = None;
        // Bounded: a chain can't be longer than the number of variables.
        for _ in 0..=self.values.assigned.len() {
            let s = self.unit.as_symbol(current)?;
            let next = *self.values.assigned.get(&s)?;
            found = Some(next);
            if self.unit.as_symbol(next).is_none() {
                break;
            }
            current = next;
        }
        found
    }

    /// How `a` relates to `b` on this path, if known.
    pub fn comparison(&self, a: ExprId, b: ExprId) -> Option<CmpOp> {
        let (ca, cb) = (self.unit.canonical(a), self.unit.canonical(b));
        if ca == cb {
            return Some(CmpOp::Eq);
        }
        if let (Some(x), Some(y)) = (self.implied_value(a), self.implied_value(b)) {
            return Some(match x.cmp(&y) {
                std::cmp::Ordering::Less => CmpOp::Lt,
                std::cmp::Ordering::Equal => CmpOp::Eq,
                std::cmp::Ordering::Greater => CmpOp::Gt,
            });
        }
        fn rank(op: CmpOp) -> u8 {
            match op {
                CmpOp::Eq => 0,
                CmpOp::Lt | CmpOp::ULt | CmpOp::Gt | CmpOp::UGt => 1,
                CmpOp::Le | CmpOp::ULe | CmpOp::Ge | CmpOp::UGe => 2,
                CmpOp::Ne => 3,
            }
        }
        self.values
            .comparisons
            .iter()
            .filter_map(|c| {
                if c.left == ca && c.right == cb {
                    Some(c.op)
                } else if c.left == cb && c.right == ca {
                    Some(c.op.flip())
                } else {
                    None
                }
            })
            .min_by_key(|op| rank(*op))
    }

    #[inline]
    pub fn known_equal(&self, a: ExprId, b: ExprId) -> bool {
        self.comparison(a, b) == Some(CmpOp::Eq)
    }

    /// Every expression transitively known equal to `e` (excluding `e`).
    pub fn equal_closure(&self, e: ExprId) -> Vec<ExprId> {
        let start = self.unit.canonical(e);
        let pairs: Vec<(ExprId, ExprId)> = self
            .values
            .comparisons
            .iter()
            .filter(|c| c.op == CmpOp::Eq)
            .map(|c| (c.left, c.right))
            .collect();
        if pairs.is_empty() {
            return Vec::new();
        }

        #[allow(clippy::clone_on_copy)]
        let outs = ascent_run! {
            relation equal(ExprId, ExprId);
            equal(a, b) <-- for (a, b) in pairs.iter().copied();
            equal(b, a) <-- equal(a, b);
            equal(a, c) <-- equal(a, b), equal(b, c);
        };

        let mut closure: Vec<ExprId> = outs
            .equal
            .into_iter()
            .filter(|(a, b)| *a == start && *b != start)
            .map(|(_, b)| b)
            .collect();
        closure.sort();
        closure.dedup();
        closure
    }
}

#[cfg(test)]
mod tests {
    use super::{Oracle, Values};
    use crate::{
        ir::{CmpOp, Stmt, UnitBuilder},
        place::Place,
    };

    #[test]
    fn branch_conditions_are_recorded_and_negated() {
        let mut b = UnitBuilder::new("t.c");
        let int = b.int(4, true);
        let i = b.local("i", int);
        let n = b.local("n", int);
        let ie = b.var(i);
        let ne = b.var(n);
        let cond = b.compare(CmpOp::Lt, ie, ne);
        b.function("f", false, vec![], vec![Stmt::Expr(cond)]);
        let unit = b.finish().unwrap();

        let mut then = Values::default();
        then.assume(&unit, cond, true);
        assert_eq!(Some(CmpOp::Lt), Oracle::new(&unit, &then).comparison(ie, ne));
        assert_eq!(Some(CmpOp::Gt), Oracle::new(&unit, &then).comparison(ne, ie));

        let mut otherwise = Values::default();
        otherwise.assume(&unit, cond, false);
        assert_eq!(Some(CmpOp::Ge), Oracle::new(&unit, &otherwise).comparison(ie, ne));

        let joined = then.join(otherwise);
        assert_eq!(None, Oracle::new(&unit, &joined).comparison(ie, ne));
    }

    #[test]
    fn writes_drop_stale_facts_and_record_equality() {
        let mut b = UnitBuilder::new("t.c");
        let int = b.int(4, true);
        let i = b.local("i", int);
        let n = b.local("n", int);
        let m = b.local("m", int);
        let ie = b.var(i);
        let ne = b.var(n);
        let me = b.var(m);
        let four = b.value(4);
        let prod = b.mul(ne, four);
        b.function("f", false, vec![], vec![]);
        let unit = b.finish().unwrap();

        let mut v = Values::default();
        v.write(&unit, ie, &Place::Var(i), Some(ne));
        v.write(&unit, me, &Place::Var(m), Some(prod));
        assert!(Oracle::new(&unit, &v).known_equal(ie, ne));
        assert_eq!(Some(prod), Oracle::new(&unit, &v).assigned_expr_recurse(me));

        v.write(&unit, ne, &Place::Var(n), None);
        assert!(!Oracle::new(&unit, &v).known_equal(ie, ne));
        assert_eq!(None, Oracle::new(&unit, &v).assigned_expr_recurse(me));
    }

    #[test]
    fn equality_is_transitive() {
        let mut b = UnitBuilder::new("t.c");
        let int = b.int(4, true);
        let i = b.local("i", int);
        let j = b.local("j", int);
        let n = b.local("n", int);
        let ie = b.var(i);
        let je = b.var(j);
        let ne = b.var(n);
        b.function("f", false, vec![], vec![]);
        let unit = b.finish().unwrap();

        let mut v = Values::default();
        v.write(&unit, je, &Place::Var(j), Some(ne));
        v.write(&unit, ie, &Place::Var(i), Some(je));
        let closure = Oracle::new(&unit, &v).equal_closure(ie);
        assert!(closure.contains(&unit.canonical(ne)));
        assert!(closure.contains(&unit.canonical(je)));
    }

    #[test]
    fn constants_fold_through_variables() {
        let mut b = UnitBuilder::new("t.c");
        let int = b.int(4, true);
        let n = b.local("n", int);
        let ne = b.var(n);
        let ten = b.value(10);
        let two = b.value(2);
        let prod = b.mul(ne, two);
        b.function("f", false, vec![], vec![]);
        let unit = b.finish().unwrap();

        let mut v = Values::default();
        v.write(&unit, ne, &Place::Var(n), Some(ten));
        let o = Oracle::new(&unit, &v);
        assert_eq!(None, o.value(prod));
        assert_eq!(Some(20), o.implied_value(prod));
    }
}
