// SPDX-License-Identifier: BSD-3-Clause
//! Interprocedural summaries: recording how call arguments relate, seeding
//! parameter facts from what callers recorded, and applying facts a callee
//! guarantees for all of its callers.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::{
    engine::{Cx, Path},
    ir::{ExprId, ExprKind, Function, Stmt, SymbolId, Unit},
    limit::{LimitKind, Relation},
    place::Place,
    store::{Caller, CallSite, FunctionKey, Origin, SummaryRow},
};

use super::{
    access::size_variable,
    capacity::{BufState, Capacity, Unmatched},
    recognize::match_size_binop,
};

type P = Path<BufState>;

/// A summary row's relation and limit kind, or `None` if it is malformed.
fn parse_row(row: &SummaryRow) -> Option<(usize, LimitKind)> {
    let parsed = Relation::parse(&row.key).zip(row.value.parse::<LimitKind>().ok());
    match parsed {
        Some((Relation::EqualsParam(k), kind)) => Some((k, kind)),
        None => {
            debug!(
                "ignoring malformed summary for {} param {}: {:?} {:?}",
                row.function, row.param, row.key, row.value
            );
            None
        }
    }
}

fn key_of<'a>(unit: &'a Unit, function: &'a Function) -> FunctionKey<'a> {
    FunctionKey {
        file: unit.file(),
        name: &function.name,
        is_static: function.is_static,
    }
}

fn callee_key<'a>(unit: &'a Unit, func: &'a str) -> FunctionKey<'a> {
    FunctionKey {
        file: unit.file(),
        name: func,
        is_static: unit.function(func).map(|f| f.is_static).unwrap_or(false),
    }
}

// ------------------------------------------------------------------
// Call sites

/// The argument that equals `array`'s capacity, possibly adjusted, as a
/// relation key.
fn size_param_comparison(
    unit: &Unit,
    path: &P,
    array: ExprId,
    args: &[ExprId],
) -> Option<(String, LimitKind)> {
    let (size, kind) = size_variable(unit, path, array)?;
    let mut kind = kind.normalized();
    for (i, arg) in args.iter().enumerate() {
        if *arg == array {
            continue;
        }
        let matched = unit.equiv(*arg, size)
            || (matches!(unit.kind(unit.strip(*arg)), ExprKind::Binop { .. })
                && match_size_binop(unit, path, size, *arg, &mut kind));
        if matched {
            return Some((Relation::EqualsParam(i).key(), kind));
        }
    }
    None
}

/// Registers the call site and records, for every pointer argument, which
/// other argument holds its capacity.
pub fn match_call(cx: &mut Cx<'_>, path: &P, call: ExprId) {
    let unit = cx.unit;
    let ExprKind::Call { func, args } = unit.kind(call) else {
        return;
    };
    let callee = callee_key(unit, func);
    let caller = Caller {
        function: cx.function.name.clone(),
        call: call.0,
    };
    cx.store.insert_call(CallSite {
        file: unit.file().to_string(),
        caller: caller.clone(),
        callee: func.clone(),
        is_static: callee.is_static,
    });
    for (param, arg) in args.iter().enumerate() {
        if !unit.is_pointer(*arg) {
            continue;
        }
        let Some((key, kind)) = size_param_comparison(unit, path, *arg, args) else {
            continue;
        };
        debug!("{}: param {} {} as {}", func, param, key, kind);
        cx.store.insert_summary(SummaryRow {
            origin: Origin::CallerInfo,
            file: unit.file().to_string(),
            caller: Some(caller.clone()),
            function: func.clone(),
            is_static: callee.is_static,
            limit_kind: kind.code(),
            param,
            key,
            value: kind.code().to_string(),
        });
    }
}

/// Applies what the callee guarantees about its arguments to this call's
/// arguments. Nothing is written, so no write is ignored: a bound passed by
/// address to the same call still invalidates its buffer.
pub fn set_implied(cx: &mut Cx<'_>, path: &mut P, call: ExprId) {
    let unit = cx.unit;
    let ExprKind::Call { func, .. } = unit.kind(call) else {
        return;
    };
    let rows = cx.store.summaries(&callee_key(unit, func));
    for row in rows
        .iter()
        .filter(|r| matches!(r.origin, Origin::CallImplies | Origin::ReturnImplies))
    {
        let Some((k, kind)) = parse_row(row) else {
            continue;
        };
        let (Some(array), Some(size)) = (unit.call_arg(call, row.param), unit.call_arg(call, k))
        else {
            continue;
        };
        let Some(buffer) = Place::of(unit, array) else {
            continue;
        };
        path.state.install(unit, buffer, kind, size);
    }
}

// ------------------------------------------------------------------
// Function entry and exit

/// Parameters the body assigns, increments or passes by address.
pub fn written_params(unit: &Unit, function: &Function) -> FxHashSet<SymbolId> {
    fn visit(unit: &Unit, function: &Function, e: ExprId, out: &mut FxHashSet<SymbolId>) {
        let target = match unit.kind(e) {
            ExprKind::Assign { left, .. } => Some(*left),
            ExprKind::Step { inner, .. } | ExprKind::AddrOf(inner) => Some(*inner),
            _ => None,
        };
        if let Some(s) = target.and_then(|t| unit.as_symbol(t)) {
            if function.param_index(s).is_some() {
                out.insert(s);
            }
        }
        for c in unit.kind(e).children() {
            visit(unit, function, c, out);
        }
    }
    let mut roots = Vec::new();
    function.body.iter().for_each(|s: &Stmt| s.exprs(&mut roots));
    let mut out = FxHashSet::default();
    for e in roots {
        visit(unit, function, e, &mut out);
    }
    out
}

/// Parameter facts as one caller sees them.
fn caller_state(unit: &Unit, function: &Function, rows: &[&SummaryRow]) -> BufState {
    let mut state = BufState::default();
    for row in rows {
        let Some((k, kind)) = parse_row(row) else {
            continue;
        };
        let (Some(array), Some(size)) = (function.params.get(row.param), function.params.get(k))
        else {
            debug!("{}: no params {} and {}", function.name, row.param, k);
            continue;
        };
        state.install(unit, Place::Var(*array), kind, unit.symbol_expr(*size));
    }
    state
}

/// Joins the parameter facts recorded by every known caller. Callers that
/// recorded nothing contribute `Undefined`.
pub fn seed(cx: &mut Cx<'_>, path: &mut P, assume_callers_agree: bool) {
    let unit = cx.unit;
    let key = key_of(unit, cx.function);
    let rows = cx.store.summaries(&key);
    let mut by_caller: BTreeMap<(String, Option<Caller>), Vec<&SummaryRow>> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.origin == Origin::CallerInfo) {
        by_caller
            .entry((row.file.clone(), row.caller.clone()))
            .or_default()
            .push(row);
    }
    if by_caller.is_empty() {
        return;
    }
    let mut sites: BTreeSet<(String, Option<Caller>)> = by_caller.keys().cloned().collect();
    sites.extend(
        cx.store
            .call_sites(&key)
            .into_iter()
            .map(|s| (s.file, Some(s.caller))),
    );

    let state = sites
        .iter()
        .map(|site| match by_caller.get(site) {
            Some(rows) => caller_state(unit, cx.function, rows),
            None => BufState::default(),
        })
        .reduce(|a, b| a.join(unit, b, Unmatched::Undefined));
    let Some(mut state) = state else {
        return;
    };
    if assume_callers_agree {
        state.assume_any_fact(unit);
    }
    for (buffer, slot) in &state.sizes {
        debug!(
            "{}: {} from {} callers",
            buffer.show(unit),
            slot.state,
            sites.len()
        );
    }
    path.state = state;
}

/// Facts the body established between two parameters it never writes hold
/// for every caller.
pub fn return_implies(
    cx: &mut Cx<'_>,
    exit: &P,
    seeded: &BTreeMap<Place, Capacity>,
    written: &FxHashSet<SymbolId>,
) {
    let unit = cx.unit;
    let function = cx.function;
    for (buffer, slot) in &exit.state.sizes {
        let Place::Var(array) = buffer else {
            continue;
        };
        let Some((kind, bound)) = slot.state.as_fact() else {
            continue;
        };
        let Some(size_sym) = unit.as_symbol(bound) else {
            continue;
        };
        let (Some(param), Some(size)) = (
            function.param_index(*array),
            function.param_index(size_sym),
        ) else {
            continue;
        };
        if param == size || written.contains(array) || written.contains(&size_sym) {
            continue;
        }
        if seeded
            .get(buffer)
            .map(|c| c.as_fact() == Some((kind, bound)))
            .unwrap_or(false)
        {
            continue;
        }
        let kind = kind.normalized();
        debug!("{}: returns with param {} {} param {}", function.name, param, kind, size);
        cx.store.insert_summary(SummaryRow {
            origin: Origin::ReturnImplies,
            file: unit.file().to_string(),
            caller: None,
            function: function.name.clone(),
            is_static: function.is_static,
            limit_kind: kind.code(),
            param,
            key: Relation::EqualsParam(size).key(),
            value: kind.code().to_string(),
        });
    }
}
