// SPDX-License-Identifier: BSD-3-Clause
//! Checks array accesses against known capacities.

use crate::{
    engine::{Cx, Path},
    ir::{BinOp, CmpOp, ExprId, ExprKind, Type, Unit},
    limit::LimitKind,
    place::{Place, QualifiedName},
};

use super::{capacity::BufState, recognize::binop};

type P = Path<BufState>;

/// Base and offset of `a[i]` or `*(a + i)`.
pub fn array_parts(unit: &Unit, e: ExprId) -> Option<(ExprId, ExprId)> {
    match unit.kind(unit.strip(e)) {
        ExprKind::Index { base, offset } => Some((unit.strip(*base), unit.strip(*offset))),
        ExprKind::Deref(inner) => {
            let (base, offset) = binop(unit, *inner, BinOp::Add)?;
            unit.is_pointer(base).then_some((base, offset))
        }
        _ => None,
    }
}

/// Capacity of `p + K` when `p` is limited by `C + n` and `C` is `K`
/// elements.
fn size_variable_from_binop(
    unit: &Unit,
    path: &P,
    left: ExprId,
    right: ExprId,
) -> Option<(ExprId, LimitKind)> {
    let oracle = path.oracle(unit);
    let offset = oracle.value(right)?;
    let (kind, bound) = path.state.fact(&Place::of(unit, left)?)?;
    let elem = unit.bytes_per_element(left)?;
    let offset_bytes = offset.checked_mul(i64::try_from(elem).ok()?)?;
    let (c, n) = binop(unit, bound, BinOp::Add)?;
    if oracle.value(c) == Some(offset_bytes) {
        Some((n, kind))
    } else if oracle.value(n) == Some(offset_bytes) {
        Some((c, kind))
    } else {
        None
    }
}

/// The expression limiting `buf` on this path, and what it counts.
pub fn size_variable(unit: &Unit, path: &P, buf: ExprId) -> Option<(ExprId, LimitKind)> {
    let buf = unit.strip(buf);
    if let Some((left, right)) = binop(unit, buf, BinOp::Add) {
        if let Some(found) = size_variable_from_binop(unit, path, left, right) {
            return Some(found);
        }
    }
    let (kind, bound) = path.state.fact(&Place::of(unit, buf)?)?;
    Some((bound, kind))
}

/// Whether a known comparison between the offset and the limit makes the
/// access `expr` safe.
pub fn index_ok(unit: &Unit, path: &P, expr: ExprId) -> bool {
    let Some((array, offset)) = array_parts(unit, expr) else {
        return false;
    };
    let Some((size, kind)) = size_variable(unit, path, array) else {
        return false;
    };
    let Some(cmp) = path.oracle(unit).comparison(offset, size) else {
        return false;
    };
    let strictly_less = matches!(cmp, CmpOp::Lt | CmpOp::ULt);
    match kind {
        LimitKind::ElemCount => strictly_less,
        LimitKind::ElemLast => strictly_less || matches!(cmp, CmpOp::Le | CmpOp::ULe | CmpOp::Eq),
        LimitKind::ByteCount => strictly_less && unit.bytes_per_element(array) == Some(1),
        LimitKind::UsedCount | LimitKind::UsedLast => false,
    }
}

/// Declared length of a fixed-size array.
fn declared_len(unit: &Unit, array: ExprId) -> Option<u64> {
    match unit.ty(unit.type_of(array)?) {
        Type::Array { len: Some(n), .. } if *n > 0 => Some(*n),
        _ => None,
    }
}

/// A constant offset into a fixed-size array.
fn known_access_ok_numbers(unit: &Unit, path: &P, array: ExprId, offset: ExprId) -> bool {
    let Some(len) = declared_len(unit, array) else {
        return false;
    };
    match path.oracle(unit).implied_value(offset) {
        Some(v) => v >= 0 && (v as u64) < len,
        None => false,
    }
}

/// `a[n]` where `a` holds `n` elements.
pub fn array_check(cx: &mut Cx<'_>, path: &P, expr: ExprId, address_only: bool) {
    let unit = cx.unit;
    let Some((array, offset)) = array_parts(unit, expr) else {
        return;
    };
    let Some((size, LimitKind::ElemCount)) = size_variable(unit, path, array) else {
        return;
    };
    if !path.oracle(unit).known_equal(size, offset) {
        return;
    }
    if address_only || index_ok(unit, path, expr) {
        return;
    }
    cx.warn(
        expr,
        format!(
            "potentially one past the end of array '{}[{}]'",
            unit.show_operand(array),
            unit.show(offset)
        ),
    );
}

/// `a[i]` where `i` is known equal to a variable recorded as a limit of `a`.
pub fn array_check_data_info(cx: &mut Cx<'_>, path: &P, expr: ExprId, address_only: bool) {
    let unit = cx.unit;
    let Some((array, offset)) = array_parts(unit, expr) else {
        return;
    };
    if address_only
        || known_access_ok_numbers(unit, path, array, offset)
        || index_ok(unit, path, expr)
    {
        return;
    }
    if Place::of(unit, offset).is_none() {
        return;
    }
    let owner = QualifiedName::of_expr(unit, cx.function, array)
        .filter(QualifiedName::is_persistable);
    let limit = path
        .oracle(unit)
        .equal_closure(offset)
        .into_iter()
        .find(|e| {
            QualifiedName::of_expr(unit, cx.function, *e)
                .filter(QualifiedName::is_persistable)
                .map(|name| cx.store.is_array_limit(owner.as_ref(), &name))
                .unwrap_or(false)
        });
    if let Some(limit) = limit {
        cx.warn(
            expr,
            format!(
                "potential off by one '{}[]' limit '{}'",
                unit.show_operand(array),
                unit.show(limit)
            ),
        );
    }
}

/// Whether `buf` is known to hold at least `var` bytes.
pub fn has_bytes(unit: &Unit, path: &P, buf: ExprId, var: ExprId) -> bool {
    let oracle = path.oracle(unit);
    if declared_len(unit, buf).is_some() {
        let bytes = unit.type_of(buf).and_then(|t| unit.type_bytes(t));
        if let (Some(bytes), Some(v)) = (bytes, oracle.implied_value(var)) {
            if v >= 0 && (v as u64) <= bytes {
                return true;
            }
        }
    }
    let Some((size, kind)) = size_variable(unit, path, buf) else {
        return false;
    };
    let bytes_limit = match kind {
        LimitKind::ByteCount => true,
        LimitKind::ElemCount | LimitKind::UsedCount => unit.bytes_per_element(buf) == Some(1),
        LimitKind::ElemLast | LimitKind::UsedLast => false,
    };
    bytes_limit
        && matches!(
            oracle.comparison(var, size),
            Some(CmpOp::Lt | CmpOp::Le | CmpOp::ULt | CmpOp::ULe | CmpOp::Eq)
        )
}
