// SPDX-License-Identifier: BSD-3-Clause
//! Recognizers that derive capacity facts from allocation, copy and
//! assignment idioms.

use tracing::debug;

use crate::{
    engine::{Cx, IgnoreWrite, Path},
    ir::{BinOp, ExprId, ExprKind, StepOp, Type, Unit},
    limit::{LimitKind, Relation},
    place::{Place, QualifiedName},
    store::{ArrayLimit, Origin, SummaryRow},
};

use super::{access::array_parts, capacity::BufState};

type P = Path<BufState>;

/// `(left, right)` of `e` when it is `left op right`, casts removed.
pub(super) fn binop(unit: &Unit, e: ExprId, op: BinOp) -> Option<(ExprId, ExprId)> {
    match unit.kind(unit.strip(e)) {
        ExprKind::Binop { op: o, left, right } if *o == op => {
            Some((unit.strip(*left), unit.strip(*right)))
        }
        _ => None,
    }
}

/// `x` when `e` is `x + 1`.
fn plus_one(unit: &Unit, path: &P, e: ExprId) -> Option<ExprId> {
    let (left, right) = binop(unit, e, BinOp::Add)?;
    (path.oracle(unit).value(right) == Some(1)).then_some(left)
}

fn is_sizeof(unit: &Unit, e: ExprId) -> bool {
    matches!(unit.kind(unit.strip(e)), ExprKind::Sizeof(_))
}

/// Follows the compiler's `({ T _res; _res = alloc(...); _res })` wrapper out
/// to the variable the user assigned, and the write that assigns it.
fn destination(unit: &Unit, assign: ExprId, outer: Option<ExprId>) -> Option<(ExprId, ExprId)> {
    let ExprKind::Assign { left, .. } = unit.kind(assign) else {
        return None;
    };
    let pointer = unit.strip(*left);
    let temporary = unit
        .as_symbol(pointer)
        .map(|s| unit.symbol(s).temporary)
        .unwrap_or(false);
    match outer.map(|o| (o, unit.kind(o))) {
        Some((o, ExprKind::Assign { left, .. })) if temporary => Some((unit.strip(*left), o)),
        _ => Some((pointer, assign)),
    }
}

/// Records that `bound` limits `buffer` for the off-by-one check.
fn save_type_link(cx: &mut Cx<'_>, buffer: &Place, kind: LimitKind, bound: ExprId) {
    let Some(limit) = QualifiedName::of_expr(cx.unit, cx.function, bound)
        .filter(QualifiedName::is_persistable)
    else {
        return;
    };
    let array = QualifiedName::of_place(cx.unit, cx.function, buffer)
        .filter(QualifiedName::is_persistable);
    cx.store.insert_array_limit(ArrayLimit {
        file: cx.unit.file().to_string(),
        limit,
        array,
        kind: kind.code(),
    });
}

fn install_recognized(
    cx: &mut Cx<'_>,
    path: &mut P,
    buffer: Place,
    kind: LimitKind,
    bound: ExprId,
    write: ExprId,
) -> Option<IgnoreWrite> {
    save_type_link(cx, &buffer, kind, bound);
    path.state.install(cx.unit, buffer, kind, bound);
    Some(IgnoreWrite(write))
}

// ------------------------------------------------------------------
// Allocations

fn alloc_helper(
    cx: &mut Cx<'_>,
    path: &mut P,
    pointer: ExprId,
    size: ExprId,
    write: ExprId,
) -> Option<IgnoreWrite> {
    let unit = cx.unit;
    let mut size = unit.strip(size);
    if let Some(def) = path.oracle(unit).assigned_expr_recurse(size) {
        if matches!(unit.kind(unit.strip(def)), ExprKind::Binop { .. }) {
            size = unit.strip(def);
        }
    }

    let mut kind = LimitKind::ByteCount;
    if let Some((left, right)) = binop(unit, size, BinOp::Mul) {
        let per_element = unit
            .bytes_per_element(pointer)
            .and_then(|b| i64::try_from(b).ok());
        let oracle = path.oracle(unit);
        if per_element.is_some() && oracle.implied_value(left) == per_element {
            size = right;
            kind = LimitKind::ElemCount;
        } else if per_element.is_some() && oracle.implied_value(right) == per_element {
            size = left;
            kind = LimitKind::ElemCount;
        }
    }

    if path.oracle(unit).value(size).is_some() {
        return None;
    }
    if let Some(x) = plus_one(unit, path, size) {
        size = x;
        kind = LimitKind::ElemLast;
    }

    let buffer = Place::of(unit, pointer)?;
    install_recognized(cx, path, buffer, kind, size, write)
}

/// The flexible array at the end of the struct `pointer` points at.
fn flexible_member(unit: &Unit, pointer: ExprId) -> Option<(Place, u64)> {
    let pointee = unit.pointee(unit.type_of(pointer)?)?;
    let Type::Struct { fields, .. } = unit.ty(pointee) else {
        return None;
    };
    let last = fields.last()?;
    let name = last.name.as_ref()?;
    let Type::Array { elem, .. } = unit.ty(last.ty) else {
        return None;
    };
    if !unit.ty(last.ty).is_flexible_array() {
        return None;
    }
    let elem_bytes = unit.type_bytes(*elem).filter(|b| *b > 0)?;
    let base = Place::of(unit, pointer)?;
    Some((
        Place::Member(Box::new(Place::Deref(Box::new(base))), name.clone()),
        elem_bytes,
    ))
}

/// Element count of a "struct plus trailing elements" size expression.
fn struct_size_count(
    cx: &Cx<'_>,
    path: &P,
    kernel: bool,
    size: ExprId,
    elem_bytes: u64,
) -> Option<ExprId> {
    let unit = cx.unit;
    let oracle = path.oracle(unit);
    if let ExprKind::Call { func, .. } = unit.kind(size) {
        if !kernel {
            return None;
        }
        return match func.as_str() {
            "__ab_c_size" => unit.call_arg(size, 0),
            "struct_size" => unit.call_arg(size, 2),
            "size_add" => {
                let mul = unit.strip(unit.call_arg(size, 1)?);
                match unit.kind(mul) {
                    ExprKind::Call { func, .. } if func == "size_mul" => unit.call_arg(mul, 0),
                    _ => None,
                }
            }
            _ => None,
        };
    }

    let (left, right) = binop(unit, size, BinOp::Add)?;
    let product = if oracle.value(left).is_some() {
        right
    } else if oracle.value(right).is_some() {
        left
    } else {
        return None;
    };
    let (a, b) = binop(unit, product, BinOp::Mul)?;
    let elem = Some(i64::try_from(elem_bytes).ok()?);
    if oracle.value(b) == elem && oracle.value(a).is_none() {
        Some(a)
    } else if oracle.value(a) == elem && oracle.value(b).is_none() {
        Some(b)
    } else {
        None
    }
}

fn struct_size_helper(
    cx: &mut Cx<'_>,
    path: &mut P,
    kernel: bool,
    pointer: ExprId,
    size: ExprId,
    write: ExprId,
) -> Option<IgnoreWrite> {
    let unit = cx.unit;
    let size = path
        .oracle(unit)
        .assigned_expr_recurse(size)
        .unwrap_or(size);
    let size = unit.strip(size);
    let (member, elem_bytes) = flexible_member(unit, pointer)?;
    let count = struct_size_count(cx, path, kernel, size, elem_bytes)?;
    install_recognized(cx, path, member, LimitKind::ElemCount, count, write)
}

/// `dst = alloc(..., size, ...)`.
pub fn match_alloc(
    cx: &mut Cx<'_>,
    path: &mut P,
    kernel: bool,
    size_arg: usize,
    call: ExprId,
    assign: ExprId,
    outer: Option<ExprId>,
) -> Option<IgnoreWrite> {
    let unit = cx.unit;
    let (pointer, write) = destination(unit, assign, outer)?;
    let size = unit.call_arg(call, size_arg)?;
    let whole = alloc_helper(cx, path, pointer, size, write);
    let member = struct_size_helper(cx, path, kernel, pointer, size, write);
    whole.or(member)
}

/// `dst = alloc(count, elem_size)`, arguments starting at `start`.
pub fn match_calloc(
    cx: &mut Cx<'_>,
    path: &mut P,
    start: usize,
    call: ExprId,
    assign: ExprId,
    outer: Option<ExprId>,
) -> Option<IgnoreWrite> {
    let unit = cx.unit;
    let (pointer, write) = destination(unit, assign, outer)?;
    let mut count = unit.call_arg(call, start)?;
    let per_element = unit
        .bytes_per_element(pointer)
        .and_then(|b| i64::try_from(b).ok());
    if per_element.is_some() && path.oracle(unit).implied_value(count) == per_element {
        count = unit.call_arg(call, start + 1)?;
    }
    let mut count = unit.strip(count);
    let mut kind = LimitKind::ElemCount;
    if let Some(x) = plus_one(unit, path, count) {
        count = x;
        kind = LimitKind::ElemLast;
    }
    if path.oracle(unit).value(count).is_some() {
        return None;
    }
    let buffer = Place::of(unit, pointer)?;
    install_recognized(cx, path, buffer, kind, count, write)
}

// ------------------------------------------------------------------
// Copies

/// A copy primitive whose source and size are both parameters of the
/// enclosing function: the function's own callers must pass a source of at
/// least `size` bytes.
pub fn match_copy(cx: &mut Cx<'_>, src: usize, size: usize, call: ExprId) {
    let unit = cx.unit;
    let param = |n: usize| {
        let s = unit.as_symbol(unit.call_arg(call, n)?)?;
        cx.function.param_index(s)
    };
    let (Some(src_param), Some(size_param)) = (param(src), param(size)) else {
        return;
    };
    debug!(
        "{}: param {} holds param {} bytes",
        cx.function.name, src_param, size_param
    );
    let kind = LimitKind::ByteCount;
    cx.store.insert_summary(SummaryRow {
        origin: Origin::CallImplies,
        file: unit.file().to_string(),
        caller: None,
        function: cx.function.name.clone(),
        is_static: cx.function.is_static,
        limit_kind: kind.code(),
        param: src_param,
        key: Relation::EqualsParam(size_param).key(),
        value: kind.code().to_string(),
    });
}

// ------------------------------------------------------------------
// Uses and assignments

/// `a[i++]` and `a[++i]`.
pub fn set_used(cx: &mut Cx<'_>, path: &mut P, expr: ExprId) {
    let unit = cx.unit;
    let Some((array, offset)) = array_parts(unit, expr) else {
        return;
    };
    let ExprKind::Step {
        op: StepOp::Inc,
        post,
        inner,
    } = unit.kind(unit.strip(offset))
    else {
        return;
    };
    let kind = if *post {
        LimitKind::UsedCount
    } else {
        LimitKind::UsedLast
    };
    if let Some(buffer) = Place::of(unit, array) {
        path.state.install(unit, buffer, kind, *inner);
    }
}

/// Adjusts `kind` for `expr`, which is `size` plus or minus one, or `size`
/// scaled by an element size. False if `expr` is none of those.
pub fn match_size_binop(
    unit: &Unit,
    path: &P,
    size: ExprId,
    expr: ExprId,
    kind: &mut LimitKind,
) -> bool {
    let ExprKind::Binop { op, left, right } = unit.kind(unit.strip(expr)) else {
        return false;
    };
    if !unit.equiv(size, *left) {
        return false;
    }
    let one = path.oracle(unit).value(*right) == Some(1);
    let adjusted = match (op, *kind) {
        (BinOp::Sub, LimitKind::ElemCount) if one => LimitKind::ElemLast,
        (BinOp::Add, LimitKind::ElemLast) if one => LimitKind::ElemCount,
        (BinOp::Mul, LimitKind::ElemCount) if is_sizeof(unit, *right) => LimitKind::ByteCount,
        (BinOp::Div, LimitKind::ByteCount) if is_sizeof(unit, *right) => LimitKind::ElemCount,
        _ => return false,
    };
    *kind = adjusted;
    true
}

/// `m = n` (or `n ± 1`, `n * sizeof`, `n / sizeof`) where `n` limits a
/// buffer: the buffer is now limited by `m`.
fn match_assign_size(cx: &mut Cx<'_>, path: &mut P, expr: ExprId) -> Option<IgnoreWrite> {
    let unit = cx.unit;
    let ExprKind::Assign { left, right, .. } = unit.kind(expr) else {
        return None;
    };
    let right = unit.strip(*right);
    let size = match unit.kind(right) {
        ExprKind::Binop { left, .. } => unit.strip(*left),
        _ => right,
    };
    let array = path.state.linked(&Place::of(unit, size)?)?.clone();
    let (mut kind, _) = path.state.fact(&array)?;
    if matches!(unit.kind(right), ExprKind::Binop { .. })
        && !match_size_binop(unit, path, size, right, &mut kind)
    {
        return None;
    }
    path.state.install(unit, array, kind, *left);
    Some(IgnoreWrite(expr))
}

/// Lowering a bound is not an invalidation.
fn match_assign_smaller(cx: &mut Cx<'_>, path: &mut P, expr: ExprId) -> Option<IgnoreWrite> {
    let unit = cx.unit;
    let ExprKind::Assign { left, right, .. } = unit.kind(expr) else {
        return None;
    };
    path.state.linked(&Place::of(unit, *left)?)?;
    let oracle = path.oracle(unit);
    if oracle.value(*right).is_some() {
        return None;
    }
    if !oracle.comparison(*left, *right)?.is_greater() {
        return None;
    }
    debug!("{}: keeps its buffer after shrinking", unit.show(*left));
    Some(IgnoreWrite(expr))
}

pub fn match_assign(cx: &mut Cx<'_>, path: &mut P, expr: ExprId) -> Option<IgnoreWrite> {
    let unit = cx.unit;
    let ExprKind::Assign {
        compound: None,
        left,
        ..
    } = unit.kind(expr)
    else {
        return None;
    };
    if let Some(s) = unit.as_symbol(*left) {
        if unit.symbol(s).temporary {
            return None;
        }
    }
    match_assign_size(cx, path, expr).or_else(|| match_assign_smaller(cx, path, expr))
}
