// SPDX-License-Identifier: BSD-3-Clause
// To debug a test, run it with `RUST_LOG` unset and print `store` or the
// unit with `eprintln!("{:#?}", ...)`.

use bufcmp::{
    analyze,
    ir::{CmpOp, ExprId, Stmt, SymbolId, TypeId},
    store::{Caller, Origin, SummaryRow},
    MemoryStore, Options, Signatures, Unit, UnitBuilder,
};

// ------------------------------------------------------------------
// Helpers

fn run(unit: &Unit, store: &mut MemoryStore, options: Options) -> Vec<String> {
    let signatures = Signatures::builtin(options.kernel);
    analyze(unit, store, &signatures, &options)
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn check(unit: &Unit) -> Vec<String> {
    run(unit, &mut MemoryStore::default(), Options::default())
}

/// `dst = func(args)`
fn assign_call(b: &mut UnitBuilder, dst: SymbolId, func: &str, args: Vec<ExprId>) -> Stmt {
    let d = b.var(dst);
    let c = b.call(func, args);
    Stmt::Expr(b.assign(d, c))
}

/// `dst = src`
fn assign_var(b: &mut UnitBuilder, dst: SymbolId, src: ExprId) -> Stmt {
    let d = b.var(dst);
    Stmt::Expr(b.assign(d, src))
}

/// `array[offset]`
fn at(b: &mut UnitBuilder, array: SymbolId, offset: ExprId) -> Stmt {
    let a = b.var(array);
    Stmt::Expr(b.index(a, offset))
}

/// `n * sizeof(elem)` style element-size argument.
fn size_of(b: &mut UnitBuilder, t: TypeId) -> ExprId {
    b.sizeof(t)
}

fn call_stmt(b: &mut UnitBuilder, func: &str, args: Vec<ExprId>) -> Stmt {
    Stmt::Expr(b.call(func, args))
}

fn caller_info<'a>(store: &'a MemoryStore, function: &str) -> Vec<&'a SummaryRow> {
    store
        .summaries
        .iter()
        .filter(|r| r.origin == Origin::CallerInfo && r.function == function)
        .collect()
}

const ONE_PAST_P_N: &str = "t.c:f() warn: potentially one past the end of array 'p[n]'";

// ------------------------------------------------------------------
// Allocation and access

#[test]
fn access_at_the_element_count_is_one_past_the_end() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    let ne = b.var(n);
    let one = b.value(1);
    let last = b.sub(ne, one);
    let inside = at(&mut b, p, last);
    b.function("f", false, vec![n], vec![alloc, past, inside]);
    let unit = b.finish().unwrap();
    assert_eq!(vec![ONE_PAST_P_N], check(&unit));
}

#[test]
fn size_times_element_size_counts_elements() {
    for (factor, expected) in [(None, vec![ONE_PAST_P_N]), (Some(3), vec![])] {
        let mut b = UnitBuilder::new("t.c");
        let int = b.int(4, true);
        let pint = b.ptr(int);
        let n = b.param("n", int);
        let p = b.local("p", pint);
        let bytes = |b: &mut UnitBuilder| {
            let ne = b.var(n);
            let elem = match factor {
                Some(k) => b.value(k),
                None => size_of(b, int),
            };
            b.mul(ne, elem)
        };
        let size = bytes(&mut b);
        let alloc = assign_call(&mut b, p, "malloc", vec![size]);
        let ne = b.var(n);
        let past = at(&mut b, p, ne);
        let pe = b.var(p);
        let size = bytes(&mut b);
        let pass = call_stmt(&mut b, "use", vec![pe, size]);
        b.function("f", false, vec![n], vec![alloc, past, pass]);
        let unit = b.finish().unwrap();
        let mut store = MemoryStore::default();
        assert_eq!(expected, run(&unit, &mut store, Options::default()), "factor {:?}", factor);
        // Either way `use` learns that its second argument is a byte count;
        // with another factor the whole product is the byte count.
        let rows = caller_info(&store, "use");
        assert_eq!(1, rows.len(), "factor {:?}", factor);
        assert_eq!(("==$1", "0"), (rows[0].key.as_str(), rows[0].value.as_str()));
    }
}

#[test]
fn element_size_may_come_first() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let p = b.local("p", pint);
    let sz = size_of(&mut b, int);
    let ne = b.var(n);
    let bytes = b.mul(sz, ne);
    let alloc = assign_call(&mut b, p, "malloc", vec![bytes]);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function("f", false, vec![n], vec![alloc, past]);
    let unit = b.finish().unwrap();
    assert_eq!(vec![ONE_PAST_P_N], check(&unit));
}

#[test]
fn count_plus_one_allocations_bound_the_last_index() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let one = b.value(1);
    let count = b.add(ne, one);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![count, sz]);
    let ne = b.var(n);
    let last = at(&mut b, p, ne);
    let pe = b.var(p);
    let ne = b.var(n);
    let pass = call_stmt(&mut b, "use", vec![pe, ne]);
    b.function("f", false, vec![n], vec![alloc, last, pass]);
    let unit = b.finish().unwrap();
    let mut store = MemoryStore::default();
    assert!(run(&unit, &mut store, Options::default()).is_empty());
    let rows = caller_info(&store, "use");
    assert_eq!(1, rows.len());
    assert_eq!(("==$1", "2"), (rows[0].key.as_str(), rows[0].value.as_str()));
}

#[test]
fn taking_the_address_one_past_the_end_is_fine() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let pe = b.var(p);
    let ne = b.var(n);
    let end = b.index(pe, ne);
    let addr = Stmt::Expr(b.addr_of(end));
    b.function("f", false, vec![n], vec![alloc, addr]);
    let unit = b.finish().unwrap();
    assert!(check(&unit).is_empty());
}

#[test]
fn pointer_arithmetic_accesses_are_checked_like_indexing() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let pe = b.var(p);
    let ne = b.var(n);
    let sum = b.add(pe, ne);
    let past = Stmt::Expr(b.deref(sum));
    b.function("f", false, vec![n], vec![alloc, past]);
    let unit = b.finish().unwrap();
    assert_eq!(vec![ONE_PAST_P_N], check(&unit));
}

/// `char *p = alloc(4 + n)`, then `p + 4` is used as an `n` byte buffer.
fn header_unit(alloc: &str, access: bool) -> Unit {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let char_ = b.int(1, true);
    let pchar = b.ptr(char_);
    let n = b.param("n", int);
    let p = b.local("p", pchar);
    let four = b.value(4);
    let ne = b.var(n);
    let size = b.add(four, ne);
    let args = if alloc == "calloc" {
        let one = b.value(1);
        vec![size, one]
    } else {
        vec![size]
    };
    let alloc = assign_call(&mut b, p, alloc, args);
    let pe = b.var(p);
    let four = b.value(4);
    let body = b.add(pe, four);
    let ne = b.var(n);
    let last = if access {
        Stmt::Expr(b.index(body, ne))
    } else {
        call_stmt(&mut b, "use", vec![body, ne])
    };
    b.function("f", false, vec![n], vec![alloc, last]);
    b.finish().unwrap()
}

#[test]
fn an_offset_into_a_buffer_has_the_remaining_capacity() {
    let mut store = MemoryStore::default();
    assert!(run(&header_unit("malloc", false), &mut store, Options::default()).is_empty());
    let rows = caller_info(&store, "use");
    assert_eq!(1, rows.len());
    assert_eq!(0, rows[0].param);
    assert_eq!(("==$1", "0"), (rows[0].key.as_str(), rows[0].value.as_str()));

    assert_eq!(
        vec!["t.c:f() warn: potentially one past the end of array '(p + 4)[n]'"],
        check(&header_unit("calloc", true))
    );
}

#[test]
fn pointers_to_oversized_arrays_are_not_sized() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let rows = b.array(int, Some(1 << 62));
    let prows = b.ptr(rows);
    let n = b.param("n", int);
    let p = b.local("p", prows);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let bytes = b.mul(ne, sz);
    let alloc = assign_call(&mut b, p, "malloc", vec![bytes]);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function("f", false, vec![n], vec![alloc, past]);
    let unit = b.finish().unwrap();
    assert!(check(&unit).is_empty());
}

#[test]
fn constant_sizes_are_not_facts() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let p = b.local("p", pint);
    let ten = b.value(10);
    let sz = size_of(&mut b, int);
    let bytes = b.mul(ten, sz);
    let alloc = assign_call(&mut b, p, "malloc", vec![bytes]);
    let pe = b.var(p);
    let ten = b.value(10);
    let pass = call_stmt(&mut b, "use", vec![pe, ten]);
    b.function("f", false, vec![], vec![alloc, pass]);
    let unit = b.finish().unwrap();
    let mut store = MemoryStore::default();
    assert!(run(&unit, &mut store, Options::default()).is_empty());
    assert!(caller_info(&store, "use").is_empty());
    assert!(store.array_limits.is_empty());
}

#[test]
fn macro_temporaries_pass_the_fact_to_the_real_destination() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let p = b.local("p", pint);
    let res = b.temporary("_res", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let call = b.call("calloc", vec![ne, sz]);
    let re = b.var(res);
    let init = b.assign(re, call);
    let re = b.var(res);
    let wrapped = b.stmt_expr(res, init, re);
    let alloc = assign_var(&mut b, p, wrapped);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function("f", false, vec![n], vec![alloc, past]);
    let unit = b.finish().unwrap();
    assert_eq!(vec![ONE_PAST_P_N], check(&unit));
}

// ------------------------------------------------------------------
// Flexible array members

fn flexible_unit(kernel_helper: bool) -> Unit {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let long = b.int(8, false);
    let flex = b.array(int, None);
    let s = b.structure("s", &[("n", int), ("data", flex)]);
    let ps = b.ptr(s);
    let count = b.param("count", int);
    let p = b.local("p", ps);
    let size = if kernel_helper {
        let pe = b.var(p);
        let pe2 = b.var(p);
        let member = b.arrow(pe2, "data");
        let ce = b.var(count);
        b.call("struct_size", vec![pe, member, ce])
    } else {
        let base = size_of(&mut b, s);
        let ce = b.var(count);
        let elem = size_of(&mut b, int);
        let tail = b.mul(ce, elem);
        let sum = b.add(base, tail);
        b.cast(long, sum)
    };
    let alloc = assign_call(&mut b, p, "malloc", vec![size]);
    let pe = b.var(p);
    let data = b.arrow(pe, "data");
    let ce = b.var(count);
    let past = Stmt::Expr(b.index(data, ce));
    b.function("f", false, vec![count], vec![alloc, past]);
    b.finish().unwrap()
}

#[test]
fn struct_plus_trailing_elements_sizes_the_flexible_member() {
    let unit = flexible_unit(false);
    assert_eq!(
        vec!["t.c:f() warn: potentially one past the end of array 'p->data[count]'"],
        check(&unit)
    );
}

#[test]
fn kernel_size_helpers_are_opt_in() {
    let unit = flexible_unit(true);
    assert!(check(&unit).is_empty());
    let kernel = Options {
        kernel: true,
        ..Options::default()
    };
    assert_eq!(
        vec!["t.c:f() warn: potentially one past the end of array 'p->data[count]'"],
        run(&unit, &mut MemoryStore::default(), kernel)
    );
}

// ------------------------------------------------------------------
// Invalidation and merging

#[test]
fn reassigning_the_buffer_drops_the_fact() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let q = b.param("q", pint);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let qe = b.var(q);
    let reassign = assign_var(&mut b, p, qe);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function("f", false, vec![n, q], vec![alloc, reassign, past]);
    let unit = b.finish().unwrap();
    assert!(check(&unit).is_empty());
}

#[test]
fn reassigning_the_bound_drops_the_fact() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let m = b.param("m", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let me = b.var(m);
    let reassign = assign_var(&mut b, n, me);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function("f", false, vec![n, m], vec![alloc, reassign, past]);
    let unit = b.finish().unwrap();
    assert!(check(&unit).is_empty());
}

fn branches(same_bound: bool) -> Unit {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let c = b.param("c", int);
    let n = b.param("n", int);
    let m = b.param("m", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let then = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let other = b.var(if same_bound { n } else { m });
    let sz = size_of(&mut b, int);
    let otherwise = assign_call(&mut b, p, "calloc", vec![other, sz]);
    let cond = b.var(c);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function(
        "f",
        false,
        vec![c, n, m],
        vec![
            Stmt::If {
                cond,
                then: vec![then],
                otherwise: vec![otherwise],
            },
            past,
        ],
    );
    b.finish().unwrap()
}

#[test]
fn disagreeing_branches_merge_to_nothing() {
    assert!(check(&branches(false)).is_empty());
}

#[test]
fn agreeing_branches_keep_the_fact() {
    assert_eq!(vec![ONE_PAST_P_N], check(&branches(true)));
}

#[test]
fn shrinking_a_bound_keeps_the_buffer_fact() {
    // Known false positive: `p[n]` is safe once `n` drops below the
    // allocated count, but the fact stays bound to `n` and is still reported.
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let m = b.param("m", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let me = b.var(m);
    let ne = b.var(n);
    let cond = b.compare(CmpOp::Lt, me, ne);
    let me = b.var(m);
    let shrink = assign_var(&mut b, n, me);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function(
        "f",
        false,
        vec![n, m],
        vec![
            alloc,
            Stmt::If {
                cond,
                then: vec![shrink, past],
                otherwise: vec![],
            },
        ],
    );
    let unit = b.finish().unwrap();
    assert_eq!(vec![ONE_PAST_P_N], check(&unit));
}

// ------------------------------------------------------------------
// Bound variables

#[test]
fn size_variables_follow_plus_and_minus_one() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let last = b.local("last", int);
    let count = b.local("count", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let ne = b.var(n);
    let one = b.value(1);
    let minus = b.sub(ne, one);
    let set_last = assign_var(&mut b, last, minus);
    let le = b.var(last);
    let at_last = at(&mut b, p, le);
    let le = b.var(last);
    let one = b.value(1);
    let plus = b.add(le, one);
    let set_count = assign_var(&mut b, count, plus);
    let ce = b.var(count);
    let at_count = at(&mut b, p, ce);
    b.function(
        "f",
        false,
        vec![n],
        vec![alloc, set_last, at_last, set_count, at_count],
    );
    let unit = b.finish().unwrap();
    assert_eq!(
        vec!["t.c:f() warn: potentially one past the end of array 'p[count]'"],
        check(&unit)
    );
}

#[test]
fn post_increment_indexes_count_used_elements() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let a = b.param("a", pint);
    let i = b.param("i", int);
    let ie = b.var(i);
    let step = b.post_inc(ie);
    let fill = at(&mut b, a, step);
    let ae = b.var(a);
    let ie = b.var(i);
    let pass = call_stmt(&mut b, "flush", vec![ae, ie]);
    b.function("f", false, vec![a, i], vec![fill, pass]);
    let unit = b.finish().unwrap();
    let mut store = MemoryStore::default();
    assert!(run(&unit, &mut store, Options::default()).is_empty());
    let rows = caller_info(&store, "flush");
    assert_eq!(1, rows.len());
    // Used counts cross the call as element counts.
    assert_eq!(("==$1", "1"), (rows[0].key.as_str(), rows[0].value.as_str()));
    assert_eq!(0, rows[0].param);
}

#[test]
fn call_arguments_adjusted_by_one_change_the_limit_kind() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let p = b.local("p", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let pe = b.var(p);
    let ne = b.var(n);
    let one = b.value(1);
    let minus = b.sub(ne, one);
    let pass = call_stmt(&mut b, "use", vec![pe, minus]);
    let pe = b.var(p);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let bytes = b.mul(ne, sz);
    let pass_bytes = call_stmt(&mut b, "use_bytes", vec![bytes, pe]);
    b.function("f", false, vec![n], vec![alloc, pass, pass_bytes]);
    let unit = b.finish().unwrap();
    let mut store = MemoryStore::default();
    run(&unit, &mut store, Options::default());

    let rows = caller_info(&store, "use");
    assert_eq!(1, rows.len());
    assert_eq!(("==$1", "2"), (rows[0].key.as_str(), rows[0].value.as_str()));

    let rows = caller_info(&store, "use_bytes");
    assert_eq!(1, rows.len());
    assert_eq!(1, rows[0].param);
    assert_eq!(("==$0", "0"), (rows[0].key.as_str(), rows[0].value.as_str()));
}

// ------------------------------------------------------------------
// Independent bound checks and array-limit variables

/// `struct foo { int len; int *buf; }` with `g` sizing `f->buf` by
/// `f->len`, and `h` indexing `f->buf` by a copy of `f->len`.
fn limit_unit(checked: bool) -> Unit {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let foo = b.structure("foo", &[("len", int), ("buf", pint)]);
    let pfoo = b.ptr(foo);

    let gf = b.param("f", pfoo);
    let fe = b.var(gf);
    let buf = b.arrow(fe, "buf");
    let fe = b.var(gf);
    let len = b.arrow(fe, "len");
    let sz = size_of(&mut b, int);
    let call = b.call("calloc", vec![len, sz]);
    let alloc = Stmt::Expr(b.assign(buf, call));
    b.function("g", false, vec![gf], vec![alloc]);

    let hf = b.param("f", pfoo);
    let n = b.param("n", int);
    let x = b.local("x", int);
    let fe = b.var(hf);
    let buf = b.arrow(fe, "buf");
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let call = b.call("calloc", vec![ne, sz]);
    let alloc = Stmt::Expr(b.assign(buf, call));
    let fe = b.var(hf);
    let len = b.arrow(fe, "len");
    let copy = assign_var(&mut b, x, len);
    let fe = b.var(hf);
    let buf = b.arrow(fe, "buf");
    let xe = b.var(x);
    let access = Stmt::Expr(b.index(buf, xe));
    let body = if checked {
        let xe = b.var(x);
        let ne = b.var(n);
        let cond = b.compare(CmpOp::Lt, xe, ne);
        vec![
            alloc,
            copy,
            Stmt::If {
                cond,
                then: vec![access],
                otherwise: vec![],
            },
        ]
    } else {
        vec![alloc, copy, access]
    };
    b.function("h", false, vec![hf, n], body);
    b.finish().unwrap()
}

#[test]
fn indexing_by_a_known_limit_is_an_off_by_one() {
    let unit = limit_unit(false);
    let mut store = MemoryStore::default();
    assert_eq!(
        vec!["t.c:h() warn: potential off by one 'f->buf[]' limit 'f->len'"],
        run(&unit, &mut store, Options::default())
    );
    assert_eq!(1, store.array_limits.len());
}

#[test]
fn a_checked_offset_is_not_reported() {
    assert!(check(&limit_unit(true)).is_empty());
}

#[test]
fn constant_offsets_into_fixed_arrays_are_fine() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let arr = b.array(int, Some(4));
    let limit = b.global("limit", int);
    let a = b.local("a", arr);
    let i = b.local("i", int);
    let le = b.var(limit);
    let three = b.value(3);
    let set_limit = assign_var(&mut b, limit, three);
    let set_i = assign_var(&mut b, i, le);
    let ie = b.var(i);
    let access = at(&mut b, a, ie);
    b.function("f", false, vec![], vec![set_limit, set_i, access]);
    let unit = b.finish().unwrap();
    let mut store = MemoryStore::default();
    store.array_limits.insert(bufcmp::store::ArrayLimit {
        file: "other.c".to_string(),
        limit: bufcmp::QualifiedName::Global {
            name: "limit".to_string(),
        },
        array: None,
        kind: 1,
    });
    assert!(run(&unit, &mut store, Options::default()).is_empty());
}

// ------------------------------------------------------------------
// Interprocedural summaries

/// `f(buf, len)` copies `len` bytes out of `buf`; `f2` wraps it; `h` calls
/// the wrapper with an allocation of `n` bytes.
fn copy_unit() -> Unit {
    let mut b = UnitBuilder::new("t.c");
    let char_ = b.int(1, true);
    let pchar = b.ptr(char_);
    let int = b.int(4, true);

    let buf = b.param("buf", pchar);
    let len = b.param("len", int);
    let dst = b.local("dst", pchar);
    let de = b.var(dst);
    let be = b.var(buf);
    let le = b.var(len);
    let copy = call_stmt(&mut b, "copy_from_user", vec![de, be, le]);
    b.function("f", false, vec![buf, len], vec![copy]);

    let b2 = b.param("b2", pchar);
    let l2 = b.param("l2", int);
    let be = b.var(b2);
    let le = b.var(l2);
    let call = call_stmt(&mut b, "f", vec![be, le]);
    b.function("f2", false, vec![b2, l2], vec![call]);

    let n = b.param("n", int);
    let arr = b.local("arr", pchar);
    let ne = b.var(n);
    let alloc = assign_call(&mut b, arr, "malloc", vec![ne]);
    let ae = b.var(arr);
    let ne = b.var(n);
    let call = call_stmt(&mut b, "f2", vec![ae, ne]);
    b.function("h", false, vec![n], vec![alloc, call]);
    b.finish().unwrap()
}

#[test]
fn copy_summaries_reach_callers_of_callers() {
    let unit = copy_unit();
    let kernel = Options {
        kernel: true,
        ..Options::default()
    };
    let mut store = MemoryStore::default();
    assert!(run(&unit, &mut store, kernel).is_empty());

    let row = |origin: Origin, function: &str| {
        store
            .summaries
            .iter()
            .find(|r| r.origin == origin && r.function == function)
            .map(|r| (r.param, r.key.clone(), r.value.clone()))
    };
    let bytes = Some((0, "==$1".to_string(), "0".to_string()));
    assert_eq!(bytes, row(Origin::CallImplies, "f"));
    assert_eq!(bytes, row(Origin::ReturnImplies, "f2"));
    assert_eq!(bytes, row(Origin::CallerInfo, "f2"));
    assert_eq!(None, row(Origin::CallerInfo, "f"));

    // A second run consumes what the first one stored.
    assert!(run(&unit, &mut store, kernel).is_empty());
}

#[test]
fn copies_are_only_recognized_with_kernel_signatures() {
    let unit = copy_unit();
    let mut store = MemoryStore::default();
    run(&unit, &mut store, Options::default());
    assert!(store
        .summaries
        .iter()
        .all(|r| r.origin == Origin::CallerInfo));
}

/// `k(a, n)` indexes `a[n]`; `c` passes an allocation of `m` elements and
/// `m`; `c2`, when present, passes a buffer of unknown size.
fn callers_unit(with_unknown_caller: bool) -> Unit {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);

    let a = b.param("a", pint);
    let n = b.param("n", int);
    let ne = b.var(n);
    let past = at(&mut b, a, ne);
    b.function("k", false, vec![a, n], vec![past]);

    let m = b.param("m", int);
    let p = b.local("p", pint);
    let me = b.var(m);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![me, sz]);
    let pe = b.var(p);
    let me = b.var(m);
    let call = call_stmt(&mut b, "k", vec![pe, me]);
    b.function("c", false, vec![m], vec![alloc, call]);

    if with_unknown_caller {
        let q = b.param("q", pint);
        let qe = b.var(q);
        let five = b.value(5);
        let call = call_stmt(&mut b, "k", vec![qe, five]);
        b.function("c2", false, vec![q], vec![call]);
    }
    b.finish().unwrap()
}

const ONE_PAST_A_N: &str = "t.c:k() warn: potentially one past the end of array 'a[n]'";

#[test]
fn parameters_are_seeded_from_callers() {
    let unit = callers_unit(false);
    let mut store = MemoryStore::default();
    assert!(run(&unit, &mut store, Options::default()).is_empty());
    let rows = caller_info(&store, "k");
    assert_eq!(1, rows.len());
    assert_eq!(
        Some("c"),
        rows[0].caller.as_ref().map(|c: &Caller| c.function.as_str())
    );
    assert_eq!(("==$1", "1"), (rows[0].key.as_str(), rows[0].value.as_str()));
    assert_eq!(vec![ONE_PAST_A_N], run(&unit, &mut store, Options::default()));
}

#[test]
fn a_caller_without_a_size_blocks_seeding() {
    let unit = callers_unit(true);
    let mut store = MemoryStore::default();
    run(&unit, &mut store, Options::default());
    assert!(run(&unit, &mut store, Options::default()).is_empty());
}

#[test]
fn assuming_callers_agree_is_opt_in() {
    // Unsound: `c2` may pass a larger buffer, and then the warning is wrong.
    let unit = callers_unit(true);
    let agree = Options {
        assume_callers_agree: true,
        ..Options::default()
    };
    let mut store = MemoryStore::default();
    assert!(run(&unit, &mut store, agree).is_empty());
    assert_eq!(vec![ONE_PAST_A_N], run(&unit, &mut store, agree));
}

fn implied_row(key: &str, value: &str) -> SummaryRow {
    SummaryRow {
        origin: Origin::CallImplies,
        file: "other.c".to_string(),
        caller: None,
        function: "fill".to_string(),
        is_static: false,
        limit_kind: 1,
        param: 0,
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn fill_unit() -> Unit {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let p = b.local("p", pint);
    let pe = b.var(p);
    let ne = b.var(n);
    let call = call_stmt(&mut b, "fill", vec![pe, ne]);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function("f", false, vec![n], vec![call, past]);
    b.finish().unwrap()
}

#[test]
fn a_bound_written_by_a_summarized_call_drops_the_fact() {
    let mut b = UnitBuilder::new("t.c");
    let int = b.int(4, true);
    let pint = b.ptr(int);
    let n = b.param("n", int);
    let m = b.param("m", int);
    let p = b.local("p", pint);
    let q = b.local("q", pint);
    let ne = b.var(n);
    let sz = size_of(&mut b, int);
    let alloc = assign_call(&mut b, p, "calloc", vec![ne, sz]);
    let qe = b.var(q);
    let me = b.var(m);
    let ne = b.var(n);
    let addr = b.addr_of(ne);
    let fill = call_stmt(&mut b, "fill", vec![qe, me, addr]);
    let ne = b.var(n);
    let past = at(&mut b, p, ne);
    b.function("f", false, vec![n, m], vec![alloc, fill, past]);
    let unit = b.finish().unwrap();

    assert!(check(&unit).is_empty());
    let mut store = MemoryStore::default();
    store.summaries.insert(implied_row("==$1", "1"));
    assert!(run(&unit, &mut store, Options::default()).is_empty());
}

#[test]
fn malformed_summaries_are_ignored() {
    let unit = fill_unit();
    let malformed = [
        implied_row("==$x", "1"),
        implied_row("<=$1", "1"),
        implied_row("==$1", "elem"),
        implied_row("==$1", "17"),
        implied_row("==$7", "1"),
    ];
    let mut store = MemoryStore::default();
    store.summaries.extend(malformed.iter().cloned());
    assert!(run(&unit, &mut store, Options::default()).is_empty());

    store.summaries.insert(implied_row("==$1", "1"));
    assert_eq!(vec![ONE_PAST_P_N], run(&unit, &mut store, Options::default()));
}

#[test]
fn static_callees_only_see_their_own_file() {
    let unit = fill_unit();
    let mut store = MemoryStore::default();
    store.summaries.insert(SummaryRow {
        is_static: true,
        ..implied_row("==$1", "1")
    });
    assert!(run(&unit, &mut store, Options::default()).is_empty());
}

// ------------------------------------------------------------------
// Units from JSON

#[test]
fn units_load_from_json() {
    let unit = callers_unit(false);
    let json = serde_json::to_string(unit.data()).unwrap();
    let loaded = Unit::from_json(&json).unwrap();
    let mut store = MemoryStore::default();
    run(&loaded, &mut store, Options::default());
    assert_eq!(vec![ONE_PAST_A_N], run(&loaded, &mut store, Options::default()));
    assert!(Unit::from_json("{\"file\": 3}").is_err());
}
