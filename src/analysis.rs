// SPDX-License-Identifier: BSD-3-Clause
//! Buffer-capacity tracking.
//!
//! Every function of a unit is walked once by [`crate::engine::walk`] with
//! [`BufComparison`] as hooks. Facts learned about parameters and copy
//! primitives go to the [`FactStore`]; they are picked up by callers and
//! callees on the next run over the same store.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use tracing::{debug, info_span};

use crate::{
    engine::{walk, Cx, Diagnostic, Hooks, IgnoreWrite, Path},
    ir::{ExprId, ExprKind, SymbolId, Unit},
    place::Place,
    signatures::{Signature, Signatures},
    store::FactStore,
};

pub mod access;
pub mod capacity;
pub mod recognize;
pub mod summary;

use capacity::{BufState, Capacity, Unmatched};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// When callers disagree about a parameter, assume any one of them.
    pub assume_callers_agree: bool,
    /// Recognize kernel size helpers (`struct_size` and friends).
    pub kernel: bool,
}

pub struct BufComparison<'s> {
    options: Options,
    signatures: &'s Signatures,
    /// Parameter facts at entry to the current function.
    seeded: BTreeMap<Place, Capacity>,
    written: FxHashSet<SymbolId>,
}

impl<'s> BufComparison<'s> {
    pub fn new(signatures: &'s Signatures, options: Options) -> Self {
        BufComparison {
            options,
            signatures,
            seeded: BTreeMap::new(),
            written: FxHashSet::default(),
        }
    }
}

type P = Path<BufState>;

impl Hooks for BufComparison<'_> {
    type State = BufState;

    fn join(&self, unit: &Unit, a: BufState, b: BufState) -> BufState {
        a.join(unit, b, Unmatched::Keep)
    }

    fn function_start(&mut self, cx: &mut Cx<'_>, path: &mut P) {
        self.written = summary::written_params(cx.unit, cx.function);
        summary::seed(cx, path, self.options.assume_callers_agree);
        self.seeded = path
            .state
            .sizes
            .iter()
            .map(|(buffer, slot)| (buffer.clone(), slot.state.clone()))
            .collect();
    }

    fn assignment(
        &mut self,
        cx: &mut Cx<'_>,
        path: &mut P,
        expr: ExprId,
        _outer: Option<ExprId>,
    ) -> Option<IgnoreWrite> {
        recognize::match_assign(cx, path, expr)
    }

    fn call(
        &mut self,
        cx: &mut Cx<'_>,
        path: &mut P,
        expr: ExprId,
        assign: Option<ExprId>,
        outer: Option<ExprId>,
    ) -> Option<IgnoreWrite> {
        let unit = cx.unit;
        let ExprKind::Call { func, .. } = unit.kind(expr) else {
            return None;
        };
        summary::match_call(cx, path, expr);
        summary::set_implied(cx, path, expr);

        let mut recognized = None;
        for sig in self.signatures.signatures_for(func).unwrap_or_default() {
            let token = match (sig, assign) {
                (Signature::Alloc { size }, Some(assign)) => recognize::match_alloc(
                    cx,
                    path,
                    self.options.kernel,
                    size,
                    expr,
                    assign,
                    outer,
                ),
                (Signature::ArrayAlloc { count }, Some(assign)) => {
                    recognize::match_calloc(cx, path, count, expr, assign, outer)
                }
                (Signature::Copy { src, size }, _) => {
                    recognize::match_copy(cx, src, size, expr);
                    None
                }
                (Signature::Alloc { .. } | Signature::ArrayAlloc { .. }, None) => None,
            };
            recognized = recognized.or(token);
        }
        recognized
    }

    fn modified(&mut self, cx: &mut Cx<'_>, path: &mut P, place: &Place, _write: ExprId) {
        path.state.modified(cx.unit, place);
    }

    fn access(&mut self, cx: &mut Cx<'_>, path: &mut P, expr: ExprId, address_only: bool) {
        access::array_check(cx, path, expr, address_only);
        access::array_check_data_info(cx, path, expr, address_only);
        recognize::set_used(cx, path, expr);
    }

    fn function_end(&mut self, cx: &mut Cx<'_>, exit: Option<&P>) {
        if let Some(exit) = exit {
            summary::return_implies(cx, exit, &self.seeded, &self.written);
        }
    }
}

/// Analyzes every function of `unit`, in order, returning the warnings.
pub fn analyze(
    unit: &Unit,
    store: &mut dyn FactStore,
    signatures: &Signatures,
    options: &Options,
) -> Vec<Diagnostic> {
    let _span = info_span!("unit", name = %unit.file()).entered();
    let mut hooks = BufComparison::new(signatures, *options);
    let mut diagnostics = Vec::new();
    for function in unit.functions() {
        walk(&mut hooks, unit, function, store, &mut diagnostics);
    }
    debug!("{}: {} warnings", unit.file(), diagnostics.len());
    diagnostics
}
