// SPDX-License-Identifier: BSD-3-Clause
//! Programmatic construction of units, for tests and benchmarks.

use super::{
    BinOp, CmpOp, Error, Expr, ExprId, ExprKind, Field, Function, LogicalOp, StepOp, Stmt,
    Storage, Symbol, SymbolId, Type, TypeId, Unit, UnitData,
};

#[derive(Debug, Default)]
pub struct UnitBuilder {
    data: UnitData,
}

impl UnitBuilder {
    pub fn new(file: &str) -> Self {
        UnitBuilder {
            data: UnitData {
                file: file.to_string(),
                ..UnitData::default()
            },
        }
    }

    pub fn finish(self) -> Result<Unit, Error> {
        Unit::new(self.data)
    }

    // --------------------------------------------------------------
    // Types

    pub fn ty(&mut self, ty: Type) -> TypeId {
        if let Some(i) = self.data.types.iter().position(|t| *t == ty) {
            return TypeId(i as u32);
        }
        self.data.types.push(ty);
        TypeId((self.data.types.len() - 1) as u32)
    }

    pub fn void(&mut self) -> TypeId {
        self.ty(Type::Void)
    }

    pub fn int(&mut self, bytes: u64, signed: bool) -> TypeId {
        self.ty(Type::Int { bytes, signed })
    }

    pub fn ptr(&mut self, to: TypeId) -> TypeId {
        self.ty(Type::Ptr(to))
    }

    pub fn array(&mut self, elem: TypeId, len: Option<u64>) -> TypeId {
        self.ty(Type::Array { elem, len })
    }

    pub fn structure(&mut self, name: &str, fields: &[(&str, TypeId)]) -> TypeId {
        self.ty(Type::Struct {
            name: Some(name.to_string()),
            fields: fields
                .iter()
                .map(|(n, t)| Field {
                    name: Some(n.to_string()),
                    ty: *t,
                })
                .collect(),
        })
    }

    // --------------------------------------------------------------
    // Symbols

    pub fn symbol(&mut self, name: &str, ty: TypeId, storage: Storage) -> SymbolId {
        self.data.symbols.push(Symbol {
            name: name.to_string(),
            ty,
            storage,
            temporary: false,
        });
        SymbolId((self.data.symbols.len() - 1) as u32)
    }

    pub fn local(&mut self, name: &str, ty: TypeId) -> SymbolId {
        self.symbol(name, ty, Storage::Local)
    }

    pub fn param(&mut self, name: &str, ty: TypeId) -> SymbolId {
        self.symbol(name, ty, Storage::Param)
    }

    pub fn global(&mut self, name: &str, ty: TypeId) -> SymbolId {
        self.symbol(name, ty, Storage::Global)
    }

    pub fn file_static(&mut self, name: &str, ty: TypeId) -> SymbolId {
        self.symbol(name, ty, Storage::Static)
    }

    pub fn temporary(&mut self, name: &str, ty: TypeId) -> SymbolId {
        let s = self.local(name, ty);
        self.data.symbols[s.index()].temporary = true;
        s
    }

    // --------------------------------------------------------------
    // Expressions

    pub fn expr(&mut self, kind: ExprKind) -> ExprId {
        self.data.exprs.push(Expr::from(kind));
        ExprId((self.data.exprs.len() - 1) as u32)
    }

    pub fn typed(&mut self, kind: ExprKind, ty: TypeId) -> ExprId {
        self.data.exprs.push(Expr { kind, ty: Some(ty) });
        ExprId((self.data.exprs.len() - 1) as u32)
    }

    pub fn value(&mut self, v: i64) -> ExprId {
        self.expr(ExprKind::Value(v))
    }

    pub fn var(&mut self, s: SymbolId) -> ExprId {
        self.expr(ExprKind::Symbol(s))
    }

    pub fn sizeof(&mut self, t: TypeId) -> ExprId {
        self.expr(ExprKind::Sizeof(t))
    }

    pub fn binop(&mut self, op: BinOp, left: ExprId, right: ExprId) -> ExprId {
        self.expr(ExprKind::Binop { op, left, right })
    }

    pub fn add(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.binop(BinOp::Add, left, right)
    }

    pub fn sub(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.binop(BinOp::Sub, left, right)
    }

    pub fn mul(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.binop(BinOp::Mul, left, right)
    }

    pub fn div(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.binop(BinOp::Div, left, right)
    }

    pub fn compare(&mut self, op: CmpOp, left: ExprId, right: ExprId) -> ExprId {
        self.expr(ExprKind::Compare { op, left, right })
    }

    pub fn logical(&mut self, op: LogicalOp, left: ExprId, right: ExprId) -> ExprId {
        self.expr(ExprKind::Logical { op, left, right })
    }

    pub fn assign(&mut self, left: ExprId, right: ExprId) -> ExprId {
        self.expr(ExprKind::Assign {
            compound: None,
            left,
            right,
        })
    }

    pub fn compound_assign(&mut self, op: BinOp, left: ExprId, right: ExprId) -> ExprId {
        self.expr(ExprKind::Assign {
            compound: Some(op),
            left,
            right,
        })
    }

    pub fn call(&mut self, func: &str, args: Vec<ExprId>) -> ExprId {
        self.expr(ExprKind::Call {
            func: func.to_string(),
            args,
        })
    }

    pub fn index(&mut self, base: ExprId, offset: ExprId) -> ExprId {
        self.expr(ExprKind::Index { base, offset })
    }

    pub fn deref(&mut self, inner: ExprId) -> ExprId {
        self.expr(ExprKind::Deref(inner))
    }

    pub fn addr_of(&mut self, inner: ExprId) -> ExprId {
        self.expr(ExprKind::AddrOf(inner))
    }

    pub fn arrow(&mut self, base: ExprId, member: &str) -> ExprId {
        self.expr(ExprKind::Member {
            base,
            deref: true,
            member: member.to_string(),
        })
    }

    pub fn dot(&mut self, base: ExprId, member: &str) -> ExprId {
        self.expr(ExprKind::Member {
            base,
            deref: false,
            member: member.to_string(),
        })
    }

    pub fn cast(&mut self, ty: TypeId, inner: ExprId) -> ExprId {
        self.expr(ExprKind::Cast { ty, inner })
    }

    pub fn post_inc(&mut self, inner: ExprId) -> ExprId {
        self.expr(ExprKind::Step {
            op: StepOp::Inc,
            post: true,
            inner,
        })
    }

    pub fn pre_inc(&mut self, inner: ExprId) -> ExprId {
        self.expr(ExprKind::Step {
            op: StepOp::Inc,
            post: false,
            inner,
        })
    }

    pub fn stmt_expr(&mut self, temp: SymbolId, init: ExprId, value: ExprId) -> ExprId {
        self.expr(ExprKind::StmtExpr { temp, init, value })
    }

    // --------------------------------------------------------------
    // Functions

    pub fn function(
        &mut self,
        name: &str,
        is_static: bool,
        params: Vec<SymbolId>,
        body: Vec<Stmt>,
    ) {
        self.data.functions.push(Function {
            name: name.to_string(),
            is_static,
            params,
            body,
        });
    }
}
