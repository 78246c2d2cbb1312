// SPDX-License-Identifier: BSD-3-Clause
//! Storage locations that per-path state is keyed by.

use std::fmt::Display;

use crate::ir::{ExprId, ExprKind, Function, Storage, SymbolId, Type, TypeId, Unit};

/// A variable plus a structural position inside it, so that `p`, `*p` and
/// `p->len` are distinct keys while `p->len` and `(*p).len` are the same one.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum Place {
    Var(SymbolId),
    Deref(Box<Place>),
    Member(Box<Place>, String),
}

impl Place {
    pub fn of(unit: &Unit, e: ExprId) -> Option<Place> {
        match unit.kind(unit.strip(e)) {
            ExprKind::Symbol(s) => Some(Place::Var(*s)),
            ExprKind::Deref(inner) => Some(Place::Deref(Box::new(Place::of(unit, *inner)?))),
            ExprKind::Member {
                base,
                deref,
                member,
            } => {
                let mut base = Place::of(unit, *base)?;
                if *deref {
                    base = Place::Deref(Box::new(base));
                }
                Some(Place::Member(Box::new(base), member.clone()))
            }
            _ => None,
        }
    }

    pub fn root(&self) -> SymbolId {
        match self {
            Place::Var(s) => *s,
            Place::Deref(p) | Place::Member(p, _) => p.root(),
        }
    }

    /// Whether writing `prefix` also changes `self`.
    pub fn has_prefix(&self, prefix: &Place) -> bool {
        if self == prefix {
            return true;
        }
        match self {
            Place::Var(_) => false,
            Place::Deref(p) | Place::Member(p, _) => p.has_prefix(prefix),
        }
    }

    pub fn type_of(&self, unit: &Unit) -> Option<TypeId> {
        match self {
            Place::Var(s) => Some(unit.symbol(*s).ty),
            Place::Deref(p) => unit.pointee(p.type_of(unit)?),
            Place::Member(p, m) => unit.ty(p.type_of(unit)?).field(m).map(|f| f.ty),
        }
    }

    pub fn show(&self, unit: &Unit) -> String {
        match self {
            Place::Var(s) => unit.symbol(*s).name.clone(),
            Place::Deref(p) => format!("*{}", p.show(unit)),
            Place::Member(p, m) => match &**p {
                Place::Deref(inner) => format!("{}->{}", inner.show(unit), m),
                p => format!("{}.{}", p.show(unit), m),
            },
        }
    }
}

/// Whether evaluating `e` reads anything stored at or below `place`.
pub fn references(unit: &Unit, e: ExprId, place: &Place) -> bool {
    if let Some(p) = Place::of(unit, e) {
        if p.has_prefix(place) {
            return true;
        }
    }
    unit.kind(e)
        .children()
        .into_iter()
        .any(|c| references(unit, c, place))
}

/// Scope-qualified name of a variable or struct member, used to match limit
/// variables across functions and files.
#[derive(
    Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum QualifiedName {
    StructMember { struct_name: String, member: String },
    Static { file: String, name: String },
    Global { name: String },
    Local { function: String, name: String },
}

impl QualifiedName {
    pub fn of_place(unit: &Unit, function: &Function, place: &Place) -> Option<Self> {
        match place {
            Place::Var(s) => {
                let sym = unit.symbol(*s);
                Some(match sym.storage {
                    Storage::Static => QualifiedName::Static {
                        file: unit.file().to_string(),
                        name: sym.name.clone(),
                    },
                    Storage::Global => QualifiedName::Global {
                        name: sym.name.clone(),
                    },
                    Storage::Local | Storage::Param => QualifiedName::Local {
                        function: function.name.clone(),
                        name: sym.name.clone(),
                    },
                })
            }
            Place::Member(base, member) => match unit.ty(base.type_of(unit)?) {
                Type::Struct {
                    name: Some(struct_name),
                    ..
                } => Some(QualifiedName::StructMember {
                    struct_name: struct_name.clone(),
                    member: member.clone(),
                }),
                _ => None,
            },
            Place::Deref(_) => None,
        }
    }

    pub fn of_expr(unit: &Unit, function: &Function, e: ExprId) -> Option<Self> {
        Self::of_place(unit, function, &Place::of(unit, e)?)
    }

    /// Locals mean nothing outside their function and are never stored.
    #[inline]
    pub fn is_persistable(&self) -> bool {
        !matches!(self, QualifiedName::Local { .. })
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualifiedName::StructMember {
                struct_name,
                member,
            } => write!(f, "(struct {})->{}", struct_name, member),
            QualifiedName::Static { file, name } => write!(f, "static {}:{}", file, name),
            QualifiedName::Global { name } => write!(f, "global {}", name),
            QualifiedName::Local { function, name } => write!(f, "local {}:{}", function, name),
        }
    }
}
