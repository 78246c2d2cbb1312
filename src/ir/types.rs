// SPDX-License-Identifier: BSD-3-Clause
use serde::{Deserialize, Serialize};

/// Size of a pointer on the analyzed target.
pub const POINTER_BYTES: u64 = 8;

#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: Option<String>,
    pub ty: TypeId,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Type {
    Void,
    Int {
        bytes: u64,
        signed: bool,
    },
    Ptr(TypeId),
    /// `len` is `None` for `T x[]` and `Some(0)` for the old `T x[0]` idiom.
    Array {
        elem: TypeId,
        len: Option<u64>,
    },
    Struct {
        name: Option<String>,
        fields: Vec<Field>,
    },
}

impl Type {
    pub(crate) fn children(&self) -> Vec<TypeId> {
        match self {
            Type::Void | Type::Int { .. } => Vec::new(),
            Type::Ptr(t) => vec![*t],
            Type::Array { elem, .. } => vec![*elem],
            Type::Struct { fields, .. } => fields.iter().map(|f| f.ty).collect(),
        }
    }

    /// Types stored inline, i.e. every child but a pointee.
    pub(crate) fn contents(&self) -> Vec<TypeId> {
        match self {
            Type::Ptr(_) => Vec::new(),
            t => t.children(),
        }
    }

    #[inline]
    pub fn is_pointer_like(&self) -> bool {
        matches!(self, Type::Ptr(_) | Type::Array { .. })
    }

    /// Array whose declared size is absent or zero.
    #[inline]
    pub fn is_flexible_array(&self) -> bool {
        matches!(self, Type::Array { len: None | Some(0), .. })
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        match self {
            Type::Struct { fields, .. } => fields
                .iter()
                .find(|f| f.name.as_deref() == Some(name)),
            _ => None,
        }
    }
}
