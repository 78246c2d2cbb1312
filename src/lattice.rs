// SPDX-License-Identifier: BSD-3-Clause
//! Lattice for values of integer variables along one path

use ascent::{lattice::constant_propagation::ConstPropagation, Lattice};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd)]
pub struct IntLattice(ConstPropagation<i64>);

// ------------------------------------------------------------------
// Constructors

impl IntLattice {
    #[inline]
    pub fn bottom() -> Self {
        IntLattice(ConstPropagation::Bottom)
    }

    #[inline]
    pub fn constant(i: i64) -> Self {
        IntLattice(ConstPropagation::Constant(i))
    }

    #[inline]
    pub fn top() -> Self {
        IntLattice(ConstPropagation::Top)
    }
}

// ------------------------------------------------------------------
// Queries

impl IntLattice {
    #[inline]
    pub fn as_constant(&self) -> Option<i64> {
        match self.0 {
            ConstPropagation::Constant(c) => Some(c),
            ConstPropagation::Bottom | ConstPropagation::Top => None,
        }
    }

    #[inline]
    pub fn is_top(&self) -> bool {
        matches!(self.0, ConstPropagation::Top)
    }
}

// ------------------------------------------------------------------
// Traits

impl std::fmt::Display for IntLattice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            ConstPropagation::Bottom => write!(f, "⊥"),
            ConstPropagation::Constant(c) => write!(f, "{}", c),
            ConstPropagation::Top => write!(f, "⊤"),
        }
    }
}

impl Lattice for IntLattice {
    fn meet(self, other: Self) -> Self {
        IntLattice(self.0.meet(other.0))
    }

    fn join(self, other: Self) -> Self {
        IntLattice(self.0.join(other.0))
    }
}
