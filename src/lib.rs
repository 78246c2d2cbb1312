// SPDX-License-Identifier: BSD-3-Clause
pub mod analysis;
pub mod engine;
pub mod ir;
pub mod lattice;
pub mod layers;
pub mod limit;
pub mod oracle;
pub mod place;
pub mod signatures;
pub mod store;

pub use analysis::{analyze, Options};
pub use engine::Diagnostic;
pub use ir::{Unit, UnitBuilder};
pub use lattice::IntLattice;
pub use limit::LimitKind;
pub use place::{Place, QualifiedName};
pub use signatures::{Signature, Signatures};
pub use store::{FactStore, JsonStore, MemoryStore};
