// SPDX-License-Identifier: BSD-3-Clause
//! Capacity and link facts, and how they merge and go stale.

use std::{collections::BTreeMap, fmt::Display};

use tracing::debug;

use crate::{
    ir::{ExprId, Unit},
    limit::LimitKind,
    place::{references, Place},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Capacity {
    /// The buffer holds `bound` units of `kind`.
    Fact {
        kind: LimitKind,
        bound: ExprId,
        name: String,
    },
    /// Paths with different facts met here.
    Merged,
    /// No fact, or the fact was invalidated.
    Undefined,
}

impl Capacity {
    pub fn fact(unit: &Unit, kind: LimitKind, bound: ExprId) -> Self {
        let bound = unit.strip(bound);
        Capacity::Fact {
            kind,
            bound,
            name: format!("{} {}", kind, unit.show(bound)),
        }
    }

    #[inline]
    pub fn as_fact(&self) -> Option<(LimitKind, ExprId)> {
        match self {
            Capacity::Fact { kind, bound, .. } => Some((*kind, *bound)),
            Capacity::Merged | Capacity::Undefined => None,
        }
    }
}

impl Display for Capacity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capacity::Fact { name, .. } => write!(f, "{}", name),
            Capacity::Merged => write!(f, "merged"),
            Capacity::Undefined => write!(f, "undefined"),
        }
    }
}

/// Points from a bound back at the buffer it limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Link {
    To(Place),
    Merged,
    Undefined,
}

pub trait SlotState: Clone + PartialEq {
    fn merged() -> Self;
    fn undefined() -> Self;
    fn same(&self, unit: &Unit, other: &Self) -> bool;
}

impl SlotState for Capacity {
    fn merged() -> Self {
        Capacity::Merged
    }

    fn undefined() -> Self {
        Capacity::Undefined
    }

    fn same(&self, unit: &Unit, other: &Self) -> bool {
        match (self, other) {
            (
                Capacity::Fact {
                    kind: k1,
                    bound: b1,
                    ..
                },
                Capacity::Fact {
                    kind: k2,
                    bound: b2,
                    ..
                },
            ) => k1 == k2 && unit.equiv(*b1, *b2),
            (Capacity::Merged, Capacity::Merged) | (Capacity::Undefined, Capacity::Undefined) => {
                true
            }
            _ => false,
        }
    }
}

impl SlotState for Link {
    fn merged() -> Self {
        Link::Merged
    }

    fn undefined() -> Self {
        Link::Undefined
    }

    fn same(&self, _unit: &Unit, other: &Self) -> bool {
        self == other
    }
}

/// A state plus every state that flowed into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot<T> {
    pub state: T,
    pub possible: Vec<T>,
}

impl<T: SlotState> Slot<T> {
    pub fn new(state: T) -> Self {
        Slot {
            possible: vec![state.clone()],
            state,
        }
    }

    pub fn join(self, unit: &Unit, other: Self) -> Self {
        let state = if self.state.same(unit, &other.state) {
            self.state
        } else {
            T::merged()
        };
        let mut possible = self.possible;
        for p in other.possible {
            if !possible.iter().any(|q| q.same(unit, &p)) {
                possible.push(p);
            }
        }
        Slot { state, possible }
    }
}

/// What a key present on only one side of a join is merged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unmatched {
    /// The other side had no reason to disagree; keep the state.
    Keep,
    Undefined,
}

fn join_maps<T: SlotState>(
    unit: &Unit,
    a: BTreeMap<Place, Slot<T>>,
    mut b: BTreeMap<Place, Slot<T>>,
    unmatched: Unmatched,
) -> BTreeMap<Place, Slot<T>> {
    let fill = |slot: Slot<T>| match unmatched {
        Unmatched::Keep => slot,
        Unmatched::Undefined => slot.join(unit, Slot::new(T::undefined())),
    };
    let mut out = BTreeMap::new();
    for (k, sa) in a {
        let joined = match b.remove(&k) {
            Some(sb) => sa.join(unit, sb),
            None => fill(sa),
        };
        out.insert(k, joined);
    }
    for (k, sb) in b {
        out.insert(k, fill(sb));
    }
    out
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BufState {
    pub sizes: BTreeMap<Place, Slot<Capacity>>,
    pub links: BTreeMap<Place, Slot<Link>>,
}

impl BufState {
    /// Sizes missing on one side follow `unmatched`. Links always merge with
    /// `Undefined`.
    pub fn join(self, unit: &Unit, other: Self, unmatched: Unmatched) -> Self {
        BufState {
            sizes: join_maps(unit, self.sizes, other.sizes, unmatched),
            links: join_maps(unit, self.links, other.links, Unmatched::Undefined),
        }
    }

    #[inline]
    pub fn capacity(&self, buffer: &Place) -> Option<&Capacity> {
        self.sizes.get(buffer).map(|s| &s.state)
    }

    pub fn fact(&self, buffer: &Place) -> Option<(LimitKind, ExprId)> {
        self.capacity(buffer).and_then(Capacity::as_fact)
    }

    pub fn set_capacity(&mut self, buffer: Place, capacity: Capacity) {
        self.sizes.insert(buffer, Slot::new(capacity));
    }

    /// The buffer `bound` limits, if exactly one.
    pub fn linked(&self, bound: &Place) -> Option<&Place> {
        match self.links.get(bound).map(|s| &s.state) {
            Some(Link::To(p)) => Some(p),
            _ => None,
        }
    }

    pub fn set_link(&mut self, bound: Place, buffer: Place) {
        self.links.insert(bound, Slot::new(Link::To(buffer)));
    }

    /// Installs a fact for `buffer` and links its bound back to it.
    pub fn install(&mut self, unit: &Unit, buffer: Place, kind: LimitKind, bound: ExprId) {
        let capacity = Capacity::fact(unit, kind, bound);
        debug!("{}: {}", buffer.show(unit), capacity);
        if let Some(b) = Place::of(unit, bound) {
            self.set_link(b, buffer.clone());
        }
        self.set_capacity(buffer, capacity);
    }

    fn invalidate(&mut self, unit: &Unit, buffer: &Place) {
        if let Some(slot) = self.sizes.get_mut(buffer) {
            if slot.state != Capacity::Undefined {
                debug!("{}: invalidated", buffer.show(unit));
                *slot = Slot::new(Capacity::Undefined);
            }
        }
    }

    /// `place` was written.
    pub fn modified(&mut self, unit: &Unit, place: &Place) {
        let stale: Vec<Place> = self
            .sizes
            .iter()
            .filter(|(buffer, slot)| {
                buffer.has_prefix(place)
                    || matches!(
                        &slot.state,
                        Capacity::Fact { bound, .. } if references(unit, *bound, place)
                    )
            })
            .map(|(buffer, _)| buffer.clone())
            .collect();
        for buffer in &stale {
            self.invalidate(unit, buffer);
        }

        let bounds: Vec<Place> = self
            .links
            .keys()
            .filter(|b| b.has_prefix(place))
            .cloned()
            .collect();
        for bound in bounds {
            let Some(slot) = self.links.get(&bound) else {
                continue;
            };
            let buffers: Vec<Place> = match &slot.state {
                Link::To(b) => vec![b.clone()],
                Link::Merged | Link::Undefined => slot
                    .possible
                    .iter()
                    .filter_map(|l| match l {
                        Link::To(b) => Some(b.clone()),
                        Link::Merged | Link::Undefined => None,
                    })
                    .collect(),
            };
            for buffer in buffers {
                // The buffer may since have been re-bound to another variable.
                let rebound = matches!(
                    self.capacity(&buffer),
                    Some(Capacity::Fact { bound: b, .. }) if !references(unit, *b, &bound)
                );
                if !rebound {
                    self.invalidate(unit, &buffer);
                }
            }
            self.links.insert(bound, Slot::new(Link::Undefined));
        }
    }

    /// Replaces every merged size by the first concrete fact that flowed
    /// into it.
    pub fn assume_any_fact(&mut self, unit: &Unit) {
        for (buffer, slot) in self.sizes.iter_mut() {
            if slot.state != Capacity::Merged {
                continue;
            }
            if let Some(fact) = slot.possible.iter().find(|c| c.as_fact().is_some()) {
                debug!("{}: assuming {}", buffer.show(unit), fact);
                slot.state = fact.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BufState, Capacity, Unmatched};
    use crate::{
        ir::{Unit, UnitBuilder},
        limit::LimitKind,
        place::Place,
    };

    struct Fixture {
        unit: Unit,
        p: Place,
        n: Place,
        ne: crate::ir::ExprId,
        me: crate::ir::ExprId,
        ne_cast: crate::ir::ExprId,
    }

    fn fixture() -> Fixture {
        let mut b = UnitBuilder::new("t.c");
        let int = b.int(4, true);
        let long = b.int(8, true);
        let pint = b.ptr(int);
        let p = b.local("p", pint);
        let n = b.local("n", int);
        let m = b.local("m", int);
        let ne = b.var(n);
        let me = b.var(m);
        let ne2 = b.var(n);
        let ne_cast = b.cast(long, ne2);
        b.function("f", false, vec![], vec![]);
        Fixture {
            unit: b.finish().unwrap(),
            p: Place::Var(p),
            n: Place::Var(n),
            ne,
            me,
            ne_cast,
        }
    }

    #[test]
    fn equivalent_facts_survive_join() {
        let f = fixture();
        let mut a = BufState::default();
        a.install(&f.unit, f.p.clone(), LimitKind::ElemCount, f.ne);
        let mut b = BufState::default();
        b.install(&f.unit, f.p.clone(), LimitKind::ElemCount, f.ne_cast);
        let j = a.join(&f.unit, b, Unmatched::Keep);
        assert_eq!(Some((LimitKind::ElemCount, f.ne)), j.fact(&f.p));
    }

    #[test]
    fn different_facts_merge() {
        let f = fixture();
        let mut a = BufState::default();
        a.install(&f.unit, f.p.clone(), LimitKind::ElemCount, f.ne);
        let mut b = BufState::default();
        b.install(&f.unit, f.p.clone(), LimitKind::ElemCount, f.me);
        let j = a.clone().join(&f.unit, b, Unmatched::Keep);
        assert_eq!(Some(&Capacity::Merged), j.capacity(&f.p));
        assert_eq!(2, j.sizes[&f.p].possible.len());

        let mut k = BufState::default();
        k.install(&f.unit, f.p.clone(), LimitKind::ByteCount, f.ne);
        let j = a.join(&f.unit, k, Unmatched::Keep);
        assert_eq!(Some(&Capacity::Merged), j.capacity(&f.p));
    }

    #[test]
    fn unmatched_policy() {
        let f = fixture();
        let mut a = BufState::default();
        a.install(&f.unit, f.p.clone(), LimitKind::ElemCount, f.ne);
        let kept = a.clone().join(&f.unit, BufState::default(), Unmatched::Keep);
        assert_eq!(Some((LimitKind::ElemCount, f.ne)), kept.fact(&f.p));
        let mut undefined = a.join(&f.unit, BufState::default(), Unmatched::Undefined);
        assert_eq!(Some(&Capacity::Merged), undefined.capacity(&f.p));
        undefined.assume_any_fact(&f.unit);
        assert_eq!(Some((LimitKind::ElemCount, f.ne)), undefined.fact(&f.p));
    }

    #[test]
    fn writing_the_bound_invalidates_the_buffer() {
        let f = fixture();
        let mut s = BufState::default();
        s.install(&f.unit, f.p.clone(), LimitKind::ElemCount, f.ne);
        assert_eq!(Some(&f.p), s.linked(&f.n));
        s.modified(&f.unit, &f.n);
        assert_eq!(Some(&Capacity::Undefined), s.capacity(&f.p));
        assert_eq!(None, s.linked(&f.n));
    }

    #[test]
    fn rebound_buffers_survive_old_bound_writes() {
        let f = fixture();
        let mut s = BufState::default();
        s.install(&f.unit, f.p.clone(), LimitKind::ElemCount, f.ne);
        s.install(&f.unit, f.p.clone(), LimitKind::ElemCount, f.me);
        s.modified(&f.unit, &f.n);
        assert_eq!(Some((LimitKind::ElemCount, f.me)), s.fact(&f.p));
        s.modified(&f.unit, &f.p);
        assert_eq!(Some(&Capacity::Undefined), s.capacity(&f.p));
    }
}
