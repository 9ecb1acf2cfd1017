// SPDX-License-Identifier: MIT OR Apache-2.0

//! The binding table: an ordered list of `(pattern, owner, role)` tuples.
//! See `spec.md` §4.2.
//!
//! Per the redesign note in `spec.md` §9 ("address bindings... by stable
//! indices or generational ids"), each binding gets a monotonically
//! increasing `BindingId` instead of being identified by pointer, so that
//! unbind can find and remove exactly the queue entries it caused.

use crate::error::KbusError;
use crate::ids::KsockId;
use crate::name::{Name, Specificity};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

#[derive(Debug, Clone)]
pub struct Binding {
    pub id: BindingId,
    pub owner: KsockId,
    pub is_replier: bool,
    pub name: Name,
}

#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: Vec<Binding>,
    next_id: u64,
}

impl BindingTable {
    pub fn new() -> Self { BindingTable::default() }

    pub fn is_empty(&self) -> bool { self.bindings.is_empty() }

    pub fn len(&self) -> usize { self.bindings.len() }

    /// Insert a new binding. Fails with `AlreadyBound` if a replier binding
    /// already exists for the exact same pattern string.
    pub fn bind(&mut self, owner: KsockId, name: Name, is_replier: bool) -> Result<BindingId, KbusError> {
        if is_replier && self.bindings.iter().any(|b| b.is_replier && b.name == name) {
            return Err(KbusError::AlreadyBound);
        }
        let id = BindingId(self.next_id);
        self.next_id += 1;
        self.bindings.push(Binding { id, owner, is_replier, name });
        Ok(id)
    }

    /// Remove the binding owned by `owner` with exactly this `(name,
    /// is_replier)`. Returns the removed binding.
    pub fn unbind(&mut self, owner: KsockId, name: &Name, is_replier: bool) -> Result<Binding, KbusError> {
        let pos = self
            .bindings
            .iter()
            .position(|b| b.owner == owner && b.is_replier == is_replier && &b.name == name)
            .ok_or(KbusError::NotFound)?;
        Ok(self.bindings.remove(pos))
    }

    /// Remove every binding owned by `owner`, in insertion order.
    pub fn remove_owner(&mut self, owner: KsockId) -> Vec<Binding> {
        let (removed, kept): (Vec<_>, Vec<_>) = self.bindings.drain(..).partition(|b| b.owner == owner);
        self.bindings = kept;
        removed
    }

    /// Exact pattern-string lookup among replier bindings, used by the
    /// `FIND_REPLIER` control operation. Does not apply wildcard matching.
    pub fn find_replier_exact(&self, name: &Name) -> Option<KsockId> {
        self.bindings.iter().find(|b| b.is_replier && &b.name == name).map(|b| b.owner)
    }

    /// Compute the Listener candidate list and the chosen Replier (if any)
    /// for a concrete, non-wildcard `name`, per `spec.md` §4.2. The same
    /// Ksock may appear multiple times in the listener list.
    pub fn find_listeners(&self, name: &Name) -> (Vec<(BindingId, KsockId)>, Option<(BindingId, KsockId)>) {
        let mut listeners = Vec::new();
        let mut best: Option<(Specificity, BindingId, KsockId)> = None;
        for b in &self.bindings {
            if !b.name.matches(name) {
                continue;
            }
            if b.is_replier {
                let spec = b.name.specificity();
                let replace = match &best {
                    None => true,
                    Some((best_spec, _, _)) => spec > *best_spec,
                };
                if replace {
                    best = Some((spec, b.id, b.owner));
                }
            } else {
                listeners.push((b.id, b.owner));
            }
        }
        (listeners, best.map(|(_, id, owner)| (id, owner)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> { self.bindings.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn ks(n: u32) -> KsockId { KsockId::for_test(n) }

    fn name(s: &str) -> Name { Name::parse_for_bind(s).unwrap() }

    #[test]
    fn at_most_one_replier_per_exact_pattern() {
        let mut t = BindingTable::new();
        t.bind(ks(1), name("$.Q"), true).unwrap();
        assert_eq!(t.bind(ks(2), name("$.Q"), true).unwrap_err(), KbusError::AlreadyBound);
        // A second listener binding to the same name is fine.
        t.bind(ks(2), name("$.Q"), false).unwrap();
    }

    #[test]
    fn find_listeners_picks_most_specific_replier() {
        let mut t = BindingTable::new();
        t.bind(ks(1), name("$.Foo.*"), true).unwrap();
        t.bind(ks(2), name("$.Foo.Bar"), true).unwrap();
        let sent = Name::parse_for_send("$.Foo.Bar").unwrap();
        let (_listeners, replier) = t.find_listeners(&sent);
        assert_eq!(replier.unwrap().1, ks(2));
    }

    #[test]
    fn find_listeners_excludes_chosen_replier_from_listener_list() {
        let mut t = BindingTable::new();
        t.bind(ks(1), name("$.Foo"), true).unwrap();
        t.bind(ks(1), name("$.Foo"), false).unwrap();
        let sent = Name::parse_for_send("$.Foo").unwrap();
        let (listeners, replier) = t.find_listeners(&sent);
        assert_eq!(replier.unwrap().1, ks(1));
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn unbind_removes_exact_binding_only() {
        let mut t = BindingTable::new();
        t.bind(ks(1), name("$.Foo"), false).unwrap();
        assert_eq!(t.unbind(ks(1), &name("$.Foo"), true).unwrap_err(), KbusError::NotFound);
        t.unbind(ks(1), &name("$.Foo"), false).unwrap();
        assert!(t.is_empty());
    }
}
