// SPDX-License-Identifier: MIT OR Apache-2.0

//! The endpoint registry: the set of live Ksocks on one device. See
//! `spec.md` §4.1. A dependency leaf — it only allocates ids and tracks
//! liveness; the per-Ksock state itself is owned by `Device`.

use std::collections::HashSet;

use crate::ids::{KsockId, WrappingCounter};

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    counter: WrappingCounter,
    live: HashSet<KsockId>,
}

impl EndpointRegistry {
    pub fn new() -> Self { EndpointRegistry::default() }

    /// Allocate a fresh, never-zero id and mark it live.
    pub fn attach(&mut self) -> KsockId {
        let id = self.counter.next_ksock_id();
        self.live.insert(id);
        id
    }

    /// Remove an id from the live set. No-op if already absent.
    pub fn detach(&mut self, id: KsockId) { self.live.remove(&id); }

    pub fn is_live(&self, id: KsockId) -> bool { self.live.contains(&id) }

    pub fn len(&self) -> usize { self.live.len() }

    pub fn is_empty(&self) -> bool { self.live.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_assigns_unique_nonzero_ids() {
        let mut reg = EndpointRegistry::new();
        let a = reg.attach();
        let b = reg.attach();
        assert_ne!(a, b);
        assert!(reg.is_live(a));
        assert!(reg.is_live(b));
    }

    #[test]
    fn detach_removes_liveness() {
        let mut reg = EndpointRegistry::new();
        let a = reg.attach();
        reg.detach(a);
        assert!(!reg.is_live(a));
        assert!(reg.is_empty());
    }
}
