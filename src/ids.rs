// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifiers used throughout the routing engine: message ids, cross-network
//! endpoint pairs, and the per-device Ksock id space.
//!
//! See `spec.md` §3 "Message identifier" and "Cross-network endpoint".

use std::num::NonZeroU32;

/// A `(network_id, serial_num)` pair. `(0, 0)` means "unset".
///
/// When a local message is accepted for sending the core assigns
/// `(0, next_serial)`; a message arriving with a non-zero `network_id` is
/// preserved verbatim, since it originated on a remote bus via a bridge.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct MessageId {
    pub network_id: u32,
    pub serial_num: u32,
}

impl MessageId {
    pub const UNSET: MessageId = MessageId { network_id: 0, serial_num: 0 };

    pub fn is_unset(&self) -> bool { *self == Self::UNSET }

    pub fn is_local(&self) -> bool { self.network_id == 0 }
}

/// A `(network_id, local_id)` pair used for `orig_from`/`final_to`. The core
/// preserves and propagates these without interpreting them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Endpoint {
    pub network_id: u32,
    pub local_id: u32,
}

/// The 32-bit local id of a live Ksock on a device. Never zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KsockId(NonZeroU32);

impl KsockId {
    pub fn get(self) -> u32 { self.0.get() }

    /// `0` is the wire sentinel for "none" / "any"; every other value may
    /// name a live Ksock.
    pub fn from_u32(n: u32) -> Option<KsockId> { NonZeroU32::new(n).map(KsockId) }

    #[cfg(test)]
    pub fn for_test(n: u32) -> KsockId { KsockId(NonZeroU32::new(n).expect("test id must be nonzero")) }
}

impl std::fmt::Display for KsockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// A monotonically increasing id counter that skips zero on wrap. Used both
/// for the endpoint registry's Ksock ids and the device's message serials.
#[derive(Debug)]
pub struct WrappingCounter {
    next: u32,
}

impl WrappingCounter {
    pub fn new() -> Self { WrappingCounter { next: 1 } }

    /// Returns the next value and advances the counter, skipping zero.
    pub fn next(&mut self) -> u32 {
        let value = self.next;
        self.next = self.next.wrapping_add(1);
        if self.next == 0 {
            self.next = 1;
        }
        value
    }

    pub fn next_ksock_id(&mut self) -> KsockId {
        KsockId(NonZeroU32::new(self.next()).expect("counter never yields zero"))
    }
}

impl Default for WrappingCounter {
    fn default() -> Self { Self::new() }
}
