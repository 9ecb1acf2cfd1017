// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message flags. See `spec.md` §3 for the bit table. The top 16 bits are
//! opaque to the core and are preserved verbatim across the wire but never
//! interpreted.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        /// Set by the sender: this message is a request.
        const WANT_REPLY = 1 << 0;
        /// Set by the core, per-recipient: this copy is addressed to the
        /// designated replier and obliges a reply.
        const WANT_YOU_TO_REPLY = 1 << 1;
        /// Set by the core: this is a synthetic diagnostic message.
        const SYNTHETIC = 1 << 2;
        /// Set by the sender: prepend this message to the recipient's queue.
        const URGENT = 1 << 3;
        /// Set by the sender: block until every required recipient has room.
        const ALL_OR_WAIT = 1 << 4;
        /// Set by the sender: fail with Busy if any required recipient is full.
        const ALL_OR_FAIL = 1 << 5;
    }
}

/// Bits reserved for the core; everything outside this mask is opaque to
/// routing and is passed through unexamined.
pub const CORE_FLAGS_MASK: u32 = 0x0000_FFFF;

impl Flags {
    /// `true` iff both ALL_OR_WAIT and ALL_OR_FAIL are set, which is always
    /// rejected by the routing engine.
    pub fn has_conflicting_all_or(&self) -> bool {
        self.contains(Flags::ALL_OR_WAIT) && self.contains(Flags::ALL_OR_FAIL)
    }

    /// The caller-opaque upper 16 bits, preserved but never interpreted.
    pub fn opaque_bits(&self) -> u32 { self.bits() & !CORE_FLAGS_MASK }
}
