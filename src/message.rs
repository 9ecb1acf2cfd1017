// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `Message` type and its derived predicates. See `spec.md` §3
//! "Message".

use crate::flags::Flags;
use crate::ids::{Endpoint, KsockId, MessageId};
use crate::name::Name;
use crate::payload::Payload;

#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub in_reply_to: MessageId,
    /// 0 means "any replier".
    pub to: u32,
    /// Set by the core on send.
    pub from: u32,
    pub orig_from: Endpoint,
    pub final_to: Endpoint,
    pub flags: Flags,
    pub name: Name,
    pub payload: Option<Payload>,
}

impl Message {
    /// A request iff WANT_REPLY is set.
    pub fn is_request(&self) -> bool { self.flags.contains(Flags::WANT_REPLY) }

    /// A reply iff `in_reply_to` is set.
    pub fn is_reply(&self) -> bool { !self.in_reply_to.is_unset() }

    /// A stateful request iff it is a request and `to` is nonzero.
    pub fn is_stateful_request(&self) -> bool { self.is_request() && self.to != 0 }

    /// Returns a copy of this message addressed for (or not for) the
    /// designated replier, per the push protocol of `spec.md` §4.3.
    pub fn oriented_for(&self, for_replier: bool) -> Message {
        let mut copy = self.clone();
        if for_replier {
            copy.flags.insert(Flags::WANT_YOU_TO_REPLY);
        } else {
            copy.flags.remove(Flags::WANT_YOU_TO_REPLY);
        }
        copy
    }

    pub fn set_from(&mut self, ksock: KsockId) { self.from = ksock.get(); }
}

/// Builds a `Message` for `send`, mirroring the fields a caller fills in
/// across the wire header of `spec.md` §6.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    pub id: MessageId,
    pub in_reply_to: MessageId,
    pub to: u32,
    pub orig_from: Endpoint,
    pub final_to: Endpoint,
    pub flags: Flags,
    pub name: Name,
    pub payload: Option<Payload>,
}

impl MessageBuilder {
    pub fn new(name: Name) -> Self {
        MessageBuilder {
            id: MessageId::UNSET,
            in_reply_to: MessageId::UNSET,
            to: 0,
            orig_from: Endpoint::default(),
            final_to: Endpoint::default(),
            flags: Flags::empty(),
            name,
            payload: None,
        }
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    pub fn to(mut self, to: u32) -> Self {
        self.to = to;
        self
    }

    pub fn in_reply_to(mut self, id: MessageId) -> Self {
        self.in_reply_to = id;
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn build(self) -> Message {
        Message {
            id: self.id,
            in_reply_to: self.in_reply_to,
            to: self.to,
            from: 0,
            orig_from: self.orig_from,
            final_to: self.final_to,
            flags: self.flags,
            name: self.name,
            payload: self.payload,
        }
    }
}
