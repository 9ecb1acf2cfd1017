// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-Ksock state: queues, outstanding-request tracking, unreplied-request
//! tracking, and the streaming read/write buffers. See `spec.md` §3
//! "Ksock" and §4.4.

use std::collections::{HashSet, VecDeque};

use crate::binding::BindingId;
use crate::ids::{KsockId, MessageId};
use crate::message::Message;
use crate::wire::{ReadBuffer, WriteBuffer};

/// Per-device tunables, passed to `Device::new`. See `spec.md` §10.3.
#[derive(Debug, Copy, Clone)]
pub struct DeviceConfig {
    /// Default `max_messages` for newly opened Ksocks.
    pub max_messages: u32,
    /// Cap on the device-wide set-aside list before it turns tragic.
    pub max_set_aside: usize,
    pub verbose: bool,
    pub report_replier_binds: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig { max_messages: 32, max_set_aside: 64, verbose: false, report_replier_binds: false }
    }
}

/// A message sitting in a Ksock's inbound queue, tagged with the binding
/// that caused its delivery (if any), so that unbinding that exact binding
/// can find and remove it again (`spec.md` §4.2 `unbind`).
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub message: Message,
    pub caused_by: Option<BindingId>,
}

/// A request this Ksock has read as Replier and not yet answered.
/// `requester` is the `from` of the original request, used to address the
/// synthetic `Replier.Ignored` reply.
#[derive(Debug, Copy, Clone)]
pub struct UnrepliedRequest {
    pub id: MessageId,
    pub requester: u32,
}

pub struct KsockState {
    pub id: KsockId,
    pub max_messages: u32,
    pub messages_only_once: bool,
    /// `true` while a send is blocked mid-retry (`spec.md` §4.3 "Retry
    /// semantics"); further writes are rejected with `AlreadyInUse`.
    pub sending: bool,
    pub inbound: VecDeque<QueueEntry>,
    pub outstanding: HashSet<MessageId>,
    pub unreplied: Vec<UnrepliedRequest>,
    /// Id of the last message whose send was attempted, for `LAST_SENT`.
    pub last_sent_id: MessageId,
    /// Id of the last message pushed to this Ksock by any delivery path,
    /// used for `messages_only_once` de-duplication across overlapping
    /// Listener/Replier bindings.
    pub last_pushed_id: Option<MessageId>,
    pub maybe_has_set_aside: bool,
    pub write_buffer: WriteBuffer,
    pub read_buffer: Option<ReadBuffer>,
    /// The message buffered across an `Again` retry, with its id already
    /// assigned so the retry preserves it.
    pub pending_send: Option<Message>,
}

impl KsockState {
    pub fn new(id: KsockId, config: &DeviceConfig) -> Self {
        KsockState {
            id,
            max_messages: config.max_messages,
            messages_only_once: false,
            sending: false,
            inbound: VecDeque::new(),
            outstanding: HashSet::new(),
            unreplied: Vec::new(),
            last_sent_id: MessageId::UNSET,
            last_pushed_id: None,
            maybe_has_set_aside: false,
            write_buffer: WriteBuffer::new(),
            read_buffer: None,
            pending_send: None,
        }
    }

    /// `len(inbound) + len(outstanding)`, the quantity bounded by
    /// `max_messages` at rest (`spec.md` §3 Invariants).
    pub fn reserved_count(&self) -> usize { self.inbound.len() + self.outstanding.len() }

    pub fn has_room(&self) -> bool { self.reserved_count() < self.max_messages as usize }

    /// Room to admit a reply whose matching outstanding-request entry is
    /// about to be removed as part of the same push, so the margin is
    /// computed one slot more generously than `has_room` (`spec.md` §4.3
    /// step 5: "room computed minus one because one slot is reserved for
    /// this reply").
    pub fn has_room_for_reply(&self) -> bool { self.reserved_count() <= self.max_messages as usize }

    pub fn push_back(&mut self, entry: QueueEntry) { self.inbound.push_back(entry); }

    pub fn push_front(&mut self, entry: QueueEntry) { self.inbound.push_front(entry); }
}
