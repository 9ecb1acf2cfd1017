// SPDX-License-Identifier: MIT OR Apache-2.0

//! `Device`: the Big Lock, the `send` routing algorithm, Ksock lifecycle,
//! and the set-aside/safe-report protocol. See `spec.md` §4.3–§4.7 and §5.
//!
//! All mutating operations on one device serialize behind a single
//! `Mutex<DeviceInner>` (the "Big Lock" of `spec.md` §5 — deliberately a
//! single coarse lock, per the design note in §9, mirroring the way the
//! teacher's `SystemServices::with_mut` serializes every syscall against one
//! lock rather than a lock per subsystem). Two condition variables hang off
//! the device rather than off each Ksock, so waiting never needs a
//! self-referential borrow through the guard; over-signaling every waiter is
//! harmless (`spec.md` §9).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::binding::{BindingId, BindingTable};
use crate::error::{KbusError, KbusResult};
use crate::flags::Flags;
use crate::ids::{KsockId, MessageId, WrappingCounter};
use crate::ksock::{DeviceConfig, KsockState, QueueEntry, UnrepliedRequest};
use crate::message::Message;
use crate::name::Name;
use crate::registry::EndpointRegistry;
use crate::synthetic;
use crate::wire::{ReadBuffer, UserMemoryAccess, WriteBuffer};

/// One entry on the device-wide set-aside list (`spec.md` §4.7).
struct SetAsideEntry {
    for_ksock: KsockId,
    message: Message,
    /// `true` for a synthesized `$.KBUS.UnbindEventsLost`, so a second
    /// overflow for the same Ksock doesn't queue a duplicate.
    is_tragic: bool,
}

struct DeviceInner {
    registry: EndpointRegistry,
    bindings: BindingTable,
    ksocks: HashMap<KsockId, KsockState>,
    serials: WrappingCounter,
    set_aside: Vec<SetAsideEntry>,
    is_tragic: bool,
    config: DeviceConfig,
}

impl DeviceInner {
    fn ksock(&self, id: KsockId) -> KbusResult<&KsockState> { self.ksocks.get(&id).ok_or(KbusError::NotFound) }

    fn ksock_mut(&mut self, id: KsockId) -> KbusResult<&mut KsockState> {
        self.ksocks.get_mut(&id).ok_or(KbusError::NotFound)
    }

    /// `push(ksock, msg, for_replier)` of `spec.md` §4.3's push protocol.
    /// Never checks capacity — callers that must respect `max_messages` do
    /// so themselves first; synthetic and bind-event deliveries bypass it
    /// on purpose (`spec.md` §4.6).
    fn push(&mut self, target_id: KsockId, msg: &Message, for_replier: bool, caused_by: Option<BindingId>) -> bool {
        let oriented = msg.oriented_for(for_replier);
        let Some(target) = self.ksocks.get_mut(&target_id) else {
            return false;
        };
        if target.messages_only_once && target.last_pushed_id == Some(oriented.id) {
            trace!("once-only: dropping duplicate push of {:?} to ksock {target_id}", oriented.id);
            return false;
        }
        if oriented.is_reply() {
            target.outstanding.remove(&oriented.in_reply_to);
        }
        let urgent = oriented.flags.contains(Flags::URGENT);
        let entry = QueueEntry { message: oriented.clone(), caused_by };
        if urgent {
            target.push_front(entry);
        } else {
            target.push_back(entry);
        }
        target.last_pushed_id = Some(oriented.id);
        true
    }

    /// Steps 1-8 of `spec.md` §4.3. Mutates nothing beyond the id assignment
    /// in step 1 unless every admission check passes, so a failed attempt
    /// leaves the caller free to retry with the same id.
    fn attempt_send(&mut self, sender_id: KsockId, msg: &mut Message) -> KbusResult<()> {
        if msg.flags.has_conflicting_all_or() {
            return Err(KbusError::BadMessage);
        }
        msg.flags.remove(Flags::SYNTHETIC);
        msg.set_from(sender_id);
        if msg.id.is_unset() {
            msg.id = MessageId { network_id: 0, serial_num: self.serials.next() };
        }

        if msg.is_request() && !self.ksock(sender_id)?.has_room() {
            return Err(KbusError::NoLock);
        }

        let (listeners, replier) = self.bindings.find_listeners(&msg.name);

        if msg.is_request() && replier.is_none() {
            return Err(KbusError::AddrNotAvailable);
        }

        let reply_target = if msg.is_reply() {
            let target_id = KsockId::from_u32(msg.to).ok_or(KbusError::AddrNotAvailable)?;
            let target = self.ksock(target_id).map_err(|_| KbusError::AddrNotAvailable)?;
            if !target.outstanding.contains(&msg.in_reply_to) {
                return Err(KbusError::ConnRefused);
            }
            if !target.has_room_for_reply() {
                return Err(all_or_error(msg));
            }
            Some(target_id)
        } else {
            None
        };

        let chosen_replier = if msg.is_request() {
            let (binding_id, replier_id) = replier.expect("checked above: is_request implies replier.is_some()");
            if msg.to != 0 && msg.to != replier_id.get() {
                return Err(KbusError::Pipe);
            }
            if !self.ksock(replier_id)?.has_room() {
                return Err(all_or_error(msg));
            }
            Some((binding_id, replier_id))
        } else {
            None
        };

        let mut listeners_to_push = Vec::with_capacity(listeners.len());
        for (binding_id, ksock_id) in listeners {
            if !self.ksock(ksock_id)?.has_room() {
                if msg.flags.contains(Flags::ALL_OR_WAIT) {
                    return Err(KbusError::Again);
                } else if msg.flags.contains(Flags::ALL_OR_FAIL) {
                    return Err(KbusError::Busy);
                } else {
                    continue;
                }
            }
            listeners_to_push.push((binding_id, ksock_id));
        }

        if let Some(target_id) = reply_target {
            self.push(target_id, msg, false, None);
            if let Ok(sender) = self.ksock_mut(sender_id) {
                sender.unreplied.retain(|r| r.id != msg.in_reply_to);
            }
        }
        if let Some((binding_id, replier_id)) = chosen_replier {
            self.push(replier_id, msg, true, Some(binding_id));
            if let Ok(sender) = self.ksock_mut(sender_id) {
                sender.outstanding.insert(msg.id);
            }
        }
        for (binding_id, ksock_id) in listeners_to_push {
            self.push(ksock_id, msg, false, Some(binding_id));
        }
        Ok(())
    }

    /// Publish `msg` (already flagged `ALL_OR_FAIL`) to every Listener
    /// matching its name, failing the whole publish with `Busy` if any is
    /// full. Used only for bind/unbind event announcements.
    fn publish_event(&mut self, msg: &Message) -> KbusResult<()> {
        let (listeners, _replier) = self.bindings.find_listeners(&msg.name);
        for (_, ksock_id) in &listeners {
            if !self.ksock(*ksock_id)?.has_room() {
                return Err(KbusError::Busy);
            }
        }
        for (binding_id, ksock_id) in listeners {
            self.push(ksock_id, msg, false, Some(binding_id));
        }
        Ok(())
    }

    /// `spec.md` §4.7 step 2: stash `msg` for every interested Listener,
    /// degrading to a single `UnbindEventsLost` per Listener once the
    /// device-wide cap is hit.
    fn stash_set_aside(&mut self, msg: &Message) {
        let (listeners, _replier) = self.bindings.find_listeners(&msg.name);
        for (_, ksock_id) in listeners {
            if self.set_aside.len() < self.config.max_set_aside {
                self.set_aside.push(SetAsideEntry { for_ksock: ksock_id, message: msg.clone(), is_tragic: false });
            } else {
                let already_tragic = self.set_aside.iter().any(|e| e.for_ksock == ksock_id && e.is_tragic);
                if !self.is_tragic {
                    warn!("set-aside list full, ksock {ksock_id} will miss bind events");
                }
                self.is_tragic = true;
                if !already_tragic {
                    let tragic_msg = synthetic::unbind_events_lost(ksock_id.get());
                    self.set_aside.push(SetAsideEntry { for_ksock: ksock_id, message: tragic_msg, is_tragic: true });
                }
            }
            if let Some(ks) = self.ksocks.get_mut(&ksock_id) {
                ks.maybe_has_set_aside = true;
            }
        }
    }

    /// `spec.md` §4.7: publish a bind/unbind event, falling back to the
    /// set-aside stash when `ALL_OR_FAIL` publication returns `Busy` and
    /// `fail_on_busy` is false. The BIND path sets `fail_on_busy` so the
    /// binding itself is refused instead of silently stashed
    /// (`spec.md` §4.2).
    fn report_bind_event(&mut self, is_bind: bool, binder: KsockId, name: &Name, fail_on_busy: bool) -> KbusResult<()> {
        if !self.config.report_replier_binds {
            return Ok(());
        }
        let mut msg = synthetic::bind_event(is_bind, binder, name);
        msg.flags.insert(Flags::ALL_OR_FAIL);
        match self.publish_event(&msg) {
            Ok(()) => Ok(()),
            Err(KbusError::Busy) if fail_on_busy => Err(KbusError::Busy),
            Err(KbusError::Busy) => {
                self.stash_set_aside(&msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// `spec.md` §4.7 step 3: after a dequeue frees a slot on `ksock_id`,
    /// move one stashed message onto its inbound queue if any is waiting.
    fn replenish_set_aside(&mut self, ksock_id: KsockId) {
        let has_stash = self.ksocks.get(&ksock_id).map(|k| k.maybe_has_set_aside).unwrap_or(false);
        if !has_stash {
            return;
        }
        if let Some(pos) = self.set_aside.iter().position(|e| e.for_ksock == ksock_id) {
            let entry = self.set_aside.remove(pos);
            self.push(ksock_id, &entry.message, false, None);
        }
        let remains = self.set_aside.iter().any(|e| e.for_ksock == ksock_id);
        if let Some(ks) = self.ksocks.get_mut(&ksock_id) {
            ks.maybe_has_set_aside = remains;
        }
        if self.set_aside.is_empty() {
            self.is_tragic = false;
        }
    }

    fn bind(&mut self, owner: KsockId, raw_name: &str, is_replier: bool) -> KbusResult<()> {
        let name = Name::parse_for_bind(raw_name)?;
        if is_replier && name.as_str() == synthetic::REPLIER_BIND_EVENT {
            return Err(KbusError::BadMessage);
        }
        self.bindings.bind(owner, name.clone(), is_replier)?;
        if is_replier {
            if let Err(e) = self.report_bind_event(true, owner, &name, true) {
                let _ = self.bindings.unbind(owner, &name, is_replier);
                return Err(e);
            }
        }
        debug!("ksock {owner} bound to {:?} (replier={is_replier})", name.as_str());
        Ok(())
    }

    fn unbind(&mut self, owner: KsockId, raw_name: &str, is_replier: bool) -> KbusResult<()> {
        let name = Name::parse_for_bind(raw_name)?;
        let binding = self.bindings.unbind(owner, &name, is_replier)?;
        debug!("ksock {owner} unbound from {:?} (replier={is_replier})", name.as_str());

        let mut removed_requests = Vec::new();
        if let Some(ks) = self.ksocks.get_mut(&owner) {
            let mut kept = VecDeque::with_capacity(ks.inbound.len());
            while let Some(entry) = ks.inbound.pop_front() {
                if entry.caused_by == Some(binding.id) {
                    removed_requests.push(entry.message);
                } else {
                    kept.push_back(entry);
                }
            }
            ks.inbound = kept;
        }
        for m in removed_requests {
            if m.is_request() && m.flags.contains(Flags::WANT_YOU_TO_REPLY) {
                if let Some(sender_id) = KsockId::from_u32(m.from) {
                    let synth = synthetic::unbound(m.id, m.from);
                    self.push(sender_id, &synth, false, None);
                }
            }
        }

        if is_replier {
            self.report_bind_event(false, owner, &name, false)?;
        }
        Ok(())
    }

    /// `spec.md` §4.5 "On release".
    fn close_ksock(&mut self, id: KsockId) {
        let Some(ks) = self.ksocks.remove(&id) else {
            return;
        };

        for entry in &ks.inbound {
            let m = &entry.message;
            if m.is_request() && m.flags.contains(Flags::WANT_YOU_TO_REPLY) && m.from != id.get() {
                if let Some(sender_id) = KsockId::from_u32(m.from) {
                    let synth = synthetic::gone_away(m.id, m.from);
                    self.push(sender_id, &synth, false, None);
                }
            }
        }

        for req in &ks.unreplied {
            if let Some(sender_id) = KsockId::from_u32(req.requester) {
                let synth = synthetic::ignored(req.id, req.requester);
                self.push(sender_id, &synth, false, None);
            }
        }

        let removed_bindings = self.bindings.remove_owner(id);
        for binding in &removed_bindings {
            if binding.is_replier {
                let _ = self.report_bind_event(false, id, &binding.name, false);
            }
        }

        self.set_aside.retain(|e| e.for_ksock != id);
        self.registry.detach(id);
    }
}

/// The error kind for a `send` that found no room at a mandatory recipient:
/// `Again` under `ALL_OR_WAIT`, `Busy` otherwise (`spec.md` §4.3 steps 5-6).
fn all_or_error(msg: &Message) -> KbusError {
    if msg.flags.contains(Flags::ALL_OR_WAIT) {
        KbusError::Again
    } else {
        KbusError::Busy
    }
}

/// One KBUS device: the Big Lock plus its readable/writable wait channels.
/// See `spec.md` §3 "Device" and §5.
pub struct Device {
    inner: Mutex<DeviceInner>,
    readable: Condvar,
    writable: Condvar,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Self {
        info!("new device created (max_messages={}, max_set_aside={})", config.max_messages, config.max_set_aside);
        Device {
            inner: Mutex::new(DeviceInner {
                registry: EndpointRegistry::new(),
                bindings: BindingTable::new(),
                ksocks: HashMap::new(),
                serials: WrappingCounter::new(),
                set_aside: Vec::new(),
                is_tragic: false,
                config,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceInner> { self.inner.lock().unwrap_or_else(|e| e.into_inner()) }

    fn notify_all_channels(&self) {
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// `true` iff the device's set-aside list has overflowed at least once
    /// and has not yet fully drained (`spec.md` §4.7, glossary "Tragic").
    pub fn is_tragic(&self) -> bool { self.lock().is_tragic }

    /// `spec.md` §4.5 "On open".
    pub fn open(&self) -> KsockId {
        let mut inner = self.lock();
        let id = inner.registry.attach();
        let config = inner.config;
        inner.ksocks.insert(id, KsockState::new(id, &config));
        drop(inner);
        self.notify_all_channels();
        debug!("ksock {id} opened");
        id
    }

    /// `spec.md` §4.5 "On release". No-op if `id` is already closed.
    pub fn close(&self, id: KsockId) {
        let mut inner = self.lock();
        inner.close_ksock(id);
        drop(inner);
        self.notify_all_channels();
        debug!("ksock {id} closed");
    }

    pub fn ksock_id(&self, id: KsockId) -> u32 { id.get() }

    /// BIND. See `spec.md` §4.2 and §6.
    pub fn bind(&self, id: KsockId, name: &str, is_replier: bool) -> KbusResult<()> {
        let mut inner = self.lock();
        let result = inner.bind(id, name, is_replier);
        drop(inner);
        if result.is_ok() {
            self.notify_all_channels();
        }
        result
    }

    /// UNBIND. See `spec.md` §4.2 and §6.
    pub fn unbind(&self, id: KsockId, name: &str, is_replier: bool) -> KbusResult<()> {
        let mut inner = self.lock();
        let result = inner.unbind(id, name, is_replier);
        drop(inner);
        if result.is_ok() {
            self.notify_all_channels();
        }
        result
    }

    /// FIND_REPLIER: exact-match lookup, `0` meaning "none".
    pub fn find_replier(&self, name: &str) -> KbusResult<u32> {
        let name = Name::parse_for_send(name)?;
        Ok(self.lock().bindings.find_replier_exact(&name).map(KsockId::get).unwrap_or(0))
    }

    /// NEXT_MSG: pop the head of the inbound queue into the read buffer,
    /// discarding any half-read prior message, and return its byte length
    /// (`0` if the queue was empty). Records an unreplied-request entry when
    /// the popped message obliges a reply (`spec.md` §4.4, §6).
    pub fn next_message(&self, id: KsockId) -> KbusResult<u32> {
        let mut inner = self.lock();
        let ks = inner.ksock_mut(id)?;
        let Some(entry) = ks.inbound.pop_front() else {
            ks.read_buffer = None;
            return Ok(0);
        };
        let owes_reply = entry.message.is_request() && entry.message.flags.contains(Flags::WANT_YOU_TO_REPLY);
        let (requester, req_id) = (entry.message.from, entry.message.id);
        let read_buffer = ReadBuffer::for_message(&entry.message);
        let total_len = read_buffer.total_len();
        ks.read_buffer = Some(read_buffer);
        if owes_reply {
            ks.unreplied.push(UnrepliedRequest { id: req_id, requester });
        }
        inner.replenish_set_aside(id);
        drop(inner);
        self.notify_all_channels();
        Ok(total_len as u32)
    }

    /// LEN_LEFT: bytes left in the current read buffer.
    pub fn len_left(&self, id: KsockId) -> KbusResult<u32> {
        let inner = self.lock();
        Ok(inner.ksock(id)?.read_buffer.as_ref().map(|b| b.bytes_left() as u32).unwrap_or(0))
    }

    /// Stream bytes out of the current read buffer, releasing it once
    /// exhausted.
    pub fn read(&self, id: KsockId, out: &mut [u8]) -> KbusResult<usize> {
        let mut inner = self.lock();
        let ks = inner.ksock_mut(id)?;
        let Some(buf) = ks.read_buffer.as_mut() else {
            return Ok(0);
        };
        let n = buf.read(out);
        if buf.is_exhausted() {
            ks.read_buffer = None;
        }
        Ok(n)
    }

    /// Stream bytes into the write buffer. Rejected with `AlreadyInUse`
    /// while a prior send is mid-retry (`spec.md` §4.4).
    pub fn write(&self, id: KsockId, data: &[u8]) -> KbusResult<usize> {
        let mut inner = self.lock();
        inner.ksock_mut(id)?.write_buffer.write(data)
    }

    /// DISCARD: abandon the current write buffer and any pending retry.
    pub fn discard(&self, id: KsockId) -> KbusResult<()> {
        let mut inner = self.lock();
        let ks = inner.ksock_mut(id)?;
        ks.write_buffer.reset();
        ks.sending = false;
        ks.pending_send = None;
        Ok(())
    }

    pub fn last_sent(&self, id: KsockId) -> KbusResult<MessageId> { Ok(self.lock().ksock(id)?.last_sent_id) }

    /// MAX_MESSAGES: `0` queries, anything else sets and returns the new
    /// current value.
    pub fn max_messages(&self, id: KsockId, new: u32) -> KbusResult<u32> {
        let mut inner = self.lock();
        let ks = inner.ksock_mut(id)?;
        if new != 0 {
            ks.max_messages = new;
        }
        Ok(ks.max_messages)
    }

    pub fn num_messages(&self, id: KsockId) -> KbusResult<u32> { Ok(self.lock().ksock(id)?.inbound.len() as u32) }

    pub fn unreplied_to(&self, id: KsockId) -> KbusResult<u32> { Ok(self.lock().ksock(id)?.unreplied.len() as u32) }

    /// MSG_ONLY_ONCE: `0`/`1` set, `0xFFFFFFFF` queries; returns the
    /// previous value.
    pub fn msg_only_once(&self, id: KsockId, value: u32) -> KbusResult<u32> {
        let mut inner = self.lock();
        let ks = inner.ksock_mut(id)?;
        let previous = ks.messages_only_once as u32;
        match value {
            0xFFFF_FFFF => {}
            0 => ks.messages_only_once = false,
            1 => ks.messages_only_once = true,
            _ => return Err(KbusError::Invalid),
        }
        Ok(previous)
    }

    /// REPORT_REPLIER_BINDS: device-wide, same query/set convention as
    /// `msg_only_once`.
    pub fn report_replier_binds(&self, value: u32) -> KbusResult<u32> {
        let mut inner = self.lock();
        let previous = inner.config.report_replier_binds as u32;
        match value {
            0xFFFF_FFFF => {}
            0 => inner.config.report_replier_binds = false,
            1 => inner.config.report_replier_binds = true,
            _ => return Err(KbusError::Invalid),
        }
        Ok(previous)
    }

    /// Attempt (or reattempt) `attempt_send` for a buffered message,
    /// updating Ksock state and generating the synthetic replies of
    /// `spec.md` §4.3 "Retry semantics" / §7 on a non-`Again` failure.
    fn settle_send_outcome(
        &self,
        inner: &mut DeviceInner,
        id: KsockId,
        msg: Message,
        result: KbusResult<()>,
        is_retry: bool,
    ) -> KbusResult<MessageId> {
        match result {
            Ok(()) => {
                if let Ok(ks) = inner.ksock_mut(id) {
                    ks.last_sent_id = msg.id;
                    ks.sending = false;
                    ks.pending_send = None;
                    ks.write_buffer.reset();
                }
                Ok(msg.id)
            }
            Err(KbusError::Again) => {
                if let Ok(ks) = inner.ksock_mut(id) {
                    ks.sending = true;
                    ks.last_sent_id = msg.id;
                    ks.write_buffer.lock_for_retry();
                    ks.pending_send = Some(msg);
                }
                Err(KbusError::Again)
            }
            Err(e) => {
                if is_retry {
                    let to = msg.from;
                    let synth = if e == KbusError::AddrNotAvailable {
                        synthetic::disappeared(msg.id, to)
                    } else {
                        synthetic::error_sending(msg.id, to)
                    };
                    if let Some(sender_id) = KsockId::from_u32(to) {
                        inner.push(sender_id, &synth, false, None);
                    }
                }
                if let Ok(ks) = inner.ksock_mut(id) {
                    ks.last_sent_id = msg.id;
                    ks.sending = false;
                    ks.pending_send = None;
                    ks.write_buffer.reset();
                }
                Err(e)
            }
        }
    }

    /// If `id` is mid-retry, reattempt its buffered send and settle the
    /// outcome. A no-op returning `None` if nothing is pending.
    fn retry_pending_send(&self, inner: &mut DeviceInner, id: KsockId) -> Option<KbusResult<MessageId>> {
        let ks = inner.ksocks.get(&id)?;
        if !ks.sending {
            return None;
        }
        let mut msg = ks.pending_send.clone().expect("sending implies a cached message");
        let result = inner.attempt_send(id, &mut msg);
        Some(self.settle_send_outcome(inner, id, msg, result, true))
    }

    /// SEND: consume the finished write buffer (or, on retry, the message
    /// cached from the previous `Again`) and run the routing algorithm of
    /// `spec.md` §4.3. `mem` resolves a pointy message's name/data and is
    /// only consulted on the first attempt.
    pub fn send(&self, id: KsockId, mem: Option<&dyn UserMemoryAccess>) -> KbusResult<MessageId> {
        let mut inner = self.lock();
        let is_retry = inner.ksock(id)?.sending;

        let mut msg = if is_retry {
            inner.ksock(id)?.pending_send.clone().expect("sending implies a cached message")
        } else {
            let ks = inner.ksock_mut(id)?;
            if !ks.write_buffer.is_finished() {
                return Err(KbusError::BadMessage);
            }
            let buf = std::mem::replace(&mut ks.write_buffer, WriteBuffer::new());
            buf.finish(mem)?
        };

        let result = inner.attempt_send(id, &mut msg);
        let outcome = self.settle_send_outcome(&mut inner, id, msg, result, is_retry);
        drop(inner);
        self.notify_all_channels();
        outcome
    }

    /// WAIT: poll, and optionally sleep up to `timeout`, for this Ksock to
    /// become readable and/or the device to become writable for it.
    /// `timeout = None` never sleeps (a pure poll). A blocked write is
    /// retried opportunistically on every wake, per `spec.md` §4.3 "a
    /// wake-up on the device's writable channel retries from step 1".
    pub fn wait(&self, id: KsockId, want_read: bool, want_write: bool, timeout: Option<Duration>) -> KbusResult<(bool, bool)> {
        let deadline = timeout.map(|d| Instant::now() + d);
        let mut inner = self.lock();
        loop {
            inner.ksock(id)?;
            if want_write {
                let _ = self.retry_pending_send(&mut inner, id);
            }
            let readable = want_read && !inner.ksock(id)?.inbound.is_empty();
            let writable = want_write && !inner.ksock(id)?.sending;
            if readable || writable {
                return Ok((readable, writable));
            }
            let remaining = match deadline {
                None => return Ok((readable, writable)),
                Some(dl) => {
                    let now = Instant::now();
                    if now >= dl {
                        return Ok((readable, writable));
                    }
                    dl - now
                }
            };
            let (guard, timed_out) =
                self.readable.wait_timeout(inner, remaining).unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if timed_out.timed_out() {
                let readable = want_read && inner.ksock(id).map(|k| !k.inbound.is_empty()).unwrap_or(false);
                let writable = want_write && inner.ksock(id).map(|k| !k.sending).unwrap_or(false);
                return Ok((readable, writable));
            }
        }
    }
}

/// Tracks every open device and assigns each an index for NEW_DEVICE
/// (`spec.md` §9: "model each device as an independently-owned aggregate,
/// discoverable through a small registry"). Out of scope for THE CORE
/// itself (`spec.md` §1) but needed to realize the boundary operation.
#[derive(Default)]
pub struct DeviceManager {
    devices: Mutex<Vec<Arc<Device>>>,
}

impl DeviceManager {
    pub fn new() -> Self { DeviceManager::default() }

    /// NEW_DEVICE: create a device with `config` and return its index and
    /// handle.
    pub fn new_device(&self, config: DeviceConfig) -> (u32, Arc<Device>) {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        let device = Arc::new(Device::new(config));
        let index = devices.len() as u32;
        devices.push(device.clone());
        (index, device)
    }

    pub fn get(&self, index: u32) -> Option<Arc<Device>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).get(index as usize).cloned()
    }

    pub fn len(&self) -> usize { self.devices.lock().unwrap_or_else(|e| e.into_inner()).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
