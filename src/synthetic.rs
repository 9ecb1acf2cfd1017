// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synthetic diagnostic messages. See `spec.md` §4.6.
//!
//! Every synthetic message carries the `SYNTHETIC` flag and, except for
//! bind-event messages, `in_reply_to` set to the id of the request it
//! explains. Bind-event messages instead carry a payload describing the
//! bind or unbind (`spec.md` §6 "Bind-event payload").

use crate::flags::Flags;
use crate::ids::{KsockId, MessageId};
use crate::message::Message;
use crate::name::Name;
use crate::payload::Payload;

pub const REPLIER_GONE_AWAY: &str = "$.KBUS.Replier.GoneAway";
pub const REPLIER_IGNORED: &str = "$.KBUS.Replier.Ignored";
pub const REPLIER_UNBOUND: &str = "$.KBUS.Replier.Unbound";
pub const REPLIER_DISAPPEARED: &str = "$.KBUS.Replier.Disappeared";
pub const ERROR_SENDING: &str = "$.KBUS.ErrorSending";
pub const REPLIER_BIND_EVENT: &str = "$.KBUS.ReplierBindEvent";
pub const UNBIND_EVENTS_LOST: &str = "$.KBUS.UnbindEventsLost";

fn synthetic_name(raw: &str) -> Name {
    Name::parse_for_send(raw).expect("synthetic message names are valid by construction")
}

/// Build a diagnostic reply addressed to `to`, explaining the fate of the
/// request `original_id`.
fn diagnostic(raw_name: &str, original_id: MessageId, to: u32) -> Message {
    Message {
        id: MessageId::UNSET,
        in_reply_to: original_id,
        to,
        from: 0,
        orig_from: Default::default(),
        final_to: Default::default(),
        flags: Flags::SYNTHETIC,
        name: synthetic_name(raw_name),
        payload: None,
    }
}

pub fn gone_away(original_id: MessageId, to: u32) -> Message {
    diagnostic(REPLIER_GONE_AWAY, original_id, to)
}

pub fn ignored(original_id: MessageId, to: u32) -> Message { diagnostic(REPLIER_IGNORED, original_id, to) }

pub fn unbound(original_id: MessageId, to: u32) -> Message { diagnostic(REPLIER_UNBOUND, original_id, to) }

pub fn disappeared(original_id: MessageId, to: u32) -> Message {
    diagnostic(REPLIER_DISAPPEARED, original_id, to)
}

pub fn error_sending(original_id: MessageId, to: u32) -> Message {
    diagnostic(ERROR_SENDING, original_id, to)
}

pub fn unbind_events_lost(to: u32) -> Message { diagnostic(UNBIND_EVENTS_LOST, MessageId::UNSET, to) }

/// `(u32 is_bind, u32 binder_ksock_id, u32 name_len, name_bytes + NUL + pad)`
fn encode_bind_event_payload(is_bind: bool, binder: KsockId, name: &Name) -> Payload {
    let name_bytes = name.as_str().as_bytes();
    let mut buf = Vec::with_capacity(12 + name_bytes.len() + 1 + 3);
    buf.extend_from_slice(&(is_bind as u32).to_le_bytes());
    buf.extend_from_slice(&binder.get().to_le_bytes());
    buf.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(name_bytes);
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
    Payload::from_bytes(buf)
}

/// A `$.KBUS.ReplierBindEvent` message announcing that `binder` bound (or
/// unbound, when `is_bind` is false) `name` as Replier.
pub fn bind_event(is_bind: bool, binder: KsockId, name: &Name) -> Message {
    Message {
        id: MessageId::UNSET,
        in_reply_to: MessageId::UNSET,
        to: 0,
        from: 0,
        orig_from: Default::default(),
        final_to: Default::default(),
        flags: Flags::SYNTHETIC,
        name: synthetic_name(REPLIER_BIND_EVENT),
        payload: Some(encode_bind_event_payload(is_bind, binder, name)),
    }
}
