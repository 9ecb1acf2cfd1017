// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synthetic diagnostic messages delivered over the full wire boundary when
//! a Replier disappears mid-flight. See `spec.md` §4.6 and §8.

mod common;

use common::*;
use kbus_core::message::MessageBuilder;
use kbus_core::name::Name;
use kbus_core::{Device, Flags};

#[test]
fn closing_a_replier_with_a_queued_request_synthesizes_gone_away() {
    let dev = Device::new(cfg());
    let requester = dev.open();
    let replier = dev.open();
    dev.bind(replier, "$.Svc.Flaky", true).unwrap();

    let req = MessageBuilder::new(Name::parse_for_send("$.Svc.Flaky").unwrap()).flags(Flags::WANT_REPLY).build();
    write_in_chunks(&dev, requester, &encode(&req), 64);
    dev.send(requester, None).unwrap();

    // The replier closes without ever reading the request off its queue.
    dev.close(replier);

    let diag = read_whole_message(&dev, requester);
    assert_eq!(diag.name.as_str(), kbus_core::synthetic::REPLIER_GONE_AWAY);
    assert!(diag.flags.contains(Flags::SYNTHETIC));
}

#[test]
fn closing_a_replier_after_it_read_but_never_answered_synthesizes_ignored() {
    let dev = Device::new(cfg());
    let requester = dev.open();
    let replier = dev.open();
    dev.bind(replier, "$.Svc.Forgetful", true).unwrap();

    let req =
        MessageBuilder::new(Name::parse_for_send("$.Svc.Forgetful").unwrap()).flags(Flags::WANT_REPLY).build();
    write_in_chunks(&dev, requester, &encode(&req), 64);
    dev.send(requester, None).unwrap();

    // The replier reads the request, obliging a reply, then closes without
    // ever sending one.
    read_whole_message(&dev, replier);
    assert_eq!(dev.unreplied_to(replier).unwrap(), 1);
    dev.close(replier);

    let diag = read_whole_message(&dev, requester);
    assert_eq!(diag.name.as_str(), kbus_core::synthetic::REPLIER_IGNORED);
}

#[test]
fn unbinding_a_replier_with_a_queued_request_synthesizes_unbound() {
    let dev = Device::new(cfg());
    let requester = dev.open();
    let replier = dev.open();
    dev.bind(replier, "$.Svc.Temp", true).unwrap();

    let req = MessageBuilder::new(Name::parse_for_send("$.Svc.Temp").unwrap()).flags(Flags::WANT_REPLY).build();
    write_in_chunks(&dev, requester, &encode(&req), 64);
    dev.send(requester, None).unwrap();

    // Unbind (not close) while the request is still sitting in the queue
    // this exact binding caused.
    dev.unbind(replier, "$.Svc.Temp", true).unwrap();

    let diag = read_whole_message(&dev, requester);
    assert_eq!(diag.name.as_str(), kbus_core::synthetic::REPLIER_UNBOUND);
}
