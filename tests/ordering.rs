// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue ordering and the WAIT boundary operation: URGENT messages jump the
//! queue, ALL_OR_WAIT blocks and retries opportunistically on WAIT, and WAIT
//! reports readiness without sleeping when nothing has changed. See
//! `spec.md` §4.3 and §8.

mod common;

use std::time::Duration;

use common::*;
use kbus_core::message::MessageBuilder;
use kbus_core::name::Name;
use kbus_core::{Device, Flags, KbusError};

#[test]
fn urgent_message_jumps_a_nonempty_queue() {
    let dev = Device::new(cfg());
    let a = dev.open();
    let b = dev.open();
    dev.bind(a, "$.Foo", false).unwrap();

    for _ in 0..2 {
        let m = MessageBuilder::new(Name::parse_for_send("$.Foo").unwrap()).build();
        write_in_chunks(&dev, b, &encode(&m), 64);
        dev.send(b, None).unwrap();
    }
    let urgent = MessageBuilder::new(Name::parse_for_send("$.Foo").unwrap()).flags(Flags::URGENT).build();
    write_in_chunks(&dev, b, &encode(&urgent), 64);
    let urgent_id = dev.send(b, None).unwrap();

    let head = read_whole_message(&dev, a);
    assert_eq!(head.id, urgent_id);
    assert_eq!(dev.num_messages(a).unwrap(), 2);
}

#[test]
fn all_or_wait_blocks_then_delivers_once_room_frees_up() {
    let dev = Device::new(cfg_narrow());
    let a = dev.open();
    let b = dev.open();
    dev.bind(a, "$.Narrow", false).unwrap();

    let filler = MessageBuilder::new(Name::parse_for_send("$.Narrow").unwrap()).build();
    write_in_chunks(&dev, b, &encode(&filler), 64);
    dev.send(b, None).unwrap();

    let blocked = MessageBuilder::new(Name::parse_for_send("$.Narrow").unwrap()).flags(Flags::ALL_OR_WAIT).build();
    write_in_chunks(&dev, b, &encode(&blocked), 64);
    assert_eq!(dev.send(b, None).unwrap_err(), KbusError::Again);

    // A further write is rejected while the retry is pending.
    assert_eq!(dev.write(b, &[0u8]).unwrap_err(), KbusError::AlreadyInUse);

    // Draining `a`'s queue frees a slot; WAIT's opportunistic retry should
    // complete the blocked send without the caller issuing a fresh SEND.
    dev.next_message(a).unwrap();
    let (_, writable) = dev.wait(b, false, true, Some(Duration::from_millis(200))).unwrap();
    assert!(writable);
    assert_eq!(dev.num_messages(a).unwrap(), 1);
}

#[test]
fn all_or_fail_never_blocks_and_reports_busy_immediately() {
    let dev = Device::new(cfg());
    let a = dev.open();
    let b = dev.open();
    dev.bind(a, "$.Q", true).unwrap();
    // Narrow only the replier's queue; `b` keeps its default room for its
    // own outstanding-request bookkeeping across two requests.
    dev.max_messages(a, 1).unwrap();

    let filler =
        MessageBuilder::new(Name::parse_for_send("$.Q").unwrap()).flags(Flags::WANT_REPLY).build();
    write_in_chunks(&dev, b, &encode(&filler), 64);
    dev.send(b, None).unwrap();

    let req = MessageBuilder::new(Name::parse_for_send("$.Q").unwrap())
        .flags(Flags::WANT_REPLY | Flags::ALL_OR_FAIL)
        .build();
    write_in_chunks(&dev, b, &encode(&req), 64);
    assert_eq!(dev.send(b, None).unwrap_err(), KbusError::Busy);
    // Busy is a first-attempt failure, not a retry: no write lock persists.
    dev.write(b, &[0u8; 4]).unwrap();
    dev.discard(b).unwrap();
}

#[test]
fn wait_reports_readable_immediately_without_sleeping() {
    let dev = Device::new(cfg());
    let a = dev.open();
    let b = dev.open();
    dev.bind(a, "$.Ready", false).unwrap();
    let msg = MessageBuilder::new(Name::parse_for_send("$.Ready").unwrap()).build();
    write_in_chunks(&dev, b, &encode(&msg), 64);
    dev.send(b, None).unwrap();

    let (readable, _) = dev.wait(a, true, false, None).unwrap();
    assert!(readable);
}

#[test]
fn wait_times_out_when_nothing_arrives() {
    let dev = Device::new(cfg());
    let a = dev.open();
    dev.bind(a, "$.Quiet", false).unwrap();
    let (readable, _) = dev.wait(a, true, false, Some(Duration::from_millis(20))).unwrap();
    assert!(!readable);
}

#[test]
fn device_manager_keeps_devices_independent() {
    let manager = kbus_core::DeviceManager::new();
    let (idx_a, dev_a) = manager.new_device(cfg());
    let (idx_b, dev_b) = manager.new_device(cfg());
    assert_ne!(idx_a, idx_b);
    assert_eq!(manager.len(), 2);

    let a = dev_a.open();
    dev_a.bind(a, "$.Only.OnA", true).unwrap();

    assert_eq!(dev_b.find_replier("$.Only.OnA").unwrap(), 0);
    assert_eq!(dev_a.find_replier("$.Only.OnA").unwrap(), a.get());
    assert!(std::sync::Arc::ptr_eq(&manager.get(idx_a).unwrap(), &dev_a));
}
