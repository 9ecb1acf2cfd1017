// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared helpers for the integration tests: driving `Device` through its
//! full streaming `write`/`send`/`next_message`/`read` boundary rather than
//! the internal `attempt_send` shims `src/device.rs`'s own unit tests use.

use kbus_core::ksock::DeviceConfig;
use kbus_core::wire::{ReadBuffer, WriteBuffer};
use kbus_core::{Device, KsockId, Message};

pub fn cfg() -> DeviceConfig {
    DeviceConfig { max_messages: 4, max_set_aside: 4, verbose: false, report_replier_binds: false }
}

pub fn cfg_narrow() -> DeviceConfig {
    DeviceConfig { max_messages: 1, max_set_aside: 4, verbose: false, report_replier_binds: false }
}

/// Serialize a caller-built message to the bytes it would arrive as over the
/// char device: the same layout `Device::write` expects.
pub fn encode(msg: &Message) -> Vec<u8> {
    let mut buf = ReadBuffer::for_message(msg);
    let mut bytes = vec![0u8; buf.total_len()];
    buf.read(&mut bytes);
    bytes
}

/// Feed `bytes` into `dev`'s write buffer for `id`, `chunk_size` bytes at a
/// time, as a caller issuing several small `write(2)` calls would.
pub fn write_in_chunks(dev: &Device, id: KsockId, bytes: &[u8], chunk_size: usize) {
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + chunk_size).min(bytes.len());
        let n = dev.write(id, &bytes[offset..end]).unwrap();
        assert!(n > 0);
        offset += n;
    }
}

/// Decode a message read back out of a Ksock's read buffer by running the
/// bytes through a fresh write-side parser; the wire format is symmetric.
pub fn decode(bytes: &[u8]) -> Message {
    let mut w = WriteBuffer::new();
    w.write(bytes).unwrap();
    assert!(w.is_finished());
    w.finish(None).unwrap()
}

pub fn read_whole_message(dev: &Device, id: KsockId) -> Message {
    let len = dev.next_message(id).unwrap();
    assert!(len > 0);
    let mut bytes = vec![0u8; len as usize];
    let mut offset = 0;
    while offset < bytes.len() {
        let n = dev.read(id, &mut bytes[offset..]).unwrap();
        assert!(n > 0);
        offset += n;
    }
    assert_eq!(dev.read(id, &mut [0u8; 1]).unwrap(), 0);
    decode(&bytes)
}
