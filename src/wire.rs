// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming wire marshaling. See `spec.md` §4.4 and the wire format of §6.
//!
//! Writes and reads are byte-granular and may span many calls, so the state
//! machines here are explicit rather than buffering a whole message at once
//! (mirroring the kernel's own byte-at-a-time socket parsing in
//! `kernel/src/arch/hosted.rs`).

use crate::error::KbusError;
use crate::flags::Flags;
use crate::ids::{Endpoint, MessageId};
use crate::message::Message;
use crate::name::Name;
use crate::payload::{Payload, PayloadBuilder};

pub const START_GUARD: u32 = 0x7375_624B;
pub const END_GUARD: u32 = 0x4B62_7573;

/// Size in bytes of the fixed header, excluding the trailing end guard.
pub const HEADER_LEN: usize = 76;

/// The fixed-size header, decoded from the wire but not yet carrying a
/// resolved name/payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireHeader {
    pub id: (u32, u32),
    pub in_reply_to: (u32, u32),
    pub to: u32,
    pub from: u32,
    pub orig_from: (u32, u32),
    pub final_to: (u32, u32),
    pub extra: u32,
    pub flags: u32,
    pub name_len: u32,
    pub data_len: u32,
    pub name_ptr: u64,
    pub data_ptr: u64,
}

impl WireHeader {
    fn is_pointy(&self) -> bool { self.name_ptr != 0 || self.data_ptr != 0 }

    fn decode(bytes: &[u8]) -> Result<Self, KbusError> {
        if bytes.len() != HEADER_LEN {
            return Err(KbusError::BadMessage);
        }
        let mut cur = Cursor(bytes);
        let start_guard = cur.u32();
        if start_guard != START_GUARD {
            return Err(KbusError::BadMessage);
        }
        let header = WireHeader {
            id: (cur.u32(), cur.u32()),
            in_reply_to: (cur.u32(), cur.u32()),
            to: cur.u32(),
            from: cur.u32(),
            orig_from: (cur.u32(), cur.u32()),
            final_to: (cur.u32(), cur.u32()),
            extra: cur.u32(),
            flags: cur.u32(),
            name_len: cur.u32(),
            data_len: cur.u32(),
            name_ptr: cur.u64(),
            data_ptr: cur.u64(),
        };
        if header.extra != 0 {
            return Err(KbusError::BadMessage);
        }
        Ok(header)
    }

    pub fn encode(message: &Message) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&START_GUARD.to_le_bytes());
        out.extend_from_slice(&message.id.network_id.to_le_bytes());
        out.extend_from_slice(&message.id.serial_num.to_le_bytes());
        out.extend_from_slice(&message.in_reply_to.network_id.to_le_bytes());
        out.extend_from_slice(&message.in_reply_to.serial_num.to_le_bytes());
        out.extend_from_slice(&message.to.to_le_bytes());
        out.extend_from_slice(&message.from.to_le_bytes());
        out.extend_from_slice(&message.orig_from.network_id.to_le_bytes());
        out.extend_from_slice(&message.orig_from.local_id.to_le_bytes());
        out.extend_from_slice(&message.final_to.network_id.to_le_bytes());
        out.extend_from_slice(&message.final_to.local_id.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // extra
        out.extend_from_slice(&message.flags.bits().to_le_bytes());
        let name_bytes = message.name.as_str().as_bytes();
        let data_len = message.payload.as_ref().map(Payload::len).unwrap_or(0);
        out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data_len as u32).to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes()); // name_ptr: inline
        out.extend_from_slice(&0u64.to_le_bytes()); // data_ptr: inline
        out
    }
}

struct Cursor<'a>(&'a [u8]);

impl<'a> Cursor<'a> {
    fn u32(&mut self) -> u32 {
        let (head, rest) = self.0.split_at(4);
        self.0 = rest;
        u32::from_le_bytes(head.try_into().unwrap())
    }

    fn u64(&mut self) -> u64 {
        let (head, rest) = self.0.split_at(8);
        self.0 = rest;
        u64::from_le_bytes(head.try_into().unwrap())
    }
}

fn pad4(len: usize) -> usize { (4 - len % 4) % 4 }

/// Lets the routing engine resolve a pointy message's name/data by copying
/// from caller memory on demand. The character-device layer (out of scope
/// for THE CORE) provides the implementation; tests can supply a trivial one
/// backed by a `HashMap` or a plain slice.
pub trait UserMemoryAccess {
    fn copy_in(&self, ptr: u64, len: usize) -> Result<Vec<u8>, KbusError>;
}

enum WritePart {
    Header,
    Name { remaining: usize },
    NamePad { remaining: usize },
    Data { remaining: usize },
    DataPad { remaining: usize },
    EndGuard { remaining: usize },
    Done,
}

/// Per-Ksock streaming write state. Accumulates bytes across many `write`
/// calls until a complete message has been assembled (`is_finished`), at
/// which point `send` can consume it.
pub struct WriteBuffer {
    part: WritePart,
    header_buf: Vec<u8>,
    header: Option<WireHeader>,
    name_buf: Vec<u8>,
    data_builder: PayloadBuilder,
    end_guard_buf: Vec<u8>,
    retry_locked: bool,
}

impl Default for WriteBuffer {
    fn default() -> Self { WriteBuffer::new() }
}

impl WriteBuffer {
    pub fn new() -> Self {
        WriteBuffer {
            part: WritePart::Header,
            header_buf: Vec::with_capacity(HEADER_LEN),
            header: None,
            name_buf: Vec::new(),
            data_builder: PayloadBuilder::default(),
            end_guard_buf: Vec::new(),
            retry_locked: false,
        }
    }

    pub fn reset(&mut self) { *self = WriteBuffer::new(); }

    pub fn is_finished(&self) -> bool { matches!(self.part, WritePart::Done) }

    pub fn lock_for_retry(&mut self) { self.retry_locked = true; }

    pub fn unlock_after_retry(&mut self) { self.retry_locked = false; }

    /// Feed more bytes into the buffer. Returns the number of bytes
    /// consumed (may be less than `data.len()` once the message completes).
    pub fn write(&mut self, data: &[u8]) -> Result<usize, KbusError> {
        if self.retry_locked {
            return Err(KbusError::AlreadyInUse);
        }
        if matches!(self.part, WritePart::Done) {
            return Err(KbusError::BadMessage);
        }
        let mut consumed = 0;
        let mut remaining = data;
        loop {
            if remaining.is_empty() {
                break;
            }
            match &mut self.part {
                WritePart::Header => {
                    let need = HEADER_LEN - self.header_buf.len();
                    let take = need.min(remaining.len());
                    self.header_buf.extend_from_slice(&remaining[..take]);
                    remaining = &remaining[take..];
                    consumed += take;
                    if self.header_buf.len() == HEADER_LEN {
                        let header = WireHeader::decode(&self.header_buf)?;
                        let pointy = header.is_pointy();
                        self.header = Some(header);
                        self.part = if pointy {
                            WritePart::Done
                        } else {
                            WritePart::Name { remaining: header.name_len as usize }
                        };
                    }
                }
                WritePart::Name { remaining: left } => {
                    let take = (*left).min(remaining.len());
                    self.name_buf.extend_from_slice(&remaining[..take]);
                    *left -= take;
                    remaining = &remaining[take..];
                    consumed += take;
                    if *left == 0 {
                        let pad = pad4(self.name_buf.len() + 1); // + NUL terminator
                        self.part = WritePart::NamePad { remaining: 1 + pad };
                    }
                }
                WritePart::NamePad { remaining: left } => {
                    let take = (*left).min(remaining.len());
                    *left -= take;
                    remaining = &remaining[take..];
                    consumed += take;
                    if *left == 0 {
                        let data_len =
                            self.header.expect("header decoded before name parsing begins").data_len as usize;
                        self.part = if data_len == 0 {
                            WritePart::DataPad { remaining: 0 }
                        } else {
                            WritePart::Data { remaining: data_len }
                        };
                    }
                }
                WritePart::Data { remaining: left } => {
                    let take = (*left).min(remaining.len());
                    self.data_builder.extend_from_slice(&remaining[..take]);
                    *left -= take;
                    remaining = &remaining[take..];
                    consumed += take;
                    if *left == 0 {
                        let pad = pad4(self.data_builder.len());
                        self.part = WritePart::DataPad { remaining: pad };
                    }
                }
                WritePart::DataPad { remaining: left } => {
                    let take = (*left).min(remaining.len());
                    *left -= take;
                    remaining = &remaining[take..];
                    consumed += take;
                    if *left == 0 {
                        self.part = WritePart::EndGuard { remaining: 4 };
                    }
                }
                WritePart::EndGuard { remaining: left } => {
                    let take = (*left).min(remaining.len());
                    self.end_guard_buf.extend_from_slice(&remaining[..take]);
                    *left -= take;
                    remaining = &remaining[take..];
                    consumed += take;
                    if *left == 0 {
                        let guard = u32::from_le_bytes(self.end_guard_buf[..4].try_into().unwrap());
                        if guard != END_GUARD {
                            return Err(KbusError::BadMessage);
                        }
                        self.part = WritePart::Done;
                    }
                }
                WritePart::Done => break,
            }
            if matches!(self.part, WritePart::Done) {
                break;
            }
        }
        if !remaining.is_empty() && matches!(self.part, WritePart::Done) {
            return Err(KbusError::BadMessage);
        }
        Ok(consumed)
    }

    /// Consume the finished buffer into a `Message`, resolving pointy
    /// name/data via `mem` if necessary.
    pub fn finish(mut self, mem: Option<&dyn UserMemoryAccess>) -> Result<Message, KbusError> {
        if !self.is_finished() {
            return Err(KbusError::BadMessage);
        }
        let header = self.header.take().expect("finished buffer always decoded a header");
        let (name_bytes, payload) = if header.is_pointy() {
            let mem = mem.ok_or(KbusError::Fault)?;
            let name_bytes = if header.name_ptr != 0 {
                mem.copy_in(header.name_ptr, header.name_len as usize)?
            } else {
                std::mem::take(&mut self.name_buf)
            };
            let payload = if header.data_ptr != 0 {
                if header.data_len == 0 {
                    None
                } else {
                    Some(Payload::from_bytes(mem.copy_in(header.data_ptr, header.data_len as usize)?))
                }
            } else {
                None
            };
            (name_bytes, payload)
        } else {
            let payload =
                if header.data_len == 0 { None } else { Some(self.data_builder.finish()) };
            (self.name_buf, payload)
        };
        let name_str = std::str::from_utf8(&name_bytes).map_err(|_| KbusError::BadMessage)?;
        let name = Name::parse_for_send(name_str)?;
        Ok(Message {
            id: MessageId { network_id: header.id.0, serial_num: header.id.1 },
            in_reply_to: MessageId { network_id: header.in_reply_to.0, serial_num: header.in_reply_to.1 },
            to: header.to,
            from: header.from,
            orig_from: Endpoint { network_id: header.orig_from.0, local_id: header.orig_from.1 },
            final_to: Endpoint { network_id: header.final_to.0, local_id: header.final_to.1 },
            flags: Flags::from_bits_retain(header.flags),
            name,
            payload,
        })
    }
}

/// Per-Ksock streaming read state: the byte layout of the message currently
/// being delivered to the caller, plus a cursor.
pub struct ReadBuffer {
    bytes: Vec<u8>,
    cursor: usize,
}

impl ReadBuffer {
    pub fn for_message(message: &Message) -> Self {
        let mut bytes = WireHeader::encode(message);
        let name_bytes = message.name.as_str().as_bytes();
        bytes.extend_from_slice(name_bytes);
        bytes.push(0);
        for _ in 0..pad4(name_bytes.len() + 1) {
            bytes.push(0);
        }
        if let Some(payload) = &message.payload {
            let data = payload.to_vec();
            bytes.extend_from_slice(&data);
            for _ in 0..pad4(data.len()) {
                bytes.push(0);
            }
        }
        bytes.extend_from_slice(&END_GUARD.to_le_bytes());
        ReadBuffer { bytes, cursor: 0 }
    }

    pub fn total_len(&self) -> usize { self.bytes.len() }

    pub fn bytes_left(&self) -> usize { self.bytes.len() - self.cursor }

    pub fn is_exhausted(&self) -> bool { self.cursor == self.bytes.len() }

    /// Copy as many bytes as fit into `out`, returning the number copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.bytes_left());
        out[..n].copy_from_slice(&self.bytes[self.cursor..self.cursor + n]);
        self.cursor += n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Flags;
    use crate::message::MessageBuilder;

    fn sample_message(payload: Option<&[u8]>) -> Message {
        let name = Name::parse_for_send("$.Foo.Bar").unwrap();
        let mut builder = MessageBuilder::new(name).flags(Flags::WANT_REPLY);
        if let Some(p) = payload {
            builder = builder.payload(Payload::from_bytes(p.to_vec()));
        }
        let mut msg = builder.build();
        msg.id = MessageId { network_id: 0, serial_num: 7 };
        msg.from = 3;
        msg
    }

    #[test]
    fn write_then_read_round_trips_entire_message() {
        let msg = sample_message(Some(b"hello"));
        let mut read = ReadBuffer::for_message(&msg);
        let mut bytes = vec![0u8; read.total_len()];
        read.read(&mut bytes);
        assert!(read.is_exhausted());

        let mut write = WriteBuffer::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let chunk = &bytes[offset..(offset + 3).min(bytes.len())];
            offset += write.write(chunk).unwrap();
        }
        assert!(write.is_finished());
        let decoded = write.finish(None).unwrap();
        assert_eq!(decoded.name.as_str(), "$.Foo.Bar");
        assert_eq!(decoded.payload.unwrap().to_vec(), b"hello");
        assert_eq!(decoded.id.serial_num, 7);
        assert_eq!(decoded.from, 3);
        assert!(decoded.flags.contains(Flags::WANT_REPLY));
    }

    #[test]
    fn write_then_read_round_trips_empty_payload() {
        let msg = sample_message(None);
        let mut read = ReadBuffer::for_message(&msg);
        let mut bytes = vec![0u8; read.total_len()];
        read.read(&mut bytes);

        let mut write = WriteBuffer::new();
        write.write(&bytes).unwrap();
        assert!(write.is_finished());
        let decoded = write.finish(None).unwrap();
        assert!(decoded.payload.is_none());
    }

    #[test]
    fn bad_end_guard_is_rejected() {
        let msg = sample_message(Some(b"x"));
        let mut read = ReadBuffer::for_message(&msg);
        let mut bytes = vec![0u8; read.total_len()];
        read.read(&mut bytes);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut write = WriteBuffer::new();
        assert_eq!(write.write(&bytes).unwrap_err(), KbusError::BadMessage);
    }

    #[test]
    fn retry_lock_rejects_writes() {
        let mut write = WriteBuffer::new();
        write.lock_for_retry();
        assert_eq!(write.write(&[0u8; 4]).unwrap_err(), KbusError::AlreadyInUse);
    }

    #[test]
    fn extra_bytes_after_finished_are_rejected() {
        let msg = sample_message(None);
        let mut read = ReadBuffer::for_message(&msg);
        let mut bytes = vec![0u8; read.total_len()];
        read.read(&mut bytes);
        bytes.push(0);

        let mut write = WriteBuffer::new();
        assert_eq!(write.write(&bytes).unwrap_err(), KbusError::BadMessage);
    }
}
