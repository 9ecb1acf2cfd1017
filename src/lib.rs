// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process routing engine for a KBUS-style kernel-mediated message bus.
//!
//! This crate implements THE CORE of such a bus on a single device: the
//! binding table, per-Ksock queues and streaming I/O buffers, the `send`
//! admission/commit algorithm with its synthetic-diagnostic discipline, and
//! the set-aside/safe-report protocol for bind-event messages that cannot
//! be delivered immediately. Everything upstream of a byte stream — the
//! character-device plumbing, `/proc` reporting, language bindings, and
//! network bridging — is out of scope and interacts with [`Device`] only
//! through the boundary operations below and the [`wire::UserMemoryAccess`]
//! trait.
//!
//! A [`Device`] serializes every mutation behind one mutex; [`DeviceManager`]
//! tracks the set of open devices for the `NEW_DEVICE` boundary call.
//! Configure a device's tunables with [`DeviceConfig`], open endpoints with
//! [`Device::open`], bind names with [`Device::bind`], and drive sends and
//! receives through the streaming [`Device::write`]/[`Device::send`] and
//! [`Device::next_message`]/[`Device::read`] pairs.

pub mod binding;
pub mod device;
pub mod error;
pub mod flags;
pub mod ids;
pub mod ksock;
pub mod message;
pub mod name;
pub mod payload;
pub mod registry;
pub mod synthetic;
pub mod wire;

pub use device::{Device, DeviceManager};
pub use error::{KbusError, KbusResult};
pub use flags::Flags;
pub use ids::{Endpoint, KsockId, MessageId};
pub use ksock::DeviceConfig;
pub use message::{Message, MessageBuilder};
pub use name::Name;
pub use payload::Payload;
pub use wire::UserMemoryAccess;
