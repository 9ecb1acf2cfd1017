// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error kinds returned by the routing engine, mirroring the abstract error
//! kinds of the KBUS wire protocol (bind/unbind, send, and control calls).

use thiserror::Error;

/// Every recoverable failure the core can report across its boundary calls.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum KbusError {
    #[error("message name is malformed")]
    BadName,
    #[error("message name exceeds the maximum length")]
    NameTooLong,
    #[error("a replier is already bound to this name")]
    AlreadyBound,
    #[error("no such binding or recipient")]
    NotFound,
    #[error("no replier is available for this name, or the reply's target has disappeared")]
    AddrNotAvailable,
    #[error("reply does not correspond to a known outstanding request")]
    ConnRefused,
    #[error("stateful request targeted a Ksock that is not the current replier")]
    Pipe,
    #[error("ALL_OR_FAIL could not deliver to every required recipient")]
    Busy,
    #[error("ALL_OR_WAIT cannot complete now; retry once writable")]
    Again,
    #[error("sender has no free slot reserved for its own request's reply")]
    NoLock,
    #[error("message is structurally invalid (guard mismatch or bad length)")]
    BadMessage,
    #[error("a write is already pending retry on this Ksock")]
    AlreadyInUse,
    #[error("out of memory")]
    NoMemory,
    #[error("fault copying to or from caller memory")]
    Fault,
    #[error("malformed control request")]
    Invalid,
    #[error("operation not supported on this kind of endpoint")]
    NotTTY,
}

pub type KbusResult<T> = Result<T, KbusError>;
