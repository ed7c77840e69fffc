//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Provides the interface layer shared by the NagareGFX frame scheduler and
//! its backend implementations.
//!
//! The types defined here fall into three groups:
//!
//!  1. **Handles** ([`handles`]): value-typed identifiers for logical
//!     resources (buffers, textures, argument tables). Handles carry no
//!     ownership; the backing state lives in the scheduler's arenas and in
//!     the backend's registry.
//!  2. **Descriptors and flags** ([`resources`], [`flags`], [`pass`]):
//!     plain data describing what a resource or render target is.
//!  3. **Backend traits** ([`command`], [`heap`], [`sync`]): the contract a
//!     backend adapter implements: command buffers, recording encoders,
//!     fences, sync events, and the transient resource registry.

pub mod command;
pub mod error;
mod flags;
pub use self::flags::*;
pub mod handles;
pub mod heap;
pub mod pass;
pub mod resources;
pub mod sync;

pub use self::error::{Error, ErrorKind, Result};

/// Represents a device memory size and offset value.
pub type DeviceSize = u64;

/// Identifies a logical submission queue. Valid values are `0..MAX_QUEUES`.
pub type QueueId = u8;

/// The maximum number of logical submission queues that may exist at any
/// point in time.
pub const MAX_QUEUES: usize = 8;

/// Identifies a single command within a frame.
pub type CmdIndex = u32;

/// A per-queue array of command buffer signal values.
///
/// Used wherever an operation must be gated on the completion of previously
/// submitted work: element `i` is the signal value that must have completed
/// on queue `i` (zero meaning "no wait").
pub type QueueCommandIndices = [u64; MAX_QUEUES];

/// Element-wise maximum of two [`QueueCommandIndices`].
pub fn merge_queue_command_indices(
    a: QueueCommandIndices,
    b: QueueCommandIndices,
) -> QueueCommandIndices {
    let mut out = a;
    for (out, &b) in out.iter_mut().zip(b.iter()) {
        if b > *out {
            *out = b;
        }
    }
    out
}

// Import all objects
#[doc(no_inline)]
pub use crate::command::*;
#[doc(no_inline)]
pub use crate::handles::*;
#[doc(no_inline)]
pub use crate::heap::*;
#[doc(no_inline)]
pub use crate::pass::*;
#[doc(no_inline)]
pub use crate::resources::*;
#[doc(no_inline)]
pub use crate::sync::*;
