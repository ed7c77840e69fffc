//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The NagareGFX frame scheduler and resource-tracking core.
//!
//! A frame goes through the following pipeline:
//!
//!  1. The client opens a [`Frame`], declares transient resources, and
//!     appends [`PassDesc`]s; each pass lists its resource accesses
//!     ([`resources::ResourceUsages`] records them in command order).
//!  2. [`info::FrameCommandInfo`] partitions the passes into encoders and
//!     the encoders into command buffers, assigning monotonic signal
//!     values.
//!  3. The compiler ([`scheduler`]) walks every resource's usage list and
//!     emits a pre-frame stream (materialise/dispose/cross-frame waits) and
//!     an in-frame stream (residency, memory barriers), plus an encoder
//!     dependency table.
//!  4. The table is transitively reduced ([`reduction`]) and each surviving
//!     edge becomes a fence pair in the in-frame stream.
//!  5. The executor ([`FrameScheduler`]) replays both streams against the
//!     backend, committing command buffers whose completions advance the
//!     process-wide [`queue`] registry.

mod executor;
mod frame;
pub mod info;
pub mod pass;
pub mod queue;
pub mod reduction;
pub mod resources;
pub mod scheduler;

pub use crate::executor::{
    CompletionHandler, DiagnosticHandler, FrameScheduler, SubmittedFrame,
};
pub use crate::frame::Frame;
pub use crate::pass::{PassDesc, PassEncoderHost, PassKind, UsageDesc};
pub use crate::queue::Queue;
pub use crate::resources::{AccessCategory, ResourceAccess, ResourceStorage, ResourceUsages};
