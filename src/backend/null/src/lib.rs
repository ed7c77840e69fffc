//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! NagareGFX Null Backend, a headless, synchronous backend.
//!
//! Every operation that would reach a device is instead appended to an
//! inspectable [`CmdLog`], and committing a command buffer "executes" it on
//! the spot: completion handlers run inline before `commit` returns. The
//! transient resource registry recycles slot-based backing memory with the
//! same wait-event and disposal-fence bookkeeping a real heap allocator
//! would perform, which makes aliasing behavior reproducible in tests.
//!
//! Besides the test suite, the null backend serves as the reference for
//! what a backend adapter must implement.

mod cmd;
mod heap;

pub use crate::cmd::{CmdLog, LogEntry, NullCmdQueue, NullFence};
pub use crate::heap::{NullResourceRegistry, RegistryEvent};
