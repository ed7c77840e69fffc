//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Synchronization primitives exposed by backends.
use std::fmt;
use std::sync::Arc;

use crate::{QueueId, StageFlags};

/// Trait for fence objects.
///
/// Fences are used for intra-queue synchronization: one encoder signals the
/// fence after a given set of pipeline stages and another waits on it before
/// its own stages begin. A fence is bound to the queue and to the signal
/// value of the command buffer whose encoder updates it; the binding is what
/// allows memory recycled through an aliased heap to be safely handed to a
/// later user even across frame boundaries.
pub trait Fence: fmt::Debug + Send + Sync {
    /// The queue this fence belongs to.
    fn queue(&self) -> QueueId;

    /// The signal value of the command buffer that updates this fence.
    fn signal_value(&self) -> u64;

    /// Expose the concrete type for backend-side downcasting.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A boxed handle representing a fence.
pub type FenceRef = Arc<dyn Fence>;

/// A fence together with the stages after which it is signalled.
///
/// Recorded by the transient resource registry against disposed aliased-heap
/// memory; a later user of overlapping memory waits on every dependency
/// before its first access.
#[derive(Debug, Clone)]
pub struct FenceDependency {
    pub fence: FenceRef,
    /// Pipeline stages that must complete before the fence is signalled.
    pub stages: StageFlags,
}

impl FenceDependency {
    pub fn new(fence: FenceRef, stages: StageFlags) -> Self {
        Self { fence, stages }
    }
}
