//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Command queues, command buffers, and recording encoders: the contract a
//! backend adapter implements.
use std::fmt;
use std::sync::Arc;

use crate::handles::{ResourceRef, TextureRef};
use crate::pass::RenderTargetDescriptor;
use crate::sync::FenceRef;
use crate::{QueueId, ResourceUsageFlags, Result, StageFlags};

/// A boxed handle representing a backend command queue.
pub type CmdQueueRef = Arc<dyn CmdQueue>;

/// Trait for backend command queues.
///
/// # Valid Usage
///
///  - `CmdQueue` must not be dropped until the queue is idle. (i.e. there
///    exists no command buffer being executed)
///
pub trait CmdQueue: fmt::Debug + Send + Sync {
    /// Allocate a new command buffer.
    ///
    /// Command buffers are meant to be shortly lived. This method might stall
    /// if there are too many outstanding command buffers.
    fn new_cmd_buffer(&self) -> Result<CmdBufferRef>;

    /// Create a fence bound to the given signal value of this queue.
    fn new_fence(&self, signal_value: u64) -> Result<FenceRef>;

    /// Whether `queue` belongs to the same API instance, i.e. whether a
    /// command buffer on this queue can encode a device-side wait for the
    /// other queue's sync event. When this returns `false` the scheduler
    /// falls back to yielding on the CPU until the other queue catches up.
    fn is_peer_queue(&self, queue: QueueId) -> bool;

    /// Schedule pending committed command buffers for execution.
    fn flush(&self);
}

/// A command buffer.
pub type CmdBufferRef = Box<dyn CmdBuffer>;

/// Trait for command buffers.
///
/// An application can (and should) drop a `CmdBuffer` object as soon as it
/// finishes recording commands and committing it.
pub trait CmdBuffer: fmt::Debug {
    /// Begin encoding a render pass. Ends the previously active encoder.
    fn encode_render(
        &mut self,
        render_target: &RenderTargetDescriptor,
    ) -> &mut dyn RenderCmdEncoder;

    /// Begin encoding a compute pass. Ends the previously active encoder.
    fn encode_compute(&mut self) -> &mut dyn ComputeCmdEncoder;

    /// Begin encoding a copy pass. Ends the previously active encoder.
    fn encode_copy(&mut self) -> &mut dyn CopyCmdEncoder;

    /// Begin an externally recorded pass. Ends the previously active encoder.
    fn encode_external(&mut self) -> &mut dyn ExternalCmdEncoder;

    /// Signal this queue's sync event with `value` after the execution of
    /// the command buffer.
    fn signal_event(&mut self, value: u64);

    /// Wait until another queue's sync event reaches `value` before the
    /// execution of the command buffer.
    ///
    /// # Valid Usage
    ///
    /// - `queue` must be a peer queue (see [`CmdQueue::is_peer_queue`]).
    fn wait_event(&mut self, queue: QueueId, value: u64);

    /// Present the drawable backing `texture` once this command buffer has
    /// been committed.
    fn present(&mut self, texture: TextureRef);

    /// Register a completion handler.
    ///
    /// Note that this method may not be called after `commit` is called.
    fn on_complete(&mut self, cb: Box<dyn FnOnce(Result<()>) + Send>);

    /// Mark this command buffer as ready for submission.
    ///
    /// # Valid Usage
    ///
    /// - On a command buffer object, no methods of `CmdBuffer` may be called
    ///   after this method is called.
    fn commit(&mut self) -> Result<()>;
}

/// Operations common to every recording encoder.
pub trait CmdEncoder: fmt::Debug {
    /// Begin a debug group.
    ///
    /// The default implementation is no-op.
    fn begin_debug_group(&mut self, _label: &str) {}

    /// End a debug group.
    ///
    /// There must be an outstanding call to [`begin_debug_group`] corresponding
    /// to this one in the same encoder.
    ///
    /// [`begin_debug_group`]: CmdEncoder::begin_debug_group
    fn end_debug_group(&mut self) {}

    /// Insert a debug marker.
    ///
    /// The default implementation is no-op.
    fn debug_marker(&mut self, _label: &str) {}

    /// Declare that the specified resources are referenced by shader
    /// arguments used on this command encoder.
    ///
    /// This ensures the resources are resident starting from the point where
    /// this command is inserted and until the end of the current command
    /// encoder. You must call this method for every resource indirectly
    /// referenced by argument tables.
    ///
    /// # Valid Usage
    ///
    /// - If `self` is a render command encoder, `resources` must not overlap
    ///   with its render targets.
    fn use_resource(
        &mut self,
        usage: ResourceUsageFlags,
        stages: StageFlags,
        resources: &[ResourceRef],
    );

    /// Insert a memory barrier and establish an execution dependency within
    /// the current encoder.
    fn barrier(
        &mut self,
        resource: ResourceRef,
        after_stages: StageFlags,
        before_stages: StageFlags,
    );

    /// Update the specified fence after the given stages complete.
    ///
    /// A fence can be updated only once. You must create a new one after done
    /// using the old one.
    fn update_fence(&mut self, fence: &FenceRef, after_stages: StageFlags);

    /// Wait on the specified fence before the given stages begin and
    /// establish an inter-encoder execution dependency.
    ///
    /// The fence must be updated first before waiting on it. The command
    /// queue automatically reorders command buffer submissions to satisfy
    /// this constraint. If fence operations are inserted in a way there
    /// exists no such ordering, a dead-lock might occur.
    fn wait_fence(&mut self, fence: &FenceRef, before_stages: StageFlags);
}

/// Trait for render pass encoders.
///
/// Draw calls themselves are recorded by client pass payloads through
/// backend-specific extensions; the scheduler only concerns itself with the
/// operations of [`CmdEncoder`].
pub trait RenderCmdEncoder: CmdEncoder {}

/// Trait for compute pass encoders.
pub trait ComputeCmdEncoder: CmdEncoder {}

/// Trait for copy (blit) pass encoders.
pub trait CopyCmdEncoder: CmdEncoder {}

/// Trait for externally recorded passes. The scheduler treats the external
/// recording as an opaque unit; only fence and residency operations are
/// interposed.
pub trait ExternalCmdEncoder: CmdEncoder {}
