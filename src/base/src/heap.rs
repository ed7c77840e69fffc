//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The transient resource registry contract.
use std::fmt;

use crate::handles::{ArgTableArrayRef, ArgTableRef, BufferRef, ResourceRef, TextureRef};
use crate::resources::{
    ArgTableDescriptor, BufferDescriptor, TextureDescriptor, TextureViewDescriptor,
};
use crate::sync::FenceDependency;
use crate::{QueueCommandIndices, Result, TextureUsageFlags};

/// A drawable acquired from a swapchain for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawableToken(pub u64);

/// Trait for the backend object that owns the backing memory of transient
/// resources.
///
/// The registry hands out backing memory for logical resources when they are
/// materialised and takes it back when they are disposed. Returned memory is
/// tagged with a *wait event* (the per-queue command buffer signal values
/// that must complete before the memory may be touched again) and, for
/// memory sub-allocated from a shared heap, with *disposal fences* that a
/// later aliasing user must wait on.
///
/// Registry mutation is serialised by the frame boundary: the scheduler
/// calls into it from a single thread between acquiring the frame semaphore
/// and committing the frame's command buffers.
pub trait TransientResourceRegistry: fmt::Debug {
    /// Obtain backing memory for a buffer, allocating or recycling as
    /// needed.
    ///
    /// Returns the wait event the caller must merge into the wait indices of
    /// the encoder that first uses the buffer.
    fn allocate_buffer_if_needed(
        &mut self,
        buffer: BufferRef,
        descriptor: &BufferDescriptor,
    ) -> Result<QueueCommandIndices>;

    /// Obtain backing memory for a texture. `usage` is the union of the
    /// usages recorded for this frame and decides the memory's capabilities
    /// (including the memoryless optimization).
    fn allocate_texture_if_needed(
        &mut self,
        texture: TextureRef,
        descriptor: &TextureDescriptor,
        usage: TextureUsageFlags,
    ) -> Result<QueueCommandIndices>;

    /// Obtain a view onto an already materialised texture.
    fn allocate_texture_view(
        &mut self,
        texture: TextureRef,
        descriptor: &TextureViewDescriptor,
        usage: TextureUsageFlags,
    ) -> Result<QueueCommandIndices>;

    /// Obtain backing memory for an argument table and populate its argument
    /// slots.
    ///
    /// # Valid Usage
    ///
    /// - Every resource referenced by `descriptor` must already be
    ///   materialised.
    fn allocate_arg_table_if_needed(
        &mut self,
        table: ArgTableRef,
        descriptor: &ArgTableDescriptor,
    ) -> Result<QueueCommandIndices>;

    /// Array variant of [`allocate_arg_table_if_needed`].
    ///
    /// [`allocate_arg_table_if_needed`]: TransientResourceRegistry::allocate_arg_table_if_needed
    fn allocate_arg_table_array_if_needed(
        &mut self,
        array: ArgTableArrayRef,
        descriptors: &[ArgTableDescriptor],
    ) -> Result<QueueCommandIndices>;

    /// Return a buffer's backing memory to the pool. Reuse requires waiting
    /// on `wait_event`.
    fn dispose_buffer(&mut self, buffer: BufferRef, wait_event: QueueCommandIndices);

    /// Return a texture's backing memory to the pool. Reuse requires waiting
    /// on `wait_event`.
    fn dispose_texture(&mut self, texture: TextureRef, wait_event: QueueCommandIndices);

    /// Return an argument table's backing memory to the pool.
    fn dispose_arg_table(&mut self, table: ArgTableRef, wait_event: QueueCommandIndices);

    /// Return an argument table array's backing memory to the pool.
    fn dispose_arg_table_array(&mut self, array: ArgTableArrayRef, wait_event: QueueCommandIndices);

    /// Whether the resource's backing memory is sub-allocated from a shared
    /// heap and therefore may interfere with other heap users.
    fn is_aliased_heap_resource(&self, resource: ResourceRef) -> bool;

    /// Invoke `f` with each fence dependency currently guarding memory that
    /// aliases `resource`.
    fn with_heap_aliasing_fences(
        &self,
        resource: ResourceRef,
        f: &mut dyn FnMut(&FenceDependency),
    );

    /// Record the fences that downstream aliasing users of this resource's
    /// memory must wait on.
    fn set_disposal_fences(&mut self, resource: ResourceRef, fences: Vec<FenceDependency>);

    /// Keep the resource's backing memory alive past this frame even though
    /// it was materialised transiently, scheduling its eventual disposal for
    /// when the resource itself is disposed. Used for history buffers that
    /// became initialised this frame.
    fn register_initialised_history_buffer_for_disposal(
        &mut self,
        resource: ResourceRef,
        wait_event: QueueCommandIndices,
    );

    /// Acquire the drawable backing a window-handle texture for this frame.
    ///
    /// Returns `None` when no drawable is available; the scheduler then
    /// skips the encoders rendering into the texture.
    fn acquire_drawable(&mut self, texture: TextureRef) -> Option<DrawableToken>;

    /// Whether render-target-only textures may be given memoryless backing.
    fn supports_memoryless(&self) -> bool;

    /// Called once before each frame's pre-frame command stream executes.
    fn prepare_frame(&mut self);

    /// Called once after each frame's command buffers are committed.
    /// Transient backing memory still tracked at this point is reclaimed
    /// unconditionally.
    fn cycle_frames(&mut self);

    /// Drop all swapchain associations.
    fn clear_swapchains(&mut self);

    /// Drop all drawables acquired for the current frame.
    fn clear_drawables(&mut self);
}
