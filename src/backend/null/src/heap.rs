//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! A slot-based transient resource registry.
//!
//! Backing "memory" is a numbered slot. Disposed slots go to a free list
//! keyed by their descriptor and are handed back to the next compatible
//! allocation together with the wait event and disposal fences their
//! previous occupant left behind, which is the same recycling contract a heap
//! allocator over real device memory implements.
use fxhash::FxHashMap;
use log::trace;
use parking_lot::Mutex;
use std::sync::Arc;

use nagare_base::{
    merge_queue_command_indices, ArgTableArrayRef, ArgTableDescriptor, ArgTableRef, BufferDescriptor,
    BufferRef, DrawableToken, Error, ErrorKind, FenceDependency, Handle, QueueCommandIndices,
    ResourceRef, ResourceType, Result, TextureDescriptor, TextureRef, TextureUsageFlags,
    TransientResourceRegistry, TextureViewDescriptor, MAX_QUEUES,
};

/// Observable registry activity, for tests and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Materialised { resource: Handle, slot: usize, recycled: bool },
    Disposed { resource: Handle, slot: usize },
    DrawableAcquired { resource: Handle },
    HistoryBufferHeld { resource: Handle },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum SlotKey {
    Buffer(BufferDescriptor),
    Texture(TextureDescriptor),
    ArgTable(usize),
    ArgTableArray(usize),
}

#[derive(Debug)]
struct Slot {
    key: SlotKey,
    wait_event: QueueCommandIndices,
    fences: Vec<FenceDependency>,
}

#[derive(Debug, Default)]
struct RegistryState {
    slots: Vec<Slot>,
    free: FxHashMap<SlotKey, Vec<usize>>,
    allocations: FxHashMap<Handle, usize>,
    /// History buffer backing kept alive across frames.
    held_history: FxHashMap<Handle, usize>,
    drawable_counter: u64,
    events: Vec<RegistryEvent>,
    aliased_heaps: bool,
    supports_memoryless: bool,
    fail_allocation: bool,
    fail_drawables: bool,
}

impl RegistryState {
    fn allocate(&mut self, handle: Handle, key: SlotKey) -> Result<QueueCommandIndices> {
        if self.fail_allocation {
            return Err(Error::new(ErrorKind::AllocationFailed));
        }
        if let Some(&slot) = self.allocations.get(&handle) {
            // Already materialised this frame.
            return Ok(self.slots[slot].wait_event);
        }
        if let Some(&slot) = self.held_history.get(&handle) {
            self.allocations.insert(handle, slot);
            self.held_history.remove(&handle);
            return Ok(self.slots[slot].wait_event);
        }

        let recycled = self.free.get_mut(&key).and_then(|list| list.pop());
        let slot = match recycled {
            Some(slot) => slot,
            None => {
                let slot = self.slots.len();
                self.slots.push(Slot {
                    key,
                    wait_event: [0; MAX_QUEUES],
                    fences: Vec::new(),
                });
                slot
            }
        };
        self.allocations.insert(handle, slot);
        self.events.push(RegistryEvent::Materialised {
            resource: handle,
            slot,
            recycled: recycled.is_some(),
        });
        trace!("materialised {:?} in slot {}", handle, slot);
        Ok(self.slots[slot].wait_event)
    }

    fn dispose(&mut self, handle: Handle, wait_event: QueueCommandIndices) {
        let slot = match self.allocations.remove(&handle) {
            Some(slot) => slot,
            // Window-handle textures and already-reclaimed resources have
            // nothing to return.
            None => return,
        };
        let data = &mut self.slots[slot];
        data.wait_event = merge_queue_command_indices(data.wait_event, wait_event);
        self.free.entry(data.key.clone()).or_default().push(slot);
        self.events.push(RegistryEvent::Disposed {
            resource: handle,
            slot,
        });
        trace!("disposed {:?} from slot {}", handle, slot);
    }
}

/// A conforming, in-memory implementation of the registry contract.
///
/// Handles to the registry share state, so a clone kept by a test remains
/// connected after another clone is handed to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct NullResourceRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl NullResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat transient buffers and textures as sub-allocated from a shared
    /// heap.
    pub fn set_aliased_heaps(&self, value: bool) {
        self.state.lock().aliased_heaps = value;
    }

    pub fn set_supports_memoryless(&self, value: bool) {
        self.state.lock().supports_memoryless = value;
    }

    /// Make every subsequent allocation fail with out-of-device-memory.
    pub fn set_fail_allocation(&self, value: bool) {
        self.state.lock().fail_allocation = value;
    }

    /// Make every subsequent drawable acquisition fail.
    pub fn set_fail_drawables(&self, value: bool) {
        self.state.lock().fail_drawables = value;
    }

    /// Snapshot of the registry's activity so far.
    pub fn events(&self) -> Vec<RegistryEvent> {
        self.state.lock().events.clone()
    }

    /// The number of resources currently holding backing memory.
    pub fn num_live_allocations(&self) -> usize {
        self.state.lock().allocations.len()
    }
}

impl TransientResourceRegistry for NullResourceRegistry {
    fn allocate_buffer_if_needed(
        &mut self,
        buffer: BufferRef,
        descriptor: &BufferDescriptor,
    ) -> Result<QueueCommandIndices> {
        self.state
            .lock()
            .allocate(buffer.handle(), SlotKey::Buffer(*descriptor))
    }

    fn allocate_texture_if_needed(
        &mut self,
        texture: TextureRef,
        descriptor: &TextureDescriptor,
        _usage: TextureUsageFlags,
    ) -> Result<QueueCommandIndices> {
        self.state
            .lock()
            .allocate(texture.handle(), SlotKey::Texture(*descriptor))
    }

    fn allocate_texture_view(
        &mut self,
        texture: TextureRef,
        descriptor: &TextureViewDescriptor,
        _usage: TextureUsageFlags,
    ) -> Result<QueueCommandIndices> {
        // A view borrows its base texture's memory; it gets a slot of its
        // own only for bookkeeping.
        let key = SlotKey::Texture(TextureDescriptor::new_2d(0, 0, descriptor.pixel_format));
        self.state.lock().allocate(texture.handle(), key)
    }

    fn allocate_arg_table_if_needed(
        &mut self,
        table: ArgTableRef,
        descriptor: &ArgTableDescriptor,
    ) -> Result<QueueCommandIndices> {
        self.state
            .lock()
            .allocate(table.handle(), SlotKey::ArgTable(descriptor.arguments.len()))
    }

    fn allocate_arg_table_array_if_needed(
        &mut self,
        array: ArgTableArrayRef,
        descriptors: &[ArgTableDescriptor],
    ) -> Result<QueueCommandIndices> {
        self.state
            .lock()
            .allocate(array.handle(), SlotKey::ArgTableArray(descriptors.len()))
    }

    fn dispose_buffer(&mut self, buffer: BufferRef, wait_event: QueueCommandIndices) {
        self.state.lock().dispose(buffer.handle(), wait_event);
    }

    fn dispose_texture(&mut self, texture: TextureRef, wait_event: QueueCommandIndices) {
        self.state.lock().dispose(texture.handle(), wait_event);
    }

    fn dispose_arg_table(&mut self, table: ArgTableRef, wait_event: QueueCommandIndices) {
        self.state.lock().dispose(table.handle(), wait_event);
    }

    fn dispose_arg_table_array(&mut self, array: ArgTableArrayRef, wait_event: QueueCommandIndices) {
        self.state.lock().dispose(array.handle(), wait_event);
    }

    fn is_aliased_heap_resource(&self, resource: ResourceRef) -> bool {
        let state = self.state.lock();
        state.aliased_heaps
            && resource.handle().is_transient()
            && match resource.resource_type() {
                ResourceType::Buffer | ResourceType::Texture => true,
                _ => false,
            }
    }

    fn with_heap_aliasing_fences(
        &self,
        resource: ResourceRef,
        f: &mut dyn FnMut(&FenceDependency),
    ) {
        let state = self.state.lock();
        if let Some(&slot) = state.allocations.get(&resource.handle()) {
            for dependency in &state.slots[slot].fences {
                f(dependency);
            }
        }
    }

    fn set_disposal_fences(&mut self, resource: ResourceRef, fences: Vec<FenceDependency>) {
        let mut state = self.state.lock();
        if let Some(&slot) = state.allocations.get(&resource.handle()) {
            state.slots[slot].fences = fences;
        }
    }

    fn register_initialised_history_buffer_for_disposal(
        &mut self,
        resource: ResourceRef,
        wait_event: QueueCommandIndices,
    ) {
        let handle = resource.handle();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(slot) = state.allocations.remove(&handle) {
            let data = &mut state.slots[slot];
            data.wait_event = merge_queue_command_indices(data.wait_event, wait_event);
            state.held_history.insert(handle, slot);
            state
                .events
                .push(RegistryEvent::HistoryBufferHeld { resource: handle });
        }
    }

    fn acquire_drawable(&mut self, texture: TextureRef) -> Option<DrawableToken> {
        let mut state = self.state.lock();
        if state.fail_drawables {
            return None;
        }
        state.drawable_counter += 1;
        let token = DrawableToken(state.drawable_counter);
        let handle = texture.handle();
        state
            .events
            .push(RegistryEvent::DrawableAcquired { resource: handle });
        Some(token)
    }

    fn supports_memoryless(&self) -> bool {
        self.state.lock().supports_memoryless
    }

    fn prepare_frame(&mut self) {}

    fn cycle_frames(&mut self) {
        // Whatever transient backing is still tracked gets reclaimed
        // unconditionally.
        let mut state = self.state.lock();
        let leftovers: Vec<(Handle, usize)> = state
            .allocations
            .iter()
            .filter(|(handle, _)| handle.is_transient())
            .map(|(&handle, &slot)| (handle, slot))
            .collect();
        for (handle, slot) in leftovers {
            state.allocations.remove(&handle);
            let key = state.slots[slot].key.clone();
            state.free.entry(key).or_default().push(slot);
        }
    }

    fn clear_swapchains(&mut self) {}

    fn clear_drawables(&mut self) {}
}
