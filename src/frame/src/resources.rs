//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Resource state tracking: descriptors, arenas, recorded usages, and
//! per-queue wait indices.
use fxhash::FxHashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::ops::Range;

use nagare_base::{
    CmdIndex, Handle, QueueId, ResourceDescriptor, ResourceOptions, ResourceType, StageFlags,
    MAX_QUEUES,
};

/// How a pass accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAccess {
    Read,
    Write,
    ReadWrite,
    /// The resource is a render target that is both loaded and stored.
    ReadWriteRenderTarget,
    /// The resource is a render target whose previous contents are not read.
    WriteOnlyRenderTarget,
    /// The resource is read in-place as an input attachment of the render
    /// target it is currently bound to.
    InputAttachmentRenderTarget,
    /// The resource is bound as a render target but neither loaded nor
    /// stored.
    UnusedRenderTarget,
}

impl ResourceAccess {
    pub fn is_read(&self) -> bool {
        match *self {
            ResourceAccess::Read
            | ResourceAccess::ReadWrite
            | ResourceAccess::ReadWriteRenderTarget
            | ResourceAccess::InputAttachmentRenderTarget => true,
            _ => false,
        }
    }

    pub fn is_write(&self) -> bool {
        match *self {
            ResourceAccess::Write
            | ResourceAccess::ReadWrite
            | ResourceAccess::ReadWriteRenderTarget
            | ResourceAccess::WriteOnlyRenderTarget => true,
            _ => false,
        }
    }

    pub fn is_render_target(&self) -> bool {
        match *self {
            ResourceAccess::ReadWriteRenderTarget
            | ResourceAccess::WriteOnlyRenderTarget
            | ResourceAccess::InputAttachmentRenderTarget
            | ResourceAccess::UnusedRenderTarget => true,
            _ => false,
        }
    }
}

/// Categories of access used for cross-frame wait tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCategory {
    Read = 0,
    Write = 1,
    ReadWrite = 2,
}

/// A single recorded access of one resource by one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUsage {
    pub pass: usize,
    pub command_range: Range<CmdIndex>,
    pub access: ResourceAccess,
    pub stages: StageFlags,
    pub in_arg_table: bool,
    pub active: bool,
}

impl ResourceUsage {
    pub fn is_read(&self) -> bool {
        self.access.is_read()
    }

    pub fn is_write(&self) -> bool {
        self.access.is_write()
    }

    pub fn is_render_target(&self) -> bool {
        self.access.is_render_target()
    }

    /// Whether this usage participates in barrier and fence placement.
    ///
    /// Inactive usages, unused render targets and host-only accesses do not.
    pub fn affects_gpu_barriers(&self) -> bool {
        self.active
            && self.access != ResourceAccess::UnusedRenderTarget
            && self.stages.intersects_device_stages()
    }
}

type UsageList = SmallVec<[ResourceUsage; 4]>;

/// The per-resource ordered usage lists recorded while a frame's passes are
/// declared.
#[derive(Debug, Default)]
pub struct ResourceUsages {
    map: FxHashMap<Handle, UsageList>,
}

impl ResourceUsages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a usage, merging it into the previous entry when the same pass
    /// repeats an identical access.
    pub fn record(&mut self, resource: Handle, usage: ResourceUsage) {
        let list = self.map.entry(resource).or_default();
        if let Some(last) = list.last_mut() {
            debug_assert!(
                last.command_range.start <= usage.command_range.start,
                "usages must be recorded in command order"
            );
            if last.pass == usage.pass
                && last.access == usage.access
                && last.stages == usage.stages
                && last.in_arg_table == usage.in_arg_table
                && last.active == usage.active
            {
                last.command_range.end = last.command_range.end.max(usage.command_range.end);
                return;
            }
        }
        list.push(usage);
    }

    pub fn usages(&self, resource: Handle) -> &[ResourceUsage] {
        self.map.get(&resource).map(|x| &x[..]).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Handles of every resource with at least one recorded usage, in a
    /// deterministic order.
    pub fn resources_sorted(&self) -> Vec<Handle> {
        let mut keys: Vec<_> = self.map.keys().cloned().collect();
        keys.sort();
        keys
    }
}

const NUM_ACCESS_CATEGORIES: usize = 3;

/// State tracked per resource.
#[derive(Debug)]
pub(crate) struct ResourceData {
    pub descriptor: ResourceDescriptor,
    pub options: ResourceOptions,
    pub initialised: bool,
    /// Per-queue, per-access-category command buffer signal values that must
    /// complete before the next access of the given category.
    pub wait_indices: [[u64; NUM_ACCESS_CATEGORIES]; MAX_QUEUES],
}

impl ResourceData {
    fn new(descriptor: ResourceDescriptor, options: ResourceOptions) -> Self {
        Self {
            descriptor,
            options,
            initialised: false,
            wait_indices: [[0; NUM_ACCESS_CATEGORIES]; MAX_QUEUES],
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    data: Option<ResourceData>,
}

/// The arena backing persistent resources.
///
/// Handles carry the slot index and a generation; the generation is checked
/// on every access so that a dangling handle of a disposed resource is
/// caught instead of silently reading a recycled slot.
#[derive(Debug, Default)]
pub struct ResourceStorage {
    inner: Mutex<StorageInner>,
}

#[derive(Debug, Default)]
struct StorageInner {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ResourceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, ty: ResourceType, descriptor: ResourceDescriptor, options: ResourceOptions) -> Handle {
        let mut inner = self.inner.lock();
        let data = ResourceData::new(descriptor, options);
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            debug_assert!(slot.data.is_none());
            slot.data = Some(data);
            Handle::new(ty, index, slot.generation, false)
        } else {
            let index = inner.slots.len() as u32;
            inner.slots.push(Slot {
                generation: 0,
                data: Some(data),
            });
            Handle::new(ty, index, 0, false)
        }
    }

    /// Remove a resource, invalidating every copy of its handle.
    pub fn dispose(&self, handle: Handle) {
        let mut inner = self.inner.lock();
        let slot = &mut inner.slots[handle.index() as usize];
        assert_eq!(slot.generation, handle.generation(), "stale resource handle");
        assert!(slot.data.take().is_some(), "resource disposed twice");
        slot.generation = slot.generation.wrapping_add(1) & 0xff_ffff;
        inner.free.push(handle.index());
    }

    pub(crate) fn with_data<R>(&self, handle: Handle, f: impl FnOnce(&mut ResourceData) -> R) -> R {
        let mut inner = self.inner.lock();
        let slot = &mut inner.slots[handle.index() as usize];
        assert_eq!(slot.generation, handle.generation(), "stale resource handle");
        f(slot.data.as_mut().expect("stale resource handle"))
    }

    pub fn options(&self, handle: Handle) -> ResourceOptions {
        self.with_data(handle, |data| data.options)
    }

    pub fn descriptor(&self, handle: Handle) -> ResourceDescriptor {
        self.with_data(handle, |data| data.descriptor.clone())
    }

    pub fn is_initialised(&self, handle: Handle) -> bool {
        self.with_data(handle, |data| data.initialised)
    }

    pub fn mark_initialised(&self, handle: Handle) {
        self.with_data(handle, |data| data.initialised = true);
    }

    pub fn wait_index(&self, handle: Handle, queue: QueueId, category: AccessCategory) -> u64 {
        self.with_data(handle, |data| {
            data.wait_indices[queue as usize][category as usize]
        })
    }

    /// Raise the wait indices of the given categories to `value`.
    pub fn update_wait_indices(
        &self,
        handle: Handle,
        queue: QueueId,
        categories: &[AccessCategory],
        value: u64,
    ) {
        self.with_data(handle, |data| {
            for &category in categories {
                let slot = &mut data.wait_indices[queue as usize][category as usize];
                *slot = (*slot).max(value);
            }
        });
    }
}

/// The arena backing transient resources of a single frame.
#[derive(Debug)]
pub(crate) struct TransientArena {
    slots: Vec<ResourceData>,
    generation: u32,
}

impl TransientArena {
    pub fn new(frame_serial: u64) -> Self {
        Self {
            slots: Vec::new(),
            generation: (frame_serial & 0xff_ffff) as u32,
        }
    }

    pub fn create(&mut self, ty: ResourceType, descriptor: ResourceDescriptor) -> Handle {
        let index = self.slots.len() as u32;
        self.slots
            .push(ResourceData::new(descriptor, ResourceOptions::empty()));
        Handle::new(ty, index, self.generation, true)
    }

    fn data(&self, handle: Handle) -> &ResourceData {
        assert_eq!(
            handle.generation(),
            self.generation,
            "transient handle from another frame"
        );
        &self.slots[handle.index() as usize]
    }
}

/// A view combining the persistent storage with one frame's transient arena.
#[derive(Debug)]
pub(crate) struct FrameResources<'a> {
    pub storage: &'a ResourceStorage,
    pub transient: &'a TransientArena,
}

impl FrameResources<'_> {
    pub fn options(&self, handle: Handle) -> ResourceOptions {
        if handle.is_transient() {
            self.transient.data(handle).options
        } else {
            self.storage.options(handle)
        }
    }

    pub fn descriptor(&self, handle: Handle) -> ResourceDescriptor {
        if handle.is_transient() {
            self.transient.data(handle).descriptor.clone()
        } else {
            self.storage.descriptor(handle)
        }
    }

    pub fn is_initialised(&self, handle: Handle) -> bool {
        if handle.is_transient() {
            false
        } else {
            self.storage.is_initialised(handle)
        }
    }

    pub fn wait_index(&self, handle: Handle, queue: QueueId, category: AccessCategory) -> u64 {
        if handle.is_transient() {
            0
        } else {
            self.storage.wait_index(handle, queue, category)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nagare_base::BufferDescriptor;

    fn buffer_descriptor() -> ResourceDescriptor {
        ResourceDescriptor::Buffer(BufferDescriptor::new(64))
    }

    #[test]
    fn generation_invalidates_stale_handles() {
        let storage = ResourceStorage::new();
        let handle = storage.create(
            ResourceType::Buffer,
            buffer_descriptor(),
            ResourceOptions::PERSISTENT,
        );
        storage.dispose(handle);
        let reused = storage.create(
            ResourceType::Buffer,
            buffer_descriptor(),
            ResourceOptions::PERSISTENT,
        );
        assert_eq!(reused.index(), handle.index());
        assert_ne!(reused.generation(), handle.generation());
        let storage = std::panic::AssertUnwindSafe(&storage);
        assert!(std::panic::catch_unwind(move || storage.options(handle)).is_err());
    }

    #[test]
    fn usage_merging() {
        let mut usages = ResourceUsages::new();
        let storage = ResourceStorage::new();
        let handle = storage.create(
            ResourceType::Buffer,
            buffer_descriptor(),
            ResourceOptions::PERSISTENT,
        );
        let usage = ResourceUsage {
            pass: 0,
            command_range: 0..1,
            access: ResourceAccess::Read,
            stages: StageFlags::COMPUTE,
            in_arg_table: false,
            active: true,
        };
        usages.record(handle, usage.clone());
        usages.record(
            handle,
            ResourceUsage {
                command_range: 1..2,
                ..usage.clone()
            },
        );
        usages.record(
            handle,
            ResourceUsage {
                pass: 1,
                command_range: 2..3,
                access: ResourceAccess::Write,
                ..usage
            },
        );
        let list = usages.usages(handle);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].command_range, 0..2);
        assert_eq!(list[1].command_range, 2..3);
    }

    #[test]
    fn wait_index_updates_are_monotonic() {
        let storage = ResourceStorage::new();
        let handle = storage.create(
            ResourceType::Buffer,
            buffer_descriptor(),
            ResourceOptions::PERSISTENT,
        );
        storage.update_wait_indices(handle, 2, &[AccessCategory::Write], 10);
        storage.update_wait_indices(handle, 2, &[AccessCategory::Write], 5);
        assert_eq!(storage.wait_index(handle, 2, AccessCategory::Write), 10);
        assert_eq!(storage.wait_index(handle, 2, AccessCategory::Read), 0);
    }
}
