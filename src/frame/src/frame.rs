//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Frame recording.
use std::sync::Arc;

use nagare_base::{
    ArgTableArrayRef, ArgTableDescriptor, ArgTableRef, BufferDescriptor, BufferRef, CmdIndex,
    LoadOp, ResourceDescriptor, ResourceOptions, ResourceType, StageFlags, StoreOp,
    TextureDescriptor, TextureRef, TextureViewDescriptor,
};

use crate::pass::{PassDesc, PassKind, PassRecord};
use crate::resources::{
    ResourceAccess, ResourceStorage, ResourceUsage, ResourceUsages, TransientArena,
};

/// An open frame being recorded.
///
/// Passes are declared in execution order; each declaration assigns the pass
/// a contiguous range of frame-wide command indices and appends its resource
/// accesses to the per-resource usage lists. Nothing touches the device
/// until the frame is handed to [`crate::FrameScheduler::submit`].
#[derive(Debug)]
pub struct Frame {
    pub(crate) passes: Vec<PassRecord>,
    pub(crate) usages: ResourceUsages,
    pub(crate) transient: TransientArena,
    pub(crate) storage: Arc<ResourceStorage>,
    next_command_index: CmdIndex,
}

impl Frame {
    pub(crate) fn new(storage: Arc<ResourceStorage>, frame_serial: u64) -> Self {
        Self {
            passes: Vec::new(),
            usages: ResourceUsages::new(),
            transient: TransientArena::new(frame_serial),
            storage,
            next_command_index: 0,
        }
    }

    pub fn num_passes(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.passes.iter().any(|p| p.active)
    }

    pub(crate) fn total_commands(&self) -> CmdIndex {
        self.next_command_index
    }

    /// Create a buffer that lives for this frame only.
    pub fn create_buffer(&mut self, descriptor: BufferDescriptor) -> BufferRef {
        BufferRef::from_handle(
            self.transient
                .create(ResourceType::Buffer, ResourceDescriptor::Buffer(descriptor)),
        )
    }

    /// Create a texture that lives for this frame only.
    pub fn create_texture(&mut self, descriptor: TextureDescriptor) -> TextureRef {
        TextureRef::from_handle(
            self.transient
                .create(ResourceType::Texture, ResourceDescriptor::Texture(descriptor)),
        )
    }

    /// Create a view onto a texture for this frame only.
    pub fn create_texture_view(&mut self, descriptor: TextureViewDescriptor) -> TextureRef {
        TextureRef::from_handle(self.transient.create(
            ResourceType::Texture,
            ResourceDescriptor::TextureView(descriptor),
        ))
    }

    /// Create an argument table for this frame only.
    pub fn create_arg_table(&mut self, descriptor: ArgTableDescriptor) -> ArgTableRef {
        ArgTableRef::from_handle(self.transient.create(
            ResourceType::ArgTable,
            ResourceDescriptor::ArgTable(descriptor),
        ))
    }

    /// Create an argument table array for this frame only.
    pub fn create_arg_table_array(
        &mut self,
        descriptors: Vec<ArgTableDescriptor>,
    ) -> ArgTableArrayRef {
        ArgTableArrayRef::from_handle(self.transient.create(
            ResourceType::ArgTableArray,
            ResourceDescriptor::ArgTableArray(descriptors),
        ))
    }

    /// Append a pass to the frame.
    ///
    /// # Panics
    ///
    /// Panics when the pass declares a write to an immutable resource that
    /// has already been initialised.
    pub fn add_pass(&mut self, desc: PassDesc) {
        let PassDesc {
            name,
            kind,
            render_target,
            num_commands,
            usages,
            active,
            standalone,
            encode,
        } = desc;

        assert!(num_commands >= 1, "a pass records at least one command");
        assert_eq!(
            render_target.is_some(),
            kind == PassKind::Render,
            "render targets belong to render passes"
        );

        let pass_index = self.passes.len();
        let command_range = self.next_command_index..self.next_command_index + num_commands;
        self.next_command_index = command_range.end;

        // Render target attachments participate as implicit usages, with the
        // access derived from their load/store actions.
        if let Some(ref rt) = render_target {
            for attachment in rt.colors.iter() {
                self.record_attachment(
                    pass_index,
                    &command_range,
                    attachment.texture,
                    attachment.load_op,
                    attachment.store_op,
                    StageFlags::RENDER_OUTPUT,
                    active,
                );
            }
            if let Some(ref attachment) = rt.depth_stencil {
                self.record_attachment(
                    pass_index,
                    &command_range,
                    attachment.texture,
                    attachment.load_op,
                    attachment.store_op,
                    StageFlags::EARLY_FRAG_TESTS | StageFlags::LATE_FRAG_TESTS,
                    active,
                );
            }
        }

        for usage in usages {
            let absolute_range = match usage.command_range {
                Some(ref relative) => {
                    let lo = command_range.start + relative.start;
                    let hi = command_range.start + relative.end;
                    assert!(hi <= command_range.end, "usage outside the pass");
                    lo..hi
                }
                None => command_range.clone(),
            };
            self.record_usage(
                usage.resource.handle(),
                ResourceUsage {
                    pass: pass_index,
                    command_range: absolute_range,
                    access: usage.access,
                    stages: usage.stages,
                    in_arg_table: usage.in_arg_table,
                    active,
                },
            );
        }

        self.passes.push(PassRecord {
            name,
            kind,
            render_target,
            command_range,
            active,
            standalone,
            encode,
        });
    }

    fn record_attachment(
        &mut self,
        pass_index: usize,
        command_range: &std::ops::Range<CmdIndex>,
        texture: TextureRef,
        load_op: LoadOp,
        store_op: StoreOp,
        stages: StageFlags,
        active: bool,
    ) {
        let access = match (load_op, store_op) {
            (LoadOp::Load, _) => ResourceAccess::ReadWriteRenderTarget,
            (_, StoreOp::Store) => ResourceAccess::WriteOnlyRenderTarget,
            (LoadOp::Clear, _) => ResourceAccess::WriteOnlyRenderTarget,
            _ => ResourceAccess::UnusedRenderTarget,
        };
        self.record_usage(
            texture.handle(),
            ResourceUsage {
                pass: pass_index,
                command_range: command_range.clone(),
                access,
                stages,
                in_arg_table: false,
                active,
            },
        );
    }

    fn record_usage(&mut self, handle: nagare_base::Handle, usage: ResourceUsage) {
        // Writing an immutable resource after its initialising frame is a
        // caller bug, caught here at the declaration site.
        if usage.access.is_write() && !handle.is_transient() {
            let options = self.storage.options(handle);
            if options.contains(ResourceOptions::IMMUTABLE_ONCE_INIT)
                && self.storage.is_initialised(handle)
            {
                panic!(
                    "write access to an immutable resource that is already initialised: {:?}",
                    handle
                );
            }
        }
        self.usages.record(handle, usage);
    }
}
