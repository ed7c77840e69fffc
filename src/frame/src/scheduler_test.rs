//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
use flags_macro::flags;
use fxhash::FxHashSet;

use nagare_base::{
    ArgTableDescriptor, BufferDescriptor, ColorAttachment, DrawableToken, Handle,
    QueueCommandIndices, RenderTargetDescriptor, ResourceDescriptor, ResourceOptions, ResourceRef,
    ResourceType, ResourceUsageFlags, StageFlags, StoreOp, TextureDescriptor, TextureRef,
    TextureUsageFlags, TransientResourceRegistry, MAX_QUEUES,
};

use super::{compile, CommandOrder, FrameCommand, FrameCompilation, PreFrameCommand};
use crate::info::FrameCommandInfo;
use crate::pass::{PassKind, PassRecord};
use crate::resources::{
    AccessCategory, FrameResources, ResourceAccess, ResourceStorage, ResourceUsage,
    ResourceUsages, TransientArena,
};

#[derive(Debug, Default)]
struct MockRegistry {
    aliased: FxHashSet<Handle>,
    memoryless: bool,
}

impl TransientResourceRegistry for MockRegistry {
    fn allocate_buffer_if_needed(
        &mut self,
        _buffer: nagare_base::BufferRef,
        _descriptor: &BufferDescriptor,
    ) -> nagare_base::Result<QueueCommandIndices> {
        Ok([0; MAX_QUEUES])
    }

    fn allocate_texture_if_needed(
        &mut self,
        _texture: TextureRef,
        _descriptor: &TextureDescriptor,
        _usage: TextureUsageFlags,
    ) -> nagare_base::Result<QueueCommandIndices> {
        Ok([0; MAX_QUEUES])
    }

    fn allocate_texture_view(
        &mut self,
        _texture: TextureRef,
        _descriptor: &nagare_base::TextureViewDescriptor,
        _usage: TextureUsageFlags,
    ) -> nagare_base::Result<QueueCommandIndices> {
        Ok([0; MAX_QUEUES])
    }

    fn allocate_arg_table_if_needed(
        &mut self,
        _table: nagare_base::ArgTableRef,
        _descriptor: &ArgTableDescriptor,
    ) -> nagare_base::Result<QueueCommandIndices> {
        Ok([0; MAX_QUEUES])
    }

    fn allocate_arg_table_array_if_needed(
        &mut self,
        _array: nagare_base::ArgTableArrayRef,
        _descriptors: &[ArgTableDescriptor],
    ) -> nagare_base::Result<QueueCommandIndices> {
        Ok([0; MAX_QUEUES])
    }

    fn dispose_buffer(&mut self, _buffer: nagare_base::BufferRef, _wait: QueueCommandIndices) {}
    fn dispose_texture(&mut self, _texture: TextureRef, _wait: QueueCommandIndices) {}
    fn dispose_arg_table(&mut self, _table: nagare_base::ArgTableRef, _wait: QueueCommandIndices) {}
    fn dispose_arg_table_array(
        &mut self,
        _array: nagare_base::ArgTableArrayRef,
        _wait: QueueCommandIndices,
    ) {
    }

    fn is_aliased_heap_resource(&self, resource: ResourceRef) -> bool {
        self.aliased.contains(&resource.handle())
    }

    fn with_heap_aliasing_fences(
        &self,
        _resource: ResourceRef,
        _f: &mut dyn FnMut(&nagare_base::FenceDependency),
    ) {
    }

    fn set_disposal_fences(
        &mut self,
        _resource: ResourceRef,
        _fences: Vec<nagare_base::FenceDependency>,
    ) {
    }

    fn register_initialised_history_buffer_for_disposal(
        &mut self,
        _resource: ResourceRef,
        _wait: QueueCommandIndices,
    ) {
    }

    fn acquire_drawable(&mut self, _texture: TextureRef) -> Option<DrawableToken> {
        Some(DrawableToken(0))
    }

    fn supports_memoryless(&self) -> bool {
        self.memoryless
    }

    fn prepare_frame(&mut self) {}
    fn cycle_frames(&mut self) {}
    fn clear_swapchains(&mut self) {}
    fn clear_drawables(&mut self) {}
}

fn pass(kind: PassKind, range: std::ops::Range<u32>) -> PassRecord {
    PassRecord {
        name: "test",
        kind,
        render_target: None,
        command_range: range,
        active: true,
        standalone: false,
        encode: None,
    }
}

fn standalone(kind: PassKind, range: std::ops::Range<u32>) -> PassRecord {
    PassRecord {
        standalone: true,
        ..pass(kind, range)
    }
}

fn usage(
    pass: usize,
    range: std::ops::Range<u32>,
    access: ResourceAccess,
    stages: StageFlags,
) -> ResourceUsage {
    ResourceUsage {
        pass,
        command_range: range,
        access,
        stages,
        in_arg_table: false,
        active: true,
    }
}

struct Fixture {
    storage: ResourceStorage,
    arena: TransientArena,
    usages: ResourceUsages,
    registry: MockRegistry,
}

impl Fixture {
    fn new() -> Self {
        Self {
            storage: ResourceStorage::new(),
            arena: TransientArena::new(0),
            usages: ResourceUsages::new(),
            registry: MockRegistry::default(),
        }
    }

    fn transient_buffer(&mut self) -> Handle {
        self.arena.create(
            ResourceType::Buffer,
            ResourceDescriptor::Buffer(BufferDescriptor::new(256)),
        )
    }

    fn transient_texture(&mut self) -> Handle {
        self.arena.create(
            ResourceType::Texture,
            ResourceDescriptor::Texture(TextureDescriptor::new_2d(
                64,
                64,
                nagare_base::PixelFormat::Rgba8Unorm,
            )),
        )
    }

    fn compile(&self, passes: &[PassRecord]) -> (FrameCompilation, FrameCommandInfo) {
        let info = FrameCommandInfo::new(passes, 1, |_| false);
        let resources = FrameResources {
            storage: &self.storage,
            transient: &self.arena,
        };
        let compilation = compile(passes, &self.usages, &resources, &info, &self.registry);
        (compilation, info)
    }
}

fn use_resources(compilation: &FrameCompilation) -> Vec<(u32, ResourceUsageFlags, StageFlags)> {
    compilation
        .frame_commands
        .iter()
        .filter_map(|entry| match entry.command {
            FrameCommand::UseResource { usage, stages, .. } => {
                Some((entry.index, usage, stages))
            }
            _ => None,
        })
        .collect()
}

fn barriers(compilation: &FrameCompilation) -> Vec<(u32, StageFlags, StageFlags)> {
    compilation
        .frame_commands
        .iter()
        .filter_map(|entry| match entry.command {
            FrameCommand::MemoryBarrier {
                after_stages,
                before_stages,
                ..
            } => Some((entry.index, after_stages, before_stages)),
            _ => None,
        })
        .collect()
}

// Draw passes fused into one encoder and reading one texture produce a
// single residency declaration and no synchronization at all.
#[test]
fn fused_draws_share_one_use_resource() {
    let mut fx = Fixture::new();
    let texture = fx.transient_texture();
    let target = fx.transient_texture();

    let render_target = RenderTargetDescriptor::new().color(ColorAttachment::new(
        TextureRef::from_handle(target),
    ));
    let passes: Vec<PassRecord> = (0..3)
        .map(|i| PassRecord {
            render_target: Some(render_target.clone()),
            ..pass(PassKind::Render, i..i + 1)
        })
        .collect();

    for i in 0..3 {
        fx.usages.record(
            texture,
            usage(
                i as usize,
                i..i + 1,
                ResourceAccess::Read,
                StageFlags::FRAGMENT,
            ),
        );
        fx.usages.record(
            target,
            usage(
                i as usize,
                i..i + 1,
                ResourceAccess::ReadWriteRenderTarget,
                StageFlags::RENDER_OUTPUT,
            ),
        );
    }

    let (compilation, info) = fx.compile(&passes);
    assert_eq!(info.encoders.len(), 1);

    let uses = use_resources(&compilation);
    assert_eq!(uses.len(), 1);
    assert_eq!(
        uses[0],
        (
            0,
            flags![ResourceUsageFlags::{READ | SAMPLE}],
            StageFlags::FRAGMENT
        )
    );

    assert!(barriers(&compilation).is_empty());
    assert!(compilation.dependency_table.is_empty());
}

// A write followed by a read in the same encoder needs a memory barrier,
// not a fence.
#[test]
fn same_encoder_read_after_write_gets_barrier() {
    let mut fx = Fixture::new();
    let buffer = fx.transient_buffer();

    let passes = vec![
        pass(PassKind::Compute, 0..1),
        pass(PassKind::Compute, 1..2),
    ];
    fx.usages.record(
        buffer,
        usage(0, 0..1, ResourceAccess::Write, StageFlags::COMPUTE),
    );
    fx.usages.record(
        buffer,
        usage(1, 1..2, ResourceAccess::Read, StageFlags::COMPUTE),
    );

    let (compilation, info) = fx.compile(&passes);
    assert_eq!(info.encoders.len(), 1);
    assert_eq!(
        barriers(&compilation),
        vec![(1, StageFlags::COMPUTE, StageFlags::COMPUTE)]
    );
    assert!(compilation.dependency_table.is_empty());
}

// The same data dependency across two encoders becomes a dependency table
// entry instead.
#[test]
fn cross_encoder_read_after_write_gets_dependency() {
    let mut fx = Fixture::new();
    let buffer = fx.transient_buffer();

    let passes = vec![
        standalone(PassKind::Compute, 0..1),
        standalone(PassKind::Compute, 1..2),
    ];
    fx.usages.record(
        buffer,
        usage(0, 0..1, ResourceAccess::Write, StageFlags::COMPUTE),
    );
    fx.usages.record(
        buffer,
        usage(1, 1..2, ResourceAccess::Read, StageFlags::COMPUTE),
    );

    let (compilation, info) = fx.compile(&passes);
    assert_eq!(info.encoders.len(), 2);
    assert!(barriers(&compilation).is_empty());

    let dependency = compilation.dependency_table.get(1, 0).unwrap();
    assert_eq!(dependency.signal.encoder, 0);
    assert_eq!(dependency.signal.index, 0);
    assert_eq!(dependency.signal.stages, StageFlags::COMPUTE);
    assert_eq!(dependency.wait.encoder, 1);
    assert_eq!(dependency.wait.index, 1);
    assert_eq!(dependency.wait.stages, StageFlags::COMPUTE);
}

// Write-after-read across encoders must also be ordered.
#[test]
fn cross_encoder_write_after_read_gets_dependency() {
    let mut fx = Fixture::new();
    let buffer = fx.transient_buffer();

    let passes = vec![
        standalone(PassKind::Compute, 0..1),
        standalone(PassKind::Compute, 1..2),
        standalone(PassKind::Compute, 2..3),
    ];
    fx.usages.record(
        buffer,
        usage(0, 0..1, ResourceAccess::Write, StageFlags::COMPUTE),
    );
    fx.usages.record(
        buffer,
        usage(1, 1..2, ResourceAccess::Read, StageFlags::COMPUTE),
    );
    fx.usages.record(
        buffer,
        usage(2, 2..3, ResourceAccess::Write, StageFlags::COMPUTE),
    );

    let (compilation, _) = fx.compile(&passes);
    // Read-after-write 0 → 1, write-after-read 1 → 2, write-after-write
    // 0 → 2.
    assert!(compilation.dependency_table.get(1, 0).is_some());
    assert!(compilation.dependency_table.get(2, 1).is_some());
    assert!(compilation.dependency_table.get(2, 0).is_some());
    // The reduction later collapses the redundant 0 → 2 edge.
    assert_eq!(compilation.dependency_table.reduce().len(), 2);
}

// Transient resources materialise at their first use and die after their
// last; argument tables materialise after everything else at the same
// position.
#[test]
fn materialise_dispose_ordering() {
    let mut fx = Fixture::new();
    let buffer = fx.transient_buffer();
    let table = fx.arena.create(
        ResourceType::ArgTable,
        ResourceDescriptor::ArgTable(ArgTableDescriptor::new(vec![ResourceRef::from_handle(
            buffer,
        )])),
    );

    let passes = vec![pass(PassKind::Compute, 0..1), pass(PassKind::Compute, 1..2)];
    fx.usages.record(
        table,
        usage(0, 0..1, ResourceAccess::Read, StageFlags::COMPUTE),
    );
    fx.usages.record(
        buffer,
        ResourceUsage {
            in_arg_table: true,
            ..usage(0, 0..1, ResourceAccess::Write, StageFlags::COMPUTE)
        },
    );
    fx.usages.record(
        buffer,
        ResourceUsage {
            in_arg_table: true,
            ..usage(1, 1..2, ResourceAccess::Read, StageFlags::COMPUTE)
        },
    );

    let (compilation, _) = fx.compile(&passes);
    let stream: Vec<_> = compilation
        .pre_frame_commands
        .iter()
        .map(|e| (e.index, e.order, format!("{:?}", e.command)))
        .collect();

    let position = |needle: &str| {
        stream
            .iter()
            .position(|(_, _, s)| s.starts_with(needle))
            .unwrap_or_else(|| panic!("missing {}: {:?}", needle, stream))
    };

    let materialise_buffer = position("MaterialiseBuffer");
    let materialise_table = position("MaterialiseArgTable");
    let dispose = position("DisposeResource(Buffer");
    let dispose_table = position("DisposeResource(ArgTable");

    // Both materialise at command 0; the plain buffer goes first.
    assert!(materialise_buffer < materialise_table);
    assert_eq!(stream[materialise_buffer].0, 0);
    assert_eq!(stream[materialise_table].0, 0);

    // Disposal comes after the respective last uses.
    assert_eq!(stream[dispose].0, 1);
    assert_eq!(stream[dispose].1, CommandOrder::After);
    assert_eq!(stream[dispose_table].0, 0);
    assert_eq!(stream[dispose_table].1, CommandOrder::After);
}

// Persistent resources gate the frame on previously stored wait indices and
// refresh them after their last use.
#[test]
fn persistent_resource_cross_frame_waits() {
    let mut fx = Fixture::new();
    let buffer = fx.storage.create(
        ResourceType::Buffer,
        ResourceDescriptor::Buffer(BufferDescriptor::new(64)),
        ResourceOptions::PERSISTENT,
    );
    fx.storage
        .update_wait_indices(buffer, 2, &[AccessCategory::Write], 41);

    let passes = vec![pass(PassKind::Compute, 0..1)];
    fx.usages.record(
        buffer,
        usage(0, 0..1, ResourceAccess::Read, StageFlags::COMPUTE),
    );

    let (compilation, _) = fx.compile(&passes);
    let waits: Vec<_> = compilation
        .pre_frame_commands
        .iter()
        .filter_map(|e| match e.command {
            PreFrameCommand::WaitForCommandBuffer { index, queue } => Some((queue, index)),
            _ => None,
        })
        .collect();
    assert_eq!(waits, vec![(2, 41)]);

    assert!(compilation.pre_frame_commands.iter().any(|e| match e.command {
        PreFrameCommand::UpdateCommandBufferWaitIndex { wrote, .. } => !wrote,
        _ => false,
    }));

    // No materialisation for persistent buffers; their backing is external.
    assert!(!compilation
        .pre_frame_commands
        .iter()
        .any(|e| matches!(e.command, PreFrameCommand::MaterialiseBuffer(_))));
}

// A reader does not wait on other readers: only stored write indices gate a
// read-only frame.
#[test]
fn read_only_frame_ignores_read_indices() {
    let mut fx = Fixture::new();
    let buffer = fx.storage.create(
        ResourceType::Buffer,
        ResourceDescriptor::Buffer(BufferDescriptor::new(64)),
        ResourceOptions::PERSISTENT,
    );
    fx.storage
        .update_wait_indices(buffer, 1, &[AccessCategory::Read], 9);

    let passes = vec![pass(PassKind::Compute, 0..1)];
    fx.usages.record(
        buffer,
        usage(0, 0..1, ResourceAccess::Read, StageFlags::COMPUTE),
    );
    let (compilation, _) = fx.compile(&passes);
    assert!(!compilation
        .pre_frame_commands
        .iter()
        .any(|e| matches!(e.command, PreFrameCommand::WaitForCommandBuffer { .. })));
}

// Immutable resources stop refreshing their wait indices once initialised.
#[test]
fn initialised_immutable_skips_wait_index_update() {
    let mut fx = Fixture::new();
    let buffer = fx.storage.create(
        ResourceType::Buffer,
        ResourceDescriptor::Buffer(BufferDescriptor::new(64)),
        ResourceOptions::PERSISTENT | ResourceOptions::IMMUTABLE_ONCE_INIT,
    );
    fx.storage.mark_initialised(buffer);

    let passes = vec![pass(PassKind::Compute, 0..1)];
    fx.usages.record(
        buffer,
        usage(0, 0..1, ResourceAccess::Read, StageFlags::COMPUTE),
    );
    let (compilation, _) = fx.compile(&passes);
    assert!(!compilation
        .pre_frame_commands
        .iter()
        .any(|e| matches!(e.command, PreFrameCommand::UpdateCommandBufferWaitIndex { .. })));
}

// An uninitialised history buffer materialises fresh, defers its disposal,
// and becomes initialised by the frame that writes it.
#[test]
fn uninitialised_history_buffer() {
    let mut fx = Fixture::new();
    let history = fx.storage.create(
        ResourceType::Texture,
        ResourceDescriptor::Texture(TextureDescriptor::new_2d(
            32,
            32,
            nagare_base::PixelFormat::Rgba16Float,
        )),
        ResourceOptions::HISTORY_BUFFER,
    );

    let passes = vec![pass(PassKind::Compute, 0..1)];
    fx.usages.record(
        history,
        usage(0, 0..1, ResourceAccess::Write, StageFlags::COMPUTE),
    );

    let (compilation, _) = fx.compile(&passes);
    assert!(compilation
        .pre_frame_commands
        .iter()
        .any(|e| matches!(e.command, PreFrameCommand::MaterialiseTexture(..))));
    assert!(!compilation
        .pre_frame_commands
        .iter()
        .any(|e| matches!(e.command, PreFrameCommand::DisposeResource(_))));
    assert_eq!(compilation.deferred_history_buffers.len(), 1);
    assert_eq!(compilation.newly_initialised, vec![history]);
}

// Once initialised, a history buffer behaves like a persistent resource.
#[test]
fn initialised_history_buffer_is_persistent() {
    let mut fx = Fixture::new();
    let history = fx.storage.create(
        ResourceType::Texture,
        ResourceDescriptor::Texture(TextureDescriptor::new_2d(
            32,
            32,
            nagare_base::PixelFormat::Rgba16Float,
        )),
        ResourceOptions::HISTORY_BUFFER,
    );
    fx.storage.mark_initialised(history);
    fx.storage
        .update_wait_indices(history, 0, &[AccessCategory::Write], 17);

    let passes = vec![pass(PassKind::Compute, 0..1)];
    fx.usages.record(
        history,
        usage(0, 0..1, ResourceAccess::Read, StageFlags::COMPUTE),
    );

    let (compilation, _) = fx.compile(&passes);
    assert!(!compilation
        .pre_frame_commands
        .iter()
        .any(|e| matches!(e.command, PreFrameCommand::MaterialiseTexture(..))));
    assert!(compilation.pre_frame_commands.iter().any(|e| matches!(
        e.command,
        PreFrameCommand::WaitForCommandBuffer { index: 17, queue: 0 }
    )));
    assert!(compilation.deferred_history_buffers.is_empty());
}

// A render-target-only transient texture whose contents are never stored
// can live entirely in tile memory.
#[test]
fn memoryless_render_target() {
    let mut fx = Fixture::new();
    fx.registry.memoryless = true;
    let target = fx.transient_texture();

    let render_target = RenderTargetDescriptor::new().color(
        ColorAttachment::new(TextureRef::from_handle(target)).with_store_op(StoreOp::DontCare),
    );
    let passes = vec![PassRecord {
        render_target: Some(render_target),
        ..pass(PassKind::Render, 0..1)
    }];
    fx.usages.record(
        target,
        usage(
            0,
            0..1,
            ResourceAccess::WriteOnlyRenderTarget,
            StageFlags::RENDER_OUTPUT,
        ),
    );

    let (compilation, _) = fx.compile(&passes);
    let flags = compilation
        .pre_frame_commands
        .iter()
        .find_map(|e| match e.command {
            PreFrameCommand::MaterialiseTexture(_, flags) => Some(flags),
            _ => None,
        })
        .unwrap();
    assert!(flags.contains(TextureUsageFlags::MEMORYLESS));
}

// Storing the render target (or sampling it later) forbids memoryless.
#[test]
fn stored_render_target_is_not_memoryless() {
    let mut fx = Fixture::new();
    fx.registry.memoryless = true;
    let target = fx.transient_texture();

    let render_target = RenderTargetDescriptor::new().color(
        ColorAttachment::new(TextureRef::from_handle(target)).with_store_op(StoreOp::Store),
    );
    let passes = vec![PassRecord {
        render_target: Some(render_target),
        ..pass(PassKind::Render, 0..1)
    }];
    fx.usages.record(
        target,
        usage(
            0,
            0..1,
            ResourceAccess::WriteOnlyRenderTarget,
            StageFlags::RENDER_OUTPUT,
        ),
    );

    let (compilation, _) = fx.compile(&passes);
    let flags = compilation
        .pre_frame_commands
        .iter()
        .find_map(|e| match e.command {
            PreFrameCommand::MaterialiseTexture(_, flags) => Some(flags),
            _ => None,
        })
        .unwrap();
    assert!(!flags.contains(TextureUsageFlags::MEMORYLESS));
}

// Reading an aliased resource before initialising it is a caller bug.
#[test]
#[should_panic(expected = "must be fully initialised")]
fn aliased_resource_first_read_panics() {
    let mut fx = Fixture::new();
    let buffer = fx.transient_buffer();
    fx.registry.aliased.insert(buffer);

    let passes = vec![pass(PassKind::Compute, 0..1)];
    fx.usages.record(
        buffer,
        usage(0, 0..1, ResourceAccess::Read, StageFlags::COMPUTE),
    );
    let _ = fx.compile(&passes);
}

// Aliased resources wait on the fences of previous occupants and leave
// fences of their own behind.
#[test]
fn aliased_resource_fence_bookkeeping() {
    let mut fx = Fixture::new();
    let buffer = fx.transient_buffer();
    fx.registry.aliased.insert(buffer);

    let passes = vec![
        standalone(PassKind::Compute, 0..1),
        standalone(PassKind::Compute, 1..2),
    ];
    fx.usages.record(
        buffer,
        usage(0, 0..1, ResourceAccess::Write, StageFlags::COMPUTE),
    );
    fx.usages.record(
        buffer,
        usage(1, 1..2, ResourceAccess::Read, StageFlags::COMPUTE),
    );

    let (compilation, _) = fx.compile(&passes);
    assert!(compilation.pre_frame_commands.iter().any(|e| matches!(
        e.command,
        PreFrameCommand::WaitForHeapAliasingFences { .. }
    )));

    // The disposal fence must cover the read, which outlives the write.
    let points = &compilation.disposal_fence_points[&buffer];
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].encoder, 1);
    assert_eq!(points[0].index, 1);
    assert_eq!(points[0].stages, StageFlags::COMPUTE);
}

// Texture views materialise through the view path, not the texture path.
#[test]
fn texture_view_materialises_as_view() {
    let mut fx = Fixture::new();
    let base = fx.transient_texture();
    let view = fx.arena.create(
        ResourceType::Texture,
        ResourceDescriptor::TextureView(nagare_base::TextureViewDescriptor {
            base: TextureRef::from_handle(base),
            pixel_format: nagare_base::PixelFormat::R32Float,
            mip_range_start: 0,
            mip_range_len: 1,
        }),
    );

    let passes = vec![pass(PassKind::Compute, 0..1), pass(PassKind::Compute, 1..2)];
    fx.usages.record(
        base,
        usage(0, 0..1, ResourceAccess::Write, StageFlags::COMPUTE),
    );
    fx.usages.record(
        view,
        usage(1, 1..2, ResourceAccess::Read, StageFlags::COMPUTE),
    );

    let (compilation, _) = fx.compile(&passes);
    assert!(compilation
        .pre_frame_commands
        .iter()
        .any(|e| matches!(e.command, PreFrameCommand::MaterialiseTextureView(..))));
    assert!(compilation
        .pre_frame_commands
        .iter()
        .any(|e| matches!(e.command, PreFrameCommand::MaterialiseTexture(..))));
}

// Usages of inactive passes leave no trace in the streams.
#[test]
fn inactive_usages_are_ignored() {
    let mut fx = Fixture::new();
    let buffer = fx.transient_buffer();

    let mut disabled = pass(PassKind::Compute, 0..1);
    disabled.active = false;
    let passes = vec![disabled, pass(PassKind::Compute, 1..2)];
    fx.usages.record(
        buffer,
        ResourceUsage {
            active: false,
            ..usage(0, 0..1, ResourceAccess::Write, StageFlags::COMPUTE)
        },
    );
    fx.usages.record(
        buffer,
        usage(1, 1..2, ResourceAccess::Write, StageFlags::COMPUTE),
    );

    let (compilation, _) = fx.compile(&passes);
    // The first active usage decides materialisation.
    let materialise = compilation
        .pre_frame_commands
        .iter()
        .find(|e| matches!(e.command, PreFrameCommand::MaterialiseBuffer(_)))
        .unwrap();
    assert_eq!(materialise.index, 1);
}
