//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The resource command compiler.
//!
//! Turns the usage lists recorded during pass declaration into two totally
//! ordered command streams plus an inter-encoder dependency table:
//!
//!  - The **pre-frame stream** runs on the CPU before any recording starts.
//!    It materialises transient resources just-in-time, returns them to the
//!    registry after their last use, raises per-encoder queue wait indices
//!    for cross-frame accesses, and collects heap-aliasing fence waits.
//!  - The **in-frame stream** is replayed while encoders record: residency
//!    declarations, intra-encoder memory barriers, and (after the
//!    dependency table has been reduced) fence updates and waits.
//!
//! Commands are ordered by `(command index, order)`. Materialisation of an
//! argument table sorts after every other materialisation at the same
//! position because its contents can only be written once the resources it
//! refers to exist.
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use log::trace;
use smallvec::SmallVec;

use nagare_base::{
    ArgTableArrayRef, ArgTableRef, BufferRef, CmdIndex, CmdQueue, FenceRef, Handle, QueueId,
    ResourceDescriptor, ResourceOptions, ResourceRef, ResourceType, ResourceUsageFlags, Result,
    StageFlags, TextureRef, TextureUsageFlags, TransientResourceRegistry, MAX_QUEUES,
};

use crate::info::FrameCommandInfo;
use crate::pass::{PassKind, PassRecord};
use crate::reduction::{Dependency, DependencyPoint, DependencyTable};
use crate::resources::{FrameResources, ResourceAccess, ResourceUsage, ResourceUsages};

#[cfg(test)]
#[path = "./scheduler_test.rs"]
mod scheduler_test;

/// Decides which side of a command index a command executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CommandOrder {
    Before,
    After,
}

/// A command executed on the CPU before device recording starts.
#[derive(Debug, Clone)]
pub enum PreFrameCommand {
    MaterialiseBuffer(BufferRef),
    MaterialiseTexture(TextureRef, TextureUsageFlags),
    MaterialiseTextureView(TextureRef, TextureUsageFlags),
    MaterialiseArgTable(ArgTableRef),
    MaterialiseArgTableArray(ArgTableArrayRef),
    /// Return the resource's backing memory, tagged with this frame's wait
    /// event.
    DisposeResource(ResourceRef),
    /// Raise the containing encoder's wait index on `queue` to at least
    /// `index`.
    WaitForCommandBuffer { index: u64, queue: QueueId },
    /// After this frame, raise the resource's per-queue wait indices to the
    /// signal value of the command buffer containing its last use.
    UpdateCommandBufferWaitIndex { resource: ResourceRef, wrote: bool },
    /// Collect the fences guarding memory aliased with the resource and
    /// schedule waits before its first use.
    WaitForHeapAliasingFences {
        resource: ResourceRef,
        before_stages: StageFlags,
    },
}

#[derive(Debug, Clone)]
pub struct PreFrameCommandEntry {
    pub index: CmdIndex,
    pub order: CommandOrder,
    pub command: PreFrameCommand,
}

impl PreFrameCommandEntry {
    fn new(index: CmdIndex, order: CommandOrder, command: PreFrameCommand) -> Self {
        Self {
            index,
            order,
            command,
        }
    }

    fn sort_rank(&self) -> u8 {
        match self.command {
            PreFrameCommand::MaterialiseBuffer(_)
            | PreFrameCommand::MaterialiseTexture(..)
            | PreFrameCommand::MaterialiseTextureView(..) => 0,
            PreFrameCommand::MaterialiseArgTable(_)
            | PreFrameCommand::MaterialiseArgTableArray(_) => 1,
            // Aliasing fences can only be looked up once the backing memory
            // has been assigned.
            PreFrameCommand::WaitForHeapAliasingFences { .. } => 2,
            _ => 0,
        }
    }
}

/// A command replayed into a recording encoder.
#[derive(Debug, Clone)]
pub enum FrameCommand {
    UseResource {
        resource: ResourceRef,
        usage: ResourceUsageFlags,
        stages: StageFlags,
    },
    MemoryBarrier {
        resource: ResourceRef,
        after_stages: StageFlags,
        before_stages: StageFlags,
    },
    UpdateFence {
        fence: FenceRef,
        after_stages: StageFlags,
    },
    WaitForFence {
        fence: FenceRef,
        before_stages: StageFlags,
    },
}

#[derive(Debug, Clone)]
pub struct FrameCommandEntry {
    pub index: CmdIndex,
    pub order: CommandOrder,
    pub command: FrameCommand,
}

impl FrameCommandEntry {
    fn new(index: CmdIndex, order: CommandOrder, command: FrameCommand) -> Self {
        Self {
            index,
            order,
            command,
        }
    }

    pub(crate) fn update_fence(index: CmdIndex, fence: FenceRef, after_stages: StageFlags) -> Self {
        Self::new(
            index,
            CommandOrder::After,
            FrameCommand::UpdateFence {
                fence,
                after_stages,
            },
        )
    }

    pub(crate) fn wait_for_fence(
        index: CmdIndex,
        fence: FenceRef,
        before_stages: StageFlags,
    ) -> Self {
        Self::new(
            index,
            CommandOrder::Before,
            FrameCommand::WaitForFence {
                fence,
                before_stages,
            },
        )
    }
}

/// Everything the compiler produced for one frame.
#[derive(Debug)]
pub struct FrameCompilation {
    pub pre_frame_commands: Vec<PreFrameCommandEntry>,
    pub frame_commands: Vec<FrameCommandEntry>,
    pub dependency_table: DependencyTable,
    /// Persistent and history resources that were written this frame and
    /// become `initialised` when it is submitted.
    pub newly_initialised: Vec<Handle>,
    /// History buffers materialised fresh this frame whose backing must
    /// outlive the frame instead of being recycled.
    pub deferred_history_buffers: Vec<ResourceRef>,
    /// For aliased-heap resources: the positions after which their backing
    /// memory becomes safe for the next aliasing user, keyed by handle.
    /// Fences are allocated when the dispose command executes.
    pub disposal_fence_points: FxHashMap<Handle, Vec<DependencyPoint>>,
}

/// Compile the recorded usages into command streams and a dependency table.
pub(crate) fn compile(
    passes: &[PassRecord],
    usages: &ResourceUsages,
    resources: &FrameResources<'_>,
    info: &FrameCommandInfo,
    registry: &dyn TransientResourceRegistry,
) -> FrameCompilation {
    let mut compilation = FrameCompilation {
        pre_frame_commands: Vec::new(),
        frame_commands: Vec::new(),
        dependency_table: DependencyTable::new(info.encoders.len()),
        newly_initialised: Vec::new(),
        deferred_history_buffers: Vec::new(),
        disposal_fence_points: FxHashMap::default(),
    };

    // Textures whose render-target contents are stored for later consumption
    // can never be memoryless.
    let stored_textures: FxHashSet<Handle> = passes
        .iter()
        .filter(|p| p.active)
        .filter_map(|p| p.render_target.as_ref())
        .flat_map(|rt| rt.stored_textures())
        .map(|t| t.handle())
        .collect();

    for handle in usages.resources_sorted() {
        compile_resource(
            handle,
            usages.usages(handle),
            passes,
            resources,
            info,
            registry,
            &stored_textures,
            &mut compilation,
        );
    }

    compilation
        .pre_frame_commands
        .sort_by_key(|entry| (entry.index, entry.order, entry.sort_rank()));

    trace!(
        "compiled frame: {} pre-frame commands, {} in-frame commands, {} encoders",
        compilation.pre_frame_commands.len(),
        compilation.frame_commands.len(),
        info.encoders.len()
    );

    compilation
}

fn compile_resource(
    handle: Handle,
    usage_list: &[ResourceUsage],
    passes: &[PassRecord],
    resources: &FrameResources<'_>,
    info: &FrameCommandInfo,
    registry: &dyn TransientResourceRegistry,
    stored_textures: &FxHashSet<Handle>,
    compilation: &mut FrameCompilation,
) {
    use self::CommandOrder::{After, Before};

    let active: Vec<&ResourceUsage> = usage_list.iter().filter(|u| u.active).collect();
    if active.is_empty() {
        return;
    }

    let resource = ResourceRef::from_handle(handle);
    let options = resources.options(handle);
    let descriptor = resources.descriptor(handle);
    let was_initialised = resources.is_initialised(handle);
    let is_texture = handle.resource_type() == ResourceType::Texture;
    let encoder_of = |u: &ResourceUsage| info.encoder_index(u.pass);

    // Residency: one use-resource per encoder in which the resource is
    // accessed outside of being a render target, carrying the union of the
    // access flags and stages seen there.
    let residency = active.iter().cloned().filter(|u| {
        !u.is_render_target()
            && passes[u.pass].kind.uses_residency()
            && u.stages.intersects_device_stages()
    });
    let residency_groups = residency.group_by(|u| encoder_of(u));
    for (_, group) in &residency_groups {
        let mut usage = ResourceUsageFlags::empty();
        let mut stages = StageFlags::empty();
        let mut index = CmdIndex::max_value();
        for u in group {
            if u.is_read() {
                usage |= ResourceUsageFlags::READ;
                if is_texture {
                    usage |= ResourceUsageFlags::SAMPLE;
                }
            }
            if u.is_write() {
                usage |= ResourceUsageFlags::WRITE;
            }
            stages |= u.stages;
            index = index.min(u.command_range.start);
        }
        compilation.frame_commands.push(FrameCommandEntry::new(
            index,
            Before,
            FrameCommand::UseResource {
                resource,
                usage,
                stages,
            },
        ));
    }

    // First usage. A leading run of read-only usages may be recorded out of
    // command order; the true first access is the one with the smallest
    // command index.
    let mut first_use = active[0];
    if first_use.is_read() && !first_use.is_write() {
        for &u in &active {
            if !(u.is_read() && !u.is_write()) {
                break;
            }
            if u.command_range.start < first_use.command_range.start {
                first_use = u;
            }
        }
    }
    let first_use_index = first_use.command_range.start;

    let aliased = registry.is_aliased_heap_resource(resource);
    if aliased {
        assert!(
            first_use.is_write() || first_use.access == ResourceAccess::UnusedRenderTarget,
            "an aliased resource must be fully initialised before it can be read: {:?}",
            resource
        );
        compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
            first_use_index,
            Before,
            PreFrameCommand::WaitForHeapAliasingFences {
                resource,
                before_stages: first_use.stages,
            },
        ));
    }

    // Dependency walk. Writes depend on every read since the previous write
    // (and on that write); reads depend on the previous write. A dependency
    // within a single encoder becomes a memory barrier, one across encoders
    // becomes an entry in the dependency table.
    let barrier_usages: Vec<&ResourceUsage> = active
        .iter()
        .cloned()
        .filter(|u| u.affects_gpu_barriers())
        .collect();

    let mut previous_write: Option<&ResourceUsage> = None;
    let mut reads_since_last_write: SmallVec<[&ResourceUsage; 4]> = SmallVec::new();

    if let Some(&first) = barrier_usages.first() {
        if first.is_write() {
            previous_write = Some(first);
        } else if first.is_read() {
            reads_since_last_write.push(first);
        }

        for &usage in &barrier_usages[1..] {
            let encoder = encoder_of(usage);

            if usage.is_write() {
                // Write-after-read: the write must wait for every reader on
                // other encoders to finish.
                for &read in &reads_since_last_write {
                    let read_encoder = encoder_of(read);
                    if read_encoder != encoder {
                        compilation.dependency_table.add(Dependency {
                            signal: DependencyPoint {
                                encoder: read_encoder,
                                index: read.command_range.end - 1,
                                stages: read.stages,
                            },
                            wait: DependencyPoint {
                                encoder,
                                index: usage.command_range.start,
                                stages: usage.stages,
                            },
                        });
                    }
                }
            }

            if let Some(write) = previous_write {
                let write_encoder = encoder_of(write);
                if usage.is_read() && write_encoder == encoder {
                    // Read-after-write within one encoder: a memory barrier,
                    // unless the write stored the render target the read now
                    // consumes in place.
                    if !(write.is_render_target() && usage.is_render_target()) {
                        compilation.frame_commands.push(FrameCommandEntry::new(
                            usage.command_range.start,
                            Before,
                            FrameCommand::MemoryBarrier {
                                resource,
                                after_stages: write.stages,
                                before_stages: usage.stages,
                            },
                        ));
                    }
                }
                if write_encoder != encoder && (usage.is_read() || usage.is_write()) {
                    compilation.dependency_table.add(Dependency {
                        signal: DependencyPoint {
                            encoder: write_encoder,
                            index: write.command_range.end - 1,
                            stages: write.stages,
                        },
                        wait: DependencyPoint {
                            encoder,
                            index: usage.command_range.start,
                            stages: usage.stages,
                        },
                    });
                }
            }

            if usage.is_write() {
                reads_since_last_write.clear();
                previous_write = Some(usage);
            }
            if usage.is_read() && !usage.is_write() {
                reads_since_last_write.push(usage);
            }
        }
    }

    // End of frame: a written persistent or history resource becomes
    // initialised once this frame is submitted.
    let frame_reads = active.iter().any(|u| u.is_read());
    let frame_writes = active.iter().any(|u| u.is_write());
    let is_history = options.contains(ResourceOptions::HISTORY_BUFFER);
    let persistent_like = options
        .intersects(ResourceOptions::PERSISTENT | ResourceOptions::HISTORY_BUFFER);
    if frame_writes && persistent_like && !was_initialised {
        compilation.newly_initialised.push(handle);
    }

    let last_use_index = active
        .iter()
        .map(|u| u.command_range.end - 1)
        .max()
        .unwrap();

    let emit_cross_frame_waits = |compilation: &mut FrameCompilation| {
        use crate::resources::AccessCategory;
        for queue in 0..MAX_QUEUES as QueueId {
            let mut value = 0;
            if frame_reads || frame_writes {
                value = value
                    .max(resources.wait_index(handle, queue, AccessCategory::Write))
                    .max(resources.wait_index(handle, queue, AccessCategory::ReadWrite));
            }
            if frame_writes {
                value = value.max(resources.wait_index(handle, queue, AccessCategory::Read));
            }
            if value > 0 {
                compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
                    first_use_index,
                    Before,
                    PreFrameCommand::WaitForCommandBuffer {
                        index: value,
                        queue,
                    },
                ));
            }
        }
    };

    match handle.resource_type() {
        ResourceType::ArgTable | ResourceType::ArgTableArray => {
            // Argument tables are materialised at their first use, not their
            // declaration, because their contents reference other resources.
            let materialise = match resource {
                ResourceRef::ArgTable(table) => PreFrameCommand::MaterialiseArgTable(table),
                ResourceRef::ArgTableArray(array) => {
                    PreFrameCommand::MaterialiseArgTableArray(array)
                }
                _ => unreachable!(),
            };
            compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
                first_use_index,
                Before,
                materialise,
            ));

            let transient = !persistent_like || (is_history && !was_initialised);
            if transient {
                compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
                    last_use_index,
                    After,
                    PreFrameCommand::DisposeResource(resource),
                ));
            } else {
                emit_cross_frame_waits(compilation);
                compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
                    last_use_index,
                    After,
                    PreFrameCommand::UpdateCommandBufferWaitIndex {
                        resource,
                        wrote: frame_writes,
                    },
                ));
            }
        }

        ResourceType::Buffer | ResourceType::Texture => {
            let mut texture_usage = match descriptor {
                ResourceDescriptor::Texture(ref desc) => desc.usage,
                _ => TextureUsageFlags::empty(),
            };
            if is_texture {
                for u in &active {
                    if u.is_render_target() {
                        texture_usage |= TextureUsageFlags::RENDER_TARGET;
                    } else {
                        if u.is_read() {
                            texture_usage |= TextureUsageFlags::SHADER_READ;
                        }
                        if u.is_write() {
                            texture_usage |= TextureUsageFlags::SHADER_WRITE;
                        }
                    }
                }
            }

            let transient_path = !persistent_like
                || options.contains(ResourceOptions::WINDOW_HANDLE)
                || (is_history && !was_initialised);

            let memoryless = is_texture
                && transient_path
                && registry.supports_memoryless()
                && texture_usage == TextureUsageFlags::RENDER_TARGET
                && !stored_textures.contains(&handle)
                && !options.contains(ResourceOptions::WINDOW_HANDLE);
            if memoryless {
                texture_usage |= TextureUsageFlags::MEMORYLESS;
            }

            let mut disposed = false;
            if transient_path {
                let materialise = match (&descriptor, resource) {
                    (ResourceDescriptor::TextureView(_), ResourceRef::Texture(texture)) => {
                        PreFrameCommand::MaterialiseTextureView(texture, texture_usage)
                    }
                    (_, ResourceRef::Texture(texture)) => {
                        PreFrameCommand::MaterialiseTexture(texture, texture_usage)
                    }
                    (_, ResourceRef::Buffer(buffer)) => {
                        PreFrameCommand::MaterialiseBuffer(buffer)
                    }
                    _ => unreachable!(),
                };
                compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
                    first_use_index,
                    Before,
                    materialise,
                ));

                if is_history && !was_initialised {
                    // The contents become next frame's history; the backing
                    // memory must survive past the frame boundary.
                    compilation.deferred_history_buffers.push(resource);
                    compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
                        last_use_index,
                        After,
                        PreFrameCommand::UpdateCommandBufferWaitIndex {
                            resource,
                            wrote: frame_writes,
                        },
                    ));
                } else {
                    compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
                        last_use_index,
                        After,
                        PreFrameCommand::DisposeResource(resource),
                    ));
                    disposed = true;
                }
            } else {
                emit_cross_frame_waits(compilation);
                let immutable = options.contains(ResourceOptions::IMMUTABLE_ONCE_INIT);
                if !(immutable && was_initialised) {
                    compilation.pre_frame_commands.push(PreFrameCommandEntry::new(
                        last_use_index,
                        After,
                        PreFrameCommand::UpdateCommandBufferWaitIndex {
                            resource,
                            wrote: frame_writes,
                        },
                    ));
                }
            }

            // For aliased heap memory that is actually written, record the
            // positions after which the memory is safe for the next aliasing
            // user: every read since the last write, or failing that the
            // last write itself. External passes signal through other means.
            if aliased && !memoryless && disposed {
                let mut points: Vec<DependencyPoint> = Vec::new();
                if !reads_since_last_write.is_empty() {
                    for read in &reads_since_last_write {
                        if passes[read.pass].kind != PassKind::External {
                            points.push(DependencyPoint {
                                encoder: encoder_of(read),
                                index: read.command_range.end - 1,
                                stages: read.stages,
                            });
                        }
                    }
                } else if let Some(write) = previous_write {
                    if passes[write.pass].kind != PassKind::External {
                        points.push(DependencyPoint {
                            encoder: encoder_of(write),
                            index: write.command_range.end - 1,
                            stages: write.stages,
                        });
                    }
                }
                compilation.disposal_fence_points.insert(handle, points);
            }
        }
    }
}

/// Reduce the dependency table and emit one fence pair per surviving edge.
///
/// Each fence is bound to the signal value of the producing encoder's
/// command buffer, updated after the producer's relevant stages at its last
/// relevant command, and awaited before the dependent's stages at its first.
pub(crate) fn emit_fences(
    compilation: &mut FrameCompilation,
    info: &FrameCommandInfo,
    backend: &dyn CmdQueue,
) -> Result<()> {
    let survivors = compilation.dependency_table.reduce();
    trace!(
        "dependency reduction: {} edges survive",
        survivors.len()
    );
    for dependency in survivors {
        let cmd_buffer = info.encoders[dependency.signal.encoder].cmd_buffer_index;
        let fence = backend.new_fence(info.signal_value(cmd_buffer))?;
        compilation.frame_commands.push(FrameCommandEntry::new(
            dependency.signal.index,
            CommandOrder::After,
            FrameCommand::UpdateFence {
                fence: fence.clone(),
                after_stages: dependency.signal.stages,
            },
        ));
        compilation.frame_commands.push(FrameCommandEntry::new(
            dependency.wait.index,
            CommandOrder::Before,
            FrameCommand::WaitForFence {
                fence,
                before_stages: dependency.wait.stages,
            },
        ));
    }
    Ok(())
}

/// Establish the final in-frame command order.
pub(crate) fn sort_frame_commands(compilation: &mut FrameCompilation) {
    compilation
        .frame_commands
        .sort_by_key(|entry| (entry.index, entry.order));
}
