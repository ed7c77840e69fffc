//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Command queue, command buffer, and encoder implementations.
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nagare_base as base;
use nagare_base::{
    CmdBufferRef, FenceRef, QueueId, RenderTargetDescriptor, ResourceRef, ResourceUsageFlags,
    Result, StageFlags, TextureRef,
};

/// One recorded backend operation.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEntry {
    BeginCmdBuffer,
    BeginRenderEncoder,
    BeginComputeEncoder,
    BeginCopyEncoder,
    BeginExternalEncoder,
    BeginDebugGroup(String),
    EndDebugGroup,
    DebugMarker(String),
    UseResource {
        resource: ResourceRef,
        usage: ResourceUsageFlags,
        stages: StageFlags,
    },
    Barrier {
        resource: ResourceRef,
        after_stages: StageFlags,
        before_stages: StageFlags,
    },
    UpdateFence {
        fence: u64,
        after_stages: StageFlags,
    },
    WaitFence {
        fence: u64,
        before_stages: StageFlags,
    },
    SignalEvent {
        value: u64,
    },
    WaitEvent {
        queue: QueueId,
        value: u64,
    },
    Present {
        texture: TextureRef,
    },
    Commit,
}

/// A shared, append-only log of every backend operation.
#[derive(Debug, Clone, Default)]
pub struct CmdLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CmdLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: LogEntry) {
        self.entries.lock().push(entry);
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries recorded after the first `skip`.
    pub fn entries_since(&self, skip: usize) -> Vec<LogEntry> {
        self.entries.lock()[skip..].to_vec()
    }
}

/// Implementation of `Fence` for the null backend.
#[derive(Debug)]
pub struct NullFence {
    id: u64,
    queue: QueueId,
    signal_value: u64,
}

impl NullFence {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl base::Fence for NullFence {
    fn queue(&self) -> QueueId {
        self.queue
    }

    fn signal_value(&self) -> u64 {
        self.signal_value
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn fence_id(fence: &FenceRef) -> u64 {
    // Every fence handed to the null backend originates from it.
    fence
        .as_any()
        .downcast_ref::<NullFence>()
        .map(|f| f.id)
        .expect("foreign fence")
}

/// Implementation of `CmdQueue` for the null backend.
#[derive(Debug)]
pub struct NullCmdQueue {
    queue_id: QueueId,
    log: CmdLog,
    fence_counter: AtomicU64,
}

impl NullCmdQueue {
    pub fn new(queue_id: QueueId, log: CmdLog) -> Self {
        Self {
            queue_id,
            log,
            fence_counter: AtomicU64::new(1),
        }
    }
}

impl base::CmdQueue for NullCmdQueue {
    fn new_cmd_buffer(&self) -> Result<CmdBufferRef> {
        self.log.push(LogEntry::BeginCmdBuffer);
        Ok(Box::new(NullCmdBuffer {
            log: self.log.clone(),
            encoder: NullEncoder {
                log: self.log.clone(),
            },
            completions: Vec::new(),
            committed: false,
        }))
    }

    fn new_fence(&self, signal_value: u64) -> Result<FenceRef> {
        Ok(Arc::new(NullFence {
            id: self.fence_counter.fetch_add(1, Ordering::Relaxed),
            queue: self.queue_id,
            signal_value,
        }))
    }

    fn is_peer_queue(&self, _queue: QueueId) -> bool {
        true
    }

    fn flush(&self) {}
}

/// Implementation of `CmdBuffer` for the null backend.
///
/// Committing runs the recorded work "instantly": completion handlers are
/// invoked inline with `Ok(())` before `commit` returns.
pub struct NullCmdBuffer {
    log: CmdLog,
    encoder: NullEncoder,
    completions: Vec<Box<dyn FnOnce(Result<()>) + Send>>,
    committed: bool,
}

impl std::fmt::Debug for NullCmdBuffer {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("NullCmdBuffer")
            .field("committed", &self.committed)
            .field("num_completions", &self.completions.len())
            .finish()
    }
}

impl base::CmdBuffer for NullCmdBuffer {
    fn encode_render(&mut self, _render_target: &RenderTargetDescriptor) -> &mut dyn base::RenderCmdEncoder {
        self.log.push(LogEntry::BeginRenderEncoder);
        &mut self.encoder
    }

    fn encode_compute(&mut self) -> &mut dyn base::ComputeCmdEncoder {
        self.log.push(LogEntry::BeginComputeEncoder);
        &mut self.encoder
    }

    fn encode_copy(&mut self) -> &mut dyn base::CopyCmdEncoder {
        self.log.push(LogEntry::BeginCopyEncoder);
        &mut self.encoder
    }

    fn encode_external(&mut self) -> &mut dyn base::ExternalCmdEncoder {
        self.log.push(LogEntry::BeginExternalEncoder);
        &mut self.encoder
    }

    fn signal_event(&mut self, value: u64) {
        self.log.push(LogEntry::SignalEvent { value });
    }

    fn wait_event(&mut self, queue: QueueId, value: u64) {
        self.log.push(LogEntry::WaitEvent { queue, value });
    }

    fn present(&mut self, texture: TextureRef) {
        self.log.push(LogEntry::Present { texture });
    }

    fn on_complete(&mut self, cb: Box<dyn FnOnce(Result<()>) + Send>) {
        assert!(!self.committed, "completion registered after commit");
        self.completions.push(cb);
    }

    fn commit(&mut self) -> Result<()> {
        assert!(!self.committed, "command buffer committed twice");
        self.committed = true;
        self.log.push(LogEntry::Commit);
        for cb in self.completions.drain(..) {
            cb(Ok(()));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct NullEncoder {
    log: CmdLog,
}

impl base::CmdEncoder for NullEncoder {
    fn begin_debug_group(&mut self, label: &str) {
        self.log.push(LogEntry::BeginDebugGroup(label.to_owned()));
    }

    fn end_debug_group(&mut self) {
        self.log.push(LogEntry::EndDebugGroup);
    }

    fn debug_marker(&mut self, label: &str) {
        self.log.push(LogEntry::DebugMarker(label.to_owned()));
    }

    fn use_resource(
        &mut self,
        usage: ResourceUsageFlags,
        stages: StageFlags,
        resources: &[ResourceRef],
    ) {
        for &resource in resources {
            self.log.push(LogEntry::UseResource {
                resource,
                usage,
                stages,
            });
        }
    }

    fn barrier(
        &mut self,
        resource: ResourceRef,
        after_stages: StageFlags,
        before_stages: StageFlags,
    ) {
        self.log.push(LogEntry::Barrier {
            resource,
            after_stages,
            before_stages,
        });
    }

    fn update_fence(&mut self, fence: &FenceRef, after_stages: StageFlags) {
        self.log.push(LogEntry::UpdateFence {
            fence: fence_id(fence),
            after_stages,
        });
    }

    fn wait_fence(&mut self, fence: &FenceRef, before_stages: StageFlags) {
        self.log.push(LogEntry::WaitFence {
            fence: fence_id(fence),
            before_stages,
        });
    }
}

impl base::RenderCmdEncoder for NullEncoder {}
impl base::ComputeCmdEncoder for NullEncoder {}
impl base::CopyCmdEncoder for NullEncoder {}
impl base::ExternalCmdEncoder for NullEncoder {}
