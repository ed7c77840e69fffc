//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Frame execution.
//!
//! [`FrameScheduler`] owns a logical queue, a backend command queue, and the
//! backend's transient resource registry. Submitting a [`Frame`] compiles
//! it, runs the pre-frame command stream (materialisation, disposal,
//! cross-frame wait collection), reduces the dependency table into fences,
//! and finally records and commits the frame's command buffers.
//!
//! The number of frames simultaneously in flight is bounded by a semaphore
//! acquired at the beginning of every submission and released (together
//! with the invocation of the caller's completion handler) when the
//! frame's last command buffer completes.
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

use fxhash::FxHashSet;
use nagare_base::{
    CmdBufferRef, CmdQueueRef, FenceDependency, QueueCommandIndices, QueueId, ResourceDescriptor,
    ResourceOptions, ResourceRef, Result, TextureRef, TransientResourceRegistry, MAX_QUEUES,
};

use crate::frame::Frame;
use crate::info::FrameCommandInfo;
use crate::pass::{PassEncoderHost, PassKind};
use crate::queue::{self, Queue};
use crate::resources::{AccessCategory, FrameResources, ResourceStorage};
use crate::scheduler::{
    self, CommandOrder, FrameCommand, FrameCommandEntry, FrameCompilation, PreFrameCommand,
};

/// A counting semaphore bounding the number of frames in flight.
#[derive(Debug)]
struct Semaphore {
    count: Mutex<usize>,
    cv: Condvar,
}

impl Semaphore {
    fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            cv: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.cv.wait(&mut count);
        }
        *count -= 1;
    }

    fn release(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.cv.notify_one();
    }
}

/// Invoked when a frame degrades gracefully, e.g. when an encoder is skipped
/// because its drawable could not be acquired.
pub type DiagnosticHandler = Box<dyn Fn(&str) + Send + Sync>;

/// The frame completion callback.
pub type CompletionHandler = Box<dyn FnOnce(Result<()>) + Send>;

/// Fires the frame's completion handler and releases the inflight-frame
/// semaphore, exactly once, from whichever side gets there first.
struct FrameCompletion {
    inner: Mutex<Option<(CompletionHandler, Arc<Semaphore>)>>,
}

impl FrameCompletion {
    fn new(handler: CompletionHandler, semaphore: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Some((handler, semaphore))),
        })
    }

    fn finish(&self, result: Result<()>) {
        if let Some((handler, semaphore)) = self.inner.lock().take() {
            handler(result);
            semaphore.release();
        }
    }
}

#[derive(Debug)]
enum FrameOutcome {
    Pending,
    Succeeded,
    /// `None` once the error has been claimed via
    /// [`SubmittedFrame::take_error`].
    Failed(Option<nagare_base::Error>),
}

#[derive(Debug)]
struct SubmittedFrameShared {
    outcome: Mutex<FrameOutcome>,
    cv: Condvar,
}

/// The observable fate of one submitted frame.
///
/// Returned by [`FrameScheduler::submit_tracked`]. The handle is fed by the
/// same completion path that releases the inflight-frame semaphore, so
/// "completed" here means the frame's last command buffer has really
/// finished (or the frame was aborted), not merely that `submit` returned.
/// Clones share the same state and may be parked on from other threads.
#[derive(Debug, Clone)]
pub struct SubmittedFrame {
    shared: Arc<SubmittedFrameShared>,
}

impl SubmittedFrame {
    fn new() -> Self {
        Self {
            shared: Arc::new(SubmittedFrameShared {
                outcome: Mutex::new(FrameOutcome::Pending),
                cv: Condvar::new(),
            }),
        }
    }

    fn completion_handler(&self) -> CompletionHandler {
        let shared = Arc::clone(&self.shared);
        Box::new(move |result| {
            *shared.outcome.lock() = match result {
                Ok(()) => FrameOutcome::Succeeded,
                Err(error) => FrameOutcome::Failed(Some(error)),
            };
            shared.cv.notify_all();
        })
    }

    /// Whether the frame has finished executing, successfully or not.
    pub fn is_completed(&self) -> bool {
        match *self.shared.outcome.lock() {
            FrameOutcome::Pending => false,
            _ => true,
        }
    }

    /// `Some(true)` once the frame completed cleanly, `Some(false)` once it
    /// failed, `None` while it is still in flight.
    pub fn succeeded(&self) -> Option<bool> {
        match *self.shared.outcome.lock() {
            FrameOutcome::Pending => None,
            FrameOutcome::Succeeded => Some(true),
            FrameOutcome::Failed(_) => Some(false),
        }
    }

    /// Block until the frame finishes.
    pub fn wait(&self) {
        let mut outcome = self.shared.outcome.lock();
        while let FrameOutcome::Pending = *outcome {
            self.shared.cv.wait(&mut outcome);
        }
    }

    /// Block until the frame finishes or `timeout` elapses. Returns whether
    /// the frame finished in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut outcome = self.shared.outcome.lock();
        while let FrameOutcome::Pending = *outcome {
            if self.shared.cv.wait_for(&mut outcome, timeout).timed_out() {
                return false;
            }
        }
        true
    }

    /// Claim the error of a failed frame. Yields the error at most once;
    /// `None` for frames that are pending, succeeded, or already claimed.
    pub fn take_error(&self) -> Option<nagare_base::Error> {
        let mut outcome = self.shared.outcome.lock();
        match *outcome {
            FrameOutcome::Failed(ref mut error) => error.take(),
            _ => None,
        }
    }
}

/// Schedules declarative frames onto one logical queue of a backend.
pub struct FrameScheduler {
    queue: Arc<Queue>,
    backend: CmdQueueRef,
    registry: Box<dyn TransientResourceRegistry>,
    storage: Arc<ResourceStorage>,
    access_semaphore: Arc<Semaphore>,
    next_signal_value: u64,
    frame_serial: u64,
    diagnostic_handler: Option<DiagnosticHandler>,
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("FrameScheduler")
            .field("queue", &self.queue)
            .field("backend", &self.backend)
            .field("registry", &self.registry)
            .field("next_signal_value", &self.next_signal_value)
            .field("frame_serial", &self.frame_serial)
            .finish()
    }
}

impl FrameScheduler {
    /// Create a scheduler, allocating a logical queue for it.
    ///
    /// `inflight_frame_count` bounds the number of frames that may be
    /// executing concurrently.
    pub fn new(
        backend: CmdQueueRef,
        registry: Box<dyn TransientResourceRegistry>,
        inflight_frame_count: usize,
    ) -> Self {
        Self::with_backend(registry, inflight_frame_count, move |_| backend)
    }

    /// Like [`FrameScheduler::new`], but hands the allocated logical queue
    /// id to the backend constructor so that fences and events can be bound
    /// to it.
    pub fn with_backend(
        registry: Box<dyn TransientResourceRegistry>,
        inflight_frame_count: usize,
        make_backend: impl FnOnce(QueueId) -> CmdQueueRef,
    ) -> Self {
        assert!(inflight_frame_count >= 1);
        let queue = Arc::new(Queue::new());
        let backend = make_backend(queue.id());
        Self {
            queue,
            backend,
            registry,
            storage: Arc::new(ResourceStorage::new()),
            access_semaphore: Arc::new(Semaphore::new(inflight_frame_count)),
            next_signal_value: 1,
            frame_serial: 0,
            diagnostic_handler: None,
        }
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// The arena in which persistent resources are created.
    pub fn storage(&self) -> &Arc<ResourceStorage> {
        &self.storage
    }

    pub fn set_diagnostic_handler(&mut self, handler: DiagnosticHandler) {
        self.diagnostic_handler = Some(handler);
    }

    /// Open a new frame for recording.
    pub fn begin_frame(&mut self) -> Frame {
        self.frame_serial += 1;
        Frame::new(Arc::clone(&self.storage), self.frame_serial)
    }

    /// Dispose of a persistent resource, returning its backing memory to the
    /// registry tagged with the resource's outstanding wait indices.
    pub fn dispose_persistent(&mut self, resource: ResourceRef) {
        let handle = resource.handle();
        assert!(
            !handle.is_transient(),
            "transient resources dispose themselves"
        );

        let mut wait_event = [0u64; MAX_QUEUES];
        for queue in 0..MAX_QUEUES as QueueId {
            for &category in &[
                AccessCategory::Read,
                AccessCategory::Write,
                AccessCategory::ReadWrite,
            ] {
                let value = self.storage.wait_index(handle, queue, category);
                wait_event[queue as usize] = wait_event[queue as usize].max(value);
            }
        }

        dispose_in_registry(&mut *self.registry, resource, wait_event);
        self.storage.dispose(handle);
    }

    /// Compile a frame without executing it.
    ///
    /// The result reflects the state the compiler hands to the executor
    /// before pre-frame commands run: no backing memory is materialised and
    /// no fences are allocated yet. Intended for tools and tests.
    pub fn compile_frame(&self, frame: &Frame) -> (FrameCompilation, FrameCommandInfo) {
        let resources = FrameResources {
            storage: &self.storage,
            transient: &frame.transient,
        };
        let info = FrameCommandInfo::new(&frame.passes, self.next_signal_value, |rt| {
            rt.textures().any(|t| {
                !t.is_transient()
                    && resources
                        .options(t.handle())
                        .contains(ResourceOptions::WINDOW_HANDLE)
            })
        });
        let compilation = scheduler::compile(
            &frame.passes,
            &frame.usages,
            &resources,
            &info,
            &*self.registry,
        );
        (compilation, info)
    }

    /// Submit a frame and return a handle tracking its fate.
    ///
    /// Equivalent to [`FrameScheduler::submit`] with a completion handler
    /// that feeds the returned [`SubmittedFrame`].
    pub fn submit_tracked(&mut self, frame: Frame) -> SubmittedFrame {
        let submitted = SubmittedFrame::new();
        self.submit(frame, submitted.completion_handler());
        submitted
    }

    /// Submit a frame.
    ///
    /// Blocks while `inflight_frame_count` frames are already executing.
    /// `completion` is invoked exactly once: after the frame's last command
    /// buffer completes, or with an error if the frame had to be aborted.
    pub fn submit(&mut self, frame: Frame, completion: CompletionHandler) {
        self.access_semaphore.acquire();

        if frame.is_empty() {
            // Nothing to do; complete immediately.
            completion(Ok(()));
            self.access_semaphore.release();
            return;
        }

        debug!(
            "submitting frame {} ({} passes, {} commands)",
            self.frame_serial,
            frame.num_passes(),
            frame.total_commands()
        );

        let (mut compilation, mut info) = self.compile_frame(&frame);
        let num_cmd_buffers = info.num_cmd_buffers;
        self.next_signal_value += num_cmd_buffers as u64;

        self.registry.prepare_frame();

        let frame_completion =
            FrameCompletion::new(completion, Arc::clone(&self.access_semaphore));
        let mut frame = frame;

        match self.execute(&mut frame, &mut compilation, &mut info, &frame_completion) {
            Ok(()) => {
                for &handle in &compilation.newly_initialised {
                    self.storage.mark_initialised(handle);
                }
                let wait_event = info.frame_wait_event(self.queue.id());
                for &resource in &compilation.deferred_history_buffers {
                    self.registry
                        .register_initialised_history_buffer_for_disposal(resource, wait_event);
                }
                self.registry.cycle_frames();
                self.registry.clear_drawables();
            }
            Err(error) => {
                // Keep waiters from deadlocking on the signal values this
                // frame claimed, then reclaim what the frame had
                // materialised.
                for index in 0..num_cmd_buffers {
                    let value = info.signal_value(index);
                    if self.queue.last_submitted_command() < value {
                        self.queue.did_submit_command(value);
                    }
                    if self.queue.last_completed_command() < value {
                        self.queue.did_complete_command(value);
                    }
                }
                self.registry.cycle_frames();
                self.registry.clear_drawables();
                frame_completion.finish(Err(error));
            }
        }
    }

    /// Run the pre-frame stream, emit fences, then record and commit.
    fn execute(
        &mut self,
        frame: &mut Frame,
        compilation: &mut FrameCompilation,
        info: &mut FrameCommandInfo,
        frame_completion: &Arc<FrameCompletion>,
    ) -> Result<()> {
        let skipped_encoders = self.run_pre_frame_commands(frame, compilation, info)?;

        scheduler::emit_fences(compilation, info, &*self.backend)?;
        scheduler::sort_frame_commands(compilation);

        if info.encoders.iter().all(|e| !e.kind.is_submitting()) {
            // A frame of pure CPU work: nothing reaches the device, but the
            // frame's signal values must still come to pass for cross-frame
            // waits to resolve.
            self.run_cpu_only_frame(frame, info)?;
            frame_completion.finish(Ok(()));
            return Ok(());
        }

        self.record_and_commit(frame, compilation, info, &skipped_encoders, frame_completion)
    }

    fn run_pre_frame_commands(
        &mut self,
        frame: &Frame,
        compilation: &mut FrameCompilation,
        info: &mut FrameCommandInfo,
    ) -> Result<FxHashSet<usize>> {
        let mut skipped = FxHashSet::default();
        let storage = Arc::clone(&self.storage);
        let resources = FrameResources {
            storage: &*storage,
            transient: &frame.transient,
        };
        let own_queue = self.queue.id();
        let frame_wait_event = info.frame_wait_event(own_queue);

        // The in-frame stream keeps growing (aliasing waits, disposal fence
        // updates) while the pre-frame stream is walked.
        let entries = std::mem::replace(&mut compilation.pre_frame_commands, Vec::new());

        for entry in &entries {
            let encoder = info.encoder_at_command(entry.index);
            match entry.command {
                PreFrameCommand::MaterialiseBuffer(buffer) => {
                    let descriptor = match resources.descriptor(buffer.handle()) {
                        ResourceDescriptor::Buffer(desc) => desc,
                        _ => unreachable!(),
                    };
                    let wait = self
                        .registry
                        .allocate_buffer_if_needed(buffer, &descriptor)?;
                    info.merge_queue_wait_indices(encoder, wait);
                }
                PreFrameCommand::MaterialiseTexture(texture, usage) => {
                    if self.materialise_window_texture(texture, &resources, encoder, &mut skipped)
                    {
                        continue;
                    }
                    let descriptor = match resources.descriptor(texture.handle()) {
                        ResourceDescriptor::Texture(desc) => desc,
                        _ => unreachable!(),
                    };
                    let wait = self
                        .registry
                        .allocate_texture_if_needed(texture, &descriptor, usage)?;
                    info.merge_queue_wait_indices(encoder, wait);
                }
                PreFrameCommand::MaterialiseTextureView(texture, usage) => {
                    let descriptor = match resources.descriptor(texture.handle()) {
                        ResourceDescriptor::TextureView(desc) => desc,
                        _ => unreachable!(),
                    };
                    let wait = self
                        .registry
                        .allocate_texture_view(texture, &descriptor, usage)?;
                    info.merge_queue_wait_indices(encoder, wait);
                }
                PreFrameCommand::MaterialiseArgTable(table) => {
                    let descriptor = match resources.descriptor(table.handle()) {
                        ResourceDescriptor::ArgTable(desc) => desc,
                        _ => unreachable!(),
                    };
                    let wait = self
                        .registry
                        .allocate_arg_table_if_needed(table, &descriptor)?;
                    info.merge_queue_wait_indices(encoder, wait);
                }
                PreFrameCommand::MaterialiseArgTableArray(array) => {
                    let descriptors = match resources.descriptor(array.handle()) {
                        ResourceDescriptor::ArgTableArray(descs) => descs,
                        _ => unreachable!(),
                    };
                    let wait = self
                        .registry
                        .allocate_arg_table_array_if_needed(array, &descriptors)?;
                    info.merge_queue_wait_indices(encoder, wait);
                }
                PreFrameCommand::DisposeResource(resource) => {
                    self.dispose_with_fences(resource, compilation, info, frame_wait_event)?;
                }
                PreFrameCommand::WaitForCommandBuffer { index, queue } => {
                    info.raise_queue_wait_index(encoder, queue, index);
                }
                PreFrameCommand::UpdateCommandBufferWaitIndex { resource, wrote } => {
                    let cmd_buffer = info.encoders[encoder].cmd_buffer_index;
                    let value = info.signal_value(cmd_buffer);
                    let categories: &[AccessCategory] = if wrote {
                        &[AccessCategory::Write, AccessCategory::ReadWrite]
                    } else {
                        &[AccessCategory::Read]
                    };
                    self.storage.update_wait_indices(
                        resource.handle(),
                        own_queue,
                        categories,
                        value,
                    );
                }
                PreFrameCommand::WaitForHeapAliasingFences {
                    resource,
                    before_stages,
                } => {
                    let frame_commands = &mut compilation.frame_commands;
                    let index = entry.index;
                    self.registry
                        .with_heap_aliasing_fences(resource, &mut |dep| {
                            frame_commands.push(FrameCommandEntry::wait_for_fence(
                                index,
                                dep.fence.clone(),
                                before_stages,
                            ));
                        });
                }
            }
        }

        Ok(skipped)
    }

    /// Acquire the drawable backing a window-handle texture. Returns `true`
    /// when the texture was one and was handled, successfully or not.
    fn materialise_window_texture(
        &mut self,
        texture: TextureRef,
        resources: &FrameResources<'_>,
        encoder: usize,
        skipped: &mut FxHashSet<usize>,
    ) -> bool {
        let handle = texture.handle();
        if handle.is_transient()
            || !resources
                .options(handle)
                .contains(ResourceOptions::WINDOW_HANDLE)
        {
            return false;
        }
        if self.registry.acquire_drawable(texture).is_none() {
            warn!(
                "drawable unavailable for {:?}; skipping encoder {}",
                texture, encoder
            );
            if let Some(ref handler) = self.diagnostic_handler {
                handler("drawable unavailable; encoder skipped");
            }
            skipped.insert(encoder);
        }
        true
    }

    /// Return a resource to the registry, creating its disposal fences
    /// first if the memory is aliased.
    fn dispose_with_fences(
        &mut self,
        resource: ResourceRef,
        compilation: &mut FrameCompilation,
        info: &FrameCommandInfo,
        wait_event: QueueCommandIndices,
    ) -> Result<()> {
        if let Some(points) = compilation.disposal_fence_points.remove(&resource.handle()) {
            let mut dependencies = Vec::with_capacity(points.len());
            for point in points {
                let cmd_buffer = info.encoders[point.encoder].cmd_buffer_index;
                let fence = self.backend.new_fence(info.signal_value(cmd_buffer))?;
                compilation.frame_commands.push(FrameCommandEntry::update_fence(
                    point.index,
                    fence.clone(),
                    point.stages,
                ));
                dependencies.push(FenceDependency::new(fence, point.stages));
            }
            self.registry.set_disposal_fences(resource, dependencies);
        }

        dispose_in_registry(&mut *self.registry, resource, wait_event);
        Ok(())
    }

    fn run_cpu_only_frame(&mut self, frame: &mut Frame, info: &FrameCommandInfo) -> Result<()> {
        for encoder in &info.encoders {
            for other in 0..MAX_QUEUES as QueueId {
                let wait = encoder.queue_wait_indices[other as usize];
                if wait > 0 {
                    queue::wait_for_command_completion_on(other, wait);
                }
            }
            for pass_index in encoder.pass_range.clone() {
                let pass = &mut frame.passes[pass_index];
                if !pass.active {
                    continue;
                }
                if let Some(ref mut encode) = pass.encode {
                    encode(&mut PassEncoderHost::Cpu)?;
                }
            }
        }
        for index in 0..info.num_cmd_buffers {
            let value = info.signal_value(index);
            self.queue.did_submit_command(value);
            self.queue.did_complete_command(value);
        }
        Ok(())
    }

    fn record_and_commit(
        &mut self,
        frame: &mut Frame,
        compilation: &FrameCompilation,
        info: &FrameCommandInfo,
        skipped_encoders: &FxHashSet<usize>,
        frame_completion: &Arc<FrameCompletion>,
    ) -> Result<()> {
        let commands = &compilation.frame_commands;
        let mut cursor = 0;

        let mut cmd_buffer: Option<CmdBufferRef> = None;
        let mut current_cb: Option<usize> = None;
        let mut waited = [0u64; MAX_QUEUES];
        let mut pending_presents: Vec<TextureRef> = Vec::new();
        let own_queue = self.queue.id();
        let final_cb = info.num_cmd_buffers - 1;

        for (encoder_index, encoder) in info.encoders.iter().enumerate() {
            if encoder.kind == PassKind::Cpu {
                // Non-submitting: satisfy the waits on the CPU and run the
                // payloads in place.
                for other in 0..MAX_QUEUES as QueueId {
                    let wait = encoder.queue_wait_indices[other as usize];
                    if wait > 0 {
                        queue::wait_for_command_completion_on(other, wait);
                    }
                }
                for pass_index in encoder.pass_range.clone() {
                    let pass = &mut frame.passes[pass_index];
                    if !pass.active {
                        continue;
                    }
                    if let Some(ref mut encode) = pass.encode {
                        encode(&mut PassEncoderHost::Cpu)?;
                    }
                }
                cursor = skip_commands(commands, cursor, encoder.command_range.end);
                continue;
            }

            // Command buffer rollover.
            if current_cb != Some(encoder.cmd_buffer_index) {
                if let Some(cb) = cmd_buffer.take() {
                    let index = current_cb.unwrap();
                    self.finish_cmd_buffer(
                        cb,
                        info,
                        index,
                        index == final_cb,
                        &mut pending_presents,
                        frame_completion,
                    )?;
                }
                cmd_buffer = Some(self.backend.new_cmd_buffer()?);
                current_cb = Some(encoder.cmd_buffer_index);
                waited = [0; MAX_QUEUES];
            }
            let cb = cmd_buffer.as_mut().unwrap();

            // Cross-queue waits required by this encoder.
            for other in 0..MAX_QUEUES as QueueId {
                let wait = encoder.queue_wait_indices[other as usize];
                if wait == 0 || wait <= waited[other as usize] {
                    continue;
                }
                if queue::last_completed_command_on(other) >= wait {
                    continue;
                }
                if other == own_queue {
                    // Command buffers on one queue execute in submission
                    // order; waits on earlier work of the same queue are
                    // implicit.
                    continue;
                }
                if self.backend.is_peer_queue(other) {
                    cb.wait_event(other, wait);
                    waited[other as usize] = wait;
                } else {
                    // Not reachable through device-side events; yield until
                    // the external queue catches up.
                    while queue::last_completed_command_on(other) < wait {
                        std::thread::yield_now();
                    }
                }
            }

            if skipped_encoders.contains(&encoder_index) {
                cursor = skip_commands(commands, cursor, encoder.command_range.end);
                continue;
            }

            if encoder.presents {
                if let Some(ref rt) = encoder.render_target {
                    for texture in rt.textures() {
                        let handle = texture.handle();
                        if !handle.is_transient()
                            && self
                                .storage
                                .options(handle)
                                .contains(ResourceOptions::WINDOW_HANDLE)
                        {
                            pending_presents.push(texture);
                        }
                    }
                }
            }

            // Open the encoder of the right kind and replay the in-frame
            // stream interleaved with the pass payloads.
            let mut host = match encoder.kind {
                PassKind::Render => PassEncoderHost::Render(
                    cb.encode_render(encoder.render_target.as_ref().unwrap()),
                ),
                PassKind::Compute => PassEncoderHost::Compute(cb.encode_compute()),
                PassKind::Copy => PassEncoderHost::Copy(cb.encode_copy()),
                PassKind::External => PassEncoderHost::External(cb.encode_external()),
                PassKind::Cpu => unreachable!(),
            };

            for pass_index in encoder.pass_range.clone() {
                let pass = &mut frame.passes[pass_index];
                if !pass.active {
                    continue;
                }

                // Commands ordered before the pass's own.
                while cursor < commands.len() {
                    let entry = &commands[cursor];
                    let leading = entry.index < pass.command_range.start
                        || (entry.index < pass.command_range.end
                            && entry.order == CommandOrder::Before);
                    if !leading {
                        break;
                    }
                    apply_command(&mut host, &entry.command);
                    cursor += 1;
                }

                begin_pass_debug_group(&mut host, pass.name);
                if let Some(ref mut encode) = pass.encode {
                    encode(&mut host)?;
                }
                end_pass_debug_group(&mut host);

                // Commands ordered after them, fence updates mostly.
                while cursor < commands.len() && commands[cursor].index < pass.command_range.end {
                    apply_command(&mut host, &commands[cursor].command);
                    cursor += 1;
                }
            }
        }

        if let Some(cb) = cmd_buffer.take() {
            let index = current_cb.unwrap();
            self.finish_cmd_buffer(
                cb,
                info,
                index,
                index == final_cb,
                &mut pending_presents,
                frame_completion,
            )?;
        }

        Ok(())
    }

    /// Seal a command buffer: schedule presents, signal the queue's sync
    /// event, register the completion handler, and commit.
    fn finish_cmd_buffer(
        &mut self,
        mut cb: CmdBufferRef,
        info: &FrameCommandInfo,
        index: usize,
        is_last: bool,
        pending_presents: &mut Vec<TextureRef>,
        frame_completion: &Arc<FrameCompletion>,
    ) -> Result<()> {
        for texture in pending_presents.drain(..) {
            cb.present(texture);
        }

        let signal_value = info.signal_value(index);
        cb.signal_event(signal_value);

        let queue = Arc::clone(&self.queue);
        let completion = if is_last {
            Some(Arc::clone(frame_completion))
        } else {
            None
        };
        cb.on_complete(Box::new(move |result| {
            if let Err(ref error) = result {
                warn!("command buffer {} failed: {}", signal_value, error);
            }
            // Advance even on failure so that waiters never deadlock.
            queue.did_complete_command(signal_value);
            if let Some(completion) = completion {
                completion.finish(result);
            }
        }));

        self.queue.did_submit_command(signal_value);
        cb.commit()?;
        if is_last {
            self.backend.flush();
        }
        Ok(())
    }
}

fn dispose_in_registry(
    registry: &mut dyn TransientResourceRegistry,
    resource: ResourceRef,
    wait_event: QueueCommandIndices,
) {
    match resource {
        ResourceRef::Buffer(buffer) => registry.dispose_buffer(buffer, wait_event),
        ResourceRef::Texture(texture) => registry.dispose_texture(texture, wait_event),
        ResourceRef::ArgTable(table) => registry.dispose_arg_table(table, wait_event),
        ResourceRef::ArgTableArray(array) => registry.dispose_arg_table_array(array, wait_event),
    }
}

fn skip_commands(commands: &[FrameCommandEntry], mut cursor: usize, end: u32) -> usize {
    while cursor < commands.len() && commands[cursor].index < end {
        cursor += 1;
    }
    cursor
}

macro_rules! with_device_encoder {
    ($host:expr, |$enc:ident| $body:expr) => {
        match $host {
            PassEncoderHost::Render($enc) => $body,
            PassEncoderHost::Compute($enc) => $body,
            PassEncoderHost::Copy($enc) => $body,
            PassEncoderHost::External($enc) => $body,
            PassEncoderHost::Cpu => {}
        }
    };
}

fn apply_command(host: &mut PassEncoderHost<'_>, command: &FrameCommand) {
    match *command {
        FrameCommand::UseResource {
            resource,
            usage,
            stages,
        } => with_device_encoder!(host, |enc| enc.use_resource(usage, stages, &[resource])),
        FrameCommand::MemoryBarrier {
            resource,
            after_stages,
            before_stages,
        } => {
            with_device_encoder!(host, |enc| enc.barrier(resource, after_stages, before_stages))
        }
        FrameCommand::UpdateFence {
            ref fence,
            after_stages,
        } => with_device_encoder!(host, |enc| enc.update_fence(fence, after_stages)),
        FrameCommand::WaitForFence {
            ref fence,
            before_stages,
        } => with_device_encoder!(host, |enc| enc.wait_fence(fence, before_stages)),
    }
}

fn begin_pass_debug_group(host: &mut PassEncoderHost<'_>, name: &str) {
    with_device_encoder!(host, |enc| enc.begin_debug_group(name));
}

fn end_pass_debug_group(host: &mut PassEncoderHost<'_>) {
    with_device_encoder!(host, |enc| enc.end_debug_group());
}
