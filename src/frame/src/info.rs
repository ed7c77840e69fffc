//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Partitioning of a frame's passes into encoders and command buffers.
use std::ops::Range;

use nagare_base::{CmdIndex, QueueCommandIndices, QueueId, RenderTargetDescriptor, MAX_QUEUES};

use crate::pass::{PassKind, PassRecord};

#[cfg(test)]
#[path = "./info_test.rs"]
mod info_test;

/// A maximal run of consecutive active passes recorded into one native
/// command encoder.
#[derive(Debug)]
pub struct EncoderInfo {
    pub kind: PassKind,
    /// Indices of the passes recorded into this encoder. Inactive passes
    /// inside the range are skipped.
    pub pass_range: Range<usize>,
    /// The frame-absolute command range the encoder spans.
    pub command_range: Range<CmdIndex>,
    pub render_target: Option<RenderTargetDescriptor>,
    pub cmd_buffer_index: usize,
    /// Whether a render encoder draws into a swapchain texture.
    pub presents: bool,
    /// Per-queue command buffer signal values that must have completed
    /// before this encoder executes. Raised while the pre-frame command
    /// stream runs.
    pub queue_wait_indices: QueueCommandIndices,
}

/// Groups a frame's passes into encoders and encoders into command buffers,
/// and assigns every command buffer a signal value.
#[derive(Debug)]
pub struct FrameCommandInfo {
    pub encoders: Vec<EncoderInfo>,
    pub num_cmd_buffers: usize,
    pub initial_signal_value: u64,
    pass_to_encoder: Vec<Option<usize>>,
}

impl FrameCommandInfo {
    pub fn new(
        passes: &[PassRecord],
        initial_signal_value: u64,
        mut presents: impl FnMut(&RenderTargetDescriptor) -> bool,
    ) -> Self {
        let mut encoders: Vec<EncoderInfo> = Vec::new();
        let mut pass_to_encoder = vec![None; passes.len()];
        let mut prev_standalone = false;

        for (pass_index, pass) in passes.iter().enumerate() {
            if !pass.active {
                continue;
            }

            let fuse = match encoders.last() {
                Some(last) => {
                    !prev_standalone
                        && !pass.standalone
                        && last.kind == pass.kind
                        && match pass.kind {
                            // A new render encoder begins whenever the
                            // render target changes incompatibly.
                            PassKind::Render => {
                                match (&last.render_target, &pass.render_target) {
                                    (Some(a), Some(b)) => a.is_compatible_with(b),
                                    _ => false,
                                }
                            }
                            PassKind::Compute | PassKind::Copy => true,
                            // External and CPU passes stand alone.
                            PassKind::External | PassKind::Cpu => false,
                        }
                }
                None => false,
            };

            if fuse {
                let last = encoders.last_mut().unwrap();
                last.pass_range.end = pass_index + 1;
                last.command_range.end = pass.command_range.end;
            } else {
                let is_present = pass.kind == PassKind::Render
                    && pass
                        .render_target
                        .as_ref()
                        .map(|rt| presents(rt))
                        .unwrap_or(false);
                encoders.push(EncoderInfo {
                    kind: pass.kind,
                    pass_range: pass_index..pass_index + 1,
                    command_range: pass.command_range.clone(),
                    render_target: pass.render_target.clone(),
                    cmd_buffer_index: 0,
                    presents: is_present,
                    queue_wait_indices: [0; MAX_QUEUES],
                });
            }
            pass_to_encoder[pass_index] = Some(encoders.len() - 1);
            prev_standalone = pass.standalone;
        }

        // Presentation work must not share a command buffer with offscreen
        // work that precedes or follows it: one boundary before the first
        // presenting encoder, one after the last.
        let first_present = encoders.iter().position(|e| e.presents);
        let last_present = encoders.iter().rposition(|e| e.presents);
        let mut num_cmd_buffers = 0;
        if !encoders.is_empty() {
            let mut index = 0;
            for (i, encoder) in encoders.iter_mut().enumerate() {
                if let (Some(first), Some(last)) = (first_present, last_present) {
                    if i == first && i != 0 {
                        index += 1;
                    }
                    if i == last + 1 {
                        index += 1;
                    }
                }
                encoder.cmd_buffer_index = index;
            }
            num_cmd_buffers = index + 1;
        }

        Self {
            encoders,
            num_cmd_buffers,
            initial_signal_value,
            pass_to_encoder,
        }
    }

    /// The encoder the given pass is recorded into.
    ///
    /// # Panics
    ///
    /// Panics when the pass is inactive.
    pub fn encoder_index(&self, pass_index: usize) -> usize {
        self.pass_to_encoder[pass_index].expect("inactive pass has no encoder")
    }

    /// The encoder whose command range contains `index`.
    pub fn encoder_at_command(&self, index: CmdIndex) -> usize {
        let candidate = self
            .encoders
            .partition_point(|e| e.command_range.start <= index);
        assert!(candidate > 0, "command index precedes every encoder");
        let candidate = candidate - 1;
        debug_assert!(index < self.encoders[candidate].command_range.end);
        candidate
    }

    /// The signal value of the command buffer with the given index.
    pub fn signal_value(&self, cmd_buffer_index: usize) -> u64 {
        debug_assert!(cmd_buffer_index < self.num_cmd_buffers);
        self.initial_signal_value + cmd_buffer_index as u64
    }

    /// The signal value of the frame's last command buffer.
    pub fn final_signal_value(&self) -> u64 {
        debug_assert!(self.num_cmd_buffers > 0);
        self.initial_signal_value + (self.num_cmd_buffers as u64 - 1)
    }

    /// The wait event representing the completion of this entire frame on
    /// the given queue.
    pub fn frame_wait_event(&self, queue: QueueId) -> QueueCommandIndices {
        let mut event = [0; MAX_QUEUES];
        if self.num_cmd_buffers > 0 {
            event[queue as usize] = self.final_signal_value();
        }
        event
    }

    /// Raise an encoder's wait index on `queue` to at least `value`.
    pub fn raise_queue_wait_index(&mut self, encoder: usize, queue: QueueId, value: u64) {
        let slot = &mut self.encoders[encoder].queue_wait_indices[queue as usize];
        *slot = (*slot).max(value);
    }

    /// Merge a per-queue wait event into an encoder's wait indices.
    pub fn merge_queue_wait_indices(&mut self, encoder: usize, event: QueueCommandIndices) {
        for (queue, &value) in event.iter().enumerate() {
            if value > 0 {
                self.raise_queue_wait_index(encoder, queue as QueueId, value);
            }
        }
    }
}
