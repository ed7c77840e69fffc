//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
use nagare_base::{
    ColorAttachment, Handle, RenderTargetDescriptor, ResourceType, TextureRef,
};

use super::FrameCommandInfo;
use crate::pass::{PassKind, PassRecord};

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

fn texture(index: u32) -> TextureRef {
    TextureRef::from_handle(Handle::new(ResourceType::Texture, index, 0, true))
}

fn render_target(index: u32) -> RenderTargetDescriptor {
    RenderTargetDescriptor::new().color(ColorAttachment::new(texture(index)))
}

fn render_pass(index: u32, range: std::ops::Range<u32>) -> PassRecord {
    PassRecord {
        render_target: Some(render_target(index)),
        ..pass(PassKind::Render, range)
    }
}

#[test]
fn encoder_partition() {
    let passes = vec![
        pass(PassKind::Compute, 0..1),
        pass(PassKind::Compute, 1..2),
        pass(PassKind::Copy, 2..3),
        render_pass(0, 3..4),
        render_pass(0, 4..5),
        render_pass(1, 5..6),
        pass(PassKind::External, 6..7),
        pass(PassKind::External, 7..8),
        pass(PassKind::Cpu, 8..9),
    ];
    let info = FrameCommandInfo::new(&passes, 1, |_| false);

    let kinds: Vec<_> = info.encoders.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            PassKind::Compute,
            PassKind::Copy,
            PassKind::Render,
            PassKind::Render,
            PassKind::External,
            PassKind::External,
            PassKind::Cpu,
        ]
    );

    // The two compute passes fuse; the draws sharing a target fuse.
    assert_eq!(info.encoders[0].pass_range, 0..2);
    assert_eq!(info.encoders[0].command_range, 0..2);
    assert_eq!(info.encoders[2].pass_range, 3..5);
    assert_eq!(info.encoders[3].pass_range, 5..6);

    assert_eq!(info.encoder_index(1), 0);
    assert_eq!(info.encoder_index(4), 2);
    assert_eq!(info.encoder_at_command(1), 0);
    assert_eq!(info.encoder_at_command(4), 2);
    assert_eq!(info.encoder_at_command(8), 6);

    // No presentation: everything lands in one command buffer.
    assert_eq!(info.num_cmd_buffers, 1);
    assert!(info.encoders.iter().all(|e| e.cmd_buffer_index == 0));
    assert_eq!(info.final_signal_value(), 1);
}

#[test]
fn inactive_passes_are_invisible() {
    let mut inactive = pass(PassKind::Compute, 1..2);
    inactive.active = false;
    let passes = vec![
        pass(PassKind::Compute, 0..1),
        inactive,
        pass(PassKind::Compute, 2..3),
    ];
    let info = FrameCommandInfo::new(&passes, 1, |_| false);
    // The run of compute passes is not broken by the inactive one.
    assert_eq!(info.encoders.len(), 1);
    assert_eq!(info.encoders[0].pass_range, 0..3);
    assert_eq!(info.encoder_index(0), 0);
    assert_eq!(info.encoder_index(2), 0);
}

#[test]
fn presentation_splits_command_buffers() {
    let swapchain = texture(7);
    let passes = vec![
        pass(PassKind::Compute, 0..1),
        render_pass(7, 1..2),
        pass(PassKind::Compute, 2..3),
    ];
    let info = FrameCommandInfo::new(&passes, 10, |rt| {
        rt.textures().any(|t| t == swapchain)
    });
    assert_eq!(info.num_cmd_buffers, 3);
    assert_eq!(info.encoders[0].cmd_buffer_index, 0);
    assert_eq!(info.encoders[1].cmd_buffer_index, 1);
    assert_eq!(info.encoders[2].cmd_buffer_index, 2);
    assert_eq!(info.signal_value(0), 10);
    assert_eq!(info.final_signal_value(), 12);
    assert_eq!(info.frame_wait_event(3)[3], 12);
}

#[test]
fn leading_presentation_needs_no_leading_boundary() {
    let swapchain = texture(7);
    let passes = vec![render_pass(7, 0..1), pass(PassKind::Compute, 1..2)];
    let info = FrameCommandInfo::new(&passes, 1, |rt| {
        rt.textures().any(|t| t == swapchain)
    });
    assert_eq!(info.num_cmd_buffers, 2);
    assert_eq!(info.encoders[0].cmd_buffer_index, 0);
    assert_eq!(info.encoders[1].cmd_buffer_index, 1);
}

#[test]
fn standalone_passes_do_not_fuse() {
    let mut standalone = pass(PassKind::Compute, 1..2);
    standalone.standalone = true;
    let passes = vec![
        pass(PassKind::Compute, 0..1),
        standalone,
        pass(PassKind::Compute, 2..3),
    ];
    let info = FrameCommandInfo::new(&passes, 1, |_| false);
    assert_eq!(info.encoders.len(), 3);
}

#[test]
fn wait_index_merge() {
    let passes = vec![pass(PassKind::Compute, 0..1)];
    let mut info = FrameCommandInfo::new(&passes, 1, |_| false);
    info.raise_queue_wait_index(0, 2, 5);
    info.raise_queue_wait_index(0, 2, 3);
    assert_eq!(info.encoders[0].queue_wait_indices[2], 5);
    let mut event = [0; nagare_base::MAX_QUEUES];
    event[2] = 9;
    event[4] = 1;
    info.merge_queue_wait_indices(0, event);
    assert_eq!(info.encoders[0].queue_wait_indices[2], 9);
    assert_eq!(info.encoders[0].queue_wait_indices[4], 1);
}
