//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
use bitflags::bitflags;
use flags_macro::flags;

bitflags! {
    /// Specifies zero or more pipeline stages.
    pub struct StageFlags: u16 {
        const INDIRECT_DRAW = 0b1;
        const VERTEX_INPUT = 0b10;
        const VERTEX = 0b100;
        const FRAGMENT = 0b1000;
        const EARLY_FRAG_TESTS = 0b10000;
        const LATE_FRAG_TESTS = 0b100000;
        const RENDER_OUTPUT = 0b1000000;
        const COMPUTE = 0b10000000;
        const COPY = 0b100000000;
        /// Host-side access performed by a CPU pass.
        const HOST = 0b1000000000;
    }
}

impl StageFlags {
    pub fn all_render() -> StageFlags {
        flags![StageFlags::{INDIRECT_DRAW | VERTEX_INPUT | VERTEX | FRAGMENT |
            EARLY_FRAG_TESTS | LATE_FRAG_TESTS | RENDER_OUTPUT}]
    }

    /// Indicates whether the set contains stages executed by the device (as
    /// opposed to [`StageFlags::HOST`] only).
    pub fn intersects_device_stages(&self) -> bool {
        self.intersects(!StageFlags::HOST)
    }
}

bitflags! {
    /// Describes how a resource will be used in a shader.
    pub struct ResourceUsageFlags: u8 {
        /// Enables reading from the resource via a shader argument.
        const READ = 0b001;
        /// Enables writing to the resource via a shader argument.
        const WRITE = 0b010;
        /// Enables texture sampling from the resource.
        const SAMPLE = 0b100;
    }
}

bitflags! {
    /// Specifies the operations a texture's backing memory must support.
    ///
    /// The scheduler derives these from the recorded usages of a texture and
    /// passes the union to the registry when the texture is materialised.
    pub struct TextureUsageFlags: u8 {
        const SHADER_READ = 0b1;
        const SHADER_WRITE = 0b10;
        const RENDER_TARGET = 0b100;
        /// The texture is viewed using a different pixel format.
        const PIXEL_FORMAT_VIEW = 0b1000;
        /// The texture's contents never leave tile memory. Only valid for
        /// render-target-only textures on backends that support it.
        const MEMORYLESS = 0b10000;
    }
}

bitflags! {
    /// Properties of a logical resource that affect its lifetime and
    /// cross-frame tracking.
    pub struct ResourceOptions: u8 {
        /// The resource lives across frames and must be explicitly disposed.
        const PERSISTENT = 0b1;
        /// The resource's contents are carried over to subsequent frames once
        /// it has been written for the first time. Implies cross-frame
        /// tracking as for `PERSISTENT`.
        const HISTORY_BUFFER = 0b10;
        /// After the resource has been initialised by its first write, no
        /// further writes are permitted.
        const IMMUTABLE_ONCE_INIT = 0b100;
        /// The texture aliases a swapchain drawable acquired per frame.
        const WINDOW_HANDLE = 0b1000;
    }
}
