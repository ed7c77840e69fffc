//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Descriptors for logical resources.
use crate::handles::{ResourceRef, TextureRef};
use crate::{DeviceSize, TextureUsageFlags};

/// The pixel format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba8Srgb,
    R16Float,
    Rgba16Float,
    R32Float,
    Rgba32Float,
    Depth32Float,
    Depth24Stencil8,
}

/// Where a resource's backing memory lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageMode {
    /// Host-visible memory.
    Shared,
    /// Device-local memory.
    Private,
    /// Tile-local memory; contents do not survive the encoder that produced
    /// them. Only meaningful for render-target textures.
    Memoryless,
}

/// Describes a buffer resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    pub length: DeviceSize,
    pub storage_mode: StorageMode,
}

impl BufferDescriptor {
    pub fn new(length: DeviceSize) -> Self {
        Self {
            length,
            storage_mode: StorageMode::Private,
        }
    }

    pub fn with_storage_mode(self, storage_mode: StorageMode) -> Self {
        Self {
            storage_mode,
            ..self
        }
    }
}

/// Describes a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub pixel_format: PixelFormat,
    pub mip_levels: u32,
    pub sample_count: u32,
    pub usage: TextureUsageFlags,
    pub storage_mode: StorageMode,
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, pixel_format: PixelFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            pixel_format,
            mip_levels: 1,
            sample_count: 1,
            usage: TextureUsageFlags::empty(),
            storage_mode: StorageMode::Private,
        }
    }

    pub fn with_usage(self, usage: TextureUsageFlags) -> Self {
        Self { usage, ..self }
    }

    pub fn with_storage_mode(self, storage_mode: StorageMode) -> Self {
        Self {
            storage_mode,
            ..self
        }
    }
}

/// Describes a view onto an existing texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureViewDescriptor {
    pub base: TextureRef,
    pub pixel_format: PixelFormat,
    pub mip_range_start: u32,
    pub mip_range_len: u32,
}

/// Describes an argument table: an ordered set of resources bound for
/// shader access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgTableDescriptor {
    pub arguments: Vec<ResourceRef>,
}

impl ArgTableDescriptor {
    pub fn new(arguments: Vec<ResourceRef>) -> Self {
        Self { arguments }
    }
}

/// The descriptor for any resource kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDescriptor {
    Buffer(BufferDescriptor),
    Texture(TextureDescriptor),
    TextureView(TextureViewDescriptor),
    ArgTable(ArgTableDescriptor),
    ArgTableArray(Vec<ArgTableDescriptor>),
}

impl ResourceDescriptor {
    pub fn as_texture(&self) -> Option<&TextureDescriptor> {
        match *self {
            ResourceDescriptor::Texture(ref x) => Some(x),
            _ => None,
        }
    }

    pub fn is_texture_view(&self) -> bool {
        match *self {
            ResourceDescriptor::TextureView(_) => true,
            _ => false,
        }
    }
}
