//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Render target descriptors.
use arrayvec::ArrayVec;

use crate::handles::TextureRef;

/// The maximum number of color render targets in a single render encoder.
pub const MAX_COLOR_TARGETS: usize = 8;

/// Specifies how the contents of a render target are initialised at the
/// beginning of a render encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

/// Specifies what happens to the contents of a render target at the end of a
/// render encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// A single color render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub texture: TextureRef,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_color: [f64; 4],
}

impl ColorAttachment {
    pub fn new(texture: TextureRef) -> Self {
        Self {
            texture,
            load_op: LoadOp::DontCare,
            store_op: StoreOp::Store,
            clear_color: [0.0; 4],
        }
    }

    pub fn with_load_op(self, load_op: LoadOp) -> Self {
        Self { load_op, ..self }
    }

    pub fn with_store_op(self, store_op: StoreOp) -> Self {
        Self { store_op, ..self }
    }
}

/// The depth/stencil render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilAttachment {
    pub texture: TextureRef,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear_depth: f32,
}

impl DepthStencilAttachment {
    pub fn new(texture: TextureRef) -> Self {
        Self {
            texture,
            load_op: LoadOp::Clear,
            store_op: StoreOp::DontCare,
            clear_depth: 1.0,
        }
    }
}

/// Describes the set of render targets a render encoder draws into.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderTargetDescriptor {
    pub colors: ArrayVec<ColorAttachment, MAX_COLOR_TARGETS>,
    pub depth_stencil: Option<DepthStencilAttachment>,
}

impl RenderTargetDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(mut self, attachment: ColorAttachment) -> Self {
        self.colors.push(attachment);
        self
    }

    pub fn depth_stencil(mut self, attachment: DepthStencilAttachment) -> Self {
        self.depth_stencil = Some(attachment);
        self
    }

    /// Iterate over every texture referenced by an attachment.
    pub fn textures(&self) -> impl Iterator<Item = TextureRef> + '_ {
        self.colors
            .iter()
            .map(|a| a.texture)
            .chain(self.depth_stencil.iter().map(|a| a.texture))
    }

    /// Iterate over every texture whose contents are stored at the end of
    /// the encoder.
    pub fn stored_textures(&self) -> impl Iterator<Item = TextureRef> + '_ {
        self.colors
            .iter()
            .filter(|a| a.store_op == StoreOp::Store)
            .map(|a| a.texture)
            .chain(
                self.depth_stencil
                    .iter()
                    .filter(|a| a.store_op == StoreOp::Store)
                    .map(|a| a.texture),
            )
    }

    /// Whether two descriptors may share a single render encoder.
    ///
    /// Descriptors are compatible when they target the same set of textures;
    /// differing load/store actions are reconciled by the first and last pass
    /// using the encoder.
    pub fn is_compatible_with(&self, other: &RenderTargetDescriptor) -> bool {
        self.colors.len() == other.colors.len()
            && self
                .colors
                .iter()
                .zip(other.colors.iter())
                .all(|(a, b)| a.texture == b.texture)
            && match (&self.depth_stencil, &other.depth_stencil) {
                (Some(a), Some(b)) => a.texture == b.texture,
                (None, None) => true,
                _ => false,
            }
    }
}
