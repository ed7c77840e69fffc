//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Value-typed resource handles.
//!
//! Handles identify logical resources without owning them. Each handle packs
//! a resource type tag, an index into an arena, a generation used to detect
//! stale references, and a marker distinguishing transient (single-frame)
//! resources from persistent ones.
//!
//! Handles are `Copy` and cheap to compare/hash; every table inside the
//! scheduler and the backend registry is keyed by them.
use std::fmt;

/// The type of the object a [`Handle`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Buffer = 0,
    Texture = 1,
    ArgTable = 2,
    ArgTableArray = 3,
}

const INDEX_BITS: u32 = 32;
const GENERATION_BITS: u32 = 24;
const GENERATION_SHIFT: u32 = INDEX_BITS;
const TYPE_SHIFT: u32 = INDEX_BITS + GENERATION_BITS;
const TRANSIENT_SHIFT: u32 = TYPE_SHIFT + 3;

/// An untyped resource handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    bits: u64,
}

impl Handle {
    pub fn new(ty: ResourceType, index: u32, generation: u32, transient: bool) -> Self {
        debug_assert!(generation < (1 << GENERATION_BITS), "generation overflow");
        Self {
            bits: u64::from(index)
                | (u64::from(generation) << GENERATION_SHIFT)
                | ((ty as u64) << TYPE_SHIFT)
                | ((transient as u64) << TRANSIENT_SHIFT),
        }
    }

    pub fn index(&self) -> u32 {
        self.bits as u32
    }

    pub fn generation(&self) -> u32 {
        ((self.bits >> GENERATION_SHIFT) as u32) & ((1 << GENERATION_BITS) - 1)
    }

    pub fn resource_type(&self) -> ResourceType {
        match (self.bits >> TYPE_SHIFT) & 0b111 {
            0 => ResourceType::Buffer,
            1 => ResourceType::Texture,
            2 => ResourceType::ArgTable,
            3 => ResourceType::ArgTableArray,
            _ => unreachable!(),
        }
    }

    pub fn is_transient(&self) -> bool {
        (self.bits >> TRANSIENT_SHIFT) & 1 != 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "{:?}({}{}.{})",
            self.resource_type(),
            if self.is_transient() { "t" } else { "p" },
            self.index(),
            self.generation()
        )
    }
}

/// Defines a typed handle wrapper.
macro_rules! define_resource_ref {
    ($(#[$smeta:meta])* $name:ident : $ty:expr) => {
        $(#[$smeta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Handle);

        impl $name {
            /// Wrap a raw handle. The handle's type tag must match.
            pub fn from_handle(handle: Handle) -> Self {
                debug_assert_eq!(handle.resource_type(), $ty);
                Self(handle)
            }

            pub fn handle(&self) -> Handle {
                self.0
            }

            pub fn index(&self) -> u32 {
                self.0.index()
            }

            pub fn generation(&self) -> u32 {
                self.0.generation()
            }

            pub fn is_transient(&self) -> bool {
                self.0.is_transient()
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, fmt: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Debug::fmt(&self.0, fmt)
            }
        }

        impl From<$name> for Handle {
            fn from(x: $name) -> Handle {
                x.0
            }
        }
    };
}

define_resource_ref! {
    /// Buffer handle.
    BufferRef: ResourceType::Buffer
}

define_resource_ref! {
    /// Texture handle. Also used for texture views.
    TextureRef: ResourceType::Texture
}

define_resource_ref! {
    /// Argument table handle.
    ///
    /// An argument table binds a fixed set of resources for shader access.
    /// Because its backing memory holds references to other resources, it is
    /// materialised only after everything it refers to has been.
    ArgTableRef: ResourceType::ArgTable
}

define_resource_ref! {
    /// Handle for a homogeneous array of argument tables.
    ArgTableArrayRef: ResourceType::ArgTableArray
}

/// An untyped reference to any resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceRef {
    Buffer(BufferRef),
    Texture(TextureRef),
    ArgTable(ArgTableRef),
    ArgTableArray(ArgTableArrayRef),
}

impl ResourceRef {
    pub fn from_handle(handle: Handle) -> Self {
        match handle.resource_type() {
            ResourceType::Buffer => ResourceRef::Buffer(BufferRef::from_handle(handle)),
            ResourceType::Texture => ResourceRef::Texture(TextureRef::from_handle(handle)),
            ResourceType::ArgTable => ResourceRef::ArgTable(ArgTableRef::from_handle(handle)),
            ResourceType::ArgTableArray => {
                ResourceRef::ArgTableArray(ArgTableArrayRef::from_handle(handle))
            }
        }
    }

    pub fn handle(&self) -> Handle {
        match *self {
            ResourceRef::Buffer(x) => x.handle(),
            ResourceRef::Texture(x) => x.handle(),
            ResourceRef::ArgTable(x) => x.handle(),
            ResourceRef::ArgTableArray(x) => x.handle(),
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.handle().resource_type()
    }

    pub fn is_transient(&self) -> bool {
        self.handle().is_transient()
    }

    pub fn is_arg_table(&self) -> bool {
        match self.resource_type() {
            ResourceType::ArgTable | ResourceType::ArgTableArray => true,
            _ => false,
        }
    }
}

impl From<BufferRef> for ResourceRef {
    fn from(x: BufferRef) -> Self {
        ResourceRef::Buffer(x)
    }
}

impl From<TextureRef> for ResourceRef {
    fn from(x: TextureRef) -> Self {
        ResourceRef::Texture(x)
    }
}

impl From<ArgTableRef> for ResourceRef {
    fn from(x: ArgTableRef) -> Self {
        ResourceRef::ArgTable(x)
    }
}

impl From<ArgTableArrayRef> for ResourceRef {
    fn from(x: ArgTableArrayRef) -> Self {
        ResourceRef::ArgTableArray(x)
    }
}
