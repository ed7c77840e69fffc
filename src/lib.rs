//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! # NagareGFX: Frame Scheduler
//!
//! NagareGFX schedules declarative frames onto an explicit graphics API
//! (Metal/Vulkan class). A client describes a frame as a list of *passes*,
//! each declaring how it accesses logical *resources*. Submitting the frame
//! compiles those declarations into:
//!
//!  - a partition of the passes into *encoders* and *command buffers*;
//!  - a pre-frame command stream that materialises transient resources
//!    just-in-time (reusing aliased heap memory when safe) and gates the
//!    frame on prior frames' completion;
//!  - an in-frame command stream carrying residency declarations, memory
//!    barriers, and the minimal set of fences needed between encoders.
//!
//! The heavy lifting lives in [`nagare_frame`]; the backend-facing contract
//! (command buffers, encoders, fences, the transient resource registry) is
//! defined by [`nagare_base`]. A headless, synchronous backend for tests is
//! provided under [`backends::null`].
//!
//! # Terminology
//!
//! | NagareGFX       | Metal 2                | Vulkan                 |
//! | --------------- | ---------------------- | ---------------------- |
//! | argument table  | argument buffer        | descriptor set         |
//! | command buffer  | command buffer         | command buffer         |
//! | fence           | fence                  | event                  |
//! | sync event      | shared event           | timeline semaphore     |
//! | texture         | texture                | image + image view     |
//! | memoryless      | memoryless storage     | transient attachment   |

pub use nagare_base as base;
pub use nagare_frame as frame;

/// Includes the in-tree backends.
pub mod backends {
    pub use nagare_null as null;
}

/// The NagareGFX prelude.
pub mod prelude {
    #[doc(no_inline)]
    pub use crate::base::{CmdBuffer, CmdEncoder, CmdQueue, TransientResourceRegistry};
    #[doc(no_inline)]
    pub use crate::frame::{Frame, FrameScheduler, PassDesc, ResourceAccess};
}
