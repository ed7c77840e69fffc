//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! Pass declarations.
use std::fmt;
use std::ops::Range;

use nagare_base::{
    CmdIndex, ComputeCmdEncoder, CopyCmdEncoder, ExternalCmdEncoder, RenderCmdEncoder,
    RenderTargetDescriptor, ResourceRef, Result, StageFlags,
};

use crate::resources::ResourceAccess;

/// The kind of work a pass performs, which decides the encoder it is
/// recorded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Render,
    Compute,
    Copy,
    /// Recorded by the client through a backend-specific interface; the
    /// scheduler only interposes synchronization.
    External,
    /// Runs on the CPU and submits nothing to the device.
    Cpu,
}

impl PassKind {
    /// Whether passes of this kind produce device commands.
    pub fn is_submitting(&self) -> bool {
        *self != PassKind::Cpu
    }

    /// Whether residency declarations apply to passes of this kind.
    pub fn uses_residency(&self) -> bool {
        match *self {
            PassKind::Render | PassKind::Compute | PassKind::Copy => true,
            PassKind::External | PassKind::Cpu => false,
        }
    }
}

/// The encoder handed to a pass's payload when it executes.
pub enum PassEncoderHost<'a> {
    Render(&'a mut dyn RenderCmdEncoder),
    Compute(&'a mut dyn ComputeCmdEncoder),
    Copy(&'a mut dyn CopyCmdEncoder),
    External(&'a mut dyn ExternalCmdEncoder),
    Cpu,
}

/// The payload executed when a pass's turn comes.
pub type PassEncodeFn = Box<dyn FnMut(&mut PassEncoderHost<'_>) -> Result<()> + Send>;

/// One resource access declared by a pass.
#[derive(Debug, Clone)]
pub struct UsageDesc {
    pub resource: ResourceRef,
    pub access: ResourceAccess,
    pub stages: StageFlags,
    pub in_arg_table: bool,
    /// Command range relative to the pass's own commands. `None` covers the
    /// whole pass.
    pub command_range: Option<Range<CmdIndex>>,
}

/// A declarative description of one pass.
pub struct PassDesc {
    pub name: &'static str,
    pub kind: PassKind,
    pub render_target: Option<RenderTargetDescriptor>,
    /// The number of commands the pass records. Usages may target a
    /// sub-range of them.
    pub num_commands: CmdIndex,
    pub usages: Vec<UsageDesc>,
    pub active: bool,
    /// Keep this pass in an encoder of its own instead of fusing it with
    /// compatible neighbours.
    pub standalone: bool,
    pub encode: Option<PassEncodeFn>,
}

impl fmt::Debug for PassDesc {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("PassDesc")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("render_target", &self.render_target)
            .field("num_commands", &self.num_commands)
            .field("usages", &self.usages)
            .field("active", &self.active)
            .field("encode", &self.encode.as_ref().map(|_| ()))
            .finish()
    }
}

impl PassDesc {
    pub fn new(name: &'static str, kind: PassKind) -> Self {
        Self {
            name,
            kind,
            render_target: None,
            num_commands: 1,
            usages: Vec::new(),
            active: true,
            standalone: false,
            encode: None,
        }
    }

    pub fn render(name: &'static str, render_target: RenderTargetDescriptor) -> Self {
        let mut desc = Self::new(name, PassKind::Render);
        desc.render_target = Some(render_target);
        desc
    }

    pub fn compute(name: &'static str) -> Self {
        Self::new(name, PassKind::Compute)
    }

    pub fn copy(name: &'static str) -> Self {
        Self::new(name, PassKind::Copy)
    }

    pub fn external(name: &'static str) -> Self {
        Self::new(name, PassKind::External)
    }

    pub fn cpu(name: &'static str) -> Self {
        Self::new(name, PassKind::Cpu)
    }

    pub fn commands(mut self, num_commands: CmdIndex) -> Self {
        assert!(num_commands >= 1);
        self.num_commands = num_commands;
        self
    }

    pub fn usage(mut self, usage: UsageDesc) -> Self {
        self.usages.push(usage);
        self
    }

    pub fn reads(self, resource: impl Into<ResourceRef>, stages: StageFlags) -> Self {
        self.access(resource, ResourceAccess::Read, stages)
    }

    pub fn writes(self, resource: impl Into<ResourceRef>, stages: StageFlags) -> Self {
        self.access(resource, ResourceAccess::Write, stages)
    }

    pub fn reads_writes(self, resource: impl Into<ResourceRef>, stages: StageFlags) -> Self {
        self.access(resource, ResourceAccess::ReadWrite, stages)
    }

    pub fn access(
        mut self,
        resource: impl Into<ResourceRef>,
        access: ResourceAccess,
        stages: StageFlags,
    ) -> Self {
        self.usages.push(UsageDesc {
            resource: resource.into(),
            access,
            stages,
            in_arg_table: false,
            command_range: None,
        });
        self
    }

    /// Declare an access made indirectly through an argument table.
    pub fn access_in_arg_table(
        mut self,
        resource: impl Into<ResourceRef>,
        access: ResourceAccess,
        stages: StageFlags,
    ) -> Self {
        self.usages.push(UsageDesc {
            resource: resource.into(),
            access,
            stages,
            in_arg_table: true,
            command_range: None,
        });
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn standalone(mut self) -> Self {
        self.standalone = true;
        self
    }

    pub fn encode(
        mut self,
        f: impl FnMut(&mut PassEncoderHost<'_>) -> Result<()> + Send + 'static,
    ) -> Self {
        self.encode = Some(Box::new(f));
        self
    }
}

/// A pass after it has been recorded into a frame.
pub struct PassRecord {
    pub name: &'static str,
    pub kind: PassKind,
    pub render_target: Option<RenderTargetDescriptor>,
    /// The frame-absolute command range this pass occupies.
    pub command_range: Range<CmdIndex>,
    pub active: bool,
    pub standalone: bool,
    pub(crate) encode: Option<PassEncodeFn>,
}

impl fmt::Debug for PassRecord {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("PassRecord")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("command_range", &self.command_range)
            .field("active", &self.active)
            .finish()
    }
}
