//
// Copyright 2018 yvt, all rights reserved.
//
// This source code is a part of Nightingales.
//
//! The error type shared by the scheduler and backend adapters.
//!
//! Only failures that a correct caller can run into are represented here:
//! the registry running dry, the device falling over, or a queue rejecting
//! a submission. Contract violations (too many queues, writes to sealed
//! resources, malformed descriptors) are bugs in the calling code and are
//! reported by panicking at the call site instead, where the offending
//! stack frame is still visible.
use std::error::Error as StdError;
use std::fmt;

/// Classifies a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The registry could not provide backing memory for a
    /// materialisation. The frame carrying the request is aborted.
    AllocationFailed,

    /// The device stopped making progress: a hang, a reset, or a driver
    /// fault. Subsequent work on the same device is unlikely to succeed.
    DeviceLost,

    /// The underlying queue rejected a committed command buffer.
    SubmissionFailed,

    /// A failure that fits none of the categories above.
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match *self {
            ErrorKind::AllocationFailed => "backing memory allocation failed",
            ErrorKind::DeviceLost => "device lost",
            ErrorKind::SubmissionFailed => "submission rejected",
            ErrorKind::Other => "unclassified failure",
        };
        fmt.write_str(message)
    }
}

/// A runtime failure, optionally wrapping the backend-level cause.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    /// Attach the lower-level error that triggered this one.
    pub fn with_source<E>(kind: ErrorKind, source: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            kind,
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            Some(ref source) => write!(fmt, "{}: {}", self.kind, source),
            None => self.kind.fmt(fmt),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;
