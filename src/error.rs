use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::io;

use ndarray::ShapeError;

use crate::hl::chunks::ChunkCoord;

/// Where in a plan an execution error happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepContext {
    pub step: usize,
    pub chunk: Option<ChunkCoord>,
}

impl fmt::Display for StepContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "plan step {}", self.step)?;
        if let Some(ref chunk) = self.chunk {
            write!(f, " (chunk {})", chunk)?;
        }
        Ok(())
    }
}

/// The error type for planning and executing selection I/O.
#[derive(Clone, PartialEq, Eq)]
pub enum Error {
    /// A selection index lies outside of the dataset extent.
    OutOfRange(String),
    /// A malformed hyperslab or index list.
    InvalidSelection(String),
    /// The storage engine failed while executing a plan step.
    Io { message: String, context: Option<StepContext> },
    /// The named object does not exist.
    NotFound(String),
    /// An object with this name already exists (creation).
    AlreadyExists(String),
    /// An object with this name already exists (copy target).
    NameConflict(String),
    /// Dataset creation parameters were rejected.
    InvalidParams(String),
    /// Attempted to write through a read-only store.
    ReadOnly(String),
    /// The operation was cancelled between plan steps.
    Cancelled,
    /// A user error occurred in the high-level API (e.g., invalid user input).
    Internal(String),
}

/// A type for results generated by this crate where the `Err` type is
/// set to `slabplan::Error`.
pub type Result<T, E = Error> = ::std::result::Result<T, E>;

impl Error {
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into(), context: None }
    }

    /// Attaches the failing plan step to an execution error.
    pub fn at_step(self, step: usize, chunk: Option<ChunkCoord>) -> Self {
        match self {
            Self::Io { message, context: None } => {
                Self::Io { message, context: Some(StepContext { step, chunk }) }
            }
            err => err,
        }
    }

    pub fn context(&self) -> Option<&StepContext> {
        match *self {
            Self::Io { ref context, .. } => context.as_ref(),
            _ => None,
        }
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::OutOfRange(_) | Self::InvalidSelection(_))
    }
}

impl From<&str> for Error {
    fn from(desc: &str) -> Self {
        Self::Internal(desc.into())
    }
}

impl From<String> for Error {
    fn from(desc: String) -> Self {
        Self::Internal(desc)
    }
}

impl From<Infallible> for Error {
    fn from(_: Infallible) -> Self {
        unreachable!("Infallible error can never be constructed")
    }
}

impl From<ShapeError> for Error {
    fn from(err: ShapeError) -> Self {
        format!("shape error: {}", err).into()
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        Self::new(io::ErrorKind::Other, err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::OutOfRange(ref desc) => write!(f, "out of range: {}", desc),
            Self::InvalidSelection(ref desc) => write!(f, "invalid selection: {}", desc),
            Self::Io { ref message, context: None } => write!(f, "i/o error: {}", message),
            Self::Io { ref message, context: Some(ref ctx) } => {
                write!(f, "i/o error at {}: {}", ctx, message)
            }
            Self::NotFound(ref name) => write!(f, "object not found: {}", name),
            Self::AlreadyExists(ref name) => write!(f, "object already exists: {}", name),
            Self::NameConflict(ref name) => write!(f, "name conflict: {}", name),
            Self::InvalidParams(ref desc) => write!(f, "invalid parameters: {}", desc),
            Self::ReadOnly(ref desc) => write!(f, "read-only: {}", desc),
            Self::Cancelled => f.write_str("operation cancelled"),
            Self::Internal(ref desc) => f.write_str(desc),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl StdError for Error {}
