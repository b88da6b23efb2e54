use std::error;
use std::fmt;

/// Misuse or terminal-state failures reported by [`CountdownLatch`].
///
/// Routine outcomes (nothing left to signal, latch already open for a
/// `try_add_count`, a wait that ran out of time) are reported as `bool`
/// and never show up here.
///
/// [`CountdownLatch`]: crate::CountdownLatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchError {
    /// A count, signal amount or timeout was out of range. State is untouched.
    InvalidArgument(&'static str),
    /// The call is not legal in the latch's current state.
    InvalidOperation(&'static str),
    /// The latch has been disposed.
    Disposed,
}

impl LatchError {
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, LatchError::InvalidArgument(_))
    }

    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, LatchError::InvalidOperation(_))
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self, LatchError::Disposed)
    }
}

impl fmt::Display for LatchError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatchError::InvalidArgument(msg) => write!(fmt, "invalid argument: {}", msg),
            LatchError::InvalidOperation(msg) => write!(fmt, "invalid operation: {}", msg),
            LatchError::Disposed => fmt.write_str("latch has been disposed"),
        }
    }
}

impl error::Error for LatchError {}
