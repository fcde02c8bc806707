//! Component added for the ambient stack: the one typed error surface this
//! crate exposes. Every allocation-path failure (backing exhaustion) is
//! treated as fatal and panics at the source, matching the original's
//! `assert`-or-abort posture; the only recoverable error condition is
//! calling the facade before `start()` or after `stop()`.

use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// A facade function was called while the allocator was not active.
    NotStarted,
    /// `start()` was called while the allocator was already active.
    AlreadyStarted,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::NotStarted => write!(f, "allocator has not been started"),
            AllocError::AlreadyStarted => write!(f, "allocator is already started"),
        }
    }
}

impl std::error::Error for AllocError {}
