//! `Outcome<T>`: the Rust realization of the "manual OOM plumbing" design
//! note (§9). The original threads an `outofmemory` flag alongside every
//! return value; here the failure variant distinguishes out-of-memory from
//! an ordinary diagnosed failure and from an internal invariant violation,
//! so callers that only care about "did this succeed" can still use `?`.

use crate::message::Message;

/// Why an operation did not produce its normal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// Allocation failed. Always fatal to the enclosing operation, never to
    /// the process: the caller's caller gets a chance to recover or abort.
    OutOfMemory,
    /// A diagnosed failure (parse failure, scope failure, ...), already
    /// recorded as a [`Message`] for the project's message sink.
    Diagnostic(Message),
    /// An internal invariant was violated. Not expected to occur; reserved
    /// for `debug_assert!`-style checks promoted to a recoverable error at
    /// API boundaries that must not panic (e.g. the transform driver).
    Invariant(&'static str),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::OutOfMemory => write!(f, "out of memory"),
            Failure::Diagnostic(m) => write!(f, "{}", m),
            Failure::Invariant(what) => write!(f, "internal invariant violated: {}", what),
        }
    }
}

impl std::error::Error for Failure {}

/// `Result<T, Failure>`, named to read naturally at call sites that mirror
/// the original's explicit success/failure return channel.
pub type Outcome<T> = Result<T, Failure>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn out_of_memory_display() {
        let f = Failure::OutOfMemory;
        assert_eq!(format!("{}", f), "out of memory");
    }

    #[test]
    fn diagnostic_display_delegates_to_message() {
        let m = Message::error("bad token", PathBuf::from("x"), 1, 2);
        let f = Failure::Diagnostic(m.clone());
        assert_eq!(format!("{}", f), format!("{}", m));
    }
}
