//! Error taxonomy exposed to user programs (§6): `Error` is the base
//! case; the others narrow it to a cause a `rescue` clause can match on.

use std::fmt;

/// A class id placeholder: the real value model assigns classes to
/// user-defined `class` declarations and to these built-in error
/// classes alike. Out-of-scope code (the bytecode emitter) is what
/// actually allocates these; the runtime only needs to carry one.
pub type ClassId = u32;

pub const CLASS_ERROR: ClassId = 0;
pub const CLASS_RUNTIME_ERROR: ClassId = 1;
pub const CLASS_OUT_OF_MEMORY_ERROR: ClassId = 2;
pub const CLASS_OS_ERROR: ClassId = 3;
pub const CLASS_IO_ERROR: ClassId = 4;

/// One of the five kinds named in §6/§7. Carries the class id it maps to
/// so a `Value::Error` built from it round-trips through the value
/// model's `classref` machinery.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeFailure {
    Error(String),
    RuntimeError(String),
    OutOfMemoryError,
    OsError { message: String, os_code: Option<i32> },
    IoError(String),
}

impl RuntimeFailure {
    pub fn class_id(&self) -> ClassId {
        match self {
            RuntimeFailure::Error(_) => CLASS_ERROR,
            RuntimeFailure::RuntimeError(_) => CLASS_RUNTIME_ERROR,
            RuntimeFailure::OutOfMemoryError => CLASS_OUT_OF_MEMORY_ERROR,
            RuntimeFailure::OsError { .. } => CLASS_OS_ERROR,
            RuntimeFailure::IoError(_) => CLASS_IO_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RuntimeFailure::Error(m) | RuntimeFailure::RuntimeError(m) | RuntimeFailure::IoError(m) => m,
            RuntimeFailure::OutOfMemoryError => "out of memory",
            RuntimeFailure::OsError { message, .. } => message,
        }
    }
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFailure::OsError { message, os_code: Some(code) } => {
                write!(f, "OSError: {message} (os error {code})")
            }
            RuntimeFailure::OsError { message, os_code: None } => write!(f, "OSError: {message}"),
            other => write!(f, "{}: {}", class_name(other.class_id()), other.message()),
        }
    }
}

impl std::error::Error for RuntimeFailure {}

fn class_name(id: ClassId) -> &'static str {
    match id {
        CLASS_ERROR => "Error",
        CLASS_RUNTIME_ERROR => "RuntimeError",
        CLASS_OUT_OF_MEMORY_ERROR => "OutOfMemoryError",
        CLASS_OS_ERROR => "OSError",
        CLASS_IO_ERROR => "IOError",
        _ => "Error",
    }
}

impl From<std::io::Error> for RuntimeFailure {
    fn from(err: std::io::Error) -> Self {
        RuntimeFailure::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_class_name_and_message() {
        let e = RuntimeFailure::RuntimeError("division by zero".to_string());
        assert_eq!(format!("{e}"), "RuntimeError: division by zero");
    }

    #[test]
    fn os_error_includes_code_when_present() {
        let e = RuntimeFailure::OsError {
            message: "connection refused".to_string(),
            os_code: Some(111),
        };
        assert_eq!(format!("{e}"), "OSError: connection refused (os error 111)");
    }

    #[test]
    fn io_error_converts_from_std_io_error() {
        let io_err = std::io::Error::other("boom");
        let failure: RuntimeFailure = io_err.into();
        assert_eq!(failure.class_id(), CLASS_IO_ERROR);
    }
}
