//! Exit codes for synqctl

use synq_common::StoreError;

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for general errors
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// Exit code when a sample names an unregistered device
pub const EXIT_UNKNOWN_DEVICE: i32 = 65;

/// Exit code when the store is unreachable (retryable)
pub const EXIT_BACKEND_UNAVAILABLE: i32 = 70;

/// Pick the exit code for a failed command
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<StoreError>() {
        Some(StoreError::UnknownDevice(_)) => EXIT_UNKNOWN_DEVICE,
        Some(e) if e.is_retryable() => EXIT_BACKEND_UNAVAILABLE,
        _ => EXIT_GENERAL_ERROR,
    }
}

/// Short code of the store error behind a failure, if there is one
pub fn error_code(err: &anyhow::Error) -> Option<&'static str> {
    err.downcast_ref::<StoreError>().map(StoreError::code)
}
