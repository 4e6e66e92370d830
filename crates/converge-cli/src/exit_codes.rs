//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

#![allow(dead_code)]

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - immutable or unpatchable field changes
pub const VALIDATION_ERROR: i32 = 2;

/// Convergence error - failed state, timeout or cancellation
pub const CONVERGENCE_ERROR: i32 = 3;

/// Not found - the resource does not exist
pub const NOT_FOUND: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Conflict - a resource with the same natural key exists
pub const CONFLICT: i32 = 6;

/// Remote error - the control plane rejected or failed a call
pub const REMOTE_ERROR: i32 = 7;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
