// Licensed under the Apache-2.0 license

//! Syscall numbers the firmware may issue inside the sandbox.

/// Crypto capability: `(algo, input, key, output)`, buffers packed as
/// `addr << 32 | len`
pub const SYS_CHAOS_CRYPTO: u64 = 0xc8a05;

pub const SYS_EXIT: u64 = 60;
pub const SYS_EXIT_GROUP: u64 = 231;

/// Exit code of a firmware that rejected its command
pub const FIRMWARE_FATAL_EXIT: i64 = 2;
