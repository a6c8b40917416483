/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains API and macros used by the accelerator crates for error
    handling.

--*/
#![cfg_attr(not(feature = "std"), no_std)]
use core::convert::From;
use core::fmt;
use core::num::{NonZeroU32, TryFromIntError};

/// Accelerator Error Type
/// Derives debug, copy, clone, eq, and partial eq
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ChaosError(pub NonZeroU32);

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, doc) tuples and generates
/// constant definitions for each error code.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: ChaosError = ChaosError::new_const($value);
        )*

        /// Returns the name of a known error code
        pub fn name(&self) -> Option<&'static str> {
            let val = self.0.get();
            $(
                if val == $value {
                    return Some(stringify!($name));
                }
            )*
            None
        }

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

impl ChaosError {
    /// Create an error; intended to only be used from const contexts, as we don't want
    /// runtime panics if val is zero. The preferred way to get a ChaosError from a u32 is to
    /// use `ChaosError::try_from()` from the `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("ChaosError cannot be 0"),
        }
    }

    define_error_constants![
        (
            DRIVER_DRAM_INVALID_SIZE,
            0x0001_0001,
            "DRAM Error: Zero sized allocation"
        ),
        (
            DRIVER_DRAM_NO_SPACE,
            0x0001_0002,
            "DRAM Error: No free range large enough"
        ),
        (
            DRIVER_DRAM_INVALID_FREE,
            0x0001_0003,
            "DRAM Error: Released range was not allocated from this pool"
        ),
        (
            DRIVER_MAILBOX_INVALID_CAPACITY,
            0x0002_0001,
            "Mailbox Error: Queue capacity is not a non-zero power of two"
        ),
        (
            DRIVER_MAILBOX_FW_LOAD_TIMEOUT,
            0x0002_0002,
            "Mailbox Error: Device did not report a firmware load status"
        ),
        (
            DRIVER_MAILBOX_FW_UNKNOWN_STATUS,
            0x0002_0003,
            "Mailbox Error: Firmware load status carries an unknown reason"
        ),
        (
            DRIVER_MAILBOX_IMAGE_TOO_LARGE,
            0x0002_0004,
            "Mailbox Error: Firmware image does not fit the register window"
        ),
        (
            CLIENT_BUFFER_EXISTS,
            0x0003_0001,
            "Client Error: A staging buffer is already allocated"
        ),
        (
            CLIENT_NO_BUFFER,
            0x0003_0002,
            "Client Error: No staging buffer allocated"
        ),
        (
            CLIENT_INVALID_SIZE,
            0x0003_0003,
            "Client Error: Zero sized staging buffer"
        ),
        (
            CLIENT_INVALID_OFFSET,
            0x0003_0004,
            "Client Error: Request offset outside of the staging buffer"
        ),
        (
            CLIENT_INVALID_MAPPING,
            0x0003_0005,
            "Client Error: Mapping outside of the staging buffer"
        ),
        (
            IMAGE_VERIFIER_INVALID_SIZE,
            0x0004_0001,
            "Image Verifier Error: Declared size does not match the image layout"
        ),
        (
            IMAGE_VERIFIER_KEY_REJECTED,
            0x0004_0002,
            "Image Verifier Error: Embedded key does not match the trust anchor"
        ),
        (
            IMAGE_VERIFIER_BAD_SIGNATURE,
            0x0004_0003,
            "Image Verifier Error: Signature does not match the code digest"
        ),
        (
            IMAGE_VERIFIER_RSA_FAILURE,
            0x0004_0004,
            "Image Verifier Error: Public key operation failed"
        ),
        (
            SANDBOX_BUFFER_INVALID_SIZE,
            0x0005_0001,
            "Sandbox Error: Transfer buffer size is zero or above the ceiling"
        ),
        (
            SANDBOX_TRANSFER_FAULT,
            0x0005_0002,
            "Sandbox Error: Memory transfer with the child failed"
        ),
        (
            SANDBOX_FORK_FAILED,
            0x0005_0003,
            "Sandbox Error: Unable to create the child context"
        ),
        (
            SANDBOX_ATTACH_FAILED,
            0x0005_0004,
            "Sandbox Error: Unable to attach to the child context"
        ),
        (
            SANDBOX_ARM_TIMEOUT,
            0x0005_0005,
            "Sandbox Error: Child did not install its syscall filter in time"
        ),
        (
            SANDBOX_WAIT_FAILED,
            0x0005_0006,
            "Sandbox Error: Waiting for the child failed"
        ),
        (
            SANDBOX_REGS_FAILED,
            0x0005_0007,
            "Sandbox Error: Reading or writing child registers failed"
        ),
        (
            SANDBOX_RESUME_FAILED,
            0x0005_0008,
            "Sandbox Error: Resuming the child failed"
        ),
        (
            SANDBOX_UNSUPPORTED_PLATFORM,
            0x0005_0009,
            "Sandbox Error: Process isolation is not available on this platform"
        ),
        (
            SANDBOX_REGION_MAP_FAILED,
            0x0005_000A,
            "Sandbox Error: Unable to map the execution or stack region"
        ),
        (
            SANDBOX_CODE_TOO_LARGE,
            0x0005_000B,
            "Sandbox Error: Code does not fit the execution region"
        ),
        (
            CRYPTO_UNKNOWN_ALGORITHM,
            0x0006_0001,
            "Crypto Error: Unknown algorithm"
        ),
        (
            CRYPTO_INVALID_KEY,
            0x0006_0002,
            "Crypto Error: Key length not supported by the algorithm"
        ),
        (
            CRYPTO_INVALID_BLOCK,
            0x0006_0003,
            "Crypto Error: Input is not exactly one cipher block"
        ),
        (
            CRYPTO_RSA_INVALID_MODULUS,
            0x0006_0004,
            "Crypto Error: RSA modulus is zero"
        ),
        (
            DEVICE_DRAM_NOT_ADDRESSABLE,
            0x0007_0001,
            "Device Error: DRAM does not lie below 4 GiB"
        ),
        (
            DEVICE_THREAD_SPAWN_FAILED,
            0x0007_0002,
            "Device Error: Unable to start the device thread"
        ),
        (
            DEVICE_NO_FIRMWARE,
            0x0007_0003,
            "Device Error: No verified firmware loaded"
        ),
        (
            BUS_LOAD_ACCESS_FAULT,
            0x0008_0001,
            "Bus Error: Read outside of the region"
        ),
        (
            BUS_STORE_ACCESS_FAULT,
            0x0008_0002,
            "Bus Error: Write outside of the region"
        ),
        (
            BUS_LOAD_ADDR_MISALIGNED,
            0x0008_0003,
            "Bus Error: Misaligned register read"
        ),
        (
            BUS_STORE_ADDR_MISALIGNED,
            0x0008_0004,
            "Bus Error: Misaligned register write"
        ),
        (
            BUS_MMAP_FAILED,
            0x0008_0005,
            "Bus Error: Unable to map shared memory"
        ),
        (
            FIRMWARE_INVALID_COMMAND,
            0x0009_0001,
            "Firmware Error: Unknown command code or payload size"
        ),
        (
            FIRMWARE_BUFFER_OUT_OF_BOUNDS,
            0x0009_0002,
            "Firmware Error: Request buffer outside of DRAM"
        ),
        (
            FIRMWARE_UNKNOWN_ALGORITHM,
            0x0009_0003,
            "Firmware Error: Unknown request algorithm"
        ),
    ];
}

impl fmt::Display for ChaosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08x})", self.0.get()),
            None => write!(f, "0x{:08x}", self.0.get()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ChaosError {}

impl From<core::num::NonZeroU32> for crate::ChaosError {
    fn from(val: core::num::NonZeroU32) -> Self {
        crate::ChaosError(val)
    }
}

impl From<ChaosError> for core::num::NonZeroU32 {
    fn from(val: ChaosError) -> Self {
        val.0
    }
}

impl From<ChaosError> for u32 {
    fn from(val: ChaosError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for ChaosError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(ChaosError(val)),
            Err(err) => Err(err),
        }
    }
}

pub type ChaosResult<T> = Result<T, ChaosError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_try_from() {
        assert!(ChaosError::try_from(0).is_err());
        assert_eq!(
            Ok(ChaosError::DRIVER_DRAM_NO_SPACE),
            ChaosError::try_from(0x0001_0002)
        );
    }

    #[test]
    fn test_display_names_known_codes() {
        assert_eq!(
            ChaosError::CLIENT_BUFFER_EXISTS.to_string(),
            "CLIENT_BUFFER_EXISTS (0x00030001)"
        );
        let unknown = ChaosError::try_from(0xdead_0000).unwrap();
        assert_eq!(unknown.to_string(), "0xdead0000");
    }

    #[test]
    fn test_error_constants_uniqueness() {
        let constants = ChaosError::all_constants();
        let mut error_values = HashSet::new();
        let mut duplicates = Vec::new();

        for (name, value) in constants {
            if !error_values.insert(value) {
                duplicates.push((name, value));
            }
        }

        assert!(
            duplicates.is_empty(),
            "Found duplicate error codes: {:?}",
            duplicates
        );
    }
}
