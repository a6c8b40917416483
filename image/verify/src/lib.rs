/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    Firmware image verification library.

--*/

mod verifier;

use chaos_api::errno;
use chaos_error::{ChaosError, ChaosResult};
use chaos_image_types::ImageDigest;

pub use verifier::ImageVerifier;

/// Verified image information
#[derive(Debug, Clone, Copy)]
pub struct VerifiedImage<'a> {
    /// Code to install in the execution region
    pub code: &'a [u8],

    /// SHA-256 of the code
    pub digest: ImageDigest,
}

/// Image Verification Environment
pub trait ImageVerificationEnv {
    /// Calculate SHA-256 Digest
    fn sha256_digest(&self, data: &[u8]) -> ChaosResult<ImageDigest>;

    /// Raise little-endian `signature` to the public exponent modulo the
    /// little-endian `modulus`
    fn rsa_public_op(&self, modulus: &[u8], signature: &[u8]) -> ChaosResult<Vec<u8>>;

    /// Pinned public key every image must carry
    fn trust_anchor(&self) -> &[u8];

    /// Capacity of the execution region in bytes
    fn exec_capacity(&self) -> usize;
}

/// Negative status code reported to the host for a verification failure
pub fn status_code(err: ChaosError) -> i64 {
    if err == ChaosError::IMAGE_VERIFIER_KEY_REJECTED {
        -errno::EKEYREJECTED
    } else if err == ChaosError::IMAGE_VERIFIER_BAD_SIGNATURE
        || err == ChaosError::IMAGE_VERIFIER_RSA_FAILURE
    {
        -errno::EBADMSG
    } else {
        -errno::EINVAL
    }
}

/// Inverse of [`status_code`]
pub fn status_error(code: i64) -> ChaosError {
    match -code {
        errno::EKEYREJECTED => ChaosError::IMAGE_VERIFIER_KEY_REJECTED,
        errno::EBADMSG => ChaosError::IMAGE_VERIFIER_BAD_SIGNATURE,
        errno::EINVAL => ChaosError::IMAGE_VERIFIER_INVALID_SIZE,
        _ => ChaosError::DRIVER_MAILBOX_FW_UNKNOWN_STATUS,
    }
}
