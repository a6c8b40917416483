/*++

Licensed under the Apache-2.0 license.

File Name:

    verifier.rs

Abstract:

    This file is the main implementation of the firmware image verifier.

--*/

use crate::*;
use chaos_image_types::FirmwareImage;

/// Image Verifier
pub struct ImageVerifier<Env: ImageVerificationEnv> {
    /// Verification Environment
    env: Env,
}

impl<Env: ImageVerificationEnv> ImageVerifier<Env> {
    /// Create a new instance `ImageVerifier`
    ///
    /// # Arguments
    ///
    /// * `env` - Environment
    pub fn new(env: Env) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Verify a firmware image
    ///
    /// # Arguments
    ///
    /// * `image` - Buffer holding the image
    /// * `declared_size` - Image size reported by the host
    ///
    /// # Returns
    ///
    /// * `VerifiedImage` - Code and digest on success
    pub fn verify<'a>(
        &self,
        image: &'a [u8],
        declared_size: u64,
    ) -> ChaosResult<VerifiedImage<'a>> {
        let declared_size = usize::try_from(declared_size)
            .map_err(|_| ChaosError::IMAGE_VERIFIER_INVALID_SIZE)?;
        let bytes = image
            .get(..declared_size)
            .ok_or(ChaosError::IMAGE_VERIFIER_INVALID_SIZE)?;

        // Size, layout, and execution region capacity
        let image = FirmwareImage::parse(bytes)?;
        if image.code.len() > self.env.exec_capacity() {
            log::warn!(
                "firmware code of {:#x} bytes exceeds the {:#x} byte execution region",
                image.code.len(),
                self.env.exec_capacity()
            );
            return Err(ChaosError::IMAGE_VERIFIER_INVALID_SIZE);
        }

        let digest = self.env.sha256_digest(image.code)?;

        // Pinned key
        if image.key != self.env.trust_anchor() {
            log::warn!("firmware key does not match the trust anchor");
            return Err(ChaosError::IMAGE_VERIFIER_KEY_REJECTED);
        }

        self.verify_signature(&image, &digest)?;

        Ok(VerifiedImage {
            code: image.code,
            digest,
        })
    }

    /// Verify the signature recovers the code digest
    fn verify_signature(&self, image: &FirmwareImage, digest: &ImageDigest) -> ChaosResult<()> {
        let recovered = self
            .env
            .rsa_public_op(image.key, image.signature)
            .map_err(|_| ChaosError::IMAGE_VERIFIER_RSA_FAILURE)?;
        if !value_eq(&recovered, digest) {
            log::warn!("firmware signature does not match the code digest");
            return Err(ChaosError::IMAGE_VERIFIER_BAD_SIGNATURE);
        }
        Ok(())
    }
}

/// Compare two little-endian integers of possibly different widths
fn value_eq(a: &[u8], b: &[u8]) -> bool {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    long[..short.len()] == *short && long[short.len()..].iter().all(|&x| x == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaos_emu_crypto::{CryptoBackend, SoftCrypto, RSA_PUBLIC_EXPONENT};
    use chaos_image_fake_keys::{DEV_RSA_MODULUS, DEV_RSA_PRIVATE_EXPONENT};
    use chaos_image_gen::{ImageGenerator, RsaSigningKey, SoftGeneratorCrypto};

    const CAPACITY: usize = 0x100;

    struct TestEnv {
        anchor: Vec<u8>,
    }

    impl ImageVerificationEnv for TestEnv {
        fn sha256_digest(&self, data: &[u8]) -> ChaosResult<ImageDigest> {
            Ok(SoftCrypto.sha256(data))
        }

        fn rsa_public_op(&self, modulus: &[u8], signature: &[u8]) -> ChaosResult<Vec<u8>> {
            SoftCrypto.rsa_modexp(modulus, &RSA_PUBLIC_EXPONENT.to_le_bytes(), signature)
        }

        fn trust_anchor(&self) -> &[u8] {
            &self.anchor
        }

        fn exec_capacity(&self) -> usize {
            CAPACITY
        }
    }

    fn verifier() -> ImageVerifier<TestEnv> {
        ImageVerifier::new(TestEnv {
            anchor: DEV_RSA_MODULUS.to_vec(),
        })
    }

    fn signed(code: &[u8]) -> Vec<u8> {
        let key = RsaSigningKey::new(&DEV_RSA_MODULUS, &DEV_RSA_PRIVATE_EXPONENT);
        ImageGenerator::new(SoftGeneratorCrypto)
            .generate(&key, code)
            .unwrap()
    }

    #[test]
    fn test_valid_image() {
        let code = [0x0f, 0x0b, 0x90, 0x90];
        let image = signed(&code);
        let verified = verifier().verify(&image, image.len() as u64).unwrap();
        assert_eq!(verified.code, &code);
        assert_eq!(verified.digest, SoftCrypto.sha256(&code));
    }

    #[test]
    fn test_declared_size_gates() {
        let image = signed(&[1, 2, 3, 4]);
        let header_len = image.len() - 4;
        for declared in [0, 5, header_len as u64, image.len() as u64 - 1] {
            assert_eq!(
                verifier().verify(&image, declared).unwrap_err(),
                ChaosError::IMAGE_VERIFIER_INVALID_SIZE
            );
        }
        // Declared beyond the buffer
        assert_eq!(
            verifier()
                .verify(&image, image.len() as u64 + 1)
                .unwrap_err(),
            ChaosError::IMAGE_VERIFIER_INVALID_SIZE
        );
    }

    #[test]
    fn test_code_larger_than_region() {
        let image = signed(&[0x90; CAPACITY + 1]);
        assert_eq!(
            verifier().verify(&image, image.len() as u64).unwrap_err(),
            ChaosError::IMAGE_VERIFIER_INVALID_SIZE
        );
    }

    #[test]
    fn test_key_pinning() {
        let image = signed(&[0x90; 8]);
        let other = ImageVerifier::new(TestEnv {
            anchor: vec![0x42; DEV_RSA_MODULUS.len()],
        });
        assert_eq!(
            other.verify(&image, image.len() as u64).unwrap_err(),
            ChaosError::IMAGE_VERIFIER_KEY_REJECTED
        );
        // A key that only shares a prefix with the anchor is rejected too.
        let truncated = ImageVerifier::new(TestEnv {
            anchor: DEV_RSA_MODULUS[..64].to_vec(),
        });
        assert_eq!(
            truncated.verify(&image, image.len() as u64).unwrap_err(),
            ChaosError::IMAGE_VERIFIER_KEY_REJECTED
        );
    }

    #[test]
    fn test_single_byte_flips() {
        let code = [0x48, 0x31, 0xc0, 0xc3];
        let image = signed(&code);
        let header_len = image.len() - code.len();
        let key_len = DEV_RSA_MODULUS.len();
        let sig_start = 5 + key_len;

        for idx in [sig_start, sig_start + 17, header_len - 1] {
            let mut bad = image.clone();
            bad[idx] ^= 0x01;
            assert_eq!(
                verifier().verify(&bad, bad.len() as u64).unwrap_err(),
                ChaosError::IMAGE_VERIFIER_BAD_SIGNATURE
            );
        }
        for idx in header_len..image.len() {
            let mut bad = image.clone();
            bad[idx] ^= 0x80;
            assert_eq!(
                verifier().verify(&bad, bad.len() as u64).unwrap_err(),
                ChaosError::IMAGE_VERIFIER_BAD_SIGNATURE
            );
        }
        assert!(verifier().verify(&image, image.len() as u64).is_ok());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(ChaosError::IMAGE_VERIFIER_INVALID_SIZE), -22);
        assert_eq!(status_code(ChaosError::IMAGE_VERIFIER_KEY_REJECTED), -129);
        assert_eq!(status_code(ChaosError::IMAGE_VERIFIER_BAD_SIGNATURE), -74);
        assert_eq!(
            status_error(-129),
            ChaosError::IMAGE_VERIFIER_KEY_REJECTED
        );
        assert_eq!(
            status_error(-5),
            ChaosError::DRIVER_MAILBOX_FW_UNKNOWN_STATUS
        );
    }

    #[test]
    fn test_value_eq() {
        assert!(value_eq(&[1, 2, 0, 0], &[1, 2]));
        assert!(value_eq(&[1, 2], &[1, 2, 0]));
        assert!(!value_eq(&[1, 2, 0, 1], &[1, 2]));
        assert!(!value_eq(&[1, 3], &[1, 2]));
    }
}
