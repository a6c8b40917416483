/*++

Licensed under the Apache-2.0 license.

File Name:

   generator.rs

Abstract:

    Firmware image generator

--*/
use anyhow::bail;
use chaos_image_types::{encode_image, MAX_KEY_BYTE_SIZE, SHA256_DIGEST_BYTE_SIZE};

use crate::*;

/// Image generator
pub struct ImageGenerator<Crypto: ImageGeneratorCrypto> {
    crypto: Crypto,
}

impl<Crypto: ImageGeneratorCrypto> ImageGenerator<Crypto> {
    /// Create an instance `ImageGenerator`
    pub fn new(crypto: Crypto) -> Self {
        Self { crypto }
    }

    /// Generate a signed image
    ///
    /// # Arguments
    ///
    /// * `key` - Signing key; its modulus is embedded as the image key
    /// * `code` - Executable content
    ///
    /// # Returns
    ///
    /// * `Vec<u8>` - Serialized image
    pub fn generate(&self, key: &RsaSigningKey, code: &[u8]) -> anyhow::Result<Vec<u8>> {
        if key.modulus.len() > MAX_KEY_BYTE_SIZE {
            bail!("Key larger than {MAX_KEY_BYTE_SIZE} bytes");
        }
        if key.modulus.len() < SHA256_DIGEST_BYTE_SIZE {
            bail!("Key smaller than the {SHA256_DIGEST_BYTE_SIZE} byte digest");
        }
        if code.is_empty() {
            bail!("Image has no code");
        }

        let digest = self.crypto.sha256_digest(code)?;
        let signature = self.crypto.rsa_sign(&digest, key)?;
        if signature.len() != key.modulus.len() {
            bail!(
                "Signature is {} bytes, expected {}",
                signature.len(),
                key.modulus.len()
            );
        }

        encode_image(&key.modulus, &signature, code)
            .map_err(|err| anyhow::anyhow!("Failed to encode image: {err}"))
    }
}
