/*++

Licensed under the Apache-2.0 license.

File Name:

   lib.rs

Abstract:

    File contains data structures for the firmware image generator.

--*/

mod generator;

pub use generator::ImageGenerator;

use anyhow::{bail, Context};
use chaos_emu_crypto::{rsa_modexp, sha256};
use chaos_image_types::ImageDigest;
use std::path::Path;

/// RSA key pair used to sign images. Integers are little-endian.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsaSigningKey {
    pub modulus: Vec<u8>,
    pub private_exponent: Vec<u8>,
}

impl RsaSigningKey {
    pub fn new(modulus: &[u8], private_exponent: &[u8]) -> Self {
        Self {
            modulus: modulus.to_vec(),
            private_exponent: private_exponent.to_vec(),
        }
    }

    /// Build a key from little-endian hex strings
    pub fn from_hex(modulus: &str, private_exponent: &str) -> anyhow::Result<Self> {
        let modulus = hex::decode(modulus.trim()).context("Invalid modulus hex")?;
        let private_exponent =
            hex::decode(private_exponent.trim()).context("Invalid private exponent hex")?;
        if modulus.is_empty() || private_exponent.is_empty() {
            bail!("RSA key material must not be empty");
        }
        Ok(Self {
            modulus,
            private_exponent,
        })
    }
}

/// Image Generator Crypto Trait
pub trait ImageGeneratorCrypto {
    /// Calculate SHA-256 digest
    fn sha256_digest(&self, data: &[u8]) -> anyhow::Result<ImageDigest>;

    /// Raw RSA signature of `digest`, little-endian and as long as the modulus
    fn rsa_sign(&self, digest: &ImageDigest, key: &RsaSigningKey) -> anyhow::Result<Vec<u8>>;

    /// Read a code blob from file
    fn code_from_file(path: &Path) -> anyhow::Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("Failed to read code file {}", path.display()))
    }
}

/// Software signer backed by the emulator crypto library
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftGeneratorCrypto;

impl ImageGeneratorCrypto for SoftGeneratorCrypto {
    fn sha256_digest(&self, data: &[u8]) -> anyhow::Result<ImageDigest> {
        Ok(sha256(data))
    }

    fn rsa_sign(&self, digest: &ImageDigest, key: &RsaSigningKey) -> anyhow::Result<Vec<u8>> {
        rsa_modexp(&key.modulus, &key.private_exponent, digest)
            .map_err(|err| anyhow::anyhow!("RSA signing failed: {err}"))
    }
}
