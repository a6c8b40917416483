/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the accelerator emulator crypto library.

--*/

mod block;
mod digest;
mod rc4;
mod rsa;

pub use block::BlockCipher;
pub use digest::{md5, sha256, MD5_DIGEST_SIZE, SHA256_DIGEST_SIZE};
pub use rc4::Rc4;
pub use rsa::{rsa_modexp, RSA_PUBLIC_EXPONENT};

use chaos_api::{Algorithm, AlgorithmKind};
use chaos_error::{ChaosError, ChaosResult};

/// Stateless crypto primitives the device exposes to firmware.
pub trait CryptoBackend {
    /// Apply `algo` to `input` under `key`
    ///
    /// # Arguments
    ///
    /// * `algo` - Algorithm to run
    /// * `input` - Input bytes; whole blocks for block ciphers
    /// * `key` - Key bytes; ignored by digests
    ///
    /// # Returns
    ///
    /// * `Vec<u8>` - Output bytes
    fn transform(&self, algo: Algorithm, input: &[u8], key: &[u8]) -> ChaosResult<Vec<u8>>;

    /// Calculate SHA-256 digest
    fn sha256(&self, data: &[u8]) -> [u8; SHA256_DIGEST_SIZE];

    /// Little-endian modular exponentiation `input ^ exponent mod modulus`,
    /// zero extended to the modulus length
    fn rsa_modexp(&self, modulus: &[u8], exponent: &[u8], input: &[u8]) -> ChaosResult<Vec<u8>>;
}

/// Software implementation of [`CryptoBackend`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftCrypto;

impl CryptoBackend for SoftCrypto {
    fn transform(&self, algo: Algorithm, input: &[u8], key: &[u8]) -> ChaosResult<Vec<u8>> {
        match algo.kind() {
            AlgorithmKind::Copy => Ok(input.to_vec()),
            AlgorithmKind::Digest { .. } => Ok(md5(input).to_vec()),
            AlgorithmKind::Stream => {
                let mut out = input.to_vec();
                Rc4::new(key)?.apply_keystream(&mut out);
                Ok(out)
            }
            AlgorithmKind::Block {
                block_size,
                encrypt,
            } => {
                let block_size = block_size as usize;
                if input.is_empty() || input.len() % block_size != 0 {
                    return Err(ChaosError::CRYPTO_INVALID_BLOCK);
                }
                let cipher = BlockCipher::new(algo, key)?;
                let mut out = input.to_vec();
                for block in out.chunks_exact_mut(block_size) {
                    if encrypt {
                        cipher.encrypt_block(block)?;
                    } else {
                        cipher.decrypt_block(block)?;
                    }
                }
                Ok(out)
            }
        }
    }

    fn sha256(&self, data: &[u8]) -> [u8; SHA256_DIGEST_SIZE] {
        sha256(data)
    }

    fn rsa_modexp(&self, modulus: &[u8], exponent: &[u8], input: &[u8]) -> ChaosResult<Vec<u8>> {
        rsa_modexp(modulus, exponent, input)
    }
}

impl<T: CryptoBackend + ?Sized> CryptoBackend for &T {
    fn transform(&self, algo: Algorithm, input: &[u8], key: &[u8]) -> ChaosResult<Vec<u8>> {
        (**self).transform(algo, input, key)
    }

    fn sha256(&self, data: &[u8]) -> [u8; SHA256_DIGEST_SIZE] {
        (**self).sha256(data)
    }

    fn rsa_modexp(&self, modulus: &[u8], exponent: &[u8], input: &[u8]) -> ChaosResult<Vec<u8>> {
        (**self).rsa_modexp(modulus, exponent, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aes_key() -> Vec<u8> {
        (0u8..16).collect()
    }

    #[test]
    fn test_aes_single_block() {
        let plaintext: Vec<u8> = (0u8..16).map(|i| i * 2).collect();
        let ciphertext = SoftCrypto
            .transform(Algorithm::AesEnc, &plaintext, &aes_key())
            .unwrap();
        assert_eq!(hex::encode(&ciphertext), "ba8c2bb6a178805d061260196db96eaa");
        let decrypted = SoftCrypto
            .transform(Algorithm::AesDec, &ciphertext, &aes_key())
            .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_block_size_enforced() {
        assert_eq!(
            SoftCrypto.transform(Algorithm::AesEnc, &[0u8; 15], &aes_key()),
            Err(ChaosError::CRYPTO_INVALID_BLOCK)
        );
        assert_eq!(
            SoftCrypto.transform(Algorithm::BlowfishEnc, &[], &aes_key()),
            Err(ChaosError::CRYPTO_INVALID_BLOCK)
        );
        assert!(SoftCrypto
            .transform(Algorithm::BlowfishEnc, &[0u8; 8], &aes_key())
            .is_ok());
    }

    #[test]
    fn test_md5_ignores_key() {
        let digest = SoftCrypto
            .transform(Algorithm::Md5, b"abc", b"unused")
            .unwrap();
        assert_eq!(hex::encode(digest), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_rc4_round_trip() {
        let key = b"Key";
        let ciphertext = SoftCrypto
            .transform(Algorithm::Rc4Enc, b"Plaintext", key)
            .unwrap();
        assert_eq!(hex::encode(&ciphertext), "bbf316e8d940af0ad3");
        let plaintext = SoftCrypto
            .transform(Algorithm::Rc4Dec, &ciphertext, key)
            .unwrap();
        assert_eq!(plaintext, b"Plaintext");
    }

    #[test]
    fn test_echo() {
        assert_eq!(
            SoftCrypto.transform(Algorithm::Echo, b"echo", b"").unwrap(),
            b"echo"
        );
    }
}
